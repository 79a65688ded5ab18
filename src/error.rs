use std::fmt;

/// Failure to obtain a remote or on-disk resource.
#[derive(Debug)]
pub enum FetchError {
    Status { status: u16, resource: String },
    NotFound(String),
    Io(std::io::Error),
    Decode(serde_json::Error),
}

impl FetchError {
    pub fn status(status: u16, resource: impl Into<String>) -> Self {
        FetchError::Status {
            status,
            resource: resource.into(),
        }
    }

    /// HTTP-equivalent status code, when one applies.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::NotFound(_) => Some(404),
            FetchError::Io(_) | FetchError::Decode(_) => None,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status { status, resource } => {
                write!(f, "HTTP error! status: {status} ({resource})")
            }
            FetchError::NotFound(resource) => write!(f, "HTTP error! status: 404 ({resource})"),
            FetchError::Io(err) => write!(f, "io error: {err}"),
            FetchError::Decode(err) => write!(f, "invalid JSON payload: {err}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Io(err) => Some(err),
            FetchError::Decode(err) => Some(err),
            FetchError::Status { .. } | FetchError::NotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(value: std::io::Error) -> Self {
        FetchError::Io(value)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(value: serde_json::Error) -> Self {
        FetchError::Decode(value)
    }
}

/// The rendered markup does not have the shape the annotator expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    NoTable,
    MissingHeader(String),
    Markdown(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoTable => write!(f, "no table found in the parsed markup"),
            ParseError::MissingHeader(label) => {
                write!(f, "table header {label:?} not found")
            }
            ParseError::Markdown(message) => write!(f, "markdown parse failed: {message}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Failure while loading one character's supplementary content. Never leaves
/// the tooltip section it belongs to.
#[derive(Debug)]
pub struct SupplementaryContentError {
    pub character: char,
    pub source: FetchError,
}

impl fmt::Display for SupplementaryContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to load supplementary content for {}: {}",
            self.character, self.source
        )
    }
}

impl std::error::Error for SupplementaryContentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Anything that stops a route from rendering.
#[derive(Debug)]
pub enum RouteError {
    Fetch(FetchError),
    Parse(ParseError),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Fetch(err) => write!(f, "{err}"),
            RouteError::Parse(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RouteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouteError::Fetch(err) => Some(err),
            RouteError::Parse(err) => Some(err),
        }
    }
}

impl From<FetchError> for RouteError {
    fn from(value: FetchError) -> Self {
        RouteError::Fetch(value)
    }
}

impl From<ParseError> for RouteError {
    fn from(value: ParseError) -> Self {
        RouteError::Parse(value)
    }
}
