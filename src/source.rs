//! Where documents, the lexicon, and supplementary content come from.

use crate::config::DataLayout;
use crate::error::{FetchError, SupplementaryContentError};
use crate::lexicon::{Lexicon, SupplementaryIndex};
use crate::tooltip::SupplementaryRequest;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait Source: Send + Sync {
    /// Reference document names, sorted.
    async fn file_list(&self) -> Result<Vec<String>, FetchError>;

    /// Raw markdown of one reference document.
    async fn document(&self, filename: &str) -> Result<String, FetchError>;

    async fn lexicon(&self) -> Result<Lexicon, FetchError>;

    async fn supplementary_index(&self) -> Result<SupplementaryIndex, FetchError>;

    /// Full HTML page of one supplementary entry, `path` relative to the data root.
    async fn supplementary(&self, path: &str) -> Result<String, FetchError>;
}

/// Fetches one tooltip's supplementary content and keeps only the page body.
pub async fn fetch_supplementary<S>(
    source: &S,
    request: &SupplementaryRequest,
) -> Result<String, SupplementaryContentError>
where
    S: Source + ?Sized,
{
    source
        .supplementary(&request.path)
        .await
        .map(|html| extract_body(&html).to_string())
        .map_err(|source| SupplementaryContentError {
            character: request.character,
            source,
        })
}

/// Inner markup of the `<body>` element, or the whole input when there is none.
pub fn extract_body(html: &str) -> &str {
    // ASCII lowercasing keeps byte offsets intact.
    let lower = html.to_ascii_lowercase();
    let Some(open) = lower.find("<body") else {
        return html.trim();
    };
    let Some(start) = lower[open..].find('>').map(|idx| open + idx + 1) else {
        return html.trim();
    };
    let end = lower
        .rfind("</body>")
        .filter(|end| *end >= start)
        .unwrap_or(html.len());
    html[start..end].trim()
}

/// Joins `relative` onto `base`, refusing anything that could escape it.
pub fn resolve_relative(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

/// Reads everything from a data directory laid out per [`DataLayout`].
#[derive(Debug, Clone)]
pub struct DirectorySource {
    layout: DataLayout,
}

impl DirectorySource {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    async fn read(&self, path: PathBuf) -> Result<Vec<u8>, FetchError> {
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn read_text(&self, path: PathBuf) -> Result<String, FetchError> {
        let bytes = self.read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl Source for DirectorySource {
    async fn file_list(&self) -> Result<Vec<String>, FetchError> {
        list_markdown_files(&self.layout.documents_path()).await
    }

    async fn document(&self, filename: &str) -> Result<String, FetchError> {
        let path = resolve_relative(&self.layout.documents_path(), filename)
            .ok_or_else(|| FetchError::NotFound(filename.to_string()))?;
        self.read_text(path).await
    }

    async fn lexicon(&self) -> Result<Lexicon, FetchError> {
        let bytes = self.read(self.layout.lexicon_path()).await?;
        Ok(Lexicon::from_json(&bytes)?)
    }

    async fn supplementary_index(&self) -> Result<SupplementaryIndex, FetchError> {
        let bytes = self.read(self.layout.supplementary_index_path()).await?;
        Ok(SupplementaryIndex::from_json(&bytes)?)
    }

    async fn supplementary(&self, path: &str) -> Result<String, FetchError> {
        let resolved = resolve_relative(&self.layout.root, path)
            .ok_or_else(|| FetchError::NotFound(path.to_string()))?;
        self.read_text(resolved).await
    }
}

/// Sorted `.md` file names directly inside `dir`.
pub async fn list_markdown_files(dir: &Path) -> Result<Vec<String>, FetchError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(FetchError::NotFound(dir.display().to_string()));
        }
        Err(err) => return Err(err.into()),
    };
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".md") && entry.file_type().await?.is_file() {
            files.push(name);
        }
    }
    files.sort();
    debug!(dir = %dir.display(), count = files.len(), "listed documents");
    Ok(files)
}

/// A request made against a [`MemorySource`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    FileList,
    Document(String),
    Lexicon,
    SupplementaryIndex,
    Supplementary(String),
}

/// In-memory source with scriptable failures and delays.
pub struct MemorySource {
    documents: BTreeMap<String, String>,
    lexicon: String,
    supplementary_index: Option<String>,
    supplementary: HashMap<String, String>,
    failures: HashMap<Resource, u16>,
    delays: HashMap<Resource, Duration>,
    requests: Mutex<Vec<Resource>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            documents: BTreeMap::new(),
            lexicon: "{}".to_string(),
            supplementary_index: None,
            supplementary: HashMap::new(),
            failures: HashMap::new(),
            delays: HashMap::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_document(mut self, filename: &str, markdown: &str) -> Self {
        self.documents
            .insert(filename.to_string(), markdown.to_string());
        self
    }

    pub fn with_lexicon_json(mut self, json: &str) -> Self {
        self.lexicon = json.to_string();
        self
    }

    pub fn with_supplementary_index_json(mut self, json: &str) -> Self {
        self.supplementary_index = Some(json.to_string());
        self
    }

    pub fn with_supplementary(mut self, path: &str, html: &str) -> Self {
        self.supplementary
            .insert(path.to_string(), html.to_string());
        self
    }

    /// Answers `resource` with the given HTTP status instead of content.
    pub fn failing(mut self, resource: Resource, status: u16) -> Self {
        self.failures.insert(resource, status);
        self
    }

    pub fn delayed(mut self, resource: Resource, delay: Duration) -> Self {
        self.delays.insert(resource, delay);
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Resource> {
        self.requests.lock().clone()
    }

    async fn answer(&self, resource: Resource, name: &str) -> Result<(), FetchError> {
        self.requests.lock().push(resource.clone());
        if let Some(delay) = self.delays.get(&resource) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.get(&resource) {
            Some(status) => Err(FetchError::status(*status, name)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn file_list(&self) -> Result<Vec<String>, FetchError> {
        self.answer(Resource::FileList, "file_list").await?;
        Ok(self.documents.keys().cloned().collect())
    }

    async fn document(&self, filename: &str) -> Result<String, FetchError> {
        self.answer(Resource::Document(filename.to_string()), filename)
            .await?;
        self.documents
            .get(filename)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(filename.to_string()))
    }

    async fn lexicon(&self) -> Result<Lexicon, FetchError> {
        self.answer(Resource::Lexicon, "lexicon").await?;
        Ok(Lexicon::from_json(self.lexicon.as_bytes())?)
    }

    async fn supplementary_index(&self) -> Result<SupplementaryIndex, FetchError> {
        self.answer(Resource::SupplementaryIndex, "supplementary index")
            .await?;
        match &self.supplementary_index {
            Some(json) => Ok(SupplementaryIndex::from_json(json.as_bytes())?),
            None => Err(FetchError::NotFound("supplementary index".to_string())),
        }
    }

    async fn supplementary(&self, path: &str) -> Result<String, FetchError> {
        self.answer(Resource::Supplementary(path.to_string()), path)
            .await?;
        self.supplementary
            .get(path)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(path.to_string()))
    }
}
