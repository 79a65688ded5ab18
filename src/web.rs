use crate::config::{DataLayout, Endpoints};
use crate::error::FetchError;
use crate::lexicon::{Lexicon, SupplementaryIndex};
use crate::source::{Source, list_markdown_files, resolve_relative};
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{Path as UrlPath, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::json;
use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceExt;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;

const URL_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'.')
    .remove(b'-')
    .remove(b'_');

#[derive(Clone)]
pub struct AppState {
    pub layout: DataLayout,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub data_root: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            data_root: PathBuf::from("./data"),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

/// Serves the data directory until Ctrl-C or SIGTERM.
pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let state = Arc::new(AppState {
        layout: DataLayout::new(config.data_root.clone()),
    });
    let router = build_router(state);
    info!(
        %config.addr,
        data_root = %config.data_root.display(),
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(value: FetchError) -> Self {
        match value {
            FetchError::NotFound(resource) => ApiError::not_found(format!("{resource} not found")),
            other => {
                warn!(error = %other, "data request failed");
                ApiError::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/file_list", get(file_list))
        .route("/data/*path", get(data_file))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(map_response(no_cache))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn no_cache(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    response
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "kanji-yomi-data" }))
}

async fn file_list(State(state): State<SharedState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(list_markdown_files(&state.layout.documents_path()).await?))
}

async fn data_file(
    State(state): State<SharedState>,
    UrlPath(path): UrlPath<String>,
) -> Result<Response, ApiError> {
    let resolved = resolve_relative(&state.layout.root, &path)
        .ok_or_else(|| ApiError::not_found(format!("{path} not found")))?;
    match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(ApiError::not_found(format!("{path} not found"))),
    }
    let bytes = match tokio::fs::read(&resolved).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!("{path} not found")));
        }
        Err(err) => return Err(FetchError::from(err).into()),
    };
    Ok(([(header::CONTENT_TYPE, content_type(&resolved))], bytes).into_response())
}

fn content_type(path: &Path) -> HeaderValue {
    let mime = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => mime::APPLICATION_JSON,
        Some("html") | Some("htm") => mime::TEXT_HTML_UTF_8,
        Some("md") | Some("txt") => mime::TEXT_PLAIN_UTF_8,
        Some("css") => mime::TEXT_CSS_UTF_8,
        Some("js") => mime::APPLICATION_JAVASCRIPT_UTF_8,
        _ => mime::APPLICATION_OCTET_STREAM,
    };
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

/// A [`Source`] that speaks the HTTP endpoint contract against a router
/// in-process, so non-2xx responses surface exactly as a browser would see
/// them.
#[derive(Clone)]
pub struct ServiceSource {
    router: Router,
    endpoints: Endpoints,
}

impl ServiceSource {
    pub fn new(router: Router, endpoints: Endpoints) -> Self {
        Self { router, endpoints }
    }

    pub fn for_data_root(root: impl Into<PathBuf>) -> Self {
        let state = Arc::new(AppState {
            layout: DataLayout::new(root),
        });
        Self::new(build_router(state), Endpoints::default())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let uri = utf8_percent_encode(path, URL_PATH).to_string();
        let request = Request::get(uri)
            .body(Body::empty())
            .map_err(|err| FetchError::Io(std::io::Error::new(ErrorKind::InvalidInput, err)))?;
        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::status(status.as_u16(), path));
        }
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|err| FetchError::Io(std::io::Error::other(err)))?;
        Ok(bytes.to_vec())
    }

    async fn get_text(&self, path: &str) -> Result<String, FetchError> {
        let bytes = self.get(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[async_trait]
impl Source for ServiceSource {
    async fn file_list(&self) -> Result<Vec<String>, FetchError> {
        let bytes = self.get(&self.endpoints.file_list).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn document(&self, filename: &str) -> Result<String, FetchError> {
        self.get_text(&self.endpoints.document(filename)).await
    }

    async fn lexicon(&self) -> Result<Lexicon, FetchError> {
        let bytes = self.get(&self.endpoints.lexicon).await?;
        Ok(Lexicon::from_json(&bytes)?)
    }

    async fn supplementary_index(&self) -> Result<SupplementaryIndex, FetchError> {
        let bytes = self.get(&self.endpoints.supplementary_index).await?;
        Ok(SupplementaryIndex::from_json(&bytes)?)
    }

    async fn supplementary(&self, path: &str) -> Result<String, FetchError> {
        self.get_text(&self.endpoints.supplementary(path)).await
    }
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::router::ViewRouter;
    use axum::body;

    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("pron_list");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(
            docs.join("火.md"),
            "| | 漢字 | index |\n|---|---|---|\n| ○ | 火 | 1 |\n| | 灯 | 1 |\n",
        )
        .unwrap();
        std::fs::write(docs.join("b.md"), "# b\n").unwrap();
        std::fs::write(
            dir.path().join("words.json"),
            r#"{"火": {"音読み": [{"pron": "カ", "type": "漢音", "words_list": ["火山"]}]}}"#,
        )
        .unwrap();
        dir
    }

    fn test_router(dir: &tempfile::TempDir) -> Router {
        build_router(Arc::new(AppState {
            layout: DataLayout::new(dir.path()),
        }))
    }

    #[tokio::test]
    async fn file_list_returns_sorted_markdown_names() {
        let dir = data_dir();
        let response = test_router(&dir)
            .oneshot(Request::get("/file_list").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let files: Vec<String> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(files, vec!["b.md", "火.md"]);
    }

    #[tokio::test]
    async fn data_files_are_served_uncached() {
        let dir = data_dir();
        let response = test_router(&dir)
            .oneshot(Request::get("/data/words.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let headers = response.headers();
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn traversal_and_missing_files_are_not_found() {
        let dir = data_dir();
        for uri in ["/data/%2E%2E/secret.txt", "/data/missing.json", "/data/pron_list"] {
            let response = test_router(&dir)
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(response.headers()[header::PRAGMA], "no-cache");
        }
    }

    #[tokio::test]
    async fn service_source_drives_the_router_over_http() {
        let dir = data_dir();
        let router = ViewRouter::new(
            ServiceSource::for_data_root(dir.path()),
            EngineConfig::with_default_groups(),
        );
        router.start("#%E7%81%AB.md#1").await.unwrap();
        let html = router.html();
        assert!(html.contains(r#"<tr id="anchor-1">"#));
        assert!(html.contains(r##"href="#火.md#1""##));
    }

    #[tokio::test]
    async fn service_source_reports_http_status() {
        let dir = data_dir();
        std::fs::remove_file(dir.path().join("words.json")).unwrap();
        let router = ViewRouter::new(
            ServiceSource::for_data_root(dir.path()),
            EngineConfig::default(),
        );
        let err = router.navigate("#b.md").await.unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(router.html().starts_with("<p>Error:"));
    }
}
