//! Location-driven view switching.
//!
//! [`ViewRouter`] maps a location hash to a view: the file list, or an
//! annotated reference table with its tooltips attached. Every navigation
//! takes a token from a shared counter; results carrying an outdated token are
//! discarded, so only the latest navigation can change [`ViewState`].

use crate::annotate::{AnnotationReport, TableAnnotator, anchor_id, toggle_column_group};
use crate::config::{ColumnGroup, EngineConfig};
use crate::document::{Document, ElementId, escape_html};
use crate::error::{FetchError, ParseError, RouteError};
use crate::lexicon::SupplementaryIndex;
use crate::source::{Source, fetch_supplementary};
use crate::tooltip::{Activation, TooltipController};
use askama::Template;
use parking_lot::Mutex;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

const HASH_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'#')
    .add(b'%')
    .add(b'"')
    .add(b'<')
    .add(b'>');

/// Parsed location hash: `#<filename>` or `#<filename>#<anchor>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteState {
    pub filename: Option<String>,
    pub anchor: Option<String>,
}

impl RouteState {
    pub fn parse(hash: &str) -> Self {
        let raw = hash.strip_prefix('#').unwrap_or(hash);
        // Split before decoding: an encoded `%23` belongs to its segment.
        let mut segments = raw.split('#');
        let non_empty = |segment: &str| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            let value = decoded.trim();
            (!value.is_empty()).then(|| value.to_string())
        };
        Self {
            filename: segments.next().and_then(non_empty),
            anchor: segments.next().and_then(non_empty),
        }
    }

    pub fn to_hash(&self) -> String {
        let Some(filename) = &self.filename else {
            return String::new();
        };
        let mut hash = format!("#{}", utf8_percent_encode(filename, HASH_COMPONENT));
        if let Some(anchor) = &self.anchor {
            hash.push('#');
            hash.extend(utf8_percent_encode(anchor, HASH_COMPONENT));
        }
        hash
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScrollRequest {
    Top,
    /// Element id to bring into view, e.g. `anchor-12`.
    Anchor(String),
    Position(f32),
}

#[derive(Debug, Clone)]
pub enum ViewContent {
    Empty,
    FileList(Vec<String>),
    Table {
        filename: String,
        document: Document,
        report: AnnotationReport,
    },
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnToggle {
    pub group: ColumnGroup,
    pub hidden: bool,
}

impl ColumnToggle {
    pub fn button_text(&self) -> String {
        self.group.button_text(self.hidden)
    }
}

/// Session history of location hashes.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<String>,
    cursor: usize,
}

impl Default for History {
    fn default() -> Self {
        Self {
            entries: vec![String::new()],
            cursor: 0,
        }
    }
}

impl History {
    pub fn current(&self) -> &str {
        &self.entries[self.cursor]
    }

    /// Adds an entry after the current one, dropping any forward entries.
    /// Pushing the current hash again is a no-op.
    pub fn push(&mut self, hash: &str) {
        if self.current() == hash {
            return;
        }
        self.entries.truncate(self.cursor + 1);
        self.entries.push(hash.to_string());
        self.cursor = self.entries.len() - 1;
    }

    pub fn replace(&mut self, hash: &str) {
        self.entries[self.cursor] = hash.to_string();
    }

    pub fn back(&mut self) -> Option<String> {
        self.cursor = self.cursor.checked_sub(1)?;
        Some(self.current().to_string())
    }

    pub fn forward(&mut self) -> Option<String> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.current().to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the host page shows, owned by one router.
pub struct ViewState {
    pub content: ViewContent,
    /// Back controls and column toggles are shown with the table view only.
    pub controls_visible: bool,
    pub column_toggles: Vec<ColumnToggle>,
    pub scroll_y: f32,
    pub history: History,
    pub tooltips: Option<TooltipController>,
    previous_position: Option<f32>,
    pending_scroll: Option<ScrollRequest>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            content: ViewContent::Empty,
            controls_visible: false,
            column_toggles: Vec::new(),
            scroll_y: 0.0,
            history: History::default(),
            tooltips: None,
            previous_position: None,
            pending_scroll: None,
        }
    }
}

impl ViewState {
    /// Scroll the host should perform next, if any.
    pub fn take_scroll(&mut self) -> Option<ScrollRequest> {
        self.pending_scroll.take()
    }

    pub fn pending_scroll(&self) -> Option<&ScrollRequest> {
        self.pending_scroll.as_ref()
    }

    pub fn previous_position(&self) -> Option<f32> {
        self.previous_position
    }

    pub fn rendered_file(&self) -> Option<&str> {
        match &self.content {
            ViewContent::Table { filename, .. } => Some(filename),
            _ => None,
        }
    }

    pub fn document(&self) -> Option<&Document> {
        match &self.content {
            ViewContent::Table { document, .. } => Some(document),
            _ => None,
        }
    }

    /// Markup of the table container.
    pub fn html(&self) -> String {
        match &self.content {
            ViewContent::Empty => String::new(),
            ViewContent::FileList(files) => render_file_list(files),
            ViewContent::Table { document, .. } => document.to_html(),
            ViewContent::Error(message) => format!("<p>Error: {}</p>", escape_html(message)),
        }
    }

    fn show_error(&mut self, message: String) {
        self.content = ViewContent::Error(message);
        self.controls_visible = false;
        self.column_toggles.clear();
        self.tooltips = None;
    }
}

struct FileLink {
    href: String,
    label: String,
}

#[derive(Template)]
#[template(
    source = r#"<ul class="file-list">
{%- for file in files %}
<li><a href="{{ file.href }}">{{ file.label }}</a></li>
{%- endfor %}
</ul>"#,
    ext = "html"
)]
struct FileListView {
    files: Vec<FileLink>,
}

pub fn render_file_list(files: &[String]) -> String {
    let view = FileListView {
        files: files
            .iter()
            .map(|file| FileLink {
                href: RouteState {
                    filename: Some(file.clone()),
                    anchor: None,
                }
                .to_hash(),
                label: file.strip_suffix(".md").unwrap_or(file).to_string(),
            })
            .collect(),
    };
    view.render().unwrap_or_else(|err| {
        warn!(error = %err, "file list template failed");
        String::new()
    })
}

/// What a router call did to the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    FileList { count: usize },
    Table { filename: String, anchor: Option<String> },
    /// Content was already rendered; only a scroll was requested.
    Scrolled,
    /// A newer navigation started before this one finished.
    Stale,
}

pub struct ViewRouter<S> {
    source: Arc<S>,
    config: Arc<EngineConfig>,
    state: Arc<Mutex<ViewState>>,
    generation: Arc<AtomicU64>,
}

impl<S> Clone for ViewRouter<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<S> ViewRouter<S>
where
    S: Source + 'static,
{
    pub fn new(source: S, config: EngineConfig) -> Self {
        Self {
            source: Arc::new(source),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(ViewState::default())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> Arc<Mutex<ViewState>> {
        Arc::clone(&self.state)
    }

    pub fn html(&self) -> String {
        self.state.lock().html()
    }

    /// Initial load: the landing hash replaces the first history entry.
    pub async fn start(&self, hash: &str) -> Result<Navigation, RouteError> {
        self.state.lock().history.replace(hash);
        self.navigate(hash).await
    }

    /// Renders the view for `hash`. Errors are also shown in the container.
    pub async fn navigate(&self, hash: &str) -> Result<Navigation, RouteError> {
        let route = RouteState::parse(hash);
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(token, file = route.filename.as_deref().unwrap_or(""), "navigating");
        match route.filename {
            None => self.show_file_list(token).await,
            Some(filename) => self.show_table(token, filename, route.anchor).await,
        }
    }

    /// A click on a file-list entry.
    pub async fn open_file(&self, filename: &str) -> Result<Navigation, RouteError> {
        let hash = RouteState {
            filename: Some(filename.to_string()),
            anchor: None,
        }
        .to_hash();
        self.state.lock().history.push(&hash);
        self.navigate(&hash).await
    }

    /// A click on a cross-reference link. Remembers the scroll position.
    /// A link into the file already rendered only scrolls, even when the
    /// target hash equals the current one.
    pub async fn follow_link(&self, href: &str) -> Result<Navigation, RouteError> {
        let target = RouteState::parse(href);
        let hash = target.to_hash();
        {
            let mut state = self.state.lock();
            state.previous_position = Some(state.scroll_y);
            if state.history.current() != hash {
                state.history.push(&hash);
            }
            if target.filename.is_some() && state.rendered_file() == target.filename.as_deref() {
                state.pending_scroll = Some(match &target.anchor {
                    Some(anchor) => ScrollRequest::Anchor(anchor_id(anchor)),
                    None => ScrollRequest::Top,
                });
                return Ok(Navigation::Scrolled);
            }
        }
        self.navigate(&hash).await
    }

    /// History traversal. Re-scrolls without fetching when the file is
    /// already rendered.
    pub async fn pop_state(&self, hash: &str) -> Result<Navigation, RouteError> {
        let route = RouteState::parse(hash);
        {
            let mut state = self.state.lock();
            if route.filename.is_some() && state.rendered_file() == route.filename.as_deref() {
                state.pending_scroll = Some(match &route.anchor {
                    Some(anchor) => ScrollRequest::Anchor(anchor_id(anchor)),
                    None => ScrollRequest::Top,
                });
                debug!(hash, "history pop served from rendered content");
                return Ok(Navigation::Scrolled);
            }
        }
        self.navigate(hash).await
    }

    pub async fn back(&self) -> Option<Result<Navigation, RouteError>> {
        let hash = self.state.lock().history.back()?;
        Some(self.pop_state(&hash).await)
    }

    pub async fn forward(&self) -> Option<Result<Navigation, RouteError>> {
        let hash = self.state.lock().history.forward()?;
        Some(self.pop_state(&hash).await)
    }

    pub async fn back_to_home(&self) -> Result<Navigation, RouteError> {
        self.state.lock().history.push("");
        self.navigate("").await
    }

    pub fn back_to_top(&self) {
        self.state.lock().pending_scroll = Some(ScrollRequest::Top);
    }

    /// Returns whether a remembered position existed.
    pub fn back_to_previous(&self) -> bool {
        let mut state = self.state.lock();
        match state.previous_position {
            Some(position) => {
                state.pending_scroll = Some(ScrollRequest::Position(position));
                true
            }
            None => false,
        }
    }

    pub fn set_scroll_position(&self, y: f32) {
        self.state.lock().scroll_y = y;
    }

    /// Flips a hideable column group. Returns the new hidden state and the
    /// button's new label.
    pub fn toggle_column_group(&self, suffix: &str) -> Option<(bool, String)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let toggle = state
            .column_toggles
            .iter_mut()
            .find(|toggle| toggle.group.suffix == suffix)?;
        let ViewContent::Table { document, .. } = &mut state.content else {
            return None;
        };
        let hidden = toggle_column_group(document.first_table_mut()?, &toggle.group)?;
        toggle.hidden = hidden;
        Some((hidden, toggle.button_text()))
    }

    /// Pointer entered a character span. Supplementary content is fetched
    /// after the tooltip is already shown and merged in as it arrives.
    /// Resolves once every fetch has settled; results that land after a
    /// newer navigation are dropped.
    pub async fn hover(&self, element: ElementId, now: Instant) -> Option<Activation> {
        let token = self.generation.load(Ordering::SeqCst);
        let activation = self.state.lock().tooltips.as_mut()?.pointer_enter(element, now);
        if let Activation::Shown { requests, .. } = &activation {
            let mut fetches = JoinSet::new();
            for request in requests.iter().cloned() {
                let source = Arc::clone(&self.source);
                fetches.spawn(async move {
                    let result = fetch_supplementary(source.as_ref(), &request).await;
                    (request, result)
                });
            }
            while let Some(joined) = fetches.join_next().await {
                let (request, result) = match joined {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "supplementary fetch task failed");
                        continue;
                    }
                };
                if let Err(err) = &result {
                    warn!(error = %err, "supplementary content unavailable");
                }
                if self.generation.load(Ordering::SeqCst) != token {
                    debug!(character = %request.character, "dropping supplementary result after navigation");
                    continue;
                }
                if let Some(tooltips) = self.state.lock().tooltips.as_mut() {
                    tooltips.supplementary_loaded(&request, result);
                }
            }
        }
        Some(activation)
    }

    /// Runs `f` against the attached tooltip controller, if a table is shown.
    pub fn with_tooltips<R>(&self, f: impl FnOnce(&mut TooltipController) -> R) -> Option<R> {
        self.state.lock().tooltips.as_mut().map(f)
    }

    fn is_current(&self, token: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == token
    }

    async fn show_file_list(&self, token: u64) -> Result<Navigation, RouteError> {
        let result = self.source.file_list().await;
        if !self.is_current(token) {
            debug!(token, "discarding stale file list");
            return Ok(Navigation::Stale);
        }
        let mut state = self.state.lock();
        match result {
            Ok(files) => {
                let count = files.len();
                state.content = ViewContent::FileList(files);
                state.controls_visible = false;
                state.column_toggles.clear();
                state.tooltips = None;
                Ok(Navigation::FileList { count })
            }
            Err(err) => {
                error!(error = %err, "failed to load file list");
                let err = RouteError::from(err);
                state.show_error(err.to_string());
                Err(err)
            }
        }
    }

    async fn show_table(
        &self,
        token: u64,
        filename: String,
        anchor: Option<String>,
    ) -> Result<Navigation, RouteError> {
        let result = self.load_table(&filename).await;
        if !self.is_current(token) {
            debug!(token, file = %filename, "discarding stale navigation");
            return Ok(Navigation::Stale);
        }
        let mut state = self.state.lock();
        match result {
            Ok((document, report, tooltips)) => {
                let column_toggles = self
                    .config
                    .column_groups
                    .iter()
                    .filter(|group| {
                        document.first_table().is_some_and(|table| {
                            table
                                .headers
                                .iter()
                                .any(|header| header.text.ends_with(group.suffix.as_str()))
                        })
                    })
                    .map(|group| ColumnToggle {
                        group: group.clone(),
                        hidden: false,
                    })
                    .collect();
                state.pending_scroll = anchor.as_deref().map(|anchor| {
                    let id = anchor_id(anchor);
                    if document.first_table().and_then(|table| table.row_by_id(&id)).is_none() {
                        warn!(file = %filename, anchor, "anchor row not found");
                    }
                    ScrollRequest::Anchor(id)
                });
                state.content = ViewContent::Table {
                    filename: filename.clone(),
                    document,
                    report,
                };
                state.controls_visible = true;
                state.column_toggles = column_toggles;
                state.tooltips = Some(tooltips);
                info!(file = %filename, "table rendered");
                Ok(Navigation::Table { filename, anchor })
            }
            Err(err) => {
                error!(error = %err, file = %filename, "failed to render table");
                state.show_error(err.to_string());
                Err(err)
            }
        }
    }

    async fn load_table(
        &self,
        filename: &str,
    ) -> Result<(Document, AnnotationReport, TooltipController), RouteError> {
        let (required, index) = tokio::join!(
            async { tokio::try_join!(self.source.document(filename), self.source.lexicon()) },
            self.source.supplementary_index(),
        );
        let (markdown, lexicon) = required?;
        let index = index.unwrap_or_else(|err: FetchError| {
            warn!(error = %err, "supplementary index unavailable");
            SupplementaryIndex::default()
        });

        // Parsing returns only once the whole structure is queryable.
        let mut document = Document::from_markdown(&markdown)?;
        let table = document.first_table_mut().ok_or(ParseError::NoTable)?;
        let report = TableAnnotator::new(&self.config.labels, filename).annotate(table, &lexicon);

        let mut tooltips = TooltipController::new(
            self.config.tooltip.clone(),
            Arc::new(lexicon),
            Arc::new(index),
        );
        tooltips.attach(table);
        Ok((document, report, tooltips))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, Resource};
    use std::time::Duration;

    const TABLE: &str = "| | 漢音 | 漢字 | index | 音_表外 |\n|---|---|---|---|---|\n| ○ | カ | 火 | 12 | x |\n| | カ | 花 | 12 | y |\n";
    const LEXICON: &str = r#"{"火": {"primary-reading": [{"pron": "カ", "words_list": ["火山"]}]}}"#;

    fn router(source: MemorySource) -> ViewRouter<MemorySource> {
        ViewRouter::new(source, EngineConfig::with_default_groups())
    }

    fn source() -> MemorySource {
        MemorySource::new()
            .with_document("foo.md", TABLE)
            .with_document("bar.md", TABLE)
            .with_lexicon_json(LEXICON)
    }

    #[test]
    fn route_state_parses_hash_grammar() {
        assert_eq!(RouteState::parse(""), RouteState::default());
        assert_eq!(RouteState::parse("#"), RouteState::default());
        assert_eq!(
            RouteState::parse("#foo.md"),
            RouteState {
                filename: Some("foo.md".to_string()),
                anchor: None
            }
        );
        let route = RouteState::parse("#%E6%BC%A2.md#12");
        assert_eq!(route.filename.as_deref(), Some("漢.md"));
        assert_eq!(route.anchor.as_deref(), Some("12"));
        assert_eq!(RouteState::parse(&route.to_hash()), route);
    }

    #[test]
    fn encoded_hash_in_filename_stays_in_filename() {
        let route = RouteState {
            filename: Some("a#b.md".to_string()),
            anchor: Some("12".to_string()),
        };
        assert_eq!(route.to_hash(), "#a%23b.md#12");
        assert_eq!(RouteState::parse(&route.to_hash()), route);

        let links = render_file_list(&["a#b.md".to_string()]);
        assert!(links.contains(r##"href="#a%23b.md""##));
    }

    #[test]
    fn extra_hash_segments_are_ignored() {
        let route = RouteState::parse("#foo.md#12#x");
        assert_eq!(route.filename.as_deref(), Some("foo.md"));
        assert_eq!(route.anchor.as_deref(), Some("12"));
    }

    #[test]
    fn history_truncates_forward_entries() {
        let mut history = History::default();
        history.push("#a.md");
        history.push("#b.md");
        assert_eq!(history.back().as_deref(), Some("#a.md"));
        history.push("#c.md");
        assert_eq!(history.forward(), None);
        assert_eq!(history.len(), 3);
        assert_eq!(history.back().as_deref(), Some("#a.md"));
        assert_eq!(history.back().as_deref(), Some(""));
        assert_eq!(history.back(), None);
    }

    #[test]
    fn file_list_links_drop_extension() {
        let html = render_file_list(&["foo.md".to_string(), "a b.md".to_string()]);
        assert!(html.contains(r##"<a href="#foo.md">foo</a>"##));
        assert!(html.contains(r##"<a href="#a%20b.md">a b</a>"##));
    }

    #[tokio::test]
    async fn empty_hash_renders_file_list_without_controls() {
        let router = router(source());
        let nav = router.start("").await.unwrap();
        assert_eq!(nav, Navigation::FileList { count: 2 });
        let state = router.state();
        let state = state.lock();
        assert!(!state.controls_visible);
        assert!(state.html().contains("file-list"));
    }

    #[tokio::test]
    async fn table_route_annotates_and_scrolls_to_anchor() {
        let router = router(source());
        let nav = router.navigate("#foo.md#12").await.unwrap();
        assert_eq!(
            nav,
            Navigation::Table {
                filename: "foo.md".to_string(),
                anchor: Some("12".to_string())
            }
        );
        let state = router.state();
        let mut state = state.lock();
        assert!(state.controls_visible);
        assert_eq!(state.column_toggles.len(), 1);
        assert_eq!(state.take_scroll(), Some(ScrollRequest::Anchor("anchor-12".to_string())));
        let html = state.html();
        assert!(html.contains(r#"<tr id="anchor-12">"#));
        assert!(html.contains(r##"href="#foo.md#12""##));
        assert!(state.tooltips.is_some());
    }

    #[tokio::test]
    async fn fetch_failure_replaces_content_with_error() {
        let router = router(source().failing(Resource::Document("foo.md".to_string()), 404));
        router.navigate("#bar.md").await.unwrap();
        let err = router.navigate("#foo.md").await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP error! status: 404 (foo.md)");
        let state = router.state();
        let state = state.lock();
        assert!(state.html().starts_with("<p>Error: HTTP error! status: 404"));
        assert!(state.document().is_none());
        assert!(state.tooltips.is_none());
    }

    #[tokio::test]
    async fn document_without_table_is_a_parse_error() {
        let router = router(source().with_document("prose.md", "# nothing here"));
        let err = router.navigate("#prose.md").await.unwrap_err();
        assert!(matches!(err, RouteError::Parse(ParseError::NoTable)));
    }

    #[tokio::test]
    async fn only_the_latest_navigation_updates_the_view() {
        let slow = source().delayed(
            Resource::Document("foo.md".to_string()),
            Duration::from_millis(50),
        );
        let router = router(slow);
        let (first, second) = tokio::join!(router.navigate("#foo.md"), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            router.navigate("#bar.md").await
        });
        assert_eq!(first.unwrap(), Navigation::Stale);
        assert!(matches!(second.unwrap(), Navigation::Table { .. }));
        assert_eq!(router.state().lock().rendered_file(), Some("bar.md"));
    }

    #[tokio::test]
    async fn following_the_same_link_rescrolls_without_fetching() {
        let router = router(source());
        router.open_file("foo.md").await.unwrap();
        router.set_scroll_position(420.0);
        router.follow_link("#foo.md#12").await.unwrap();
        let before = router.source().requests().len();
        router.state().lock().take_scroll();

        let nav = router.follow_link("#foo.md#12").await.unwrap();
        assert_eq!(nav, Navigation::Scrolled);
        assert_eq!(router.source().requests().len(), before);
        assert_eq!(
            router.state().lock().take_scroll(),
            Some(ScrollRequest::Anchor("anchor-12".to_string()))
        );
        assert!(router.back_to_previous());
        assert!(matches!(
            router.state().lock().take_scroll(),
            Some(ScrollRequest::Position(_))
        ));
    }

    #[tokio::test]
    async fn link_to_another_anchor_in_same_file_only_scrolls() {
        let router = router(source());
        router.open_file("foo.md").await.unwrap();
        let before = router.source().requests().len();

        let nav = router.follow_link("#foo.md#13").await.unwrap();
        assert_eq!(nav, Navigation::Scrolled);
        assert_eq!(router.source().requests().len(), before);
        let state = router.state();
        let mut state = state.lock();
        assert_eq!(state.history.current(), "#foo.md#13");
        assert_eq!(state.take_scroll(), Some(ScrollRequest::Anchor("anchor-13".to_string())));
        assert!(state.tooltips.is_some());
    }

    #[tokio::test]
    async fn link_to_another_file_fetches_it() {
        let router = router(source());
        router.open_file("foo.md").await.unwrap();
        let nav = router.follow_link("#bar.md#12").await.unwrap();
        assert!(matches!(nav, Navigation::Table { .. }));
        assert_eq!(router.state().lock().rendered_file(), Some("bar.md"));
    }

    #[tokio::test]
    async fn history_pop_reuses_rendered_content() {
        let router = router(source());
        router.start("").await.unwrap();
        router.open_file("foo.md").await.unwrap();
        router.follow_link("#foo.md#12").await.unwrap();
        let before = router.source().requests().len();

        assert_eq!(router.back().await.unwrap().unwrap(), Navigation::Scrolled);
        assert_eq!(router.source().requests().len(), before);
        assert_eq!(router.state().lock().take_scroll(), Some(ScrollRequest::Top));

        let nav = router.back().await.unwrap().unwrap();
        assert_eq!(nav, Navigation::FileList { count: 2 });
    }

    #[tokio::test]
    async fn column_groups_toggle_with_button_text() {
        let router = router(source());
        router.navigate("#foo.md").await.unwrap();
        let (hidden, text) = router.toggle_column_group("_表外").unwrap();
        assert!(hidden);
        assert_eq!(text, ColumnGroup::new("_表外", "Hyogai").button_text(true));
        assert!(router.html().contains(r#"<th class="hidden">音_表外</th>"#));
        assert_eq!(router.toggle_column_group("_old"), None);
    }

    #[tokio::test]
    async fn hover_merges_supplementary_content() {
        let router = router(
            source()
                .with_supplementary_index_json(r#"{"火": "wikt/火.html"}"#)
                .with_supplementary("wikt/火.html", "<html><body><p>fire</p></body></html>"),
        );
        router.navigate("#foo.md").await.unwrap();
        let activation = router.hover(ElementId(0), Instant::now()).await.unwrap();
        assert!(matches!(activation, Activation::Shown { .. }));
        let html = router.with_tooltips(|tips| tips.html(ElementId(0))).flatten().unwrap();
        assert!(html.contains("火山"));
        assert!(html.contains("<p>fire</p>"));
    }

    #[tokio::test]
    async fn supplementary_results_after_navigation_are_dropped() {
        let router = router(
            source()
                .with_supplementary_index_json(r#"{"火": "wikt/火.html"}"#)
                .with_supplementary("wikt/火.html", "<html><body><p>fire</p></body></html>")
                .delayed(
                    Resource::Supplementary("wikt/火.html".to_string()),
                    Duration::from_millis(50),
                ),
        );
        router.navigate("#foo.md").await.unwrap();
        let now = Instant::now();

        let (activation, _) = tokio::join!(router.hover(ElementId(0), now), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            router.navigate("#bar.md").await.unwrap();
            router.with_tooltips(|tips| tips.pointer_enter(ElementId(0), now));
        });
        assert!(matches!(activation, Some(Activation::Shown { .. })));

        let toggles = router
            .with_tooltips(|tips| tips.session(ElementId(0)).map(|session| session.toggles().len()))
            .flatten();
        assert_eq!(toggles, Some(0));
        assert_eq!(router.state().lock().rendered_file(), Some("bar.md"));
    }
}
