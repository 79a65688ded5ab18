//! Headless engine for kanji reading reference tables.
//!
//! Markdown reference documents are parsed into an owned [`Document`], their
//! first table is annotated with row anchors, cross-reference links and
//! interactive character spans, and each span gets a lazily built tooltip
//! summarizing the characters' readings from a JSON lexicon. A hash-driven
//! [`ViewRouter`] ties it together over any [`Source`] of data.

pub mod annotate;
pub mod config;
pub mod document;
pub mod error;
pub mod lexicon;
pub mod merge;
pub mod render;
pub mod router;
pub mod source;
pub mod tooltip;
#[cfg(feature = "web")]
pub mod web;

pub use annotate::{AnnotationReport, TableAnnotator};
pub use config::{ColumnGroup, DataLayout, Endpoints, EngineConfig, TableLabels, TooltipConfig};
pub use document::{Document, ElementId, Table};
pub use error::{FetchError, ParseError, RouteError, SupplementaryContentError};
pub use lexicon::{ExampleWords, KeyedWords, LexicalRecord, Lexicon, Reading, SupplementaryIndex};
pub use merge::{MergedGroup, merge};
pub use render::TooltipContent;
pub use router::{Navigation, RouteState, ScrollRequest, ViewContent, ViewRouter, ViewState};
pub use source::{DirectorySource, MemorySource, Source};
pub use tooltip::{Activation, ClickTarget, TooltipController, TooltipState};
