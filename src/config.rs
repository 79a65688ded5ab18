use std::path::PathBuf;
use std::time::Duration;

/// HTTP paths the browser-facing side of the system fetches from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub file_list: String,
    pub document_base: String,
    pub lexicon: String,
    pub supplementary_index: String,
    pub supplementary_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            file_list: "/file_list".to_string(),
            document_base: "/data/pron_list".to_string(),
            lexicon: "/data/words.json".to_string(),
            supplementary_index: "/data/wikt_index.json".to_string(),
            supplementary_base: "/data".to_string(),
        }
    }
}

impl Endpoints {
    pub fn document(&self, filename: &str) -> String {
        format!("{}/{}", self.document_base.trim_end_matches('/'), filename)
    }

    pub fn supplementary(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.supplementary_base.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

/// Where each resource lives below a data root on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub root: PathBuf,
    pub documents_dir: PathBuf,
    pub lexicon_file: PathBuf,
    pub supplementary_index_file: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            documents_dir: PathBuf::from("pron_list"),
            lexicon_file: PathBuf::from("words.json"),
            supplementary_index_file: PathBuf::from("wikt_index.json"),
        }
    }

    pub fn documents_path(&self) -> PathBuf {
        self.root.join(&self.documents_dir)
    }

    pub fn lexicon_path(&self) -> PathBuf {
        self.root.join(&self.lexicon_file)
    }

    pub fn supplementary_index_path(&self) -> PathBuf {
        self.root.join(&self.supplementary_index_file)
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new("data")
    }
}

/// Column labels and markers the annotator matches against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLabels {
    pub character_column: String,
    pub index_column: String,
    /// First-cell marker of the row that owns an index value.
    pub canonical_marker: String,
    /// Substring that marks a header as a reading column.
    pub reading_marker: String,
    pub separator: char,
    pub link_class: String,
}

impl Default for TableLabels {
    fn default() -> Self {
        Self {
            character_column: "漢字".to_string(),
            index_column: "index".to_string(),
            canonical_marker: "○".to_string(),
            reading_marker: "音".to_string(),
            separator: '、',
            link_class: "index-link".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TooltipConfig {
    pub hide_delay: Duration,
    pub min_width_fraction: f32,
    pub max_width_fraction: f32,
    pub primary_label: String,
    pub native_label: String,
    pub unknown_placeholder: String,
    pub no_examples_placeholder: String,
    pub not_found_message: String,
    pub supplementary_label: String,
}

impl Default for TooltipConfig {
    fn default() -> Self {
        Self {
            hide_delay: Duration::from_millis(300),
            min_width_fraction: 0.2,
            max_width_fraction: 0.6,
            primary_label: "音読み".to_string(),
            native_label: "訓読み".to_string(),
            unknown_placeholder: "unknown".to_string(),
            no_examples_placeholder: "no examples".to_string(),
            not_found_message: "No kanji information found".to_string(),
            supplementary_label: "Wiktionary".to_string(),
        }
    }
}

/// A set of columns that can be hidden together, matched by header suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnGroup {
    pub suffix: String,
    pub label: String,
}

impl ColumnGroup {
    pub fn new(suffix: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            label: label.into(),
        }
    }

    pub fn button_text(&self, hidden: bool) -> String {
        if hidden {
            format!("Show {}", self.label)
        } else {
            format!("Hide {}", self.label)
        }
    }
}

pub fn default_column_groups() -> Vec<ColumnGroup> {
    vec![
        ColumnGroup::new("_表外", "Hyogai"),
        ColumnGroup::new("_old", "Old"),
    ]
}

/// Everything the view engine needs, bundled.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub labels: TableLabels,
    pub tooltip: TooltipConfig,
    pub column_groups: Vec<ColumnGroup>,
}

impl EngineConfig {
    pub fn with_default_groups() -> Self {
        Self {
            column_groups: default_column_groups(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_without_double_slashes() {
        let endpoints = Endpoints {
            document_base: "/data/pron_list/".to_string(),
            ..Endpoints::default()
        };
        assert_eq!(endpoints.document("a.md"), "/data/pron_list/a.md");
        assert_eq!(
            Endpoints::default().supplementary("/wikt/火.html"),
            "/data/wikt/火.html"
        );
    }

    #[test]
    fn column_group_button_text_flips() {
        let group = ColumnGroup::new("_old", "Old");
        assert_eq!(group.button_text(true), "Show Old");
        assert_eq!(group.button_text(false), "Hide Old");
    }

    #[test]
    fn layout_paths_hang_off_root() {
        let layout = DataLayout::new("/srv/yomi");
        assert_eq!(
            layout.documents_path(),
            PathBuf::from("/srv/yomi/pron_list")
        );
        assert_eq!(layout.lexicon_path(), PathBuf::from("/srv/yomi/words.json"));
    }
}
