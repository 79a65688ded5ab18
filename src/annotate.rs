use crate::config::{ColumnGroup, TableLabels};
use crate::document::{ElementId, Inline, Table};
use crate::error::ParseError;
use crate::lexicon::Lexicon;
use tracing::{debug, warn};

/// What one annotation pass did to a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationReport {
    pub anchors: usize,
    pub links: usize,
    pub character_spans: usize,
    pub reading_spans: usize,
    /// Characters inside spans that have no lexicon record.
    pub unknown_characters: usize,
    /// Missing headers; the dependent behavior was skipped, the rest still ran.
    pub errors: Vec<ParseError>,
}

/// Rewrites a rendered reference table in place: row anchors, index
/// cross-links, and interactive character/reading spans.
pub struct TableAnnotator<'a> {
    labels: &'a TableLabels,
    current_file: &'a str,
}

impl<'a> TableAnnotator<'a> {
    pub fn new(labels: &'a TableLabels, current_file: &'a str) -> Self {
        Self {
            labels,
            current_file,
        }
    }

    pub fn annotate(&self, table: &mut Table, lexicon: &Lexicon) -> AnnotationReport {
        let mut report = AnnotationReport::default();
        let character_column = table.column_index(&self.labels.character_column);
        let index_column = table.column_index(&self.labels.index_column);
        for (label, column) in [
            (&self.labels.character_column, character_column),
            (&self.labels.index_column, index_column),
        ] {
            if column.is_none() {
                let err = ParseError::MissingHeader(label.clone());
                warn!(error = %err, file = self.current_file, "annotating without column");
                report.errors.push(err);
            }
        }

        if let Some(index_column) = index_column {
            self.assign_anchors(table, index_column, &mut report);
        }
        self.rewrite_cells(table, character_column, index_column, lexicon, &mut report);
        debug!(
            file = self.current_file,
            anchors = report.anchors,
            links = report.links,
            characters = report.character_spans,
            "table annotated"
        );
        report
    }

    fn is_canonical(&self, first_cell: Option<String>) -> bool {
        first_cell.as_deref() == Some(self.labels.canonical_marker.as_str())
    }

    fn assign_anchors(&self, table: &mut Table, index_column: usize, report: &mut AnnotationReport) {
        for row in &mut table.rows {
            if !self.is_canonical(row.cell_text(0)) {
                continue;
            }
            if let Some(index) = row.cell_text(index_column) {
                row.id = Some(anchor_id(&index));
                report.anchors += 1;
            }
        }
    }

    fn rewrite_cells(
        &self,
        table: &mut Table,
        character_column: Option<usize>,
        index_column: Option<usize>,
        lexicon: &Lexicon,
        report: &mut AnnotationReport,
    ) {
        let reading_columns: Vec<bool> = table
            .headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                Some(idx) != character_column
                    && Some(idx) != index_column
                    && header.text.contains(self.labels.reading_marker.as_str())
            })
            .collect();
        let mut next_element = 0usize;
        let separator = self.labels.separator;

        for row in &mut table.rows {
            let canonical = self.is_canonical(row.cell_text(0));
            for (idx, cell) in row.cells.iter_mut().enumerate() {
                let text = cell.text_content().trim().to_string();
                if Some(idx) == index_column {
                    if canonical || text.is_empty() {
                        cell.replace(vec![Inline::Text(text)]);
                    } else {
                        cell.replace(vec![Inline::Link {
                            href: cross_reference_href(self.current_file, &text),
                            class: self.labels.link_class.clone(),
                            text,
                        }]);
                        report.links += 1;
                    }
                } else if Some(idx) == character_column {
                    let content = split_tokens(&text, separator, |token| {
                        let element = ElementId(next_element);
                        next_element += 1;
                        report.character_spans += 1;
                        report.unknown_characters +=
                            token.chars().filter(|ch| !lexicon.contains(*ch)).count();
                        Inline::Character {
                            text: token.to_string(),
                            element,
                        }
                    });
                    cell.replace(content);
                } else if reading_columns.get(idx).copied().unwrap_or(false) {
                    let content = split_tokens(&text, separator, |token| {
                        report.reading_spans += 1;
                        Inline::Reading(token.to_string())
                    });
                    cell.replace(content);
                }
            }
        }
    }
}

pub fn anchor_id(index: &str) -> String {
    format!("anchor-{index}")
}

pub fn cross_reference_href(file: &str, index: &str) -> String {
    format!("#{file}#{index}")
}

/// Splits on `separator`, wraps every non-empty token, and keeps the
/// separators as plain text so the visible text is unchanged.
fn split_tokens<F>(text: &str, separator: char, mut wrap: F) -> Vec<Inline>
where
    F: FnMut(&str) -> Inline,
{
    let mut content = Vec::new();
    for (i, token) in text.split(separator).enumerate() {
        if i > 0 {
            content.push(Inline::Text(separator.to_string()));
        }
        if !token.is_empty() {
            content.push(wrap(token));
        }
    }
    content
}

/// Flips the hidden flag of every column whose header ends with the group's
/// suffix. Returns the new hidden state, or `None` when no column matches.
pub fn toggle_column_group(table: &mut Table, group: &ColumnGroup) -> Option<bool> {
    let columns: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(_, header)| header.text.ends_with(group.suffix.as_str()))
        .map(|(idx, _)| idx)
        .collect();
    let first = *columns.first()?;
    let hidden = !table.headers[first].hidden;
    for &column in &columns {
        table.headers[column].hidden = hidden;
        for row in &mut table.rows {
            if let Some(cell) = row.cells.get_mut(column) {
                cell.hidden = hidden;
            }
        }
    }
    Some(hidden)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Row;
    use crate::lexicon::LexicalRecord;

    fn sample_table() -> Table {
        Table::new(
            ["", "漢音", "漢字", "index", "音_表外"],
            vec![
                Row::from_texts(["○", "カ、ケ", "火、化", "12", "x"]),
                Row::from_texts(["", "カ", "花", "12", "y"]),
                Row::from_texts(["○", "スイ", "水", "13", "z"]),
                Row::from_texts(["", "スイ"]),
            ],
        )
    }

    fn lexicon() -> Lexicon {
        Lexicon::from_entries([("火", LexicalRecord::default()), ("水", LexicalRecord::default())])
    }

    #[test]
    fn canonical_rows_get_anchors() {
        let mut table = sample_table();
        let labels = TableLabels::default();
        let report = TableAnnotator::new(&labels, "foo.md").annotate(&mut table, &lexicon());
        assert_eq!(report.anchors, 2);
        assert_eq!(table.rows[0].id.as_deref(), Some("anchor-12"));
        assert_eq!(table.rows[1].id, None);
        assert_eq!(table.rows[2].id.as_deref(), Some("anchor-13"));
        assert!(table.row_by_id("anchor-13").is_some());
    }

    #[test]
    fn non_canonical_index_cells_become_links() {
        let mut table = sample_table();
        let labels = TableLabels::default();
        let report = TableAnnotator::new(&labels, "foo.md").annotate(&mut table, &lexicon());
        assert_eq!(report.links, 1);
        assert_eq!(
            table.rows[1].cells[3].content,
            vec![Inline::Link {
                href: "#foo.md#12".to_string(),
                class: "index-link".to_string(),
                text: "12".to_string(),
            }]
        );
        assert_eq!(
            table.rows[0].cells[3].content,
            vec![Inline::Text("12".to_string())]
        );
    }

    #[test]
    fn character_cells_split_into_spans_with_round_trip_text() {
        let mut table = sample_table();
        let labels = TableLabels::default();
        let report = TableAnnotator::new(&labels, "foo.md").annotate(&mut table, &lexicon());
        let cell = &table.rows[0].cells[2];
        assert_eq!(cell.text_content(), "火、化");
        let spans: Vec<_> = cell
            .content
            .iter()
            .filter_map(|inline| match inline {
                Inline::Character { text, element } => Some((text.as_str(), element.0)),
                _ => None,
            })
            .collect();
        assert_eq!(spans, vec![("火", 0), ("化", 1)]);
        assert_eq!(report.character_spans, 4);
        assert_eq!(report.unknown_characters, 2);
    }

    #[test]
    fn reading_columns_are_wrapped_and_others_untouched() {
        let mut table = sample_table();
        let labels = TableLabels::default();
        TableAnnotator::new(&labels, "foo.md").annotate(&mut table, &lexicon());
        assert_eq!(
            table.rows[0].cells[1].content,
            vec![
                Inline::Reading("カ".to_string()),
                Inline::Text("、".to_string()),
                Inline::Reading("ケ".to_string()),
            ]
        );
        // "音_表外" contains the reading marker too.
        assert_eq!(
            table.rows[0].cells[4].content,
            vec![Inline::Reading("x".to_string())]
        );
        assert_eq!(
            table.rows[0].cells[0].content,
            vec![Inline::Text("○".to_string())]
        );
    }

    #[test]
    fn short_rows_are_annotated_defensively() {
        let mut table = sample_table();
        let labels = TableLabels::default();
        TableAnnotator::new(&labels, "foo.md").annotate(&mut table, &lexicon());
        assert_eq!(table.rows[3].cells.len(), 2);
        assert_eq!(table.rows[3].id, None);
    }

    #[test]
    fn missing_headers_are_reported_but_other_columns_still_run() {
        let mut table = Table::new(
            ["", "呉音", "字"],
            vec![Row::from_texts(["○", "ゴ、グ", "後"])],
        );
        let labels = TableLabels::default();
        let report = TableAnnotator::new(&labels, "foo.md").annotate(&mut table, &lexicon());
        assert_eq!(
            report.errors,
            vec![
                ParseError::MissingHeader("漢字".to_string()),
                ParseError::MissingHeader("index".to_string()),
            ]
        );
        assert_eq!(report.reading_spans, 2);
        assert_eq!(table.rows[0].id, None);
    }

    #[test]
    fn sentinel_comparison_is_trimmed_exact_match() {
        let mut table = Table::new(
            ["", "index"],
            vec![
                Row::from_texts(["  ○ ", "1"]),
                Row::from_texts(["○○", "2"]),
            ],
        );
        let labels = TableLabels::default();
        TableAnnotator::new(&labels, "f.md").annotate(&mut table, &lexicon());
        assert_eq!(table.rows[0].id.as_deref(), Some("anchor-1"));
        assert_eq!(table.rows[1].id, None);
    }

    #[test]
    fn toggling_a_column_group_hides_headers_and_cells() {
        let mut table = sample_table();
        let group = ColumnGroup::new("_表外", "Hyogai");
        assert_eq!(toggle_column_group(&mut table, &group), Some(true));
        assert!(table.headers[4].hidden);
        assert!(table.rows[0].cells[4].hidden);
        assert!(!table.rows[0].cells[3].hidden);
        assert_eq!(toggle_column_group(&mut table, &group), Some(false));
        assert!(!table.rows[1].cells[4].hidden);
        assert_eq!(
            toggle_column_group(&mut table, &ColumnGroup::new("_old", "Old")),
            None
        );
    }
}
