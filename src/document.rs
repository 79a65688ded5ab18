//! Owned document model standing in for the injected page markup.
//!
//! Markdown is parsed once with the `markdown` crate. Tables become a
//! [`Table`] that the annotator can rewrite cell by cell; everything else is
//! kept as pre-rendered HTML.

use crate::error::ParseError;
use markdown::mdast::{Node, Table as MdTable};
use markdown::{Options as MarkdownOptions, ParseOptions, to_html_with_options, to_mdast};
use std::fmt::Write as _;

/// Handle of an interactive character span, unique within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Reading(String),
    Character { text: String, element: ElementId },
    Link { href: String, class: String, text: String },
}

impl Inline {
    pub fn text(&self) -> &str {
        match self {
            Inline::Text(text) | Inline::Reading(text) => text,
            Inline::Character { text, .. } | Inline::Link { text, .. } => text,
        }
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Inline::Text(text) => out.push_str(&escape_html(text)),
            Inline::Reading(text) => {
                let _ = write!(out, r#"<span class="reading">{}</span>"#, escape_html(text));
            }
            Inline::Character { text, element } => {
                let text = escape_html(text);
                let _ = write!(
                    out,
                    r#"<span class="kanji" data-kanji="{text}" data-element="{}">{text}</span>"#,
                    element.0
                );
            }
            Inline::Link { href, class, text } => {
                let _ = write!(
                    out,
                    r#"<a href="{}" class="{}">{}</a>"#,
                    escape_html(href),
                    escape_html(class),
                    escape_html(text)
                );
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub content: Vec<Inline>,
    pub hidden: bool,
}

impl Cell {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Inline::Text(text.into())],
            hidden: false,
        }
    }

    /// Visible text of the cell, markup ignored.
    pub fn text_content(&self) -> String {
        self.content.iter().map(Inline::text).collect()
    }

    pub fn replace(&mut self, content: Vec<Inline>) {
        self.content = content;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderCell {
    pub text: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub id: Option<String>,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: None,
            cells: texts.into_iter().map(Cell::text).collect(),
        }
    }

    pub fn cell_text(&self, index: usize) -> Option<String> {
        self.cells
            .get(index)
            .map(|cell| cell.text_content().trim().to_string())
    }
}

/// A table whose header row is stored apart from its data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<HeaderCell>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new<I, S>(headers: I, rows: Vec<Row>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|text| HeaderCell {
                    text: text.into().trim().to_string(),
                    hidden: false,
                })
                .collect(),
            rows,
        }
    }

    /// Position of the header whose trimmed text equals `label`.
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.headers.iter().position(|header| header.text == label)
    }

    pub fn header_text(&self, index: usize) -> Option<&str> {
        self.headers.get(index).map(|header| header.text.as_str())
    }

    pub fn row_by_id(&self, id: &str) -> Option<&Row> {
        self.rows.iter().find(|row| row.id.as_deref() == Some(id))
    }

    pub fn characters(&self) -> impl Iterator<Item = (ElementId, &str)> {
        self.rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .flat_map(|cell| cell.content.iter())
            .filter_map(|inline| match inline {
                Inline::Character { text, element } => Some((*element, text.as_str())),
                _ => None,
            })
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from("<table>\n<thead>\n<tr>");
        for header in &self.headers {
            out.push_str(if header.hidden {
                r#"<th class="hidden">"#
            } else {
                "<th>"
            });
            out.push_str(&escape_html(&header.text));
            out.push_str("</th>");
        }
        out.push_str("</tr>\n</thead>\n<tbody>\n");
        for row in &self.rows {
            match &row.id {
                Some(id) => {
                    let _ = write!(out, r#"<tr id="{}">"#, escape_html(id));
                }
                None => out.push_str("<tr>"),
            }
            for cell in &row.cells {
                out.push_str(if cell.hidden {
                    r#"<td class="hidden">"#
                } else {
                    "<td>"
                });
                for inline in &cell.content {
                    inline.write_html(&mut out);
                }
                out.push_str("</td>");
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n</table>\n");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Html(String),
    Table(Table),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

impl Document {
    /// Parses GFM markdown. Returns once the whole structure is queryable.
    pub fn from_markdown(source: &str) -> Result<Self, ParseError> {
        let root = to_mdast(source, &ParseOptions::gfm())
            .map_err(|err| ParseError::Markdown(err.to_string()))?;
        let children = root.children().map(Vec::as_slice).unwrap_or_default();
        let mut blocks = Vec::new();
        let mut pending: Option<(usize, usize)> = None;
        for node in children {
            let span = node
                .position()
                .map(|position| (position.start.offset, position.end.offset));
            match node {
                Node::Table(table) => {
                    if let Some(range) = pending.take() {
                        push_html_block(&mut blocks, source, range);
                    }
                    blocks.push(Block::Table(table_from_mdast(table)));
                }
                _ => {
                    if let Some((start, end)) = span {
                        pending = Some(match pending {
                            Some((first, _)) => (first, end),
                            None => (start, end),
                        });
                    }
                }
            }
        }
        if let Some(range) = pending {
            push_html_block(&mut blocks, source, range);
        }
        Ok(Self { blocks })
    }

    pub fn first_table(&self) -> Option<&Table> {
        self.blocks.iter().find_map(|block| match block {
            Block::Table(table) => Some(table),
            Block::Html(_) => None,
        })
    }

    pub fn first_table_mut(&mut self) -> Option<&mut Table> {
        self.blocks.iter_mut().find_map(|block| match block {
            Block::Table(table) => Some(table),
            Block::Html(_) => None,
        })
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Html(html) => out.push_str(html),
                Block::Table(table) => out.push_str(&table.to_html()),
            }
        }
        out
    }
}

fn markdown_options() -> MarkdownOptions {
    let mut options = MarkdownOptions::gfm();
    // Reference documents are produced by our own exporter and may carry inline HTML.
    options.compile.allow_dangerous_html = true;
    options.compile.gfm_tagfilter = false;
    options
}

fn push_html_block(blocks: &mut Vec<Block>, source: &str, (start, end): (usize, usize)) {
    let Some(slice) = source.get(start..end) else {
        return;
    };
    if slice.trim().is_empty() {
        return;
    }
    let html = to_html_with_options(slice, &markdown_options())
        .unwrap_or_else(|_| format!("<p>{}</p>", escape_html(slice)));
    blocks.push(Block::Html(html));
}

fn table_from_mdast(table: &MdTable) -> Table {
    let mut rows = table.children.iter().filter_map(|row| match row {
        Node::TableRow(row) => Some(
            row.children
                .iter()
                .map(|cell| text_content(cell).trim().to_string())
                .collect::<Vec<_>>(),
        ),
        _ => None,
    });
    let headers = rows.next().unwrap_or_default();
    let rows = rows.map(Row::from_texts).collect();
    Table::new(headers, rows)
}

fn text_content(node: &Node) -> String {
    match node {
        Node::Text(text) => text.value.clone(),
        Node::InlineCode(code) => code.value.clone(),
        Node::InlineMath(math) => math.value.clone(),
        Node::Break(_) | Node::Html(_) => String::new(),
        other => other
            .children()
            .map(|children| children.iter().map(text_content).collect())
            .unwrap_or_default(),
    }
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
