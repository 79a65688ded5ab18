use crate::config::TooltipConfig;
use crate::document::escape_html;
use crate::lexicon::{ExampleWords, LexicalRecord, Lexicon, Reading};
use crate::merge::merge;
use askama::Template;
use tracing::warn;

const WORD_SEPARATOR: &str = ", ";

/// Built tooltip body for one character span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TooltipContent {
    /// Characters of the span that have lexicon records, in span order.
    pub characters: Vec<char>,
    pub html: String,
    pub markdown: String,
}

impl TooltipContent {
    /// Builds the content for the exact source text of a character span.
    ///
    /// One valid character renders its own entry; several are merged so that
    /// characters with identical records share one block.
    pub fn build(text: &str, lexicon: &Lexicon, config: &TooltipConfig) -> Self {
        let characters = lexicon.valid_characters(text);
        let mut html = String::new();
        let mut markdown = String::new();
        match characters.as_slice() {
            [] => {
                html = format!(
                    r#"<p class="kanji-missing">{}</p>"#,
                    escape_html(&config.not_found_message)
                );
                markdown = config.not_found_message.clone();
            }
            [single] => {
                if let Some(record) = lexicon.get(*single) {
                    let view = EntryView::new(&single.to_string(), record, config);
                    html = view.to_html();
                    markdown = view.to_markdown();
                }
            }
            many => {
                let entries: Vec<_> = many
                    .iter()
                    .filter_map(|ch| lexicon.get(*ch).map(|record| (*ch, record)))
                    .collect();
                for group in merge(&entries) {
                    let view = EntryView::new(&group.header(), group.info, config);
                    html.push_str(&view.to_html());
                    if !markdown.is_empty() {
                        markdown.push('\n');
                    }
                    markdown.push_str(&view.to_markdown());
                }
            }
        }
        Self {
            characters,
            html,
            markdown,
        }
    }
}

struct KeyedLine {
    key: String,
    words: String,
}

struct ReadingLine {
    pronunciation: String,
    classification: String,
    flat: String,
    keyed: Vec<KeyedLine>,
}

impl ReadingLine {
    fn new(reading: &Reading, config: &TooltipConfig) -> Self {
        let unknown = || config.unknown_placeholder.clone();
        let (flat, keyed) = match &reading.example_words {
            Some(ExampleWords::List(words)) if !words.is_empty() => {
                (words.join(WORD_SEPARATOR), Vec::new())
            }
            Some(ExampleWords::Keyed(keyed)) if !keyed.0.is_empty() => (
                String::new(),
                keyed
                    .iter()
                    .map(|(key, words)| KeyedLine {
                        key: key.to_string(),
                        words: if words.is_empty() {
                            config.no_examples_placeholder.clone()
                        } else {
                            words.join(WORD_SEPARATOR)
                        },
                    })
                    .collect(),
            ),
            _ => (config.no_examples_placeholder.clone(), Vec::new()),
        };
        Self {
            pronunciation: reading.pronunciation.clone().unwrap_or_else(unknown),
            classification: reading.classification.clone().unwrap_or_else(unknown),
            flat,
            keyed,
        }
    }

    fn markdown(&self, out: &mut String, with_classification: bool) {
        out.push_str("- **");
        out.push_str(&self.pronunciation);
        out.push_str("**");
        if with_classification {
            out.push_str(" (");
            out.push_str(&self.classification);
            out.push(')');
        }
        if self.keyed.is_empty() {
            out.push_str(": ");
            out.push_str(&self.flat);
        }
        out.push('\n');
        for line in &self.keyed {
            out.push_str("  - ");
            out.push_str(&line.key);
            out.push_str(": ");
            out.push_str(&line.words);
            out.push('\n');
        }
    }
}

#[derive(Template)]
#[template(
    source = r#"<div class="kanji-info"><h3>{{ header }}</h3>
{%- if !primary.is_empty() %}<h4>{{ primary_label }}</h4>
{%- for line in primary %}<p><strong>{{ line.pronunciation }}</strong> ({{ line.classification }}){% if line.keyed.is_empty() %}: {{ line.flat }}{% endif %}</p>
{%- for sub in line.keyed %}<p class="sub-reading">{{ sub.key }}: {{ sub.words }}</p>{% endfor %}
{%- endfor %}
{%- endif %}
{%- if !native.is_empty() %}<h4>{{ native_label }}</h4>
{%- for line in native %}<p><strong>{{ line.pronunciation }}</strong>{% if line.keyed.is_empty() %}: {{ line.flat }}{% endif %}</p>
{%- for sub in line.keyed %}<p class="sub-reading">{{ sub.key }}: {{ sub.words }}</p>{% endfor %}
{%- endfor %}
{%- endif %}</div>"#,
    ext = "html"
)]
struct EntryView<'a> {
    header: String,
    primary_label: &'a str,
    native_label: &'a str,
    primary: Vec<ReadingLine>,
    native: Vec<ReadingLine>,
}

impl<'a> EntryView<'a> {
    fn new(header: &str, record: &LexicalRecord, config: &'a TooltipConfig) -> Self {
        Self {
            header: header.to_string(),
            primary_label: &config.primary_label,
            native_label: &config.native_label,
            primary: record
                .primary
                .iter()
                .map(|reading| ReadingLine::new(reading, config))
                .collect(),
            native: record
                .native
                .iter()
                .map(|reading| ReadingLine::new(reading, config))
                .collect(),
        }
    }

    fn to_html(&self) -> String {
        self.render().unwrap_or_else(|err| {
            warn!(error = %err, header = %self.header, "tooltip template failed");
            format!(
                r#"<div class="kanji-info"><h3>{}</h3></div>"#,
                escape_html(&self.header)
            )
        })
    }

    fn to_markdown(&self) -> String {
        let mut out = format!("### {}\n", self.header);
        if !self.primary.is_empty() {
            out.push_str(&format!("#### {}\n", self.primary_label));
            for line in &self.primary {
                line.markdown(&mut out, true);
            }
        }
        if !self.native.is_empty() {
            out.push_str(&format!("#### {}\n", self.native_label));
            for line in &self.native {
                line.markdown(&mut out, false);
            }
        }
        out
    }
}

/// State of one collapsible supplementary-content section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleBody {
    Loaded(String),
    Failed(String),
}

#[derive(Template)]
#[template(
    source = r#"<div class="wikt-toggle" data-kanji="{{ character }}"><button class="wikt-toggle-button" aria-expanded="{{ expanded }}">{{ label }}: {{ character }}</button><div class="wikt-content{% if !expanded %} hidden{% endif %}">
{%- match body %}{% when ToggleBody::Loaded with (html) %}{{ html|safe }}{% when ToggleBody::Failed with (message) %}<p class="wikt-error">{{ message }}</p>{% endmatch -%}
</div></div>"#,
    ext = "html"
)]
struct ToggleView<'a> {
    label: &'a str,
    character: char,
    expanded: bool,
    body: &'a ToggleBody,
}

pub fn render_toggle(label: &str, character: char, expanded: bool, body: &ToggleBody) -> String {
    let view = ToggleView {
        label,
        character,
        expanded,
        body,
    };
    view.render().unwrap_or_else(|err| {
        warn!(error = %err, %character, "toggle template failed");
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::KeyedWords;

    fn fire_lexicon() -> Lexicon {
        Lexicon::from_json(
            r#"{"火": {"primary-reading": [{"pron": "カ", "words_list": ["火山"]}]}}"#.as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn single_character_entry_has_primary_section_only() {
        let config = TooltipConfig::default();
        let content = TooltipContent::build("火", &fire_lexicon(), &config);
        assert_eq!(content.characters, vec!['火']);
        assert!(content.html.contains("カ"));
        assert!(content.html.contains("火山"));
        assert!(content.html.contains("(unknown)"));
        assert!(content.html.contains("<h4>音読み</h4>"));
        assert!(!content.html.contains("訓読み"));
    }

    #[test]
    fn unknown_text_yields_not_found_message() {
        let config = TooltipConfig::default();
        let content = TooltipContent::build("abc", &fire_lexicon(), &config);
        assert!(content.characters.is_empty());
        assert!(content.html.contains("No kanji information found"));
    }

    #[test]
    fn identical_records_render_one_merged_block() {
        let record = r#"{"primary-reading": [{"pron": "ジツ", "type": "漢音", "words_list": ["日本"]}]}"#;
        let json = format!(r#"{{"日": {record}, "実": {record}, "月": {{}}}}"#);
        let lexicon = Lexicon::from_json(json.as_bytes()).unwrap();
        let content = TooltipContent::build("日実月", &lexicon, &TooltipConfig::default());
        assert_eq!(content.html.matches("kanji-info").count(), 2);
        assert!(content.html.contains("<h3>日実</h3>"));
        assert!(content.html.contains("<h3>月</h3>"));
    }

    #[test]
    fn keyed_words_render_sub_lines_with_placeholder() {
        let record = LexicalRecord {
            primary: Vec::new(),
            native: vec![Reading::new("ひ").with_keyed_words(
                KeyedWords::default().push("ひ", ["火花"]).push("ほ", Vec::<String>::new()),
            )],
        };
        let lexicon = Lexicon::from_entries([("火", record)]);
        let content = TooltipContent::build("火", &lexicon, &TooltipConfig::default());
        assert!(content.html.contains(r#"<p class="sub-reading">ひ: 火花</p>"#));
        assert!(content.html.contains(r#"<p class="sub-reading">ほ: no examples</p>"#));
        assert!(content.markdown.contains("  - ほ: no examples"));
        assert!(!content.html.contains("音読み"));
    }

    #[test]
    fn missing_words_list_uses_placeholder() {
        let record = LexicalRecord {
            primary: vec![Reading::default()],
            native: Vec::new(),
        };
        let lexicon = Lexicon::from_entries([("木", record)]);
        let content = TooltipContent::build("木", &lexicon, &TooltipConfig::default());
        assert!(content.markdown.contains("- **unknown** (unknown): no examples"));
    }

    #[test]
    fn toggle_renders_error_inline() {
        let html = render_toggle(
            "Wiktionary",
            '火',
            false,
            &ToggleBody::Failed("HTTP error! status: 404".to_string()),
        );
        assert!(html.contains("wikt-error"));
        assert!(html.contains("wikt-content hidden"));
    }
}
