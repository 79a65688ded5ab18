use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Lexical data for a single character.
///
/// Equality is structural and order-sensitive, which is exactly what
/// [`crate::merge::merge`] groups on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexicalRecord {
    #[serde(rename = "音読み", alias = "primary-reading", default)]
    pub primary: Vec<Reading>,
    #[serde(rename = "訓読み", alias = "native-reading", default)]
    pub native: Vec<Reading>,
}

impl LexicalRecord {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.native.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(rename = "pron", default, skip_serializing_if = "Option::is_none")]
    pub pronunciation: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<String>,
    #[serde(rename = "words_list", default, skip_serializing_if = "Option::is_none")]
    pub example_words: Option<ExampleWords>,
}

impl Reading {
    pub fn new(pronunciation: &str) -> Self {
        Self {
            pronunciation: Some(pronunciation.to_string()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, classification: &str) -> Self {
        self.classification = Some(classification.to_string());
        self
    }

    pub fn with_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.example_words = Some(ExampleWords::List(
            words.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn with_keyed_words(mut self, keyed: KeyedWords) -> Self {
        self.example_words = Some(ExampleWords::Keyed(keyed));
        self
    }
}

/// Example vocabulary: either a flat list, or sub-pronunciation → words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExampleWords {
    List(Vec<String>),
    Keyed(KeyedWords),
}

/// A JSON object of `sub-pronunciation → [word]` that keeps document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyedWords(pub Vec<(String, Vec<String>)>);

impl KeyedWords {
    pub fn push<I, S>(mut self, key: &str, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .push((key.to_string(), words.into_iter().map(Into::into).collect()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(key, words)| (key.as_str(), words.as_slice()))
    }
}

impl Serialize for KeyedWords {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, words) in &self.0 {
            map.serialize_entry(key, words)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for KeyedWords {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyedVisitor;

        impl<'de> Visitor<'de> for KeyedVisitor {
            type Value = KeyedWords;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of pronunciation to word lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<KeyedWords, A::Error> {
                let mut rows = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, words)) = access.next_entry::<String, Vec<String>>()? {
                    rows.push((key, words));
                }
                Ok(KeyedWords(rows))
            }
        }

        deserializer.deserialize_map(KeyedVisitor)
    }
}

/// Character → lexical record lookup, as fetched from the lexicon endpoint.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    records: HashMap<char, LexicalRecord>,
}

impl Lexicon {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, LexicalRecord> = serde_json::from_slice(bytes)?;
        Ok(Self::from_entries(raw))
    }

    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, LexicalRecord)>,
        K: AsRef<str>,
    {
        let mut records = HashMap::new();
        for (key, record) in entries {
            let key = key.as_ref();
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => {
                    records.insert(ch, record);
                }
                _ => warn!(key, "skipping lexicon key that is not a single character"),
            }
        }
        Self { records }
    }

    pub fn get(&self, ch: char) -> Option<&LexicalRecord> {
        self.records.get(&ch)
    }

    pub fn contains(&self, ch: char) -> bool {
        self.records.contains_key(&ch)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Characters of `text` that have a record, first occurrence only.
    pub fn valid_characters(&self, text: &str) -> Vec<char> {
        let mut seen = Vec::new();
        for ch in text.chars() {
            if self.contains(ch) && !seen.contains(&ch) {
                seen.push(ch);
            }
        }
        seen
    }
}

/// Character → relative path of its supplementary (Wiktionary) page.
#[derive(Debug, Clone, Default)]
pub struct SupplementaryIndex {
    paths: HashMap<char, String>,
}

impl SupplementaryIndex {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, String> = serde_json::from_slice(bytes)?;
        Ok(Self::from_entries(raw))
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let paths = entries
            .into_iter()
            .filter_map(|(key, path)| {
                let mut chars = key.as_ref().chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Some((ch, path.into())),
                    _ => None,
                }
            })
            .collect();
        Self { paths }
    }

    pub fn path_for(&self, ch: char) -> Option<&str> {
        self.paths.get(&ch).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
