//! Grouping of characters that carry identical lexical data.

use crate::lexicon::LexicalRecord;

/// Characters sharing one lexical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedGroup<'a> {
    pub characters: Vec<char>,
    pub info: &'a LexicalRecord,
}

impl MergedGroup<'_> {
    pub fn header(&self) -> String {
        self.characters.iter().collect()
    }
}

/// Groups `entries` by deep equality of their records.
///
/// Groups come out in first-occurrence order of each distinct record, and each
/// group lists its characters in input order. Quadratic in the input size,
/// which is the handful of characters written in one table cell.
pub fn merge<'a>(entries: &[(char, &'a LexicalRecord)]) -> Vec<MergedGroup<'a>> {
    let mut grouped = vec![false; entries.len()];
    let mut groups = Vec::new();
    for (i, (ch, info)) in entries.iter().enumerate() {
        if grouped[i] {
            continue;
        }
        grouped[i] = true;
        let mut characters = vec![*ch];
        for (j, (other_ch, other_info)) in entries.iter().enumerate().skip(i + 1) {
            if !grouped[j] && *other_info == *info {
                grouped[j] = true;
                characters.push(*other_ch);
            }
        }
        groups.push(MergedGroup { characters, info });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::{KeyedWords, Reading};

    fn record(pron: &str) -> LexicalRecord {
        LexicalRecord {
            primary: vec![Reading::new(pron).with_words(["例"])],
            native: Vec::new(),
        }
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(merge(&[]).is_empty());
    }

    #[test]
    fn identical_records_share_a_group() {
        let a = record("カ");
        let b = record("カ");
        let c = record("スイ");
        let groups = merge(&[('火', &a), ('水', &c), ('化', &b)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].characters, vec!['火', '化']);
        assert_eq!(groups[0].header(), "火化");
        assert_eq!(groups[1].characters, vec!['水']);
    }

    #[test]
    fn every_character_lands_in_exactly_one_group() {
        let records = [record("ア"), record("イ"), record("ア"), record("イ"), record("ウ")];
        let chars = ['一', '二', '三', '四', '五'];
        let entries: Vec<_> = chars.iter().copied().zip(records.iter()).collect();
        let groups = merge(&entries);
        let mut seen: Vec<char> = groups
            .iter()
            .flat_map(|group| group.characters.iter().copied())
            .collect();
        seen.sort_unstable();
        let mut expected = chars.to_vec();
        expected.sort_unstable();
        assert_eq!(seen, expected);
        for group in &groups {
            for ch in &group.characters {
                let idx = chars.iter().position(|c| c == ch).unwrap();
                assert_eq!(&records[idx], group.info);
            }
        }
    }

    #[test]
    fn nested_mapping_order_matters() {
        let first = LexicalRecord {
            primary: Vec::new(),
            native: vec![Reading::new("ひ").with_keyed_words(
                KeyedWords::default().push("ひ", ["火花"]).push("ほ", ["火影"]),
            )],
        };
        let mut second = first.clone();
        second.native[0] = Reading::new("ひ").with_keyed_words(
            KeyedWords::default().push("ほ", ["火影"]).push("ひ", ["火花"]),
        );
        let groups = merge(&[('火', &first), ('灯', &second)]);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn classification_difference_splits_groups() {
        let a = LexicalRecord {
            primary: vec![Reading::new("カ").with_type("漢音")],
            native: Vec::new(),
        };
        let b = LexicalRecord {
            primary: vec![Reading::new("カ").with_type("呉音")],
            native: Vec::new(),
        };
        assert_eq!(merge(&[('火', &a), ('化', &b)]).len(), 2);
    }
}
