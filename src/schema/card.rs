use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::template::TemplateId;

/// The concrete value assigned to one slot, kept for auditing and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub name: String,
    /// Value as drawn from the source, before transforms.
    pub raw: String,
    /// Value as it appears in the card text.
    pub value: String,
    pub slot_type: Option<String>,
}

/// Game-specific choices derived alongside the text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CardOptions {
    #[default]
    None,
    Choice { a: String, b: String },
    WordGuess { target: String, forbidden: Vec<String> },
    Vote { players: Vec<String> },
}

/// A generated card. Built once per successful fill and not mutated after
/// the quality gate has normalized its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledCard {
    pub id: Uuid,
    pub template_id: TemplateId,
    pub game_id: String,
    pub text: String,
    pub family: String,
    pub spice: u8,
    pub locality: u8,
    /// Word budget of the source template, if any.
    pub max_words: Option<u32>,
    pub slots: Vec<SlotAssignment>,
    pub options: CardOptions,
}

impl FilledCard {
    pub fn slot_value(&self, name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.value.as_str())
    }

    pub fn word_count(&self) -> usize {
        count_words(&self.text)
    }
}

/// Count whitespace-separated words, ignoring empty tokens.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Whether two slot or option values are the same word, ignoring
/// surrounding whitespace and Unicode case.
pub fn same_value(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    a == b || a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_extra_whitespace() {
        assert_eq!(count_words("  Most   likely\tto \n cry  "), 4);
        assert_eq!(count_words(""), 0);
        assert_eq!(count_words("   "), 0);
    }

    #[test]
    fn same_value_folds_unicode_case() {
        assert!(same_value("Éclair", "éclair"));
        assert!(same_value(" STRASSE ", "strasse"));
        assert!(same_value("ÜBER", "über"));
        assert!(!same_value("éclair", "eclair"));
    }
}
