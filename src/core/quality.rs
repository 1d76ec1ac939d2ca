//! Quality gate: normalizes card text and rejects malformed or
//! low-quality cards, reporting every problem found.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

use crate::core::config::QualityConfig;
use crate::schema::card::{same_value, CardOptions, FilledCard};
use crate::schema::template::InteractionKind;

const QUOTE_CHARS: &[char] = &['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '`'];

/// Why a card was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    TooFewWords { words: usize, min: usize },
    TooManyWords { words: usize, max: usize },
    Profanity { word: String, spice: u8 },
    ContractMismatch { expected: InteractionKind, detail: String },
    UnresolvedPlaceholder,
    MissingValue { token: String },
    Repetitive { token: String, ratio: f64 },
    IncompatibleSlots { first: String, second: String },
    LowCoherence { score: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewWords { words, min } => write!(f, "{} words, minimum is {}", words, min),
            Self::TooManyWords { words, max } => write!(f, "{} words, maximum is {}", words, max),
            Self::Profanity { word, spice } => {
                write!(f, "profanity '{}' not allowed at spice {}", word, spice)
            }
            Self::ContractMismatch { expected, detail } => {
                write!(f, "options do not fit {}: {}", expected, detail)
            }
            Self::UnresolvedPlaceholder => f.write_str("text contains placeholder delimiters"),
            Self::MissingValue { token } => write!(f, "text contains missing-value token '{}'", token),
            Self::Repetitive { token, ratio } => {
                write!(f, "'{}' makes up {:.0}% of the text", token, ratio * 100.0)
            }
            Self::IncompatibleSlots { first, second } => {
                write!(f, "slots '{}' and '{}' have incompatible types", first, second)
            }
            Self::LowCoherence { score } => write!(f, "coherence score {:.2} below floor", score),
        }
    }
}

/// Outcome of a quality evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    Reject(Vec<RejectReason>),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// A chain of lexical, structural and semantic validators.
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: QualityConfig,
    profanity: FxHashSet<String>,
    missing_tokens: FxHashSet<String>,
    incompatible: FxHashSet<(String, String)>,
}

impl QualityGate {
    pub fn new(config: &QualityConfig) -> Self {
        let mut incompatible = FxHashSet::default();
        for (a, b) in &config.incompatible_types {
            incompatible.insert((a.to_lowercase(), b.to_lowercase()));
            incompatible.insert((b.to_lowercase(), a.to_lowercase()));
        }
        Self {
            config: config.clone(),
            profanity: config.profanity.iter().map(|w| w.to_lowercase()).collect(),
            missing_tokens: config
                .missing_value_tokens
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            incompatible,
        }
    }

    /// Normalize the card's text, then run every check against it and the
    /// expected interaction contract. Reasons are accumulated, not
    /// short-circuited.
    pub fn evaluate(&self, card: &mut FilledCard, contract: &InteractionKind) -> Verdict {
        card.text = sanitize(&card.text);

        let mut reasons = Vec::new();
        self.check_lexical(card, &mut reasons);
        check_contract(card, contract, &mut reasons);
        self.check_text_structure(card, &mut reasons);
        self.check_repetition(card, &mut reasons);
        self.check_coherence(card, &mut reasons);

        if reasons.is_empty() {
            Verdict::Accept
        } else {
            Verdict::Reject(reasons)
        }
    }

    fn check_lexical(&self, card: &FilledCard, reasons: &mut Vec<RejectReason>) {
        let words = card.word_count();
        if words < self.config.min_words {
            reasons.push(RejectReason::TooFewWords {
                words,
                min: self.config.min_words,
            });
        }
        let max = card
            .max_words
            .map(|m| m as usize)
            .unwrap_or(self.config.global_max_words);
        if words > max {
            reasons.push(RejectReason::TooManyWords { words, max });
        }

        if card.spice < self.config.profanity_min_spice {
            if let Some(word) = tokens(&card.text).find(|t| self.profanity.contains(t)) {
                reasons.push(RejectReason::Profanity {
                    word,
                    spice: card.spice,
                });
            }
        }
    }

    fn check_text_structure(&self, card: &FilledCard, reasons: &mut Vec<RejectReason>) {
        if card.text.contains(&['{', '}'][..]) {
            reasons.push(RejectReason::UnresolvedPlaceholder);
        }
        let missing = card.text.split_whitespace().find_map(|raw| {
            let token = raw
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'))
                .to_lowercase();
            self.missing_tokens.contains(&token).then_some(token)
        });
        if let Some(token) = missing {
            reasons.push(RejectReason::MissingValue { token });
        }
    }

    fn check_repetition(&self, card: &FilledCard, reasons: &mut Vec<RejectReason>) {
        let all: Vec<String> = tokens(&card.text).collect();
        if all.len() < self.config.repetition_min_tokens {
            return;
        }
        let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
        for token in &all {
            *counts.entry(token.as_str()).or_default() += 1;
        }
        // Ties resolve to the first token in text order.
        let mut top: Option<(&str, usize)> = None;
        for token in &all {
            let count = counts[token.as_str()];
            if top.map_or(true, |(_, best)| count > best) {
                top = Some((token.as_str(), count));
            }
        }
        if let Some((token, count)) = top {
            let ratio = count as f64 / all.len() as f64;
            if ratio > self.config.repetition_ceiling {
                reasons.push(RejectReason::Repetitive {
                    token: token.to_string(),
                    ratio,
                });
            }
        }
    }

    /// Pairwise slot-type compatibility in `[0, 1]`.
    ///
    /// Incompatible type pairs score zero and zero the aggregate; two slots
    /// with the same resolved text score `duplicate_pair_score`; all other
    /// pairs score one. Cards with fewer than two slots score one.
    pub fn coherence(&self, card: &FilledCard) -> (f64, Vec<RejectReason>) {
        let mut conflicts = Vec::new();
        let mut scores = Vec::new();

        for (i, first) in card.slots.iter().enumerate() {
            for second in &card.slots[i + 1..] {
                let incompatible = match (&first.slot_type, &second.slot_type) {
                    (Some(a), Some(b)) => self
                        .incompatible
                        .contains(&(a.to_lowercase(), b.to_lowercase())),
                    _ => false,
                };
                let score = if incompatible {
                    conflicts.push(RejectReason::IncompatibleSlots {
                        first: first.name.clone(),
                        second: second.name.clone(),
                    });
                    0.0
                } else if same_value(&first.raw, &second.raw) {
                    self.config.duplicate_pair_score
                } else {
                    1.0
                };
                scores.push(score);
            }
        }

        if scores.is_empty() {
            return (1.0, conflicts);
        }
        if !conflicts.is_empty() {
            return (0.0, conflicts);
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        (mean.clamp(0.0, 1.0), conflicts)
    }

    fn check_coherence(&self, card: &FilledCard, reasons: &mut Vec<RejectReason>) {
        if card.slots.len() < 2 {
            return;
        }
        let (score, conflicts) = self.coherence(card);
        reasons.extend(conflicts);
        if score < self.config.coherence_floor {
            reasons.push(RejectReason::LowCoherence { score });
        }
    }
}

/// Trim, collapse internal whitespace and strip wrapping quotes.
pub fn sanitize(text: &str) -> String {
    let mut current = text.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let mut chars = current.chars();
        let (first, last) = (chars.next(), chars.next_back());
        match (first, last) {
            (Some(a), Some(b)) if QUOTE_CHARS.contains(&a) && QUOTE_CHARS.contains(&b) => {
                let inner = &current[a.len_utf8()..current.len() - b.len_utf8()];
                current = inner.trim().to_string();
            }
            _ => return current,
        }
    }
}

/// Lowercased word tokens with surrounding punctuation removed.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
}

fn check_contract(card: &FilledCard, contract: &InteractionKind, reasons: &mut Vec<RejectReason>) {
    let mismatch = |detail: &str| RejectReason::ContractMismatch {
        expected: contract.clone(),
        detail: detail.to_string(),
    };
    let blank = |s: &str| s.trim().is_empty();

    match (contract, &card.options) {
        (InteractionKind::Statement, CardOptions::None) => {}
        (InteractionKind::Statement, _) => reasons.push(mismatch("statement cards carry no options")),
        (InteractionKind::BinaryChoice, CardOptions::Choice { a, b }) => {
            if blank(a) || blank(b) {
                reasons.push(mismatch("an option is blank"));
            } else if same_value(a, b) {
                reasons.push(mismatch("both options are the same"));
            }
        }
        (InteractionKind::WordGuess { forbidden }, CardOptions::WordGuess { target, forbidden: words }) => {
            if blank(target) {
                reasons.push(mismatch("target word is blank"));
            }
            if words.len() != *forbidden || words.iter().any(|w| blank(w)) {
                reasons.push(mismatch(&format!(
                    "expected {} forbidden words, got {}",
                    forbidden,
                    words.iter().filter(|w| !blank(w)).count()
                )));
            }
        }
        (InteractionKind::PlayerVote, CardOptions::Vote { players }) => {
            let eligible: FxHashSet<String> = players
                .iter()
                .filter(|p| !blank(p))
                .map(|p| p.trim().to_lowercase())
                .collect();
            if eligible.len() < 2 {
                reasons.push(mismatch("fewer than two eligible players"));
            }
        }
        (_, options) => reasons.push(mismatch(&format!("got {}", options_shape(options)))),
    }
}

fn options_shape(options: &CardOptions) -> &'static str {
    match options {
        CardOptions::None => "no options",
        CardOptions::Choice { .. } => "a choice",
        CardOptions::WordGuess { .. } => "a word guess",
        CardOptions::Vote { .. } => "a vote",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::card::SlotAssignment;
    use crate::schema::template::TemplateId;
    use uuid::Uuid;

    fn card(text: &str) -> FilledCard {
        FilledCard {
            id: Uuid::nil(),
            template_id: TemplateId::new("t"),
            game_id: "g".to_string(),
            text: text.to_string(),
            family: "f".to_string(),
            spice: 1,
            locality: 0,
            max_words: None,
            slots: Vec::new(),
            options: CardOptions::None,
        }
    }

    fn slot(name: &str, value: &str, slot_type: Option<&str>) -> SlotAssignment {
        SlotAssignment {
            name: name.to_string(),
            raw: value.to_string(),
            value: value.to_string(),
            slot_type: slot_type.map(str::to_string),
        }
    }

    fn gate() -> QualityGate {
        let mut config = QualityConfig::default();
        config.incompatible_types = vec![("sacred".to_string(), "gross".to_string())];
        QualityGate::new(&config)
    }

    fn reasons(verdict: Verdict) -> Vec<RejectReason> {
        match verdict {
            Verdict::Accept => Vec::new(),
            Verdict::Reject(r) => r,
        }
    }

    #[test]
    fn sanitize_normalizes_without_rejecting() {
        assert_eq!(sanitize("  \"Who  would\n win?\"  "), "Who would win?");
        assert_eq!(sanitize("\u{201C}'nested'\u{201D}"), "nested");
        assert_eq!(sanitize("plain"), "plain");
        assert_eq!(sanitize("\""), "\"");

        let mut c = card("   \"Most likely   to cry\"  ");
        assert!(gate().evaluate(&mut c, &InteractionKind::Statement).is_accept());
        assert_eq!(c.text, "Most likely to cry");
    }

    #[test]
    fn accumulates_every_reason() {
        let mut c = card("{x} null");
        let r = reasons(gate().evaluate(&mut c, &InteractionKind::BinaryChoice));
        assert!(r.contains(&RejectReason::TooFewWords { words: 2, min: 3 }));
        assert!(r.contains(&RejectReason::UnresolvedPlaceholder));
        assert!(r.contains(&RejectReason::MissingValue {
            token: "null".to_string()
        }));
        assert!(r
            .iter()
            .any(|reason| matches!(reason, RejectReason::ContractMismatch { .. })));
    }

    #[test]
    fn word_limit_prefers_template_budget() {
        let mut c = card("one two three four five six");
        c.max_words = Some(5);
        let r = reasons(gate().evaluate(&mut c, &InteractionKind::Statement));
        assert_eq!(r, vec![RejectReason::TooManyWords { words: 6, max: 5 }]);
    }

    #[test]
    fn profanity_gated_by_spice() {
        let mut mild = card("Who is the biggest ass here?");
        let r = reasons(gate().evaluate(&mut mild, &InteractionKind::Statement));
        assert_eq!(
            r,
            vec![RejectReason::Profanity {
                word: "ass".to_string(),
                spice: 1
            }]
        );

        let mut spicy = card("Who is the biggest ass here?");
        spicy.spice = 3;
        assert!(gate().evaluate(&mut spicy, &InteractionKind::Statement).is_accept());
    }

    #[test]
    fn repetition_ceiling() {
        let mut c = card("word word word cake");
        let r = reasons(gate().evaluate(&mut c, &InteractionKind::Statement));
        assert!(matches!(&r[..], [RejectReason::Repetitive { token, ratio }] if token == "word" && (*ratio - 0.75).abs() < 1e-9));

        let mut ok = card("Would you rather eat a cake or a pie");
        assert!(gate().evaluate(&mut ok, &InteractionKind::Statement).is_accept());
    }

    #[test]
    fn binary_choice_contract() {
        let mut same = card("Would you rather fly or fly?");
        same.options = CardOptions::Choice {
            a: "fly".to_string(),
            b: " FLY ".to_string(),
        };
        assert!(!gate().evaluate(&mut same, &InteractionKind::BinaryChoice).is_accept());

        let mut good = card("Would you rather fly or swim?");
        good.options = CardOptions::Choice {
            a: "fly".to_string(),
            b: "swim".to_string(),
        };
        assert!(gate().evaluate(&mut good, &InteractionKind::BinaryChoice).is_accept());
    }

    #[test]
    fn word_guess_contract_checks_length() {
        let mut c = card("Describe the word on your card");
        c.options = CardOptions::WordGuess {
            target: "pizza".to_string(),
            forbidden: vec!["cheese".to_string(), "slice".to_string()],
        };
        assert!(!gate()
            .evaluate(&mut c, &InteractionKind::WordGuess { forbidden: 3 })
            .is_accept());
        assert!(gate()
            .evaluate(&mut c, &InteractionKind::WordGuess { forbidden: 2 })
            .is_accept());
    }

    #[test]
    fn player_vote_needs_two_players() {
        let mut c = card("Who is most likely to win?");
        c.options = CardOptions::Vote {
            players: vec!["Ana".to_string(), " ".to_string()],
        };
        assert!(!gate().evaluate(&mut c, &InteractionKind::PlayerVote).is_accept());
        c.options = CardOptions::Vote {
            players: vec!["Ana".to_string(), "Bo".to_string()],
        };
        assert!(gate().evaluate(&mut c, &InteractionKind::PlayerVote).is_accept());
    }

    #[test]
    fn incompatible_types_score_zero_regardless_of_names() {
        let mut c = card("Pray to the moldy sock tonight");
        c.slots = vec![
            slot("thing_one", "the moon", Some("Sacred")),
            slot("thing_two", "moldy sock", Some("gross")),
        ];
        let (score, conflicts) = gate().coherence(&c);
        assert_eq!(score, 0.0);
        assert_eq!(conflicts.len(), 1);
        assert!(!gate().evaluate(&mut c, &InteractionKind::Statement).is_accept());
    }

    #[test]
    fn duplicate_slot_text_penalized() {
        let mut c = card("Trade your taco for a taco");
        c.slots = vec![slot("a", "taco", None), slot("b", "Taco", None)];
        let (score, _) = gate().coherence(&c);
        assert_eq!(score, 0.25);
        let r = reasons(gate().evaluate(&mut c, &InteractionKind::Statement));
        assert_eq!(r, vec![RejectReason::LowCoherence { score: 0.25 }]);

        c.slots.push(slot("c", "burrito", Some("food")));
        let (score, _) = gate().coherence(&c);
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn accented_duplicates_caught_in_any_case() {
        let mut pair = card("Would you rather eat an éclair or an Éclair?");
        pair.options = CardOptions::Choice {
            a: "éclair".to_string(),
            b: "Éclair".to_string(),
        };
        assert!(!gate().evaluate(&mut pair, &InteractionKind::BinaryChoice).is_accept());

        let mut c = card("Swap your éclair for an Éclair tonight");
        c.slots = vec![slot("a", "éclair", None), slot("b", "Éclair", None)];
        let (score, _) = gate().coherence(&c);
        assert_eq!(score, 0.25);
    }

    #[test]
    fn reason_messages() {
        assert_eq!(
            RejectReason::TooFewWords { words: 1, min: 3 }.to_string(),
            "1 words, minimum is 3"
        );
        assert_eq!(
            RejectReason::ContractMismatch {
                expected: InteractionKind::BinaryChoice,
                detail: "got no options".to_string()
            }
            .to_string(),
            "options do not fit binary choice: got no options"
        );
    }
}
