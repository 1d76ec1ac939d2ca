//! Optional AI enhancement. The collaborator lives outside the crate; the
//! engine only asks it for a rewrite and a spice audit, and keeps the
//! original card whenever anything goes wrong.

use thiserror::Error;

use crate::core::config::EnhanceConfig;
use crate::core::quality::{QualityGate, Verdict};
use crate::schema::card::FilledCard;
use crate::schema::template::InteractionKind;

/// Labels used to audit the spice of a rewritten card. Index `i` maps to
/// spice level `i + 1`.
pub const SPICE_LABELS: [&str; 4] = ["mild", "cheeky", "spicy", "wild"];

const SYSTEM_PROMPT: &str = "You polish short party game prompts. Keep the meaning, \
the player names and the options. Reply with the rewritten prompt only.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnhanceError {
    #[error("enhancer unavailable")]
    Unavailable,
    #[error("enhancer timed out")]
    Timeout,
    #[error("enhancer failed: {0}")]
    Failed(String),
}

/// External text model. Implementations must honour
/// `EnhanceConfig::timeout_ms` and return `EnhanceError::Timeout` past it.
pub trait Enhancer: Send + Sync {
    fn generate(
        &self,
        system: &str,
        user: &str,
        config: &EnhanceConfig,
    ) -> Result<String, EnhanceError>;

    /// Index into `labels` of the best-matching label.
    fn classify(
        &self,
        text: &str,
        labels: &[&str],
        config: &EnhanceConfig,
    ) -> Result<usize, EnhanceError>;
}

/// Why an enhancement was discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback {
    Absent,
    Error(EnhanceError),
    Rejected(Verdict),
    SpiceEscalated { from: u8, to: u8 },
}

/// Ask the enhancer for a rewrite of `card`. The rewrite must pass the
/// quality gate and must not audit above the card's spice level.
pub fn enhance_card(
    card: &FilledCard,
    enhancer: Option<&dyn Enhancer>,
    gate: &QualityGate,
    contract: &InteractionKind,
    config: &EnhanceConfig,
) -> Result<FilledCard, Fallback> {
    let enhancer = enhancer.ok_or(Fallback::Absent)?;

    let rewritten = enhancer
        .generate(SYSTEM_PROMPT, &user_prompt(card), config)
        .map_err(Fallback::Error)?;

    let mut candidate = card.clone();
    candidate.text = rewritten;
    let verdict = gate.evaluate(&mut candidate, contract);
    if !verdict.is_accept() {
        return Err(Fallback::Rejected(verdict));
    }

    let label = enhancer
        .classify(&candidate.text, &SPICE_LABELS, config)
        .map_err(Fallback::Error)?;
    let audited = u8::try_from(label.min(SPICE_LABELS.len() - 1) + 1).unwrap_or(u8::MAX);
    if audited > card.spice {
        return Err(Fallback::SpiceEscalated {
            from: card.spice,
            to: audited,
        });
    }

    Ok(candidate)
}

fn user_prompt(card: &FilledCard) -> String {
    let level = SPICE_LABELS
        .get(usize::from(card.spice.max(1)) - 1)
        .copied()
        .unwrap_or("wild");
    let mut prompt = format!(
        "Rewrite this {} card so it reads naturally. Keep it {} or milder",
        card.family, level
    );
    if let Some(max) = card.max_words {
        prompt.push_str(&format!(" and under {} words", max));
    }
    prompt.push_str(":\n");
    prompt.push_str(&card.text);
    prompt
}
