//! Template filling: resolves slots, applies transforms and constraints,
//! and renders the final card text.

use rand::rngs::StdRng;
use rand::Rng;
use std::borrow::Cow;
use thiserror::Error;
use uuid::Builder;

use crate::core::blueprint::{Blueprint, Segment};
use crate::core::config::FillerConfig;
use crate::core::lexicon::CachedLexicon;
use crate::core::resolver::SlotResolver;
use crate::schema::card::{count_words, CardOptions, FilledCard, SlotAssignment};
use crate::schema::context::SelectionContext;
use crate::schema::template::{OptionProvider, SlotSource, SlotSpec, Template, Transform};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FillError {
    #[error("slot '{slot}' could not be resolved from {origin}")]
    SlotResolution { slot: String, origin: String },
    #[error("no distinct value left for slot '{slot}'")]
    UniquenessExhausted { slot: String },
    #[error("card has {words} words, budget is {max}")]
    WordBudgetExceeded { words: usize, max: u32 },
}

/// Fills templates into cards.
pub struct TemplateFiller<'a> {
    lexicon: &'a CachedLexicon,
    config: &'a FillerConfig,
}

impl<'a> TemplateFiller<'a> {
    pub fn new(lexicon: &'a CachedLexicon, config: &'a FillerConfig) -> Self {
        Self { lexicon, config }
    }

    /// Fill a template into a card.
    ///
    /// Options are derived first so blueprints can reference them, then
    /// slots are resolved in declaration order. Text over the template's
    /// word budget is an error, never truncated.
    pub fn fill(
        &self,
        template: &Template,
        ctx: &SelectionContext,
        rng: &mut StdRng,
    ) -> Result<FilledCard, FillError> {
        let specs = slot_specs(template);
        let mut resolver = SlotResolver::new(self.lexicon, ctx, &self.config.player_placeholder, rng);

        let options = self.derive_options(&template.options, ctx, &mut resolver, rng)?;

        let mut assignments: Vec<SlotAssignment> = Vec::with_capacity(specs.len());
        for spec in specs.iter() {
            let excluded = exclusions(template, &specs, spec, &assignments);
            let raw = if excluded.is_empty() {
                resolver.resolve(&spec.name, &spec.source, rng)?
            } else {
                resolver.resolve_distinct(
                    &spec.name,
                    &spec.source,
                    &excluded,
                    self.config.unique_attempts,
                    rng,
                )?
            };
            let value = apply_transforms(&raw, &spec.transforms);
            assignments.push(SlotAssignment {
                name: spec.name.clone(),
                raw,
                value,
                slot_type: spec.slot_type.clone(),
            });
        }

        let text = render(
            &template.blueprint,
            &assignments,
            &options,
            template.uses_structured_slots(),
        )?;

        let words = count_words(&text);
        if let Some(max) = template.max_words {
            if words > max as usize {
                return Err(FillError::WordBudgetExceeded { words, max });
            }
        }

        Ok(FilledCard {
            id: Builder::from_random_bytes(rng.gen()).into_uuid(),
            template_id: template.id.clone(),
            game_id: template.game_id.clone(),
            text,
            family: template.family.clone(),
            spice: template.spice,
            locality: template.locality,
            max_words: template.max_words,
            slots: assignments,
            options,
        })
    }

    fn derive_options(
        &self,
        provider: &OptionProvider,
        ctx: &SelectionContext,
        resolver: &mut SlotResolver<'_>,
        rng: &mut StdRng,
    ) -> Result<CardOptions, FillError> {
        let options = match provider {
            OptionProvider::None => CardOptions::None,
            OptionProvider::FixedPair(a, b) => CardOptions::Choice {
                a: a.clone(),
                b: b.clone(),
            },
            OptionProvider::ContrastingPair(key) => {
                let source = SlotSource::Lexicon(key.clone());
                let a = resolver.resolve("option_a", &source, rng)?;
                let b = resolver.resolve_distinct(
                    "option_b",
                    &source,
                    std::slice::from_ref(&a),
                    self.config.unique_attempts,
                    rng,
                )?;
                CardOptions::Choice { a, b }
            }
            OptionProvider::TabooWord { source, forbidden } => {
                let entry = resolver.resolve("target_word", &SlotSource::Lexicon(source.clone()), rng)?;
                let mut parts = entry.split('|').map(str::trim).filter(|p| !p.is_empty());
                let target = parts.next().unwrap_or_default().to_string();
                let forbidden = parts.take(*forbidden).map(str::to_string).collect();
                CardOptions::WordGuess { target, forbidden }
            }
            OptionProvider::Roster => CardOptions::Vote {
                players: ctx.players.clone(),
            },
        };
        Ok(options)
    }
}

/// The slot specs a template fills: its structured specs, or specs inferred
/// from inline placeholder syntax.
pub fn slot_specs(template: &Template) -> Cow<'_, [SlotSpec]> {
    if template.uses_structured_slots() {
        return Cow::Borrowed(&template.slots);
    }
    let reserved = template.options.placeholders();
    let inferred = template
        .blueprint
        .slot_names()
        .into_iter()
        .filter(|name| !reserved.contains(name))
        .map(|name| SlotSpec {
            name: name.to_string(),
            source: inline_source(name),
            transforms: template.blueprint.inline_transforms(name).to_vec(),
            distinct_from: Vec::new(),
            slot_type: None,
        })
        .collect();
    Cow::Owned(inferred)
}

/// Source for an inline placeholder. Trailing digits are dropped so that
/// `{noun1}` and `{noun2}` share the `noun` list.
pub fn inline_source(name: &str) -> SlotSource {
    let key = name.trim_end_matches(|c: char| c.is_ascii_digit());
    let key = if key.is_empty() { name } else { key };
    match key {
        "player" => SlotSource::Player,
        "inbound" => SlotSource::Inbound,
        _ => SlotSource::Lexicon(key.to_string()),
    }
}

/// Raw values of already-filled slots that `spec` must differ from.
fn exclusions(
    template: &Template,
    specs: &[SlotSpec],
    spec: &SlotSpec,
    assigned: &[SlotAssignment],
) -> Vec<String> {
    assigned
        .iter()
        .filter(|a| {
            let other = specs.iter().find(|s| s.name == a.name);
            template.constraints.distinct_slots
                || (spec.is_unique() && other.is_some_and(SlotSpec::is_unique))
                || spec.distinct_from.contains(&a.name)
                || other.is_some_and(|o| o.distinct_from.contains(&spec.name))
        })
        .map(|a| a.raw.clone())
        .collect()
}

fn apply_transforms(value: &str, transforms: &[Transform]) -> String {
    transforms
        .iter()
        .fold(value.to_string(), |acc, t| t.apply(&acc))
}

fn option_value<'c>(options: &'c CardOptions, name: &str) -> Option<&'c str> {
    match (options, name) {
        (CardOptions::Choice { a, .. }, "option_a") => Some(a),
        (CardOptions::Choice { b, .. }, "option_b") => Some(b),
        (CardOptions::WordGuess { target, .. }, "target_word") => Some(target),
        _ => None,
    }
}

fn render(
    blueprint: &Blueprint,
    assignments: &[SlotAssignment],
    options: &CardOptions,
    structured: bool,
) -> Result<String, FillError> {
    let mut out = String::new();
    for segment in blueprint.segments() {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Slot { name, transforms } => {
                if let Some(assignment) = assignments.iter().find(|a| &a.name == name) {
                    // Inline transforms were folded into inferred specs already.
                    if structured {
                        out.push_str(&apply_transforms(&assignment.value, transforms));
                    } else {
                        out.push_str(&assignment.value);
                    }
                } else if let Some(value) = option_value(options, name) {
                    out.push_str(&apply_transforms(value, transforms));
                } else {
                    return Err(FillError::SlotResolution {
                        slot: name.clone(),
                        origin: "an undeclared slot".to_string(),
                    });
                }
            }
        }
    }
    Ok(out)
}
