//! Deck Engine: prompt-card generation for party games.
//!
//! Picks a content template with a Thompson-sampling bandit, fills its
//! slots from word lists and the player roster, validates the result
//! through a quality gate, and learns from player ratings which templates
//! a table enjoys.

pub mod core;
pub mod schema;

pub use crate::core::catalog::TemplateCatalog;
pub use crate::core::config::EngineConfig;
pub use crate::core::engine::{DeckEngine, DeckEngineBuilder, EngineStats, GenerationFailure};
pub use crate::core::lexicon::WordLists;
pub use crate::schema::card::FilledCard;
pub use crate::schema::context::SelectionContext;
pub use crate::schema::template::{Template, TemplateId};
