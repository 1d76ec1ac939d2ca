use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::template::TemplateId;

/// Session constraints and learned signals for one card request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionContext {
    /// Active player names, in seating order.
    #[serde(default)]
    pub players: Vec<String>,
    /// Highest spice level the session accepts.
    pub spice_ceiling: u8,
    /// Restrict selection to one game.
    #[serde(default)]
    pub game_id: Option<String>,
    /// Template ids that must not be returned.
    #[serde(default)]
    pub avoid: FxHashSet<TemplateId>,
    /// Families shown recently, most recent last.
    #[serde(default)]
    pub recent_families: Vec<String>,
    /// Learned audience preference per template tag.
    #[serde(default)]
    pub tag_affinity: FxHashMap<String, f64>,
    /// Explicit player count; defaults to the roster length.
    #[serde(default)]
    pub player_count: Option<u32>,
    /// Runtime-supplied text for `Inbound` slots.
    #[serde(default)]
    pub inbound: Vec<String>,
}

impl Default for SelectionContext {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SelectionContext {
    pub fn new(spice_ceiling: u8) -> Self {
        Self {
            players: Vec::new(),
            spice_ceiling,
            game_id: None,
            avoid: FxHashSet::default(),
            recent_families: Vec::new(),
            tag_affinity: FxHashMap::default(),
            player_count: None,
            inbound: Vec::new(),
        }
    }

    pub fn with_players(mut self, players: &[&str]) -> Self {
        self.players = players.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_game(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    pub fn avoiding(mut self, id: impl Into<TemplateId>) -> Self {
        self.avoid.insert(id.into());
        self
    }

    pub fn with_recent_family(mut self, family: impl Into<String>) -> Self {
        self.recent_families.push(family.into());
        self
    }

    pub fn with_affinity(mut self, tag: impl Into<String>, weight: f64) -> Self {
        self.tag_affinity.insert(tag.into(), weight);
        self
    }

    pub fn with_inbound(mut self, texts: &[&str]) -> Self {
        self.inbound = texts.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Number of players at the table.
    pub fn player_count(&self) -> u32 {
        self.player_count
            .unwrap_or_else(|| self.players.len() as u32)
    }

    /// Sum of affinity weights for the given tags.
    pub fn affinity_for(&self, tags: &[String]) -> f64 {
        tags.iter()
            .filter_map(|tag| self.tag_affinity.get(tag))
            .sum()
    }
}
