//! WASM bindings for deck-engine. Powers the web demo table.

use wasm_bindgen::prelude::*;

use deck_engine::core::catalog::TemplateCatalog;
use deck_engine::core::config::EngineConfig;
use deck_engine::core::engine::{DeckEngine, EngineStats};
use deck_engine::core::lexicon::WordLists;
use deck_engine::schema::card::FilledCard;
use deck_engine::schema::context::SelectionContext;
use deck_engine::schema::feedback::{FeedbackTally, Rating};
use deck_engine::schema::template::TemplateId;

// ---------------------------------------------------------------------------
// Embedded deck data, compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const ENGINE_CONFIG: &str = include_str!("../../deck_data/engine.ron");
    pub const PARTY_TEMPLATES: &str = include_str!("../../deck_data/party/templates.ron");
    pub const PARTY_LEXICON: &str = include_str!("../../deck_data/party/lexicon.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Deserialize)]
struct TableInput {
    #[serde(default)]
    players: Vec<String>,
    #[serde(default = "default_spice")]
    spice: u8,
    game: Option<String>,
    #[serde(default)]
    inbound: Vec<String>,
}

fn default_spice() -> u8 {
    2
}

#[derive(serde::Deserialize)]
struct RatingInput {
    template_id: String,
    ratings: Vec<String>,
}

#[derive(serde::Serialize)]
struct RatingResult {
    template_id: String,
    recorded: bool,
    posterior_mean: f64,
}

fn js_err(context: &str, e: impl std::fmt::Display) -> JsError {
    JsError::new(&format!("{context}: {e}"))
}

// ---------------------------------------------------------------------------
// DeckDemo: the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct DeckDemo {
    engine: DeckEngine,
}

#[wasm_bindgen]
impl DeckDemo {
    /// Create a new demo session over the bundled party deck.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64) -> Result<DeckDemo, JsError> {
        let config = EngineConfig::parse_ron(data::ENGINE_CONFIG)
            .map_err(|e| js_err("Config parse error", e))?;
        let catalog = TemplateCatalog::parse_ron(data::PARTY_TEMPLATES)
            .map_err(|e| js_err("Catalogue parse error", e))?;
        let lexicon = WordLists::parse_ron(data::PARTY_LEXICON)
            .map_err(|e| js_err("Lexicon parse error", e))?;

        let engine = DeckEngine::builder()
            .seed(seed)
            .config(config)
            .catalog(catalog)
            .lexicon(lexicon)
            .build()
            .map_err(|e| js_err("Engine build error", e))?;

        Ok(DeckDemo { engine })
    }

    /// Draw a card for the table described by a JSON string. Returns the
    /// card as JSON.
    ///
    /// Expected JSON shape:
    /// ```json
    /// {
    ///   "players": ["Ana", "Ben", "Chloe"],
    ///   "spice": 2,
    ///   "game": "party",
    ///   "inbound": []
    /// }
    /// ```
    pub fn request_card(&self, table_json: &str) -> Result<String, JsError> {
        let ctx = parse_table(table_json)?;
        let card = self
            .engine
            .request_card(&ctx)
            .map_err(|e| js_err("Generation error", e))?;
        card_json(&card)
    }

    /// Draw up to `count` cards from distinct templates. Returns a JSON array.
    pub fn request_variants(&self, table_json: &str, count: usize) -> Result<String, JsError> {
        let ctx = parse_table(table_json)?;
        let cards = self
            .engine
            .request_variants(&ctx, count)
            .map_err(|e| js_err("Generation error", e))?;
        serde_json::to_string(&cards).map_err(|e| js_err("Serialization error", e))
    }

    /// Record the table's reactions to a card.
    ///
    /// Expected JSON shape: `{ "template_id": "never-have-i", "ratings": ["+", "0", "-"] }`
    pub fn rate(&self, rating_json: &str) -> Result<String, JsError> {
        let input: RatingInput = serde_json::from_str(rating_json)
            .map_err(|e| js_err("Invalid rating JSON", e))?;
        let tally: FeedbackTally = input
            .ratings
            .iter()
            .map(|r| Rating::parse(r).ok_or_else(|| JsError::new(&format!("Unknown rating: {r}"))))
            .collect::<Result<Vec<Rating>, JsError>>()?
            .into_iter()
            .collect();

        let id = TemplateId::new(input.template_id.as_str());
        let recorded = self
            .engine
            .record_feedback(&id, &tally)
            .map_err(|e| js_err("Feedback error", e))?
            .is_some();

        let result = RatingResult {
            template_id: input.template_id,
            recorded,
            posterior_mean: self.engine.posterior_mean(&id),
        };
        serde_json::to_string(&result).map_err(|e| js_err("Serialization error", e))
    }

    /// Return the session counters as JSON.
    pub fn stats(&self) -> Result<String, JsError> {
        let stats: EngineStats = self.engine.stats();
        serde_json::to_string(&stats).map_err(|e| js_err("Serialization error", e))
    }

    /// Return a JSON array of the game ids in the bundled deck.
    pub fn games(&self) -> String {
        serde_json::to_string(&self.engine.catalog().games()).unwrap_or_else(|_| "[]".to_string())
    }

    /// Reset the session with a new seed. Learned priors are discarded.
    pub fn reset(&mut self, seed: u64) -> Result<(), JsError> {
        self.engine = DeckDemo::new(seed)?.engine;
        Ok(())
    }
}

fn parse_table(table_json: &str) -> Result<SelectionContext, JsError> {
    let input: TableInput =
        serde_json::from_str(table_json).map_err(|e| js_err("Invalid table JSON", e))?;
    let mut ctx = SelectionContext::new(input.spice);
    ctx.players = input.players;
    ctx.game_id = input.game;
    ctx.inbound = input.inbound;
    Ok(ctx)
}

fn card_json(card: &FilledCard) -> Result<String, JsError> {
    serde_json::to_string(card).map_err(|e| js_err("Serialization error", e))
}
