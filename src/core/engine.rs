//! The generation orchestrator: context → template → card, with bounded
//! retries, plus the session state that feedback updates.
//!
//! Each request runs SELECTING → FILLING → VALIDATING → ACCEPTED. A failure
//! in any step moves to RETRYING, which excludes the failed template and
//! selects again, until `max_attempts` is spent (EXHAUSTED).

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use crate::core::bandit::{BanditState, BetaArm, PriorStore, StoreError};
use crate::core::catalog::{CatalogError, TemplateCatalog};
use crate::core::config::{ConfigError, EngineConfig};
use crate::core::enhance::{enhance_card, Enhancer, Fallback};
use crate::core::exposure::{ExposureHistory, ExposureStore};
use crate::core::feedback::{reward_from_tally, FeedbackError, FeedbackRecorder};
use crate::core::filler::{FillError, TemplateFiller};
use crate::core::lexicon::{CachedLexicon, LexiconError, LexiconProvider, WordLists};
use crate::core::quality::{QualityGate, RejectReason, Verdict};
use crate::core::selector::{SelectError, SelectorState, TemplateSelector};
use crate::schema::card::FilledCard;
use crate::schema::context::SelectionContext;
use crate::schema::feedback::FeedbackTally;
use crate::schema::template::{InteractionKind, Template, TemplateId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("lexicon error: {0}")]
    Lexicon(#[from] LexiconError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("prior store error: {0}")]
    Store(#[from] StoreError),
}

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Fill(#[from] FillError),
    #[error("quality gate rejected the card: {}", join_reasons(.reasons))]
    QualityRejected { reasons: Vec<RejectReason> },
}

fn join_reasons(reasons: &[RejectReason]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// One failed attempt. `template_id` is `None` when selection itself failed.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub template_id: Option<TemplateId>,
    pub error: AttemptError,
}

/// Terminal failure of a card request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationFailure {
    /// The context filters out every template. Retrying cannot help.
    #[error("no template is eligible for this context")]
    NoEligibleTemplate,
    #[error("no card accepted after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        failures: Vec<AttemptFailure>,
    },
}

/// States of a single card request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Selecting,
    Filling,
    Validating,
    Accepted,
    Retrying,
    Exhausted,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Selecting => "SELECTING",
            Self::Filling => "FILLING",
            Self::Validating => "VALIDATING",
            Self::Accepted => "ACCEPTED",
            Self::Retrying => "RETRYING",
            Self::Exhausted => "EXHAUSTED",
        };
        f.write_str(name)
    }
}

/// Observability counters for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total_generated: u64,
    pub total_attempts: u64,
    /// Accepted cards per attempt; zero before the first attempt.
    pub accept_rate: f64,
    pub per_template_visits: FxHashMap<TemplateId, u64>,
}

/// Mutable per-session state. Written only on accepted cards and
/// recorded outcomes.
struct SessionState {
    bandit: BanditState,
    exposure: Box<dyn ExposureStore>,
    recent_families: VecDeque<String>,
    visits: FxHashMap<TemplateId, u64>,
}

/// The card engine for one session. Built via `DeckEngine::builder()`.
///
/// Requests take `&self`; share the engine through an `Arc` to pre-generate
/// cards in the background.
pub struct DeckEngine {
    catalog: TemplateCatalog,
    lexicon: CachedLexicon,
    config: EngineConfig,
    gate: QualityGate,
    prior_store: Option<Box<dyn PriorStore>>,
    session: RwLock<SessionState>,
    /// How long exposure records are kept: the selector horizon or the
    /// longest no-repeat window in the catalogue, whichever is larger.
    exposure_retention_minutes: u32,
    seed: u64,
    generation_index: AtomicU64,
    total_generated: AtomicU64,
    total_attempts: AtomicU64,
}

impl DeckEngine {
    pub fn builder() -> DeckEngineBuilder {
        DeckEngineBuilder::default()
    }

    /// Draw one card for the context.
    pub fn request_card(&self, ctx: &SelectionContext) -> Result<FilledCard, GenerationFailure> {
        self.request_card_at(ctx, Utc::now())
    }

    /// Draw one card as if the current time were `now`.
    pub fn request_card_at(
        &self,
        ctx: &SelectionContext,
        now: DateTime<Utc>,
    ) -> Result<FilledCard, GenerationFailure> {
        let generation = self.generation_index.fetch_add(1, Ordering::Relaxed);
        let (template, card) = self.generate(ctx, generation, now)?;
        self.accept(template, now);
        Ok(card)
    }

    /// Draw up to `count` cards, each avoiding the templates used earlier in
    /// the batch. Stops early when the pool runs dry; fails only if not
    /// even the first card can be drawn.
    pub fn request_variants(
        &self,
        ctx: &SelectionContext,
        count: usize,
    ) -> Result<Vec<FilledCard>, GenerationFailure> {
        self.request_variants_at(ctx, count, Utc::now())
    }

    /// Draw a batch of variants as if the current time were `now`.
    pub fn request_variants_at(
        &self,
        ctx: &SelectionContext,
        count: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<FilledCard>, GenerationFailure> {
        let mut ctx = ctx.clone();
        let mut cards = Vec::with_capacity(count);
        for _ in 0..count {
            match self.request_card_at(&ctx, now) {
                Ok(card) => {
                    ctx.avoid.insert(card.template_id.clone());
                    cards.push(card);
                }
                Err(failure) if cards.is_empty() => return Err(failure),
                Err(failure) => {
                    tracing::debug!(%failure, drawn = cards.len(), "variant batch ended early");
                    break;
                }
            }
        }
        Ok(cards)
    }

    fn generate(
        &self,
        ctx: &SelectionContext,
        generation: u64,
        now: DateTime<Utc>,
    ) -> Result<(&Template, FilledCard), GenerationFailure> {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        let mut ctx = self.session_context(ctx, &session);
        let state = SelectorState {
            bandit: &session.bandit,
            exposure: session.exposure.as_ref(),
            now,
        };
        let selector = TemplateSelector::new(&self.config.selector);
        let filler = TemplateFiller::new(&self.lexicon, &self.config.filler);
        let mut failures: Vec<AttemptFailure> = Vec::new();

        for attempt in 0..self.config.max_attempts {
            self.total_attempts.fetch_add(1, Ordering::Relaxed);
            let mut rng = StdRng::seed_from_u64(attempt_seed(self.seed, generation, attempt));

            tracing::debug!(state = %GenerationState::Selecting, attempt, "generation step");
            let template = match selector.pick(&ctx, self.catalog.templates(), &state, &mut rng) {
                Ok(template) => template,
                Err(SelectError::NoEligibleTemplate) if attempt == 0 => {
                    tracing::debug!("no eligible template for context");
                    return Err(GenerationFailure::NoEligibleTemplate);
                }
                Err(err) => {
                    failures.push(AttemptFailure {
                        template_id: None,
                        error: err.into(),
                    });
                    break;
                }
            };

            tracing::debug!(
                state = %GenerationState::Filling,
                template = %template.id,
                attempt,
                "generation step"
            );
            let outcome = filler
                .fill(template, &ctx, &mut rng)
                .map_err(AttemptError::from)
                .and_then(|mut card| {
                    tracing::debug!(
                        state = %GenerationState::Validating,
                        template = %template.id,
                        attempt,
                        "generation step"
                    );
                    match self.gate.evaluate(&mut card, &template.interaction) {
                        Verdict::Accept => Ok(card),
                        Verdict::Reject(reasons) => Err(AttemptError::QualityRejected { reasons }),
                    }
                });

            match outcome {
                Ok(card) => {
                    tracing::debug!(
                        state = %GenerationState::Accepted,
                        template = %template.id,
                        attempt,
                        "generation step"
                    );
                    return Ok((template, card));
                }
                Err(error) => {
                    tracing::debug!(
                        state = %GenerationState::Retrying,
                        template = %template.id,
                        attempt,
                        %error,
                        "attempt failed"
                    );
                    ctx.avoid.insert(template.id.clone());
                    failures.push(AttemptFailure {
                        template_id: Some(template.id.clone()),
                        error,
                    });
                }
            }
        }

        let attempts = failures.len() as u32;
        tracing::warn!(state = %GenerationState::Exhausted, attempts, "card generation exhausted");
        Err(GenerationFailure::Exhausted { attempts, failures })
    }

    /// The caller's context plus the families this session showed recently.
    fn session_context(&self, ctx: &SelectionContext, session: &SessionState) -> SelectionContext {
        let mut ctx = ctx.clone();
        for family in &session.recent_families {
            if !ctx.recent_families.contains(family) {
                ctx.recent_families.push(family.clone());
            }
        }
        ctx
    }

    fn accept(&self, template: &Template, now: DateTime<Utc>) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        let recorder = FeedbackRecorder::new(&self.config.feedback);
        recorder.add_exposure(session.exposure.as_mut(), template.id.clone(), now);
        recorder.prune(session.exposure.as_mut(), self.exposure_retention_minutes, now);

        *session.visits.entry(template.id.clone()).or_insert(0) += 1;
        session.recent_families.retain(|f| f != &template.family);
        session.recent_families.push_back(template.family.clone());
        while session.recent_families.len() > self.config.selector.recent_family_window {
            session.recent_families.pop_front();
        }
        self.total_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a reward in `[0, 1]` into the template's belief and persist it
    /// when a prior store is configured.
    pub fn record_outcome(&self, id: &TemplateId, reward: f64) -> Result<BetaArm, FeedbackError> {
        let arm = {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            FeedbackRecorder::new(&self.config.feedback).record_outcome(
                &mut session.bandit,
                id,
                reward,
            )?
        };
        if let Some(store) = &self.prior_store {
            if let Err(err) = store.persist(id, arm) {
                tracing::warn!(
                    template = %id,
                    error = %err,
                    "failed to persist prior; keeping in-memory state"
                );
            }
        }
        Ok(arm)
    }

    /// Map a feedback tally to a reward and record it. An empty tally is
    /// ignored.
    pub fn record_feedback(
        &self,
        id: &TemplateId,
        tally: &FeedbackTally,
    ) -> Result<Option<BetaArm>, FeedbackError> {
        match reward_from_tally(tally, &self.config.feedback) {
            Some(reward) => self.record_outcome(id, reward).map(Some),
            None => Ok(None),
        }
    }

    /// Try to polish a card with an external enhancer. Returns the original
    /// card when the enhancer is absent, fails, or produces something the
    /// quality gate or spice audit rejects.
    pub fn enhance(&self, card: &FilledCard, enhancer: Option<&dyn Enhancer>) -> FilledCard {
        let contract = self
            .catalog
            .get(&card.template_id)
            .map(|t| t.interaction.clone())
            .unwrap_or(InteractionKind::Statement);
        match enhance_card(card, enhancer, &self.gate, &contract, &self.config.enhance) {
            Ok(enhanced) => enhanced,
            Err(Fallback::Absent) => card.clone(),
            Err(fallback) => {
                tracing::debug!(template = %card.template_id, ?fallback, "enhancement discarded");
                card.clone()
            }
        }
    }

    pub fn stats(&self) -> EngineStats {
        let total_generated = self.total_generated.load(Ordering::Relaxed);
        let total_attempts = self.total_attempts.load(Ordering::Relaxed);
        let accept_rate = if total_attempts == 0 {
            0.0
        } else {
            total_generated as f64 / total_attempts as f64
        };
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        EngineStats {
            total_generated,
            total_attempts,
            accept_rate,
            per_template_visits: session.visits.clone(),
        }
    }

    pub fn snapshot_bandit(&self) -> BanditState {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bandit
            .clone()
    }

    /// Posterior mean `success / (success + failure)` for a template.
    pub fn posterior_mean(&self, id: &TemplateId) -> f64 {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bandit
            .arm(id)
            .mean()
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Builder for constructing a `DeckEngine`.
#[derive(Default)]
pub struct DeckEngineBuilder {
    catalog_paths: Vec<PathBuf>,
    lexicon_paths: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    seed: u64,
    /// Directly provided templates (for testing without files).
    catalog: Option<TemplateCatalog>,
    /// Directly provided word lists (for testing without files).
    lexicon: Option<WordLists>,
    lexicon_provider: Option<Box<dyn LexiconProvider>>,
    config: Option<EngineConfig>,
    prior_store: Option<Box<dyn PriorStore>>,
    exposure_store: Option<Box<dyn ExposureStore>>,
}

impl DeckEngineBuilder {
    /// Load templates from a RON file. Later files override earlier ones.
    pub fn catalog_path(mut self, path: impl AsRef<Path>) -> Self {
        self.catalog_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Load word lists from a RON file. Later files override earlier ones.
    pub fn lexicon_path(mut self, path: impl AsRef<Path>) -> Self {
        self.lexicon_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Provide templates directly. Files from `catalog_path` merge over them.
    pub fn catalog(mut self, catalog: TemplateCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Provide word lists directly. Files from `lexicon_path` merge over them.
    pub fn lexicon(mut self, lexicon: WordLists) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    /// Use an external lexicon provider instead of in-memory word lists.
    pub fn lexicon_provider(mut self, provider: Box<dyn LexiconProvider>) -> Self {
        self.lexicon_provider = Some(provider);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn prior_store(mut self, store: Box<dyn PriorStore>) -> Self {
        self.prior_store = Some(store);
        self
    }

    pub fn exposure_store(mut self, store: Box<dyn ExposureStore>) -> Self {
        self.exposure_store = Some(store);
        self
    }

    pub fn build(self) -> Result<DeckEngine, EngineError> {
        let config = match (&self.config_path, self.config) {
            (Some(path), _) => EngineConfig::load_from_ron(path)?,
            (None, Some(config)) => {
                config.validate()?;
                config
            }
            (None, None) => EngineConfig::default(),
        };

        let mut catalog = self.catalog.unwrap_or_default();
        for path in &self.catalog_paths {
            catalog.merge(TemplateCatalog::load_from_ron(path)?);
        }

        let lexicon: Box<dyn LexiconProvider> = match self.lexicon_provider {
            Some(provider) => {
                if !self.lexicon_paths.is_empty() || self.lexicon.is_some() {
                    tracing::warn!("lexicon provider set; ignoring in-memory word lists");
                }
                provider
            }
            None => {
                let mut lists = self.lexicon.unwrap_or_default();
                for path in &self.lexicon_paths {
                    lists.merge(WordLists::load_from_ron(path)?);
                }
                Box::new(lists)
            }
        };

        let exposure_retention_minutes = catalog
            .templates()
            .iter()
            .filter_map(|t| t.constraints.no_repeat_minutes)
            .fold(config.selector.exposure_horizon_minutes, u32::max);

        let bandit = match &self.prior_store {
            Some(store) => match store.load_priors() {
                Ok(priors) => BanditState::from_priors(priors, config.feedback.min_param),
                Err(err) => {
                    tracing::warn!(error = %err, "failed to load priors; starting uniform");
                    BanditState::new()
                }
            },
            None => BanditState::new(),
        };

        let session = SessionState {
            bandit,
            exposure: self
                .exposure_store
                .unwrap_or_else(|| Box::new(ExposureHistory::new())),
            recent_families: VecDeque::new(),
            visits: FxHashMap::default(),
        };

        Ok(DeckEngine {
            gate: QualityGate::new(&config.quality),
            catalog,
            lexicon: CachedLexicon::new(lexicon),
            config,
            prior_store: self.prior_store,
            session: RwLock::new(session),
            exposure_retention_minutes,
            seed: self.seed,
            generation_index: AtomicU64::new(0),
            total_generated: AtomicU64::new(0),
            total_attempts: AtomicU64::new(0),
        })
    }
}

/// RNG seed for one attempt. Generation goes in the high half and attempt
/// in the low half, so no two (generation, attempt) pairs share a stream
/// within the first 2^32 generations.
fn attempt_seed(seed: u64, generation: u64, attempt: u32) -> u64 {
    seed.wrapping_add((generation << 32) | u64::from(attempt))
}

/// Template ids that failed during an exhausted request.
pub fn failed_templates(failure: &GenerationFailure) -> FxHashSet<TemplateId> {
    match failure {
        GenerationFailure::NoEligibleTemplate => FxHashSet::default(),
        GenerationFailure::Exhausted { failures, .. } => failures
            .iter()
            .filter_map(|f| f.template_id.clone())
            .collect(),
    }
}
