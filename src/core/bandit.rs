//! Thompson-sampling beliefs: Beta arms per template and their
//! persistence seam.

use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::schema::template::TemplateId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("RON serialization error: {0}")]
    RonSerialize(#[from] ron::Error),
}

/// Beta(success, failure) belief about one template's reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaArm {
    pub success: f64,
    pub failure: f64,
}

impl Default for BetaArm {
    fn default() -> Self {
        Self::uniform()
    }
}

impl BetaArm {
    /// The uninformative prior Beta(1, 1).
    pub fn uniform() -> Self {
        Self {
            success: 1.0,
            failure: 1.0,
        }
    }

    pub fn new(success: f64, failure: f64) -> Self {
        Self { success, failure }
    }

    /// Posterior mean `success / (success + failure)`.
    pub fn mean(&self) -> f64 {
        self.success / (self.success + self.failure)
    }

    pub fn variance(&self) -> f64 {
        let sum = self.success + self.failure;
        (self.success * self.failure) / (sum.powi(2) * (sum + 1.0))
    }

    /// Draw one sample in `[0, 1]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let x = sample_gamma(self.success, rng);
        let y = sample_gamma(self.failure, rng);
        let total = x + y;
        if total > 0.0 && total.is_finite() {
            (x / total).clamp(0.0, 1.0)
        } else {
            self.mean()
        }
    }

    /// Fold a reward in `[0, 1]` into the belief. Both parameters stay at
    /// or above `min_param`.
    pub fn update(&mut self, reward: f64, learning_rate: f64, min_param: f64) {
        let reward = reward.clamp(0.0, 1.0);
        self.success = (self.success + learning_rate * reward).max(min_param);
        self.failure = (self.failure + learning_rate * (1.0 - reward)).max(min_param);
    }

    /// Replace non-finite or non-positive parameters.
    fn sanitized(self, min_param: f64) -> Self {
        let fix = |v: f64| if v.is_finite() { v.max(min_param) } else { 1.0 };
        Self {
            success: fix(self.success),
            failure: fix(self.failure),
        }
    }
}

/// Gamma(shape, 1) via Marsaglia-Tsang; shapes below one use the
/// `Gamma(shape + 1) * U^(1/shape)` boost.
fn sample_gamma<R: Rng + ?Sized>(shape: f64, rng: &mut R) -> f64 {
    if shape < 1.0 {
        let u: f64 = 1.0 - rng.gen::<f64>();
        return sample_gamma(shape + 1.0, rng) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let (x, v) = loop {
            let x = standard_normal(rng);
            let v = 1.0 + c * x;
            if v > 0.0 {
                break (x, v * v * v);
            }
        };
        let u: f64 = 1.0 - rng.gen::<f64>();
        if u < 1.0 - 0.0331 * x.powi(4) || u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

/// Box-Muller standard normal draw.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Per-session beliefs for every template seen so far. Templates without
/// an arm read as Beta(1, 1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BanditState {
    arms: FxHashMap<TemplateId, BetaArm>,
}

impl BanditState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from persisted priors, repairing any non-positive parameters.
    pub fn from_priors(priors: FxHashMap<TemplateId, BetaArm>, min_param: f64) -> Self {
        Self {
            arms: priors
                .into_iter()
                .map(|(id, arm)| (id, arm.sanitized(min_param)))
                .collect(),
        }
    }

    pub fn arm(&self, id: &TemplateId) -> BetaArm {
        self.arms.get(id).copied().unwrap_or_default()
    }

    pub fn sample<R: Rng + ?Sized>(&self, id: &TemplateId, rng: &mut R) -> f64 {
        self.arm(id).sample(rng)
    }

    /// Apply a reward and return the updated arm.
    pub fn record(
        &mut self,
        id: &TemplateId,
        reward: f64,
        learning_rate: f64,
        min_param: f64,
    ) -> BetaArm {
        let arm = self.arms.entry(id.clone()).or_default();
        arm.update(reward, learning_rate, min_param);
        *arm
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TemplateId, &BetaArm)> {
        self.arms.iter()
    }

    pub fn len(&self) -> usize {
        self.arms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arms.is_empty()
    }
}

/// Durable storage for bandit priors. Optional: the engine runs on
/// in-memory state when no store is configured or the store fails.
pub trait PriorStore: Send + Sync {
    fn load_priors(&self) -> Result<FxHashMap<TemplateId, BetaArm>, StoreError>;
    fn persist(&self, id: &TemplateId, arm: BetaArm) -> Result<(), StoreError>;
}

/// Prior store kept in memory, mostly for tests and the web demo.
#[derive(Debug, Default)]
pub struct MemoryPriorStore {
    arms: Mutex<FxHashMap<TemplateId, BetaArm>>,
}

impl MemoryPriorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priors(priors: FxHashMap<TemplateId, BetaArm>) -> Self {
        Self {
            arms: Mutex::new(priors),
        }
    }

    pub fn get(&self, id: &TemplateId) -> Option<BetaArm> {
        self.arms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .copied()
    }
}

impl PriorStore for MemoryPriorStore {
    fn load_priors(&self) -> Result<FxHashMap<TemplateId, BetaArm>, StoreError> {
        Ok(self
            .arms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn persist(&self, id: &TemplateId, arm: BetaArm) -> Result<(), StoreError> {
        self.arms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), arm);
        Ok(())
    }
}

/// Prior store backed by a RON file of `id: (success, failure)` entries.
/// Every persist rewrites the whole file.
#[derive(Debug)]
pub struct RonPriorStore {
    path: PathBuf,
    arms: Mutex<FxHashMap<TemplateId, BetaArm>>,
}

impl RonPriorStore {
    /// Open a store, reading the file if it exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let arms = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            ron::from_str(&contents)?
        } else {
            FxHashMap::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            arms: Mutex::new(arms),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PriorStore for RonPriorStore {
    fn load_priors(&self) -> Result<FxHashMap<TemplateId, BetaArm>, StoreError> {
        Ok(self
            .arms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn persist(&self, id: &TemplateId, arm: BetaArm) -> Result<(), StoreError> {
        let mut arms = self.arms.lock().unwrap_or_else(PoisonError::into_inner);
        arms.insert(id.clone(), arm);
        // Sorted output keeps the file diffable.
        let sorted: std::collections::BTreeMap<&TemplateId, &BetaArm> = arms.iter().collect();
        let serialized = ron::ser::to_string_pretty(&sorted, ron::ser::PrettyConfig::default())?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}
