//! Feedback recording: maps player ratings to rewards and folds rewards
//! and exposures into session state.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::core::bandit::{BanditState, BetaArm};
use crate::core::config::FeedbackConfig;
use crate::core::exposure::ExposureStore;
use crate::schema::feedback::{FeedbackTally, Rating};
use crate::schema::template::TemplateId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedbackError {
    #[error("reward must be a number, got {0}")]
    InvalidReward(f64),
}

/// Reward for a single rating.
pub fn reward_for(rating: Rating, config: &FeedbackConfig) -> f64 {
    match rating {
        Rating::Positive => config.positive_reward,
        Rating::Neutral => config.neutral_reward,
        Rating::Negative => config.negative_reward,
    }
}

/// Feedback-weighted average reward of a tally, clamped to `[0, 1]`.
/// An empty tally carries no signal.
pub fn reward_from_tally(tally: &FeedbackTally, config: &FeedbackConfig) -> Option<f64> {
    let total = tally.total();
    if total == 0 {
        return None;
    }
    let sum = f64::from(tally.positive) * config.positive_reward
        + f64::from(tally.neutral) * config.neutral_reward
        + f64::from(tally.negative) * config.negative_reward;
    Some((sum / total as f64).clamp(0.0, 1.0))
}

/// The only writer of bandit beliefs and exposure history.
pub struct FeedbackRecorder<'a> {
    config: &'a FeedbackConfig,
}

impl<'a> FeedbackRecorder<'a> {
    pub fn new(config: &'a FeedbackConfig) -> Self {
        Self { config }
    }

    /// Fold a reward into the template's arm and return the updated arm.
    /// Finite rewards outside `[0, 1]` are clamped.
    pub fn record_outcome(
        &self,
        bandit: &mut BanditState,
        id: &TemplateId,
        reward: f64,
    ) -> Result<BetaArm, FeedbackError> {
        if reward.is_nan() {
            return Err(FeedbackError::InvalidReward(reward));
        }
        let arm = bandit.record(
            id,
            reward.clamp(0.0, 1.0),
            self.config.learning_rate,
            self.config.min_param,
        );
        tracing::debug!(
            template = %id,
            reward,
            success = arm.success,
            failure = arm.failure,
            "recorded outcome"
        );
        Ok(arm)
    }

    pub fn add_exposure(&self, exposure: &mut dyn ExposureStore, id: TemplateId, at: DateTime<Utc>) {
        exposure.append(id, at);
    }

    /// Drop exposure records older than `horizon_minutes`.
    pub fn prune(
        &self,
        exposure: &mut dyn ExposureStore,
        horizon_minutes: u32,
        now: DateTime<Utc>,
    ) -> usize {
        let removed = exposure.prune(TimeDelta::minutes(i64::from(horizon_minutes)), now);
        if removed > 0 {
            tracing::debug!(removed, "pruned exposure history");
        }
        removed
    }
}
