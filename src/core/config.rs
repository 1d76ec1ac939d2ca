//! Engine configuration: every tunable constant of selection, filling,
//! validation and learning, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Scoring constants for the template selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Subtracted when the template itself was shown within the horizon.
    pub recent_penalty: f64,
    /// Subtracted when the template's family is in the context's recent families.
    pub family_penalty: f64,
    /// Multiplier on the summed tag affinity.
    pub affinity_weight: f64,
    /// Multiplier on `weight / (1 + visits)`.
    pub novelty_weight: f64,
    pub exposure_horizon_minutes: u32,
    /// Spice override can never go above this.
    pub absolute_spice_cap: u8,
    /// How many accepted families the engine remembers per session.
    pub recent_family_window: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            recent_penalty: 0.35,
            family_penalty: 0.15,
            affinity_weight: 0.10,
            novelty_weight: 0.05,
            exposure_horizon_minutes: 60,
            absolute_spice_cap: 4,
            recent_family_window: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    /// Random redraws tried before falling back to the remaining pool.
    pub unique_attempts: u32,
    /// Used for player slots when the roster is empty.
    pub player_placeholder: String,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            unique_attempts: 8,
            player_placeholder: "someone".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_words: usize,
    /// Applies when the template has no word budget of its own.
    pub global_max_words: usize,
    /// Profane words are allowed from this spice level up.
    pub profanity_min_spice: u8,
    pub profanity: Vec<String>,
    /// Highest allowed share of the most frequent token.
    pub repetition_ceiling: f64,
    /// Cards shorter than this skip the repetition check.
    pub repetition_min_tokens: usize,
    pub missing_value_tokens: Vec<String>,
    /// Slot type pairs that can never appear together.
    pub incompatible_types: Vec<(String, String)>,
    /// Pair score when two slots resolved to the same text.
    pub duplicate_pair_score: f64,
    pub coherence_floor: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_words: 3,
            global_max_words: 40,
            profanity_min_spice: 3,
            profanity: ["damn", "hell", "shit", "fuck", "ass", "bitch", "crap"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            repetition_ceiling: 0.5,
            repetition_min_tokens: 4,
            missing_value_tokens: ["null", "undefined", "[missing]"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            incompatible_types: Vec::new(),
            duplicate_pair_score: 0.25,
            coherence_floor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Scales every Beta update: success += rate * reward.
    pub learning_rate: f64,
    /// Floor for both Beta parameters.
    pub min_param: f64,
    pub positive_reward: f64,
    pub neutral_reward: f64,
    pub negative_reward: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1.0,
            min_param: 1e-3,
            positive_reward: 1.0,
            neutral_reward: 0.35,
            negative_reward: 0.0,
        }
    }
}

/// Settings handed to an external enhancement collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound the collaborator must honour per call.
    pub timeout_ms: u64,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 64,
            timeout_ms: 1500,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub selector: SelectorConfig,
    pub filler: FillerConfig,
    pub quality: QualityConfig,
    pub feedback: FeedbackConfig,
    pub enhance: EnhanceConfig,
    /// Attempts per card request before giving up.
    pub max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            selector: SelectorConfig::default(),
            filler: FillerConfig::default(),
            quality: QualityConfig::default(),
            feedback: FeedbackConfig::default(),
            enhance: EnhanceConfig::default(),
            max_attempts: 5,
        }
    }
}

impl EngineConfig {
    /// Load and validate a config from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse and validate a config from a RON string.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        let config: EngineConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.selector;
        non_negative("selector.recent_penalty", s.recent_penalty)?;
        non_negative("selector.family_penalty", s.family_penalty)?;
        non_negative("selector.affinity_weight", s.affinity_weight)?;
        non_negative("selector.novelty_weight", s.novelty_weight)?;

        let q = &self.quality;
        if q.min_words > q.global_max_words {
            return Err(ConfigError::Invalid {
                field: "quality.min_words",
                reason: format!(
                    "{} exceeds global_max_words {}",
                    q.min_words, q.global_max_words
                ),
            });
        }
        unit_interval("quality.repetition_ceiling", q.repetition_ceiling, false)?;
        unit_interval("quality.duplicate_pair_score", q.duplicate_pair_score, true)?;
        unit_interval("quality.coherence_floor", q.coherence_floor, true)?;

        let f = &self.feedback;
        positive("feedback.learning_rate", f.learning_rate)?;
        positive("feedback.min_param", f.min_param)?;
        unit_interval("feedback.positive_reward", f.positive_reward, true)?;
        unit_interval("feedback.neutral_reward", f.neutral_reward, true)?;
        unit_interval("feedback.negative_reward", f.negative_reward, true)?;

        if self.enhance.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "enhance.timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} must be a non-negative number", value),
        })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} must be greater than zero", value),
        })
    }
}

/// `[0, 1]` when `allow_zero`, otherwise `(0, 1]`.
fn unit_interval(field: &'static str, value: f64, allow_zero: bool) -> Result<(), ConfigError> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if value.is_finite() && lower_ok && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("{} is outside the unit interval", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_ron_falls_back_to_defaults() {
        let config = EngineConfig::parse_ron(
            "(max_attempts: 3, feedback: (learning_rate: 0.5), selector: (recent_penalty: 0.9))",
        )
        .unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.feedback.learning_rate, 0.5);
        assert_eq!(config.feedback.neutral_reward, 0.35);
        assert_eq!(config.selector.recent_penalty, 0.9);
        assert_eq!(config.selector.family_penalty, 0.15);
        assert_eq!(config.quality, QualityConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let err = EngineConfig::parse_ron("(feedback: (learning_rate: 0.0))").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "feedback.learning_rate",
                ..
            }
        ));

        assert!(EngineConfig::parse_ron("(max_attempts: 0)").is_err());
        assert!(EngineConfig::parse_ron("(quality: (repetition_ceiling: 1.5))").is_err());
        assert!(EngineConfig::parse_ron("(selector: (novelty_weight: -0.1))").is_err());
        assert!(EngineConfig::parse_ron("(quality: (min_words: 50))").is_err());
    }

    #[test]
    fn incompatible_types_as_tuples() {
        let config = EngineConfig::parse_ron(
            r#"(quality: (incompatible_types: [("sacred", "gross")]))"#,
        )
        .unwrap();
        assert_eq!(
            config.quality.incompatible_types,
            vec![("sacred".to_string(), "gross".to_string())]
        );
    }

    #[test]
    fn load_bundled_config() {
        let config = EngineConfig::load_from_ron(Path::new("deck_data/engine.ron")).unwrap();
        assert!(config.max_attempts >= 1);
    }
}
