//! Template selection: hard filtering followed by Thompson sampling with
//! diversity, affinity and novelty adjustments.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::core::bandit::BanditState;
use crate::core::config::SelectorConfig;
use crate::core::exposure::ExposureStore;
use crate::schema::context::SelectionContext;
use crate::schema::template::{Template, TemplateId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("no template in the pool passes the hard filter")]
    NoEligibleTemplate,
}

/// Read-only view of the session state the selector scores against.
pub struct SelectorState<'a> {
    pub bandit: &'a BanditState,
    pub exposure: &'a dyn ExposureStore,
    pub now: DateTime<Utc>,
}

/// Whether a template survives the context's hard constraints. Exposure
/// based constraints are checked separately by the selector.
pub fn passes_hard_filter(
    template: &Template,
    ctx: &SelectionContext,
    config: &SelectorConfig,
) -> bool {
    let spice_ok = template.spice <= ctx.spice_ceiling
        || (template.constraints.allow_spice_override
            && template.spice <= config.absolute_spice_cap);
    if !spice_ok {
        return false;
    }
    if let Some(game) = &ctx.game_id {
        if &template.game_id != game {
            return false;
        }
    }
    if let Some(min) = template.min_players {
        if min > ctx.player_count() {
            return false;
        }
    }
    !ctx.avoid.contains(&template.id)
}

pub struct TemplateSelector<'a> {
    config: &'a SelectorConfig,
}

impl<'a> TemplateSelector<'a> {
    pub fn new(config: &'a SelectorConfig) -> Self {
        Self { config }
    }

    /// Templates from `pool` that may be shown right now, in pool order.
    pub fn eligible<'t>(
        &self,
        ctx: &SelectionContext,
        pool: &'t [Template],
        state: &SelectorState<'_>,
    ) -> Vec<&'t Template> {
        let mut blocked: FxHashMap<u32, FxHashSet<TemplateId>> = FxHashMap::default();
        pool.iter()
            .filter(|t| passes_hard_filter(t, ctx, self.config))
            .filter(|t| match t.constraints.no_repeat_minutes {
                Some(minutes) => !blocked
                    .entry(minutes)
                    .or_insert_with(|| {
                        state
                            .exposure
                            .recent_ids(TimeDelta::minutes(i64::from(minutes)), state.now)
                    })
                    .contains(&t.id),
                None => true,
            })
            .collect()
    }

    /// Pick the best-scoring eligible template. Ties go to the earlier
    /// template in `pool`.
    pub fn pick<'t, R: Rng + ?Sized>(
        &self,
        ctx: &SelectionContext,
        pool: &'t [Template],
        state: &SelectorState<'_>,
        rng: &mut R,
    ) -> Result<&'t Template, SelectError> {
        let candidates = self.eligible(ctx, pool, state);
        if candidates.is_empty() {
            return Err(SelectError::NoEligibleTemplate);
        }

        let horizon = TimeDelta::minutes(i64::from(self.config.exposure_horizon_minutes));
        let recent = state.exposure.recent_ids(horizon, state.now);

        let scores: Vec<f64> = candidates
            .iter()
            .map(|t| self.score(t, ctx, state, &recent, rng))
            .collect();

        let best = best_index(&scores).ok_or(SelectError::NoEligibleTemplate)?;
        let chosen = candidates[best];
        tracing::debug!(
            template = %chosen.id,
            score = scores[best],
            candidates = candidates.len(),
            "selected template"
        );
        Ok(chosen)
    }

    fn score<R: Rng + ?Sized>(
        &self,
        template: &Template,
        ctx: &SelectionContext,
        state: &SelectorState<'_>,
        recent: &FxHashSet<TemplateId>,
        rng: &mut R,
    ) -> f64 {
        let mut score = state.bandit.sample(&template.id, rng);

        if recent.contains(&template.id) {
            score -= self.config.recent_penalty;
        }
        if ctx.recent_families.iter().any(|f| f == &template.family) {
            score -= self.config.family_penalty;
        }

        score += self.config.affinity_weight * ctx.affinity_for(&template.tags);

        let visits = state.exposure.visits(&template.id) as f64;
        score += self.config.novelty_weight * template.weight / (1.0 + visits);

        score
    }
}

/// Index of the highest score, first occurrence on ties. NaN scores never win.
fn best_index(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bandit::BetaArm;
    use crate::core::blueprint::Blueprint;
    use crate::core::exposure::ExposureHistory;
    use crate::schema::template::TemplateConstraints;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn template(id: &str, spice: u8) -> Template {
        let blueprint = Blueprint::parse("Who would {verb} first?").unwrap();
        Template::new(id, "party", format!("family-{id}"), blueprint).with_spice(spice)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap()
    }

    #[test]
    fn spice_filtered_template_is_never_picked() {
        let mut priors = FxHashMap::default();
        priors.insert(TemplateId::new("A"), BetaArm::new(2.0, 3.0));
        priors.insert(TemplateId::new("B"), BetaArm::new(1.0, 1.0));
        let bandit = BanditState::from_priors(priors, 1e-3);
        let exposure = ExposureHistory::new();
        let state = SelectorState {
            bandit: &bandit,
            exposure: &exposure,
            now: now(),
        };

        let config = SelectorConfig::default();
        let selector = TemplateSelector::new(&config);
        let pool = vec![template("A", 1), template("B", 3)];
        let ctx = SelectionContext::new(2);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = selector.pick(&ctx, &pool, &state, &mut rng).unwrap();
            assert_eq!(picked.id.as_str(), "A");
        }
    }

    #[test]
    fn empty_pool_after_filter_is_an_error() {
        let bandit = BanditState::new();
        let exposure = ExposureHistory::new();
        let state = SelectorState {
            bandit: &bandit,
            exposure: &exposure,
            now: now(),
        };
        let config = SelectorConfig::default();
        let selector = TemplateSelector::new(&config);
        let pool = vec![template("A", 3)];
        let ctx = SelectionContext::new(1);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            selector.pick(&ctx, &pool, &state, &mut rng).unwrap_err(),
            SelectError::NoEligibleTemplate
        );
    }

    #[test]
    fn hard_filter_checks_game_players_and_avoid() {
        let config = SelectorConfig::default();
        let t = template("A", 1).with_min_players(4);

        let ctx = SelectionContext::new(4).with_players(&["a", "b", "c"]);
        assert!(!passes_hard_filter(&t, &ctx, &config));

        let ctx = SelectionContext::new(4).with_players(&["a", "b", "c", "d"]);
        assert!(passes_hard_filter(&t, &ctx, &config));
        assert!(!passes_hard_filter(&t, &ctx.clone().with_game("trivia"), &config));
        assert!(passes_hard_filter(&t, &ctx.clone().with_game("party"), &config));
        assert!(!passes_hard_filter(&t, &ctx.avoiding("A"), &config));
    }

    #[test]
    fn spice_override_is_capped() {
        let mut config = SelectorConfig::default();
        config.absolute_spice_cap = 3;
        let constraints = TemplateConstraints {
            allow_spice_override: true,
            ..TemplateConstraints::default()
        };
        let mild = template("mild", 3).with_constraints(constraints.clone());
        let wild = template("wild", 4).with_constraints(constraints);
        let ctx = SelectionContext::new(1);
        assert!(passes_hard_filter(&mild, &ctx, &config));
        assert!(!passes_hard_filter(&wild, &ctx, &config));
    }

    #[test]
    fn no_repeat_window_blocks_recent_templates() {
        let bandit = BanditState::new();
        let mut exposure = ExposureHistory::new();
        exposure.append(TemplateId::new("A"), now() - TimeDelta::minutes(10));
        let state = SelectorState {
            bandit: &bandit,
            exposure: &exposure,
            now: now(),
        };
        let config = SelectorConfig::default();
        let selector = TemplateSelector::new(&config);
        let constraints = TemplateConstraints {
            no_repeat_minutes: Some(30),
            ..TemplateConstraints::default()
        };
        let pool = vec![template("A", 1).with_constraints(constraints), template("B", 1)];
        let ctx = SelectionContext::new(1);

        let eligible = selector.eligible(&ctx, &pool, &state);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id.as_str(), "B");
    }

    #[test]
    fn recent_templates_are_picked_less_often() {
        let bandit = BanditState::new();
        let mut exposure = ExposureHistory::new();
        exposure.append(TemplateId::new("recent"), now() - TimeDelta::minutes(5));
        let state = SelectorState {
            bandit: &bandit,
            exposure: &exposure,
            now: now(),
        };
        let config = SelectorConfig::default();
        let selector = TemplateSelector::new(&config);
        let pool = vec![template("recent", 1), template("fresh", 1)];
        let ctx = SelectionContext::new(1);

        let mut rng = StdRng::seed_from_u64(99);
        let fresh = (0..400)
            .filter(|_| selector.pick(&ctx, &pool, &state, &mut rng).unwrap().id.as_str() == "fresh")
            .count();
        assert!(fresh > 250, "fresh picked {fresh}/400");
    }

    #[test]
    fn tag_affinity_pulls_selection() {
        let bandit = BanditState::new();
        let exposure = ExposureHistory::new();
        let state = SelectorState {
            bandit: &bandit,
            exposure: &exposure,
            now: now(),
        };
        let config = SelectorConfig::default();
        let selector = TemplateSelector::new(&config);
        let pool = vec![
            template("plain", 1),
            template("loved", 1).with_tags(&["food"]),
        ];
        let ctx = SelectionContext::new(1).with_affinity("food", 20.0);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let picked = selector.pick(&ctx, &pool, &state, &mut rng).unwrap();
            assert_eq!(picked.id.as_str(), "loved");
        }
    }

    #[test]
    fn pick_is_deterministic_for_a_seed() {
        let bandit = BanditState::new();
        let exposure = ExposureHistory::new();
        let state = SelectorState {
            bandit: &bandit,
            exposure: &exposure,
            now: now(),
        };
        let config = SelectorConfig::default();
        let selector = TemplateSelector::new(&config);
        let pool: Vec<Template> = (0..8).map(|i| template(&format!("t{i}"), 1)).collect();
        let ctx = SelectionContext::new(1);

        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..10)
                .map(|_| selector.pick(&ctx, &pool, &state, &mut rng).unwrap().id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn ties_go_to_first_candidate() {
        assert_eq!(best_index(&[0.5, 0.9, 0.9, 0.1]), Some(1));
        assert_eq!(best_index(&[f64::NAN, 0.2]), Some(1));
        assert_eq!(best_index(&[]), None);
    }
}
