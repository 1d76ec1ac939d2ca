//! Slot resolution: turns a slot source into a concrete candidate value.

use rand::rngs::StdRng;
use rand::Rng;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::core::filler::FillError;
use crate::core::lexicon::CachedLexicon;
use crate::schema::card::same_value;
use crate::schema::context::SelectionContext;
use crate::schema::template::SlotSource;

/// The candidate values a source can produce.
enum Pool<'a> {
    Shared(Arc<[String]>),
    Borrowed(&'a [String]),
    Placeholder(&'a str),
}

impl Pool<'_> {
    fn len(&self) -> usize {
        match self {
            Pool::Shared(words) => words.len(),
            Pool::Borrowed(words) => words.len(),
            Pool::Placeholder(_) => 1,
        }
    }

    fn get(&self, index: usize) -> &str {
        match self {
            Pool::Shared(words) => &words[index],
            Pool::Borrowed(words) => &words[index],
            Pool::Placeholder(value) => value,
        }
    }

    fn iter(&self) -> impl Iterator<Item = &str> {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Resolves slot values for a single fill.
///
/// Player and target-name slots rotate from a random starting offset, so
/// consecutive slots of the same source get different entries while the
/// pool lasts.
pub struct SlotResolver<'a> {
    lexicon: &'a CachedLexicon,
    ctx: &'a SelectionContext,
    player_placeholder: &'a str,
    player_offset: usize,
    player_cursor: usize,
    target_cursors: FxHashMap<String, usize>,
}

impl<'a> SlotResolver<'a> {
    pub fn new(
        lexicon: &'a CachedLexicon,
        ctx: &'a SelectionContext,
        player_placeholder: &'a str,
        rng: &mut StdRng,
    ) -> Self {
        let player_offset = if ctx.players.is_empty() {
            0
        } else {
            rng.gen_range(0..ctx.players.len())
        };
        Self {
            lexicon,
            ctx,
            player_placeholder,
            player_offset,
            player_cursor: 0,
            target_cursors: FxHashMap::default(),
        }
    }

    fn pool(&self, slot: &str, source: &SlotSource) -> Result<Pool<'a>, FillError> {
        let missing = || FillError::SlotResolution {
            slot: slot.to_string(),
            origin: source.to_string(),
        };
        match source {
            SlotSource::Lexicon(key) | SlotSource::TargetName(key) => {
                self.lexicon.lookup(key).map(Pool::Shared).ok_or_else(missing)
            }
            SlotSource::Player => {
                if self.ctx.players.is_empty() {
                    Ok(Pool::Placeholder(self.player_placeholder))
                } else {
                    Ok(Pool::Borrowed(&self.ctx.players))
                }
            }
            SlotSource::Inbound => {
                if self.ctx.inbound.iter().any(|t| !t.trim().is_empty()) {
                    Ok(Pool::Borrowed(&self.ctx.inbound))
                } else {
                    Err(missing())
                }
            }
        }
    }

    /// Draw the next value for a slot.
    pub fn resolve(
        &mut self,
        slot: &str,
        source: &SlotSource,
        rng: &mut StdRng,
    ) -> Result<String, FillError> {
        let pool = self.pool(slot, source)?;
        let value = match source {
            SlotSource::Player => {
                let index = (self.player_offset + self.player_cursor) % pool.len();
                self.player_cursor += 1;
                pool.get(index).to_string()
            }
            SlotSource::TargetName(key) => {
                let len = pool.len();
                let cursor = self
                    .target_cursors
                    .entry(key.clone())
                    .or_insert_with(|| rng.gen_range(0..len));
                let value = pool.get(*cursor % len).to_string();
                *cursor += 1;
                value
            }
            SlotSource::Inbound => {
                let texts: Vec<&str> = pool.iter().filter(|t| !t.trim().is_empty()).collect();
                texts[rng.gen_range(0..texts.len())].to_string()
            }
            SlotSource::Lexicon(_) => pool.get(rng.gen_range(0..pool.len())).to_string(),
        };
        Ok(value)
    }

    /// Draw a value that matches none of `excluded` (case-insensitive).
    ///
    /// Tries the regular draw, then up to `attempts` random redraws, then
    /// any remaining candidate. Fails only when every candidate is excluded.
    pub fn resolve_distinct(
        &mut self,
        slot: &str,
        source: &SlotSource,
        excluded: &[String],
        attempts: u32,
        rng: &mut StdRng,
    ) -> Result<String, FillError> {
        let clashes = |value: &str| excluded.iter().any(|e| same_value(e, value));

        let first = self.resolve(slot, source, rng)?;
        if !clashes(first.as_str()) {
            return Ok(first);
        }

        let pool = self.pool(slot, source)?;
        for _ in 0..attempts {
            let candidate = pool.get(rng.gen_range(0..pool.len()));
            if !candidate.trim().is_empty() && !clashes(candidate) {
                return Ok(candidate.to_string());
            }
        }

        let remaining: Vec<&str> = pool
            .iter()
            .filter(|c| !c.trim().is_empty() && !clashes(*c))
            .collect();
        if remaining.is_empty() {
            return Err(FillError::UniquenessExhausted {
                slot: slot.to_string(),
            });
        }
        Ok(remaining[rng.gen_range(0..remaining.len())].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexicon::WordLists;
    use rand::SeedableRng;

    fn lexicon() -> CachedLexicon {
        CachedLexicon::new(Box::new(
            WordLists::new()
                .with_list("food", &["taco", "ramen", "pie"])
                .with_list("celebs", &["Ada", "Grace", "Linus"])
                .with_list("same", &["x", "X", "x"]),
        ))
    }

    #[test]
    fn players_rotate_without_repeats() {
        let lex = lexicon();
        let ctx = SelectionContext::new(2).with_players(&["Ana", "Bo", "Cy"]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut resolver = SlotResolver::new(&lex, &ctx, "someone", &mut rng);

        let picks: Vec<String> = (0..3)
            .map(|_| resolver.resolve("p", &SlotSource::Player, &mut rng).unwrap())
            .collect();
        let mut sorted = picks.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["Ana", "Bo", "Cy"]);
    }

    #[test]
    fn empty_roster_uses_placeholder() {
        let lex = lexicon();
        let ctx = SelectionContext::new(2);
        let mut rng = StdRng::seed_from_u64(1);
        let mut resolver = SlotResolver::new(&lex, &ctx, "someone", &mut rng);
        assert_eq!(
            resolver.resolve("p", &SlotSource::Player, &mut rng).unwrap(),
            "someone"
        );
    }

    #[test]
    fn target_names_rotate_per_key() {
        let lex = lexicon();
        let ctx = SelectionContext::new(2);
        let mut rng = StdRng::seed_from_u64(9);
        let mut resolver = SlotResolver::new(&lex, &ctx, "someone", &mut rng);
        let source = SlotSource::TargetName("celebs".to_string());
        let a = resolver.resolve("t1", &source, &mut rng).unwrap();
        let b = resolver.resolve("t2", &source, &mut rng).unwrap();
        let c = resolver.resolve("t3", &source, &mut rng).unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn missing_lexicon_is_resolution_error() {
        let lex = lexicon();
        let ctx = SelectionContext::new(2);
        let mut rng = StdRng::seed_from_u64(1);
        let mut resolver = SlotResolver::new(&lex, &ctx, "someone", &mut rng);
        let err = resolver
            .resolve("target_name", &SlotSource::Lexicon("target_name".to_string()), &mut rng)
            .unwrap_err();
        assert!(matches!(err, FillError::SlotResolution { ref slot, .. } if slot == "target_name"));
    }

    #[test]
    fn inbound_used_verbatim_and_required() {
        let lex = lexicon();
        let ctx = SelectionContext::new(2).with_inbound(&["  ", "I once ate a candle"]);
        let mut rng = StdRng::seed_from_u64(5);
        let mut resolver = SlotResolver::new(&lex, &ctx, "someone", &mut rng);
        assert_eq!(
            resolver.resolve("confession", &SlotSource::Inbound, &mut rng).unwrap(),
            "I once ate a candle"
        );

        let empty = SelectionContext::new(2);
        let mut resolver = SlotResolver::new(&lex, &empty, "someone", &mut rng);
        assert!(resolver.resolve("confession", &SlotSource::Inbound, &mut rng).is_err());
    }

    #[test]
    fn distinct_draw_avoids_exclusions() {
        let lex = lexicon();
        let ctx = SelectionContext::new(2);
        let source = SlotSource::Lexicon("food".to_string());
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut resolver = SlotResolver::new(&lex, &ctx, "someone", &mut rng);
            let excluded = vec!["TACO".to_string(), "ramen".to_string()];
            let value = resolver
                .resolve_distinct("f", &source, &excluded, 0, &mut rng)
                .unwrap();
            assert_eq!(value, "pie");
        }
    }

    #[test]
    fn distinct_draw_exhausts_case_insensitively() {
        let lex = lexicon();
        let ctx = SelectionContext::new(2);
        let mut rng = StdRng::seed_from_u64(2);
        let mut resolver = SlotResolver::new(&lex, &ctx, "someone", &mut rng);
        let err = resolver
            .resolve_distinct(
                "w2",
                &SlotSource::Lexicon("same".to_string()),
                &["x".to_string()],
                8,
                &mut rng,
            )
            .unwrap_err();
        assert!(matches!(err, FillError::UniquenessExhausted { .. }));
    }
}
