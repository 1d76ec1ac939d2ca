//! Word lists: the lexicon provider seam and an in-memory implementation.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Resolves a named word list.
///
/// Implementations return `None` for unknown keys. An empty list is
/// treated exactly like a missing one by the engine.
pub trait LexiconProvider: Send + Sync {
    fn words_for(&self, key: &str) -> Option<Vec<String>>;
}

/// Named word lists held in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordLists {
    lists: FxHashMap<String, Vec<String>>,
}

impl WordLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a list, trimming entries and dropping blank ones.
    pub fn insert<I, S>(&mut self, key: impl Into<String>, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cleaned = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        self.lists.insert(key.into(), cleaned);
    }

    pub fn with_list(mut self, key: &str, words: &[&str]) -> Self {
        self.insert(key, words);
        self
    }

    /// Load word lists from a RON map of `key: [words]`.
    pub fn load_from_ron(path: &Path) -> Result<WordLists, LexiconError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<WordLists, LexiconError> {
        let raw: FxHashMap<String, Vec<String>> = ron::from_str(input)?;
        let mut lists = WordLists::new();
        for (key, words) in raw {
            lists.insert(key, words);
        }
        Ok(lists)
    }

    /// Merge another set of lists into this one. Lists from `other` replace
    /// lists with the same key.
    pub fn merge(&mut self, other: WordLists) {
        self.lists.extend(other.lists);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lists.get(key).is_some_and(|l| !l.is_empty())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

impl LexiconProvider for WordLists {
    fn words_for(&self, key: &str) -> Option<Vec<String>> {
        self.lists.get(key).filter(|l| !l.is_empty()).cloned()
    }
}

/// Memoizes provider lookups per key, including misses.
pub struct CachedLexicon {
    inner: Box<dyn LexiconProvider>,
    cache: RwLock<FxHashMap<String, Option<Arc<[String]>>>>,
}

impl CachedLexicon {
    pub fn new(inner: Box<dyn LexiconProvider>) -> Self {
        Self {
            inner,
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// Look up a non-empty word list.
    pub fn lookup(&self, key: &str) -> Option<Arc<[String]>> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = cache.get(key) {
                return hit.clone();
            }
        }

        let fetched: Option<Arc<[String]>> = self
            .inner
            .words_for(key)
            .filter(|words| !words.is_empty())
            .map(Arc::from);

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), fetched.clone());
        fetched
    }

    /// Drop cached lookups, e.g. after the external lexicon was reloaded.
    pub fn clear(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for CachedLexicon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self
            .cache
            .read()
            .map(|c| c.len())
            .unwrap_or_default();
        f.debug_struct("CachedLexicon")
            .field("cached_keys", &cached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    impl LexiconProvider for CountingProvider {
        fn words_for(&self, key: &str) -> Option<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match key {
                "animals" => Some(vec!["otter".to_string(), "heron".to_string()]),
                "empty" => Some(Vec::new()),
                _ => None,
            }
        }
    }

    #[test]
    fn insert_trims_and_drops_blanks() {
        let lists = WordLists::new().with_list("food", &["  taco ", "", "   ", "ramen"]);
        assert_eq!(
            lists.words_for("food"),
            Some(vec!["taco".to_string(), "ramen".to_string()])
        );
    }

    #[test]
    fn empty_list_reads_as_missing() {
        let lists = WordLists::new().with_list("nothing", &["  "]);
        assert_eq!(lists.words_for("nothing"), None);
        assert!(!lists.contains_key("nothing"));
        assert_eq!(lists.words_for("never_defined"), None);
    }

    #[test]
    fn parse_ron_map() {
        let lists = WordLists::parse_ron(r#"{ "colors": ["red", " blue "], "moods": [] }"#).unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(
            lists.words_for("colors"),
            Some(vec!["red".to_string(), "blue".to_string()])
        );
        assert!(lists.words_for("moods").is_none());
    }

    #[test]
    fn merge_replaces_same_key() {
        let mut base = WordLists::new()
            .with_list("food", &["taco"])
            .with_list("place", &["beach"]);
        base.merge(WordLists::new().with_list("food", &["sushi"]));
        assert_eq!(base.words_for("food"), Some(vec!["sushi".to_string()]));
        assert!(base.contains_key("place"));
    }

    #[test]
    fn cache_hits_provider_once_per_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = CachedLexicon::new(Box::new(CountingProvider {
            calls: Arc::clone(&calls),
        }));

        assert_eq!(cached.lookup("animals").map(|w| w.len()), Some(2));
        assert_eq!(cached.lookup("animals").map(|w| w.len()), Some(2));
        assert!(cached.lookup("empty").is_none());
        assert!(cached.lookup("empty").is_none());
        assert!(cached.lookup("unknown").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cached.clear();
        cached.lookup("animals");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
