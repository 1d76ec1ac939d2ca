use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::blueprint::Blueprint;

/// Newtype wrapper for template IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TemplateId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TemplateId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A text transform applied to a resolved slot value, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transform {
    /// Uppercase the whole value.
    Upper,
    /// Lowercase the whole value.
    Lower,
    /// Capitalize the first letter of every word.
    Title,
    /// Prefix the value with "a" or "an".
    Article,
    /// The value must differ from every other `Unique` slot in the same fill.
    Unique,
}

impl Transform {
    /// Parse the inline spelling used inside blueprint placeholders.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "upper" | "caps" => Some(Self::Upper),
            "lower" => Some(Self::Lower),
            "title" => Some(Self::Title),
            "a" | "an" | "article" => Some(Self::Article),
            "unique" => Some(Self::Unique),
            _ => None,
        }
    }

    /// Apply this transform to a value. `Unique` is a constraint, not a
    /// rewrite, and returns the value unchanged.
    pub fn apply(&self, value: &str) -> String {
        match self {
            Self::Upper => value.to_uppercase(),
            Self::Lower => value.to_lowercase(),
            Self::Title => title_case(value),
            Self::Article => with_article(value),
            Self::Unique => value.to_string(),
        }
    }
}

fn title_case(value: &str) -> String {
    value
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Insert "a"/"an" before the value based on its leading letter.
fn with_article(value: &str) -> String {
    let leading = value.chars().find(|c| c.is_alphanumeric());
    let article = match leading {
        Some(c) if matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    };
    format!("{} {}", article, value)
}

/// Where a slot's value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotSource {
    /// A random entry from the named word list.
    Lexicon(String),
    /// The next player in the active roster.
    Player,
    /// The next entry of a rotating name pool backed by the named word list.
    TargetName(String),
    /// A runtime-supplied inbound string, used verbatim.
    Inbound,
}

impl fmt::Display for SlotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexicon(key) => write!(f, "lexicon:{}", key),
            Self::Player => f.write_str("player"),
            Self::TargetName(key) => write!(f, "target:{}", key),
            Self::Inbound => f.write_str("inbound"),
        }
    }
}

/// Declaration of one named slot in a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: String,
    pub source: SlotSource,
    #[serde(default)]
    pub transforms: Vec<Transform>,
    /// Other slot names whose value this slot must not equal.
    #[serde(default)]
    pub distinct_from: Vec<String>,
    /// Semantic category used by the coherence check (e.g. "food", "place").
    #[serde(default)]
    pub slot_type: Option<String>,
}

impl SlotSpec {
    pub fn new(name: impl Into<String>, source: SlotSource) -> Self {
        Self {
            name: name.into(),
            source,
            transforms: Vec::new(),
            distinct_from: Vec::new(),
            slot_type: None,
        }
    }

    pub fn with_transforms(mut self, transforms: &[Transform]) -> Self {
        self.transforms = transforms.to_vec();
        self
    }

    pub fn distinct_from(mut self, names: &[&str]) -> Self {
        self.distinct_from = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn typed(mut self, slot_type: impl Into<String>) -> Self {
        self.slot_type = Some(slot_type.into());
        self
    }

    pub fn is_unique(&self) -> bool {
        self.transforms.contains(&Transform::Unique)
    }
}

/// How game-specific choices are derived for a card.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum OptionProvider {
    #[default]
    None,
    /// Two distinct entries drawn from the named word list.
    ContrastingPair(String),
    /// Two fixed, authored choices.
    FixedPair(String, String),
    /// A target word and its forbidden words. Entries of the named list
    /// are written `target|forbidden|forbidden|...`.
    TabooWord { source: String, forbidden: usize },
    /// Every player on the roster is an option.
    Roster,
}

impl OptionProvider {
    /// Blueprint placeholders filled from the derived options rather than
    /// from slot specs.
    pub fn placeholders(&self) -> &'static [&'static str] {
        match self {
            Self::ContrastingPair(_) | Self::FixedPair(..) => &["option_a", "option_b"],
            Self::TabooWord { .. } => &["target_word"],
            Self::None | Self::Roster => &[],
        }
    }
}

/// The interaction a card is played with. Determines the option shape the
/// quality gate expects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InteractionKind {
    /// Read aloud; no options.
    #[default]
    Statement,
    /// Pick one of two options.
    BinaryChoice,
    /// Guess a word without saying any of `forbidden` words.
    WordGuess { forbidden: usize },
    /// Vote for a player.
    PlayerVote,
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Statement => f.write_str("statement"),
            Self::BinaryChoice => f.write_str("binary choice"),
            Self::WordGuess { forbidden } => write!(f, "word guess ({} forbidden)", forbidden),
            Self::PlayerVote => f.write_str("player vote"),
        }
    }
}

/// Declarative per-template constraints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateConstraints {
    /// Every slot value must differ from every other.
    #[serde(default)]
    pub distinct_slots: bool,
    /// The template is not eligible again until this many minutes after it was shown.
    #[serde(default)]
    pub no_repeat_minutes: Option<u32>,
    /// The template may exceed the session's spice ceiling, up to the absolute cap.
    #[serde(default)]
    pub allow_spice_override: bool,
}

fn default_weight() -> f64 {
    1.0
}

/// An immutable content template: a blueprint with slot declarations and
/// selection metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub game_id: String,
    pub family: String,
    /// Content intensity, 1 (mild) to 4 (explicit).
    pub spice: u8,
    #[serde(default)]
    pub locality: u8,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub min_players: Option<u32>,
    #[serde(default)]
    pub max_words: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub blueprint: Blueprint,
    /// Structured slot declarations. Empty means the blueprint's inline
    /// placeholder syntax is used instead.
    #[serde(default)]
    pub slots: Vec<SlotSpec>,
    #[serde(default)]
    pub options: OptionProvider,
    #[serde(default)]
    pub interaction: InteractionKind,
    #[serde(default)]
    pub constraints: TemplateConstraints,
}

impl Template {
    pub fn new(
        id: impl Into<TemplateId>,
        game_id: impl Into<String>,
        family: impl Into<String>,
        blueprint: Blueprint,
    ) -> Self {
        Self {
            id: id.into(),
            game_id: game_id.into(),
            family: family.into(),
            spice: 1,
            locality: 0,
            weight: default_weight(),
            min_players: None,
            max_words: None,
            tags: Vec::new(),
            blueprint,
            slots: Vec::new(),
            options: OptionProvider::None,
            interaction: InteractionKind::Statement,
            constraints: TemplateConstraints::default(),
        }
    }

    pub fn with_spice(mut self, spice: u8) -> Self {
        self.spice = spice;
        self
    }

    pub fn with_slots(mut self, slots: Vec<SlotSpec>) -> Self {
        self.slots = slots;
        self
    }

    pub fn with_min_players(mut self, min_players: u32) -> Self {
        self.min_players = Some(min_players);
        self
    }

    pub fn with_max_words(mut self, max_words: u32) -> Self {
        self.max_words = Some(max_words);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_options(mut self, options: OptionProvider, interaction: InteractionKind) -> Self {
        self.options = options;
        self.interaction = interaction;
        self
    }

    pub fn with_constraints(mut self, constraints: TemplateConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn slot(&self, name: &str) -> Option<&SlotSpec> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn uses_structured_slots(&self) -> bool {
        !self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_follows_leading_letter() {
        assert_eq!(Transform::Article.apply("apple"), "an apple");
        assert_eq!(Transform::Article.apply("Umbrella"), "an Umbrella");
        assert_eq!(Transform::Article.apply("pear"), "a pear");
        assert_eq!(Transform::Article.apply("\"odd\" idea"), "an \"odd\" idea");
    }

    #[test]
    fn case_transforms() {
        assert_eq!(Transform::Upper.apply("hot dog"), "HOT DOG");
        assert_eq!(Transform::Lower.apply("Hot Dog"), "hot dog");
        assert_eq!(Transform::Title.apply("hot dog stand"), "Hot Dog Stand");
        assert_eq!(Transform::Unique.apply("as is"), "as is");
    }

    #[test]
    fn parse_inline_transform_names() {
        assert_eq!(Transform::parse("a"), Some(Transform::Article));
        assert_eq!(Transform::parse("AN"), Some(Transform::Article));
        assert_eq!(Transform::parse("caps"), Some(Transform::Upper));
        assert_eq!(Transform::parse("unique"), Some(Transform::Unique));
        assert_eq!(Transform::parse("sideways"), None);
    }

    #[test]
    fn template_ron_defaults() {
        let src = r#"Template(
            id: "wyr_food",
            game_id: "would_you_rather",
            family: "wyr",
            spice: 2,
            blueprint: "Would you rather eat {food}?",
            slots: [(name: "food", source: Lexicon("food"))],
        )"#;
        let t: Template = ron::from_str(src).unwrap();
        assert_eq!(t.id, TemplateId::new("wyr_food"));
        assert_eq!(t.weight, 1.0);
        assert_eq!(t.interaction, InteractionKind::Statement);
        assert_eq!(t.options, OptionProvider::None);
        assert!(t.slots[0].transforms.is_empty());
        assert!(t.uses_structured_slots());
    }

    #[test]
    fn spec_builders() {
        let s = SlotSpec::new("w1", SlotSource::Lexicon("L".to_string()))
            .with_transforms(&[Transform::Unique])
            .distinct_from(&["w2"])
            .typed("food");
        assert!(s.is_unique());
        assert_eq!(s.distinct_from, vec!["w2".to_string()]);
        assert_eq!(s.slot_type.as_deref(), Some("food"));
    }
}
