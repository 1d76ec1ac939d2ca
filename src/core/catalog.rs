//! Template catalogue: loading, validation and merging of template sets.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use thiserror::Error;

use crate::core::filler::slot_specs;
use crate::schema::template::{OptionProvider, SlotSource, Template, TemplateId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("duplicate template id '{0}'")]
    DuplicateId(TemplateId),
    #[error("template '{template}' declares slot '{slot}' twice")]
    DuplicateSlot { template: TemplateId, slot: String },
    #[error("template '{template}' uses placeholder '{slot}' with no slot spec")]
    UndeclaredPlaceholder { template: TemplateId, slot: String },
    #[error("template '{template}': slot '{slot}' is distinct from unknown slot '{other}'")]
    UnknownDistinctFrom {
        template: TemplateId,
        slot: String,
        other: String,
    },
    #[error("template '{template}' has spice {spice}, expected 1 to 4")]
    SpiceOutOfRange { template: TemplateId, spice: u8 },
    #[error("template '{template}' has weight {weight}, expected a positive number")]
    InvalidWeight { template: TemplateId, weight: f64 },
}

/// An ordered, validated set of templates. Order is significant: the
/// selector breaks ties by catalogue position.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
    index: FxHashMap<TemplateId, usize>,
}

impl TemplateCatalog {
    /// Load a catalogue from a RON file holding a list of `Template(...)`.
    pub fn load_from_ron(path: &Path) -> Result<TemplateCatalog, CatalogError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a catalogue from a RON string.
    pub fn parse_ron(input: &str) -> Result<TemplateCatalog, CatalogError> {
        let templates: Vec<Template> = ron::from_str(input)?;
        Self::from_templates(templates)
    }

    pub fn from_templates(templates: Vec<Template>) -> Result<TemplateCatalog, CatalogError> {
        let mut index = FxHashMap::default();
        for (i, template) in templates.iter().enumerate() {
            validate_template(template)?;
            if index.insert(template.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(template.id.clone()));
            }
        }
        Ok(TemplateCatalog { templates, index })
    }

    /// Merge another catalogue into this one. Templates from `other`
    /// replace templates in `self` with the same id, in place; new ids are
    /// appended.
    pub fn merge(&mut self, other: TemplateCatalog) {
        for template in other.templates {
            match self.index.get(&template.id) {
                Some(&i) => self.templates[i] = template,
                None => {
                    self.index.insert(template.id.clone(), self.templates.len());
                    self.templates.push(template);
                }
            }
        }
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, id: &TemplateId) -> Option<&Template> {
        self.index.get(id).map(|&i| &self.templates[i])
    }

    /// Distinct game ids, in first-seen order.
    pub fn games(&self) -> Vec<&str> {
        let mut seen = FxHashSet::default();
        self.templates
            .iter()
            .map(|t| t.game_id.as_str())
            .filter(|g| seen.insert(*g))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Word-list keys a template draws from, including option sources.
pub fn lexicon_keys(template: &Template) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for spec in slot_specs(template).iter() {
        if let SlotSource::Lexicon(key) | SlotSource::TargetName(key) = &spec.source {
            keys.push(key.clone());
        }
    }
    match &template.options {
        OptionProvider::ContrastingPair(key) => keys.push(key.clone()),
        OptionProvider::TabooWord { source, .. } => keys.push(source.clone()),
        OptionProvider::None | OptionProvider::FixedPair(..) | OptionProvider::Roster => {}
    }
    let mut seen = FxHashSet::default();
    keys.retain(|k| seen.insert(k.clone()));
    keys
}

fn validate_template(template: &Template) -> Result<(), CatalogError> {
    let id = &template.id;
    if !(1..=4).contains(&template.spice) {
        return Err(CatalogError::SpiceOutOfRange {
            template: id.clone(),
            spice: template.spice,
        });
    }
    if !(template.weight.is_finite() && template.weight > 0.0) {
        return Err(CatalogError::InvalidWeight {
            template: id.clone(),
            weight: template.weight,
        });
    }
    if !template.uses_structured_slots() {
        return Ok(());
    }

    let mut names = FxHashSet::default();
    for spec in &template.slots {
        if !names.insert(spec.name.as_str()) {
            return Err(CatalogError::DuplicateSlot {
                template: id.clone(),
                slot: spec.name.clone(),
            });
        }
    }
    for spec in &template.slots {
        if let Some(other) = spec.distinct_from.iter().find(|o| !names.contains(o.as_str())) {
            return Err(CatalogError::UnknownDistinctFrom {
                template: id.clone(),
                slot: spec.name.clone(),
                other: other.clone(),
            });
        }
    }

    let reserved = template.options.placeholders();
    for slot in template.blueprint.slot_names() {
        if !names.contains(slot) && !reserved.contains(&slot) {
            return Err(CatalogError::UndeclaredPlaceholder {
                template: id.clone(),
                slot: slot.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blueprint::Blueprint;
    use crate::schema::template::{InteractionKind, SlotSpec, Transform};

    const CATALOG: &str = r#"[
        Template(
            id: "most-likely",
            game_id: "party",
            family: "most-likely",
            spice: 1,
            tags: ["social"],
            blueprint: "Who is most likely to {activity}?",
            slots: [
                (name: "activity", source: Lexicon("activity")),
            ],
        ),
        Template(
            id: "this-or-that",
            game_id: "party",
            family: "choice",
            spice: 2,
            blueprint: "{option_a} or {option_b}?",
            options: ContrastingPair("food"),
            interaction: BinaryChoice,
        ),
        Template(
            id: "taboo",
            game_id: "guess",
            family: "taboo",
            spice: 1,
            blueprint: "Describe {target_word} to your team",
            options: TabooWord(source: "taboo", forbidden: 3),
            interaction: WordGuess(forbidden: 3),
        ),
    ]"#;

    #[test]
    fn parse_catalog_from_ron() {
        let catalog = TemplateCatalog::parse_ron(CATALOG).unwrap();
        assert_eq!(catalog.len(), 3);
        let t = catalog.get(&TemplateId::new("this-or-that")).unwrap();
        assert_eq!(t.options, OptionProvider::ContrastingPair("food".to_string()));
        assert_eq!(t.interaction, InteractionKind::BinaryChoice);
        assert_eq!(t.weight, 1.0);
        assert_eq!(catalog.games(), vec!["party", "guess"]);
    }

    #[test]
    fn bad_blueprint_is_a_ron_error() {
        let input = r#"[Template(id: "x", game_id: "g", family: "f", spice: 1, blueprint: "{open")]"#;
        assert!(matches!(
            TemplateCatalog::parse_ron(input),
            Err(CatalogError::Ron(_))
        ));

        let braces = r#"[Template(id: "x", game_id: "g", family: "f", spice: 1, blueprint: "Draw {{a}} box")]"#;
        assert!(matches!(
            TemplateCatalog::parse_ron(braces),
            Err(CatalogError::Ron(_))
        ));
    }

    fn base(id: &str) -> Template {
        Template::new(id, "party", "fam", Blueprint::parse("Who would {verb}?").unwrap())
    }

    #[test]
    fn validation_errors() {
        let dup = TemplateCatalog::from_templates(vec![base("a"), base("a")]);
        assert!(matches!(dup, Err(CatalogError::DuplicateId(_))));

        let spicy = TemplateCatalog::from_templates(vec![base("a").with_spice(5)]);
        assert!(matches!(spicy, Err(CatalogError::SpiceOutOfRange { spice: 5, .. })));

        let mut heavy = base("a");
        heavy.weight = 0.0;
        assert!(matches!(
            TemplateCatalog::from_templates(vec![heavy]),
            Err(CatalogError::InvalidWeight { .. })
        ));

        let undeclared = base("a").with_slots(vec![SlotSpec::new("noun", SlotSource::Lexicon("noun".into()))]);
        assert!(matches!(
            TemplateCatalog::from_templates(vec![undeclared]),
            Err(CatalogError::UndeclaredPlaceholder { .. })
        ));

        let twice = base("a").with_slots(vec![
            SlotSpec::new("verb", SlotSource::Lexicon("verb".into())),
            SlotSpec::new("verb", SlotSource::Lexicon("verb".into())),
        ]);
        assert!(matches!(
            TemplateCatalog::from_templates(vec![twice]),
            Err(CatalogError::DuplicateSlot { .. })
        ));

        let dangling = base("a").with_slots(vec![
            SlotSpec::new("verb", SlotSource::Lexicon("verb".into())).distinct_from(&["noun"]),
        ]);
        assert!(matches!(
            TemplateCatalog::from_templates(vec![dangling]),
            Err(CatalogError::UnknownDistinctFrom { .. })
        ));
    }

    #[test]
    fn merge_replaces_in_place() {
        let mut catalog = TemplateCatalog::from_templates(vec![base("a"), base("b")]).unwrap();
        let other =
            TemplateCatalog::from_templates(vec![base("a").with_spice(2), base("c")]).unwrap();
        catalog.merge(other);

        let ids: Vec<&str> = catalog.templates().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(catalog.get(&TemplateId::new("a")).unwrap().spice, 2);
    }

    #[test]
    fn lexicon_keys_cover_inline_and_options() {
        let inline = Template::new(
            "inline",
            "party",
            "fam",
            Blueprint::parse("{player} and {noun1|unique} or {noun2|unique}, {option_a} vs {option_b}")
                .unwrap(),
        )
        .with_options(OptionProvider::ContrastingPair("food".into()), InteractionKind::BinaryChoice);
        assert_eq!(lexicon_keys(&inline), vec!["noun".to_string(), "food".to_string()]);

        let structured = base("s").with_slots(vec![SlotSpec::new(
            "verb",
            SlotSource::TargetName("names".into()),
        )
        .with_transforms(&[Transform::Upper])]);
        assert_eq!(lexicon_keys(&structured), vec!["names".to_string()]);
    }

    #[test]
    fn load_bundled_catalog() {
        let catalog =
            TemplateCatalog::load_from_ron(Path::new("deck_data/party/templates.ron")).unwrap();
        assert!(catalog.len() >= 10);
    }
}
