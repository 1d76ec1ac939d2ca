/// Catalog Linter: validates template catalogues against their word lists.
///
/// Usage: catalog_linter <deck_dir | templates.ron> [--lexicon <path>]...
///
/// In a directory, files named `templates.ron` or `*_templates.ron` are
/// catalogues and `lexicon.ron` or `*_lexicon.ron` are word lists.

use deck_engine::core::catalog::{lexicon_keys, TemplateCatalog};
use deck_engine::core::filler::slot_specs;
use deck_engine::core::lexicon::{LexiconProvider, WordLists};
use deck_engine::schema::template::{OptionProvider, SlotSource, Template, Transform};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: catalog_linter <deck_dir | templates.ron> [--lexicon <path>]...");
        process::exit(0);
    }

    let deck_path = Path::new(&args[1]);
    let mut catalog = TemplateCatalog::default();
    let mut lexicon = WordLists::new();

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--lexicon" && i + 1 < args.len() {
            i += 1;
            match WordLists::load_from_ron(Path::new(&args[i])) {
                Ok(lists) => lexicon.merge(lists),
                Err(e) => {
                    eprintln!("ERROR: Failed to load word lists {}: {}", args[i], e);
                    process::exit(1);
                }
            }
        }
        i += 1;
    }

    if deck_path.is_file() {
        match TemplateCatalog::load_from_ron(deck_path) {
            Ok(c) => catalog.merge(c),
            Err(e) => {
                eprintln!("ERROR: Failed to load catalogue: {}", e);
                process::exit(1);
            }
        }
    } else if deck_path.is_dir() {
        load_deck_recursive(deck_path, &mut catalog, &mut lexicon);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", deck_path.display());
        process::exit(1);
    }

    println!(
        "Loaded {} templates and {} word lists",
        catalog.len(),
        lexicon.len()
    );

    let (errors, warnings) = lint_catalog(&catalog, &lexicon);

    println!("\n=== Catalogue Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if !errors.is_empty() {
        process::exit(1);
    }
}

fn load_deck_recursive(dir: &Path, catalog: &mut TemplateCatalog, lexicon: &mut WordLists) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            load_deck_recursive(&path, catalog, lexicon);
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) != Some("ron") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if stem == "templates" || stem.ends_with("_templates") {
            match TemplateCatalog::load_from_ron(&path) {
                Ok(c) => {
                    println!("  Loaded: {}", path.display());
                    catalog.merge(c);
                }
                Err(e) => eprintln!("  ERROR loading {}: {}", path.display(), e),
            }
        } else if stem == "lexicon" || stem.ends_with("_lexicon") {
            match WordLists::load_from_ron(&path) {
                Ok(lists) => {
                    println!("  Loaded: {}", path.display());
                    lexicon.merge(lists);
                }
                Err(e) => eprintln!("  ERROR loading {}: {}", path.display(), e),
            }
        }
    }
}

fn lint_catalog(catalog: &TemplateCatalog, lexicon: &WordLists) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut used_lists: FxHashSet<String> = FxHashSet::default();
    let mut families: FxHashMap<&str, u32> = FxHashMap::default();
    let mut tags: FxHashMap<&str, u32> = FxHashMap::default();

    for template in catalog.templates() {
        *families.entry(template.family.as_str()).or_insert(0) += 1;
        for tag in &template.tags {
            *tags.entry(tag.as_str()).or_insert(0) += 1;
        }

        for key in lexicon_keys(template) {
            if !lexicon.contains_key(&key) {
                errors.push(format!(
                    "Template '{}' draws from missing word list '{}'",
                    template.id, key
                ));
            }
            used_lists.insert(key);
        }

        if let Some(max) = template.max_words {
            let literal = template.blueprint.literal_word_count();
            if literal > max as usize {
                errors.push(format!(
                    "Template '{}' has {} literal words, over its budget of {}",
                    template.id, literal, max
                ));
            }
        }

        lint_options(template, lexicon, &mut errors);
        lint_unique_slots(template, lexicon, &mut warnings);
    }

    let mut single: Vec<&str> = families
        .iter()
        .filter(|(_, n)| **n == 1)
        .map(|(f, _)| *f)
        .collect();
    single.sort();
    for family in single {
        warnings.push(format!(
            "Family '{}' has a single template; the diversity penalty will always hit it",
            family
        ));
    }

    let mut lone_tags: Vec<&str> = tags
        .iter()
        .filter(|(_, n)| **n == 1)
        .map(|(t, _)| *t)
        .collect();
    lone_tags.sort();
    for tag in lone_tags {
        warnings.push(format!("Tag '{}' is used by only one template", tag));
    }

    let mut unused: Vec<&str> = lexicon
        .keys()
        .filter(|k| !used_lists.contains(*k))
        .collect();
    unused.sort();
    for key in unused {
        warnings.push(format!("Word list '{}' is never referenced", key));
    }

    for game in catalog.games() {
        let has_mild = catalog
            .templates()
            .iter()
            .any(|t| t.game_id == game && t.spice == 1);
        if !has_mild {
            warnings.push(format!(
                "Game '{}' has no spice-1 templates; mild sessions get nothing",
                game
            ));
        }
    }

    (errors, warnings)
}

fn lint_options(template: &Template, lexicon: &WordLists, errors: &mut Vec<String>) {
    match &template.options {
        OptionProvider::ContrastingPair(key) => {
            if let Some(words) = lexicon.words_for(key) {
                if words.len() < 2 {
                    errors.push(format!(
                        "Template '{}' needs two entries in '{}' for a pair",
                        template.id, key
                    ));
                }
            }
        }
        OptionProvider::TabooWord { source, forbidden } => {
            let Some(words) = lexicon.words_for(source) else {
                return;
            };
            for entry in words {
                let parts = entry.split('|').filter(|p| !p.trim().is_empty()).count();
                if parts < forbidden + 1 {
                    errors.push(format!(
                        "Template '{}': entry '{}' in '{}' has fewer than {} forbidden words",
                        template.id, entry, source, forbidden
                    ));
                }
            }
        }
        OptionProvider::None | OptionProvider::FixedPair(..) | OptionProvider::Roster => {}
    }
}

/// Unique slots drawing from the same list need at least that many entries.
fn lint_unique_slots(template: &Template, lexicon: &WordLists, warnings: &mut Vec<String>) {
    let mut demand: FxHashMap<String, usize> = FxHashMap::default();
    for spec in slot_specs(template).iter() {
        let (SlotSource::Lexicon(key) | SlotSource::TargetName(key)) = &spec.source else {
            continue;
        };
        let unique = spec.transforms.contains(&Transform::Unique) || !spec.distinct_from.is_empty();
        if unique {
            *demand.entry(key.clone()).or_insert(0) += 1;
        }
    }
    for (key, needed) in demand {
        if let Some(words) = lexicon.words_for(&key) {
            if words.len() < needed {
                warnings.push(format!(
                    "Template '{}' wants {} distinct values from '{}' but it has {}",
                    template.id,
                    needed,
                    key,
                    words.len()
                ));
            }
        }
    }
}
