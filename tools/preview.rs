/// Preview: interactive shell for drawing and rating cards from a deck.
///
/// Usage: preview --catalog <path> --lexicon <path> [--config <path>] [--seed <n>]
///
/// Commands:
///   card                 draw one card for the current table
///   rate <+|0|->         rate the last card
///   players <a,b,c>      set the player roster
///   spice <n>            set the spice ceiling (1-4)
///   game <id|any>        restrict to one game
///   bulk <n>             draw n cards from a fresh session with variety stats
///   stats                show session counters
///   seed <n>             rebuild the engine with a new seed
///   help                 list commands
///   quit                 exit

use deck_engine::core::engine::{DeckEngine, EngineError};
use deck_engine::schema::card::{CardOptions, FilledCard};
use deck_engine::schema::context::SelectionContext;
use deck_engine::schema::feedback::{FeedbackTally, Rating};
use rustc_hash::FxHashMap;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

/// Files the engine is rebuilt from on `seed` and `bulk`.
struct Sources {
    catalogs: Vec<String>,
    lexicons: Vec<String>,
    config: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut sources = Sources {
        catalogs: Vec::new(),
        lexicons: Vec::new(),
        config: None,
    };
    let mut seed: u64 = 42;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--catalog" if i + 1 < args.len() => {
                i += 1;
                sources.catalogs.push(args[i].clone());
            }
            "--lexicon" if i + 1 < args.len() => {
                i += 1;
                sources.lexicons.push(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                sources.config = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if sources.catalogs.is_empty() {
        eprintln!("At least one --catalog is required.");
        std::process::exit(1);
    }

    let mut engine = match build_engine(&sources, seed) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Loaded {} templates across {} games",
        engine.catalog().len(),
        engine.catalog().games().len()
    );
    println!("Seed: {}", seed);
    println!("Type 'help' for commands.\n");

    let mut ctx = SelectionContext::new(2).with_players(&["Ana", "Ben", "Chloe", "Dev"]);
    let mut last_card: Option<FilledCard> = None;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => {
                print_help();
            }
            "card" | "c" => match engine.request_card(&ctx) {
                Ok(card) => {
                    print_card(&card);
                    last_card = Some(card);
                }
                Err(e) => println!("ERROR: {}", e),
            },
            "rate" => {
                let rating = match parts.get(1).and_then(|s| Rating::parse(s)) {
                    Some(r) => r,
                    None => {
                        println!("Usage: rate <+|0|->");
                        continue;
                    }
                };
                let Some(card) = &last_card else {
                    println!("No card drawn yet.");
                    continue;
                };
                let tally: FeedbackTally = std::iter::once(rating).collect();
                match engine.record_feedback(&card.template_id, &tally) {
                    Ok(Some(arm)) => println!(
                        "'{}' now ({:.2}, {:.2}), mean {:.3}",
                        card.template_id,
                        arm.success,
                        arm.failure,
                        arm.mean()
                    ),
                    Ok(None) => println!("Nothing recorded."),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "players" => {
                if parts.len() < 2 {
                    println!("Players: {}", ctx.players.join(", "));
                    continue;
                }
                ctx.players = parts[1..]
                    .join(" ")
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect();
                println!("Players set to: {}", ctx.players.join(", "));
            }
            "spice" => match parts.get(1).and_then(|s| s.parse::<u8>().ok()) {
                Some(n) if (1..=4).contains(&n) => {
                    ctx.spice_ceiling = n;
                    println!("Spice ceiling set to {}", n);
                }
                _ => println!("Usage: spice <1-4> (current: {})", ctx.spice_ceiling),
            },
            "game" => match parts.get(1) {
                Some(&"any") => {
                    ctx.game_id = None;
                    println!("Drawing from all games.");
                }
                Some(id) => {
                    if !engine.catalog().games().contains(id) {
                        println!("Unknown game '{}'. Known: {}", id, engine.catalog().games().join(", "));
                        continue;
                    }
                    ctx.game_id = Some(id.to_string());
                    println!("Game set to '{}'", id);
                }
                None => println!(
                    "Current game: {}",
                    ctx.game_id.as_deref().unwrap_or("any")
                ),
            },
            "stats" => {
                let stats = engine.stats();
                println!("Generated: {}", stats.total_generated);
                println!("Attempts: {}", stats.total_attempts);
                println!("Accept rate: {:.2}", stats.accept_rate);
                let mut visits: Vec<_> = stats.per_template_visits.into_iter().collect();
                visits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                for (id, n) in visits {
                    println!("  {}: {} (mean {:.3})", id, n, engine.posterior_mean(&id));
                }
            }
            "seed" => {
                if parts.len() < 2 {
                    println!("Current seed: {}", engine.seed());
                    continue;
                }
                match parts[1].parse::<u64>() {
                    Ok(s) => match build_engine(&sources, s) {
                        Ok(rebuilt) => {
                            engine = rebuilt;
                            last_card = None;
                            println!("Seed set to {}", s);
                        }
                        Err(e) => println!("ERROR: {}", e),
                    },
                    Err(_) => {
                        println!("Invalid seed: {}", parts[1]);
                    }
                }
            }
            "bulk" => {
                let count: usize = match parts.get(1).map(|s| s.parse()) {
                    Some(Ok(n)) if n > 0 => n,
                    _ => {
                        println!("Usage: bulk <n>");
                        continue;
                    }
                };
                let bulk_engine = match build_engine(&sources, engine.seed()) {
                    Ok(e) => e,
                    Err(e) => {
                        println!("ERROR: {}", e);
                        continue;
                    }
                };
                print_bulk(&bulk_engine, &ctx, count);
            }
            _ => {
                println!("Unknown command: '{}'. Type 'help' for available commands.", cmd);
            }
        }
    }
}

fn print_usage() {
    println!("Preview: interactive shell for drawing and rating cards.");
    println!();
    println!("Usage: preview --catalog <path> --lexicon <path> [--config <path>] [--seed <n>]");
    println!();
    println!("  --catalog <path>   Template catalogue RON file (repeatable, later files win)");
    println!("  --lexicon <path>   Word list RON file (repeatable)");
    println!("  --config <path>    Engine config RON file (optional)");
    println!("  --seed <n>         Initial RNG seed (default: 42)");
}

fn print_help() {
    println!("Commands:");
    println!("  card               Draw one card for the current table");
    println!("  rate <+|0|->       Rate the last card");
    println!("  players <a,b,c>    Set the player roster");
    println!("  spice <n>          Set the spice ceiling (1-4)");
    println!("  game <id|any>      Restrict to one game");
    println!("  bulk <n>           Draw n cards from a fresh session with variety statistics");
    println!("  stats              Show session counters");
    println!("  seed <n>           Rebuild the engine with a new seed");
    println!("  help               Show this help");
    println!("  quit               Exit");
}

fn print_card(card: &FilledCard) {
    println!("\n--- {} ({}, spice {}) ---", card.template_id, card.game_id, card.spice);
    println!("{}", card.text);
    match &card.options {
        CardOptions::None => {}
        CardOptions::Choice { a, b } => println!("  A: {}\n  B: {}", a, b),
        CardOptions::WordGuess { target, forbidden } => {
            println!("  Word: {}", target);
            println!("  Forbidden: {}", forbidden.join(", "));
        }
        CardOptions::Vote { players } => println!("  Vote: {}", players.join(" / ")),
    }
    println!("--- {} words ---\n", card.word_count());
}

fn print_bulk(engine: &DeckEngine, ctx: &SelectionContext, count: usize) {
    let mut cards = Vec::new();
    let mut errors = 0;
    for _ in 0..count {
        match engine.request_card(ctx) {
            Ok(card) => cards.push(card),
            Err(_) => errors += 1,
        }
    }

    println!("\n=== Bulk Generation: {} cards ({} errors) ===\n", cards.len(), errors);

    let mut per_family: FxHashMap<&str, u32> = FxHashMap::default();
    let mut per_template: FxHashMap<&str, u32> = FxHashMap::default();
    for card in &cards {
        *per_family.entry(card.family.as_str()).or_insert(0) += 1;
        *per_template.entry(card.template_id.as_str()).or_insert(0) += 1;
    }
    println!("Distinct templates: {} / {}", per_template.len(), engine.catalog().len());

    let unique_texts: rustc_hash::FxHashSet<&str> = cards.iter().map(|c| c.text.as_str()).collect();
    println!("Unique texts: {} / {}", unique_texts.len(), cards.len());

    let avg_words: f64 = if cards.is_empty() {
        0.0
    } else {
        cards.iter().map(|c| c.word_count() as f64).sum::<f64>() / cards.len() as f64
    };
    println!("Average length: {:.1} words", avg_words);

    let mut families: Vec<(&str, u32)> = per_family.into_iter().collect();
    families.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    println!("\nFamilies:");
    for (family, n) in families {
        println!("  {}: {}", family, n);
    }

    let stats = engine.stats();
    println!("\nAccept rate: {:.2} over {} attempts", stats.accept_rate, stats.total_attempts);

    if let Some(first) = cards.first() {
        println!("\nSample card:");
        println!("  {}", first.text);
    }
    println!();
}

fn build_engine(sources: &Sources, seed: u64) -> Result<DeckEngine, EngineError> {
    let mut builder = DeckEngine::builder().seed(seed);
    for path in &sources.catalogs {
        builder = builder.catalog_path(path);
    }
    for path in &sources.lexicons {
        builder = builder.lexicon_path(path);
    }
    if let Some(path) = &sources.config {
        builder = builder.config_path(path);
    }
    builder.build()
}
