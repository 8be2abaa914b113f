//! ShieldGate CLI
//!
//! CLI tool for building rule stores from filter lists and checking requests
//! against them.

mod config;

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

use sg_compiler::{build_rule_store, BuildError, BuildOptions, BuildStats};
use sg_core::engine::Engine;
use sg_core::psl::install_suffix_list_from_str;
use sg_core::store::RuleStore;
use sg_core::types::{Decision, Request, ResourceKind};

use crate::config::{Config, StoreConfig};

#[derive(Parser)]
#[command(name = "sg-cli")]
#[command(about = "ShieldGate filter list tools")]
struct Cli {
    /// JSON config file with stores, tags and parse mode
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ListArgs {
    /// Filter list files, one engine slot each
    #[arg(short, long)]
    list: Vec<String>,

    /// Fail on the first unparseable line
    #[arg(long)]
    strict: bool,

    /// Public suffix list file
    #[arg(long)]
    psl: Option<String>,

    /// Enable a rule tag
    #[arg(short, long)]
    tag: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a single request
    Check {
        #[command(flatten)]
        lists: ListArgs,

        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Initiating page host
        #[arg(short, long)]
        source: String,

        /// Resource type (script, image, xmlhttprequest, ...)
        #[arg(long = "type", default_value = "other")]
        kind: String,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decide requests from a JSON-lines file
    Batch {
        #[command(flatten)]
        lists: ListArgs,

        /// File with one {"url", "source", "type"} object per line
        #[arg(short, long)]
        input: String,
    },

    /// Build stores and print statistics
    Stats {
        #[command(flatten)]
        lists: ListArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let result = match cli.command {
        Commands::Check {
            lists,
            url,
            source,
            kind,
            json,
        } => cmd_check(cli.config.as_deref(), &lists, &url, &source, &kind, json),
        Commands::Batch { lists, input } => cmd_batch(cli.config.as_deref(), &lists, &input),
        Commands::Stats { lists } => cmd_stats(cli.config.as_deref(), &lists),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_check(
    config_path: Option<&str>,
    lists: &ListArgs,
    url: &str,
    source: &str,
    kind: &str,
    json: bool,
) -> Result<(), String> {
    let config = load_config(config_path, lists)?;
    let (engine, _) = build_engine(&config)?;

    let kind = ResourceKind::from_str(kind);
    let decision = engine.decide(&Request::new(url, source, kind));

    if json {
        let line = serde_json::to_string(&decision).map_err(|e| format!("Failed to encode decision: {}", e))?;
        println!("{line}");
    } else {
        print_decision(url, &decision);
    }

    Ok(())
}

#[derive(Deserialize)]
struct BatchRequest {
    url: String,
    source: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Serialize)]
struct BatchResult<'a> {
    url: &'a str,
    #[serde(flatten)]
    decision: Decision,
}

fn cmd_batch(config_path: Option<&str>, lists: &ListArgs, input: &str) -> Result<(), String> {
    let config = load_config(config_path, lists)?;
    let (engine, _) = build_engine(&config)?;

    let file = fs::File::open(input).map_err(|e| format!("Failed to open '{}': {}", input, e))?;
    let reader = BufReader::new(file);

    let start = Instant::now();
    let mut total = 0usize;
    let mut blocked = 0usize;
    let mut excepted = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Failed to read '{}': {}", input, e))?;
        if line.trim().is_empty() {
            continue;
        }

        let request: BatchRequest = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: invalid request: {}", input, index + 1, e))?;
        let kind = request
            .kind
            .as_deref()
            .map_or(ResourceKind::SubResource, ResourceKind::from_str);

        let decision = engine.decide(&Request::new(&request.url, &request.source, kind));
        total += 1;
        if decision.is_blocked() {
            blocked += 1;
        } else if decision.matched_exception {
            excepted += 1;
        }

        let result = BatchResult {
            url: &request.url,
            decision,
        };
        let encoded = serde_json::to_string(&result).map_err(|e| format!("Failed to encode decision: {}", e))?;
        println!("{encoded}");
    }

    let elapsed = start.elapsed();
    eprintln!(
        "Decided {} requests in {:.1}ms: {} blocked, {} allowed by exception, {} allowed",
        total,
        elapsed.as_secs_f64() * 1000.0,
        blocked,
        excepted,
        total - blocked - excepted,
    );

    Ok(())
}

fn cmd_stats(config_path: Option<&str>, lists: &ListArgs) -> Result<(), String> {
    let config = load_config(config_path, lists)?;
    let start = Instant::now();
    let (engine, built) = build_engine(&config)?;
    let total_time = start.elapsed();

    for (slot, (name, stats)) in built.iter().enumerate() {
        println!("[{}] {}", slot, name);
        println!("  Lines:       {}", stats.lines);
        println!("  Rules:       {}", stats.rules);
        println!("  Comments:    {}", stats.comments);
        println!("  Cosmetic:    {} (ignored)", stats.cosmetic);
        println!("  Invalid:     {}", stats.invalid);
        println!("  Duplicates:  {}", stats.deduped);
        println!("  Badfiltered: {}", stats.badfiltered);

        if let Some(store) = engine.rule_store(slot) {
            let index = store.stats();
            println!(
                "  Block index: {} rules ({} hosts, {} tokens, {} fallback)",
                index.block.rules, index.block.host_keys, index.block.token_keys, index.block.fallback_rules
            );
            println!(
                "  Exceptions:  {} rules ({} hosts, {} tokens, {} fallback)",
                index.exception.rules,
                index.exception.host_keys,
                index.exception.token_keys,
                index.exception.fallback_rules
            );
        }
    }

    println!();
    println!("Slots:  {}", engine.slot_count());
    println!("Rules:  {}", engine.rule_count());
    println!("Time:   {:.1}ms", total_time.as_secs_f64() * 1000.0);

    Ok(())
}

// =============================================================================
// Engine Setup
// =============================================================================

fn load_config(config_path: Option<&str>, lists: &ListArgs) -> Result<Config, String> {
    let mut config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.merge_flags(&lists.list, &lists.tag, lists.strict, lists.psl.as_deref());

    if config.stores.is_empty() {
        return Err("No filter lists specified (use --list or a config file)".to_string());
    }
    Ok(config)
}

fn build_engine(config: &Config) -> Result<(Engine, Vec<(String, BuildStats)>), String> {
    if let Some(psl) = &config.psl {
        let text = fs::read_to_string(psl).map_err(|e| format!("Failed to read '{}': {}", psl.display(), e))?;
        install_suffix_list_from_str(&text).map_err(|e| format!("Invalid suffix list '{}': {}", psl.display(), e))?;
    }

    let options = BuildOptions {
        mode: config.mode.into(),
    };

    let engine = Engine::with_slots(config.stores.len());
    let mut built = Vec::with_capacity(config.stores.len());

    for (slot, store_config) in config.stores.iter().enumerate() {
        let (store, stats) = build_store(store_config, &options)?;
        log::debug!("slot {} '{}': {} rules", slot, store_config.name, store.len());
        engine.replace_rule_store(slot, store);
        built.push((store_config.name.clone(), stats));
    }

    for tag in &config.tags {
        engine.set_tag(tag, true);
    }

    Ok((engine, built))
}

/// Build one store from the concatenation of its list files.
fn build_store(store: &StoreConfig, options: &BuildOptions) -> Result<(RuleStore, BuildStats), String> {
    let mut contents = Vec::with_capacity(store.lists.len());
    for path in &store.lists {
        let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
        contents.push(text);
    }

    let lines = contents.iter().flat_map(|text| text.lines());
    build_rule_store(lines, options).map_err(|e| match e {
        BuildError::Parse { line_number, reason } => {
            let (path, line) = locate_line(&store.lists, &contents, line_number);
            format!("{}:{}: {}", path.display(), line, reason)
        }
        BuildError::EmptyRuleSet => format!("Store '{}': {}", store.name, e),
    })
}

/// Map a line number across concatenated files back to one file.
fn locate_line<'a>(paths: &'a [PathBuf], contents: &[String], mut line_number: usize) -> (&'a Path, usize) {
    for (path, text) in paths.iter().zip(contents) {
        let count = text.lines().count();
        if line_number <= count {
            return (path.as_path(), line_number);
        }
        line_number -= count;
    }
    let last = paths.last().map_or(Path::new(""), PathBuf::as_path);
    (last, line_number)
}

fn print_decision(url: &str, decision: &Decision) {
    let verdict = if decision.is_blocked() {
        if decision.explicit_cancel {
            "BLOCK (explicit cancel)"
        } else {
            "BLOCK"
        }
    } else if decision.matched_exception {
        "ALLOW (exception)"
    } else {
        "ALLOW"
    };
    println!("{verdict}  {url}");
}
