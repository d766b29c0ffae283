//! CLI entry point: translate content read from JSON files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;

use lingua_cache::translate::MAX_BATCH_SIZE;
use lingua_cache::{Config, Feedback, PuzzleFields, TrainingScenario, TranslationService};

/// Translate puzzle, scenario and feedback content through a cached,
/// rate-limited upstream.
#[derive(Parser, Debug)]
#[command(name = "lingua-cache", version)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate one puzzle (JSON object).
    Puzzle {
        #[arg(long)]
        input: PathBuf,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Translate one training scenario (JSON object).
    Scenario {
        #[arg(long)]
        input: PathBuf,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Translate feedback: a JSON value, or plain text if the file is not JSON.
    Feedback {
        #[arg(long)]
        input: PathBuf,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Translate a JSON array of puzzles, preserving order.
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Drop the cached translation of a puzzle.
    Invalidate {
        #[arg(long)]
        input: PathBuf,
        #[arg(short, long)]
        language: String,
    },
    /// Show cache contents by language.
    Stats,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read input: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse input: {}", path.display()))
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    lingua_cache::init_tracing(cli.json_logs);

    let config = Config::from_env().context("configuration")?;
    let service = TranslationService::from_config(&config).context("startup")?;

    match cli.cmd {
        Command::Puzzle { input, language } => {
            let puzzle: PuzzleFields = read_json(&input)?;
            let result = service.translate_puzzle(&puzzle, language.as_deref()).await;
            print(&result.into_localized())?;
        }
        Command::Scenario { input, language } => {
            let scenario: TrainingScenario = read_json(&input)?;
            let result = service.translate_scenario(&scenario, language.as_deref()).await;
            print(&result.into_localized())?;
        }
        Command::Feedback { input, language } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("read input: {}", input.display()))?;
            let feedback = serde_json::from_str(&text).unwrap_or(Feedback::Text(text));
            let result = service.translate_feedback(&feedback, language.as_deref()).await;
            let fallback = result.is_fallback();
            print(&serde_json::json!({
                "feedback": result.into_fields(),
                "fallback": fallback,
            }))?;
        }
        Command::Batch { input, language } => {
            let puzzles: Vec<PuzzleFields> = read_json(&input)?;
            if puzzles.len() > MAX_BATCH_SIZE {
                bail!("batch of {} exceeds the limit of {MAX_BATCH_SIZE}", puzzles.len());
            }
            let results = service.translate_batch(&puzzles, language.as_deref()).await;
            let localized: Vec<_> = results.into_iter().map(|r| r.into_localized()).collect();
            print(&localized)?;
        }
        Command::Invalidate { input, language } => {
            let puzzle: PuzzleFields = read_json(&input)?;
            let removed = service.invalidate(&puzzle, &language).await;
            print(&serde_json::json!({ "removed": removed }))?;
        }
        Command::Stats => {
            print(&service.cache_stats().await)?;
        }
    }
    Ok(())
}
