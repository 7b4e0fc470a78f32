//! # Conflict-Aware RAG CLI (`crag`)
//!
//! Builds an in-memory vector index over the policy files in the data
//! folder and answers questions about them with an external LLM.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crag ask [QUESTION]` | Answer a question, citing the source file |
//! | `crag retrieve QUESTION` | Show the passages retrieval would pick |
//! | `crag prompt QUESTION` | Print the rendered prompt |
//! | `crag sources` | List the files that would be indexed |
//!
//! ## Examples
//!
//! ```bash
//! crag ask
//! crag ask "Can I expense a standing desk?" -k 5
//! crag --data-dir ./policies sources
//! crag --config ./config/crag.toml retrieve "remote work"
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conflict_rag::commands::{self, AskOutcome};
use conflict_rag::config::{self, Config};
use conflict_rag::progress::ProgressMode;

const DEFAULT_CONFIG_PATH: &str = "./config/crag.toml";

/// Conflict-aware RAG over a folder of HR policy files.
///
/// API keys are read from the environment (`GOOGLE_API_KEY` by default);
/// a `.env` file in the working directory is loaded first.
#[derive(Parser)]
#[command(
    name = "crag",
    about = "Conflict-aware retrieval-augmented answers over HR policy files",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/crag.toml`. When the default file does not
    /// exist the built-in defaults are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override `data.dir` from the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Indexing progress on stderr. Defaults to `human` on a TTY, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question from the policy files.
    ///
    /// Loads and indexes the data folder, retrieves the most relevant
    /// passages, and asks the configured LLM to resolve any conflicts
    /// between them.
    Ask {
        /// The question. Defaults to `query.default_question`.
        question: Option<String>,

        /// Number of passages to retrieve.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the answer and its sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show ranked sources for a question without calling the LLM.
    Retrieve {
        question: String,

        /// Number of passages to retrieve.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Print the rendered prompt without calling the LLM.
    Prompt {
        question: String,

        /// Number of passages to retrieve.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// List the documents that would be indexed.
    Sources,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => config::resolve_config(path, true)?,
        None => config::resolve_config(&PathBuf::from(DEFAULT_CONFIG_PATH), false)?,
    };
    if let Some(dir) = &cli.data_dir {
        cfg.data.dir = dir.clone();
    }

    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Ask {
            question,
            top_k,
            json,
        } => {
            apply_top_k(&mut cfg, top_k)?;
            let question = question.unwrap_or_else(|| cfg.query.default_question.clone());
            match commands::run_ask(&cfg, &question, json, progress.as_ref()).await? {
                AskOutcome::Answered(_) => {}
                AskOutcome::Failed => return Ok(ExitCode::FAILURE),
            }
        }
        Commands::Retrieve { question, top_k } => {
            apply_top_k(&mut cfg, top_k)?;
            commands::run_retrieve(&cfg, &question, progress.as_ref()).await?;
        }
        Commands::Prompt { question, top_k } => {
            apply_top_k(&mut cfg, top_k)?;
            commands::run_prompt(&cfg, &question, progress.as_ref()).await?;
        }
        Commands::Sources => {
            commands::run_sources(&cfg)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn apply_top_k(cfg: &mut Config, top_k: Option<usize>) -> Result<()> {
    if let Some(k) = top_k {
        cfg.retrieval.top_k = k;
        config::validate(cfg)?;
    }
    Ok(())
}
