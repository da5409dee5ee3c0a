mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gradebox_common::catalog::Catalog;
use gradebox_common::types::{EntryPoint, Language};
use gradebox_engine::{Backend, Engine, EngineConfig, LanguageConfigManager};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gradebox-cli")]
#[command(about = "gradebox CLI - Browse challenges and grade submissions locally", long_about = None)]
struct Cli {
    /// Challenge catalog file (defaults to the built-in catalog)
    #[arg(long, global = true, env = "GRADEBOX_CATALOG")]
    catalog: Option<PathBuf>,

    /// Execution backend: process or docker (overrides GRADEBOX_BACKEND)
    #[arg(long, global = true)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog challenges
    List,

    /// Show a challenge's description, starter code and test cases
    Show {
        /// Challenge id (e.g., add-two-numbers)
        id: String,
    },

    /// Grade a source file against a catalog challenge
    Run {
        /// Challenge id (e.g., add-two-numbers)
        id: String,

        /// Source file to submit
        #[arg(short, long)]
        file: PathBuf,

        /// Print the raw ExecutionResult as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run a source file with ad-hoc test cases
    Exec {
        /// Language (javascript, python)
        #[arg(short, long)]
        language: Language,

        /// Source file to run
        #[arg(short, long)]
        file: PathBuf,

        /// Function to call for each case, as NAME/ARITY (e.g., add/2)
        #[arg(short, long)]
        entry: Option<EntryPoint>,

        /// JSON file with an array of test cases
        #[arg(short, long)]
        cases: Option<PathBuf>,

        /// Time budget in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Print the raw ExecutionResult as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List configured language runtimes
    Languages,
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    match path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display())),
        None => Catalog::builtin().context("Failed to load built-in catalog"),
    }
}

fn load_languages() -> Result<(EngineConfig, LanguageConfigManager)> {
    let config = EngineConfig::from_env()?;
    let languages = LanguageConfigManager::load_or_default(&config.languages_path)?;
    Ok((config, languages))
}

fn build_engine(backend: Option<Backend>) -> Result<Engine> {
    let (mut config, languages) = load_languages()?;
    if let Some(backend) = backend {
        config.backend = backend;
    }
    Engine::from_config(&config, languages).context("Failed to start execution backend")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let passed = match cli.command {
        Commands::List => {
            commands::list_challenges(&load_catalog(cli.catalog.as_deref())?);
            true
        }
        Commands::Show { id } => {
            commands::show_challenge(&load_catalog(cli.catalog.as_deref())?, &id)?;
            true
        }
        Commands::Run { id, file, json } => {
            let catalog = load_catalog(cli.catalog.as_deref())?;
            let engine = build_engine(cli.backend)?;
            commands::run_challenge(&engine, &catalog, &id, &file, json).await?
        }
        Commands::Exec {
            language,
            file,
            entry,
            cases,
            timeout_ms,
            json,
        } => {
            let engine = build_engine(cli.backend)?;
            commands::exec(
                &engine,
                language,
                &file,
                entry,
                cases.as_deref(),
                timeout_ms,
                json,
            )
            .await?
        }
        Commands::Languages => {
            let (_, languages) = load_languages()?;
            commands::list_languages(&languages)?;
            true
        }
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
