mod concepts;
mod config;
mod extract;
mod session;
mod surface;
mod workflows;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use crate::config::{Config, ConfigOverrides};
use crate::extract::GeminiClient;
use crate::surface::InputMode;
use crate::workflows::{OutputOptions, RunContext};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "CLI to collect concepts for a word-guessing game, by hand or extracted from text with Gemini"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Optional path to a configuration TOML file overriding defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the Gemini model used for extraction
    #[arg(long)]
    model: Option<String>,

    /// Override the Gemini API base URL
    #[arg(long = "base-url")]
    base_url: Option<String>,

    /// Optional temperature override for the language model
    #[arg(long)]
    temperature: Option<f32>,

    /// Seconds a success message stays visible in the interactive session
    #[arg(long = "success-delay")]
    success_delay: Option<u64>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Turn a manual list (one concept per line) into a clean concept list
    Split(SourceArgs),
    /// Extract concepts from free-form text with the AI model
    Extract(SourceArgs),
    /// Run an interactive session for building the concept list
    Interactive(InteractiveArgs),
    /// Show the resolved configuration
    Config,
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Optional path to a text file (.txt, .csv, .md, .json); stdin is used when no text is given
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,

    /// Text supplied directly via CLI arguments
    #[arg(name = "TEXT", required = false)]
    text: Vec<String>,
}

#[derive(Debug, Args)]
struct InteractiveArgs {
    /// Input mode to start in
    #[arg(long, value_enum)]
    mode: Option<InputMode>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Write the concept list to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit the concept list as a JSON array
    #[arg(long)]
    json: bool,
}

impl From<OutputArgs> for OutputOptions {
    fn from(args: OutputArgs) -> Self {
        Self {
            path: args.output,
            json: args.json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    init_tracing(cli.verbose)?;

    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!("Failed to load .env file: {}", err),
    }

    let overrides = ConfigOverrides {
        model: cli.model.clone(),
        base_url: cli.base_url.clone(),
        temperature: cli.temperature,
        success_delay_secs: cli.success_delay,
    };

    let config = Config::load(cli.config.clone(), overrides)?;
    let client =
        GeminiClient::new(config.extractor()).context("failed to set up the Gemini client")?;

    let run_ctx = RunContext {
        config: &config,
        extractor: Arc::new(client),
    };

    match cli.command {
        Command::Split(args) => {
            let text = workflows::read_source_text(args.input.as_deref(), &args.text)?;
            workflows::run_split_flow(&text, &OutputOptions::from(args.output))?;
        }
        Command::Extract(args) => {
            let text = workflows::read_source_text(args.input.as_deref(), &args.text)?;
            workflows::run_extract_flow(&text, &OutputOptions::from(args.output), &run_ctx)
                .await?;
        }
        Command::Interactive(args) => {
            let output = OutputOptions::from(args.output);
            workflows::run_interactive_session(args.mode, &output, &run_ctx).await?;
        }
        Command::Config => print_config(&config),
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| anyhow::anyhow!("Failed to set tracing subscriber: {err}"))
}

fn print_config(config: &Config) {
    let path = config
        .config_path()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "(none)".to_string());
    let key = match config.api_key.as_deref() {
        Some(key) => format!("set ({} chars)", key.len()),
        None => "missing".to_string(),
    };

    println!("config file   : {path}");
    println!("model         : {}", config.model);
    println!("base url      : {}", config.base_url);
    println!(
        "temperature   : {}",
        config
            .temperature
            .map(|t| t.to_string())
            .unwrap_or_else(|| "provider default".to_string())
    );
    println!("success delay : {}s", config.success_delay.as_secs());
    println!("api key       : {key}");
}
