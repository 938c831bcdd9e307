//! DandiClaw CLI: the main entry point.
//!
//! Commands:
//! - `chat`     Edit a metadata file with the assistant
//! - `diff`     Summarize the changes between two metadata files
//! - `propose`  Turn two metadata files into a review link
//! - `review`   Check a review link against a file and apply it
//! - `init`     Write a default config file

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "dandiclaw",
    about = "DandiClaw, an AI assistant for DANDI dandiset metadata",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of ~/.dandiclaw/config.toml
    #[arg(long, global = true, env = "DANDICLAW_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit a metadata file interactively
    Chat {
        /// Dandiset metadata JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Dandiset identifier, needed for review links
        #[arg(short, long)]
        dandiset: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show the changes between two metadata files
    Diff {
        original: PathBuf,
        modified: PathBuf,

        /// Print the changes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a review link proposing MODIFIED as an edit of ORIGINAL
    Propose {
        original: PathBuf,
        modified: PathBuf,

        #[arg(short, long)]
        dandiset: String,
    },

    /// Validate a review link against a metadata file and apply it
    Review {
        /// Review link, or the bare proposal token
        link: String,

        /// Metadata file the proposal was made against
        #[arg(short, long)]
        file: PathBuf,

        /// Where to write the result; printed to stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing on stderr; stdout carries command output
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Chat {
            file,
            dandiset,
            message,
        } => {
            let config = commands::load_config(config_path)?;
            commands::chat::run(config, file, dandiset, message).await?
        }
        Commands::Diff {
            original,
            modified,
            json,
        } => commands::diff::run(&original, &modified, json)?,
        Commands::Propose {
            original,
            modified,
            dandiset,
        } => {
            let config = commands::load_config(config_path)?;
            commands::propose::run(&config, &original, &modified, &dandiset)?
        }
        Commands::Review { link, file, output } => {
            commands::review::run(&link, &file, output.as_deref())?
        }
        Commands::Init => commands::init::run(config_path)?,
    }

    Ok(())
}
