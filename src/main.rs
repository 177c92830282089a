//! chat-timeline - conversation timeline engine CLI
//!
//! Runs a scripted session against the in-memory chat service and manages
//! the session configuration file.

mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use chat_timeline::{logging, SessionConfig};

#[derive(Parser)]
#[command(name = "chat-timeline")]
#[command(about = "Message timeline synchronization engine for chat screens", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a scripted conversation against the in-memory service
    Demo {
        /// How long the typing indicator stays up, in milliseconds
        #[arg(long, default_value = "1500")]
        typing_ms: u64,

        /// Print the final timeline as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose);

    match cli.command {
        Commands::Demo { typing_ms, json } => {
            let config = SessionConfig::load().context("Failed to load configuration")?;
            demo::run(config, typing_ms, json).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let path = SessionConfig::config_path()?;
                let config = SessionConfig::load_from(&path)?;
                println!("# {}", path.display());
                print!(
                    "{}",
                    toml::to_string_pretty(&config).context("Failed to serialize config")?
                );
            }
            ConfigAction::Init { force } => {
                let path = SessionConfig::config_path()?;
                if path.exists() && !force {
                    anyhow::bail!(
                        "Config already exists at {} (use --force to overwrite)",
                        path.display()
                    );
                }
                SessionConfig::default().save_to(&path)?;
                tracing::info!("Wrote default config to {}", path.display());
            }
        },
    }

    Ok(())
}
