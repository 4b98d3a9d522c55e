//! Ritualcraft CLI: the main entry point.
//!
//! Commands:
//! - `serve`     : Start the HTTP API server
//! - `normalize` : Normalize a saved model reply against a tool's schema
//! - `templates` : Import or list prompt templates
//! - `tools`     : List the tool catalog
//! - `doctor`    : Diagnose configuration and storage

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "ritualcraft",
    about = "Ritualcraft: AI tools for quarterly planning rituals",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.ritualcraft/config.toml)
    #[arg(short, long, global = true, env = "RITUALCRAFT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Normalize a raw model reply (from a file or stdin)
    Normalize {
        /// Tool whose response schema to apply
        tool: String,

        /// Read the reply from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print the tier-by-tier trace after the result
        #[arg(long)]
        trace: bool,
    },

    /// Manage prompt templates
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// List available tools and their fields
    Tools,

    /// Diagnose configuration and storage
    Doctor,
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Upsert every template from a TOML seed file
    Import {
        /// Path to the TOML file
        file: PathBuf,
    },

    /// List stored templates
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Normalize { tool, file, trace } => {
            commands::normalize::run(&config, &tool, file.as_deref(), trace)?
        }
        Commands::Templates { action } => match action {
            TemplateAction::Import { file } => commands::templates::import(&config, &file).await?,
            TemplateAction::List => commands::templates::list(&config).await?,
        },
        Commands::Tools => commands::tools::run(&config),
        Commands::Doctor => commands::doctor::run(&config, cli.config.as_deref()).await?,
    }

    Ok(())
}
