use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "scrapechat")]
#[command(version, about = "Chat with an LLM grounded in scraped web pages")]
pub struct Cli {
    /// Debug-level logging for scrapechat and the HTTP layer
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log filter directive (e.g. "scrapechat=trace"). Overrides RUST_LOG and config.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to the config file (defaults to .scrapechat/config.toml in the project dir)
    #[arg(long, global = true, env = "SCRAPECHAT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP and WebSocket server
    Serve {
        /// Port to serve on (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path (overrides [server] db_path)
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, bind all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Create the .scrapechat directory, default config and database
    Init,
    /// Print the grounding context a conversation would send
    Context {
        /// Conversation id
        conversation_id: String,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default config.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    dotenvy::from_path(project_dir.join(".env")).ok();

    let config = cmd::load_config(&project_dir, cli.config.as_deref())?;
    let _log_guard = scrapechat::telemetry::init(
        &config.logging,
        &project_dir,
        cli.log_level.as_deref(),
        cli.verbose,
    )?;

    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            cmd::cmd_serve(&project_dir, &config, *port, db_path.clone(), *dev).await?;
        }
        Commands::Init => cmd::cmd_init(&project_dir, cli.config.as_deref())?,
        Commands::Context { conversation_id } => {
            cmd::cmd_context(&project_dir, &config, conversation_id).await?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&project_dir, cli.config.as_deref(), &config, command.clone())?
        }
    }

    Ok(())
}
