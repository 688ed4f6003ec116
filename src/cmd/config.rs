//! Configuration view and validation commands: `scrapechat config`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use scrapechat::config::{AppConfig, CONFIG_DIR, CONFIG_FILE};

use super::super::ConfigCommands;

fn config_path(project_dir: &Path, explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Load the file config (explicit path or `.scrapechat/config.toml`) and
/// layer environment overrides on top. A missing file means defaults.
pub fn load_config(project_dir: &Path, explicit: Option<&Path>) -> Result<AppConfig> {
    let path = config_path(project_dir, explicit);
    let mut config = if path.exists() {
        AppConfig::load(&path)?
    } else {
        AppConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

pub fn cmd_config(
    project_dir: &Path,
    explicit: Option<&Path>,
    config: &AppConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let path = config_path(project_dir, explicit);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("scrapechat configuration");
            println!("========================");
            println!();
            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("No config file at {} (using defaults)", path.display());
            }
            println!();

            // Secrets never reach the terminal
            let mut shown = config.clone();
            if shown.model.api_key.is_some() {
                shown.model.api_key = Some("<set>".to_string());
            }
            if shown.scraper.api_key.is_some() {
                shown.scraper.api_key = Some("<set>".to_string());
            }
            println!("{}", toml::to_string_pretty(&shown)?);

            println!("Effective values:");
            match config.budget() {
                Ok(budget) => println!(
                    "  token budget = {} ({} reserved for reply, {} available)",
                    budget.total,
                    budget.reserved_for_reply,
                    budget.available()
                ),
                Err(e) => println!("  token budget = invalid ({:#})", e),
            }
            println!("  tokenizer = {}", config.memory.tokenizer);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if path.exists() {
                println!("config.toml already exists at {}", path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            AppConfig::default().save(&path)?;

            println!("Created config.toml at {}", path.display());
            println!();
            println!("You can now customize:");
            println!("  - [model] name, base_url, max_tokens, temperature");
            println!("  - [memory] window_tokens, context_limit, tokenizer");
            println!("  - [scraper] timeout_secs, proxy_domains");
            println!("  - [prompt] system or system_file");
            println!();
        }
    }

    Ok(())
}
