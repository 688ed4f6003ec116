//! Project initialization: `scrapechat init`.

use anyhow::{Context, Result};
use std::path::Path;

use scrapechat::config::{AppConfig, CONFIG_DIR, CONFIG_FILE, resolve};
use scrapechat::store::ChatDb;

pub fn cmd_init(project_dir: &Path, config_path: Option<&Path>) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    let was_initialized = config_dir.exists();
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config_dir.join(CONFIG_FILE));
    let config = if config_path.exists() {
        AppConfig::load(&config_path)?
    } else {
        let config = AppConfig::default();
        config.save(&config_path)?;
        println!("Created {}", config_path.display());
        config
    };

    let db_path = resolve(project_dir, &config.server.db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    ChatDb::new(&db_path)?;

    if was_initialized {
        println!("scrapechat already initialized at {}", config_dir.display());
        println!("Database verified at {}", db_path.display());
    } else {
        println!("Initialized scrapechat at {}", config_dir.display());
        println!("Database created at {}", db_path.display());
        println!();
        println!("Next steps:");
        println!("  1. Put OPENROUTER_API_KEY=... in .env");
        println!("  2. Run `scrapechat serve`");
    }

    Ok(())
}
