//! HTTP server command: `scrapechat serve`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use scrapechat::config::AppConfig;
use scrapechat::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    project_dir: &Path,
    config: &AppConfig,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let mut server = ServerConfig::from_app_config(config, project_dir);
    if let Some(port) = port {
        server.port = port;
    }
    if let Some(path) = db_path {
        server.db_path = if path.is_absolute() {
            path
        } else {
            project_dir.join(path)
        };
    }
    server.dev_mode = dev;

    start_server(config, project_dir, server).await
}
