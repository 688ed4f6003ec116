use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, http::HeaderValue, routing::get};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::api::{self, AppState};
use super::ws;
use crate::chat::{ChatOrchestrator, ChatSettings};
use crate::config::{AppConfig, resolve};
use crate::llm::OpenAiCompatClient;
use crate::scrape::HttpScraper;
use crate::store::{ChatDb, DbHandle};

/// Listener settings for the chat server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cors_origins: Vec<String>,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            db_path: PathBuf::from(".scrapechat/scrapechat.db"),
            cors_origins: Vec::new(),
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    /// Listener settings from the `[server]` section, paths resolved
    /// against `base_dir`.
    pub fn from_app_config(config: &AppConfig, base_dir: &Path) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: resolve(base_dir, &config.server.db_path),
            cors_origins: config.server.cors_origins.clone(),
            dev_mode: false,
        }
    }

    fn cors_layer(&self) -> Option<CorsLayer> {
        if self.dev_mode {
            return Some(CorsLayer::permissive());
        }
        if self.cors_origins.is_empty() {
            return None;
        }
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        Some(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any),
        )
    }
}

/// Build the full application router: REST API plus the `/ws` event stream.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Open the database, wire the collaborators and serve until Ctrl+C.
pub async fn start_server(
    app_config: &AppConfig,
    base_dir: &Path,
    config: ServerConfig,
) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = ChatDb::new(&config.db_path).context("Failed to initialize chat database")?;
    let scraper = HttpScraper::new(app_config.scraper.clone())?;
    let llm = OpenAiCompatClient::new(app_config.model.clone())?;
    let settings = ChatSettings::from_config(app_config, base_dir)?;
    tracing::info!(
        model = %app_config.model.name,
        window_tokens = settings.budget.total,
        reserved_for_reply = settings.budget.reserved_for_reply,
        db = %config.db_path.display(),
        "Chat service configured"
    );

    let chat = Arc::new(ChatOrchestrator::new(
        DbHandle::new(db),
        Arc::new(scraper),
        Arc::new(llm),
        settings,
    ));
    let state = Arc::new(AppState::new(Arc::clone(&chat)));

    let mut app = build_router(state);
    if let Some(cors) = config.cors_layer() {
        app = app.layer(cors);
    }

    let host = if config.dev_mode { "0.0.0.0" } else { config.host.as_str() };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "Listening");
    println!("scrapechat running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    chat.shutdown();
    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionOptions, LlmClient};
    use crate::scrape::Scraper;
    use crate::store::Message;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct NoScraper;

    #[async_trait]
    impl Scraper for NoScraper {
        async fn fetch(&self, url: &str) -> anyhow::Result<String> {
            anyhow::bail!("offline: {}", url)
        }
    }

    struct FixedLlm;

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[Message],
            _options: CompletionOptions,
        ) -> anyhow::Result<String> {
            Ok("fixed".to_string())
        }
    }

    fn test_router() -> Router {
        let chat = ChatOrchestrator::new(
            DbHandle::new(ChatDb::new_in_memory().unwrap()),
            Arc::new(NoScraper),
            Arc::new(FixedLlm),
            ChatSettings::default(),
        );
        build_router(Arc::new(AppState::new(Arc::new(chat))))
    }

    #[tokio::test]
    async fn test_health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_routes_mounted() {
        let app = test_router();
        let req = Request::builder()
            .method("POST")
            .uri("/api/conversations")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({}).to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let conversation: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(conversation["title"].is_null());
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let app = test_router();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = test_router();
        let req = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.db_path, PathBuf::from(".scrapechat/scrapechat.db"));
        assert!(!config.dev_mode);
        assert!(config.cors_layer().is_none());
    }

    #[test]
    fn test_server_config_from_app_config() {
        let mut app_config = AppConfig::default();
        app_config.server.port = 9100;
        app_config.server.cors_origins = vec!["http://localhost:5173".into()];
        let config = ServerConfig::from_app_config(&app_config, Path::new("/srv/chat"));
        assert_eq!(config.port, 9100);
        assert_eq!(
            config.db_path,
            PathBuf::from("/srv/chat/.scrapechat/scrapechat.db")
        );
        assert!(config.cors_layer().is_some());
    }
}
