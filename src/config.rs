//! Configuration for scrapechat.
//!
//! Settings are read from `.scrapechat/config.toml`, then overridden by
//! environment variables (a `.env` file is honoured), then by CLI flags.
//! Every key is optional.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! db_path = ".scrapechat/scrapechat.db"
//!
//! [model]
//! name = "deepseek/deepseek-chat"
//! base_url = "https://openrouter.ai/api/v1"
//! max_tokens = 1536
//! temperature = 0.4
//!
//! [memory]
//! window_tokens = 65536
//! context_limit = "100%"
//! tokenizer = "estimate"
//!
//! [scraper]
//! timeout_secs = 60
//! max_content_length = 100000000
//! proxy_domains = ["rotogrinders.com", "nba.com"]
//!
//! [logging]
//! level = "scrapechat=info"
//! format = "pretty"
//! file = "logs/scrapechat.log"
//!
//! [prompt]
//! system_file = "prompt.txt"
//! ```
//!
//! # Environment
//!
//! | Variable              | Overrides           |
//! |-----------------------|---------------------|
//! | `OPENROUTER_API_KEY`  | `model.api_key`     |
//! | `SCRAPER_API_KEY`     | `scraper.api_key`   |
//! | `SCRAPECHAT_MODEL`    | `model.name`        |
//! | `SCRAPECHAT_BASE_URL` | `model.base_url`    |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::context::{ContextLimit, DEFAULT_WINDOW_TOKENS, SystemPrompt, TokenBudget, TokenizerKind};

pub const CONFIG_DIR: &str = ".scrapechat";
pub const CONFIG_FILE: &str = "config.toml";

/// HTTP listener and database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite file; relative paths resolve against the working directory
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    format!("{}/scrapechat.db", CONFIG_DIR)
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            cors_origins: Vec::new(),
        }
    }
}

/// Chat completion endpoint (any OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    #[serde(default = "default_model")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Reply length cap, also reserved out of the memory budget
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_topic_max_tokens")]
    pub topic_max_tokens: u32,
}

fn default_model() -> String {
    "deepseek/deepseek-chat".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_max_tokens() -> u32 {
    1536
}

fn default_temperature() -> f64 {
    0.4
}

fn default_model_timeout() -> u64 {
    120
}

fn default_topic_max_tokens() -> u32 {
    20
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            name: default_model(),
            base_url: default_base_url(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_model_timeout(),
            topic_max_tokens: default_topic_max_tokens(),
        }
    }
}

/// Rolling memory budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySection {
    /// Model context window in tokens
    #[serde(default = "default_window_tokens")]
    pub window_tokens: usize,
    /// Share of the window to fill: percentage ("80%") or absolute tokens
    #[serde(default = "default_context_limit")]
    pub context_limit: String,
    /// Tokens held back for the reply; defaults to `model.max_tokens`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_for_reply: Option<usize>,
    #[serde(default)]
    pub tokenizer: TokenizerKind,
}

fn default_window_tokens() -> usize {
    DEFAULT_WINDOW_TOKENS
}

fn default_context_limit() -> String {
    "100%".to_string()
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            window_tokens: default_window_tokens(),
            context_limit: default_context_limit(),
            reserved_for_reply: None,
            tokenizer: TokenizerKind::default(),
        }
    }
}

/// Page fetching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperSection {
    #[serde(default = "default_scraper_timeout")]
    pub timeout_secs: u64,
    /// Longer bodies are cut and suffixed with `...`
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Hosts (and their subdomains) fetched through the proxy API
    #[serde(default = "default_proxy_domains")]
    pub proxy_domains: Vec<String>,
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_scraper_timeout() -> u64 {
    60
}

fn default_max_content_length() -> usize {
    100_000_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_proxy_domains() -> Vec<String> {
    vec!["rotogrinders.com".to_string(), "nba.com".to_string()]
}

fn default_proxy_url() -> String {
    "https://api.scraperapi.com".to_string()
}

impl Default for ScraperSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_scraper_timeout(),
            max_content_length: default_max_content_length(),
            user_agent: default_user_agent(),
            proxy_domains: default_proxy_domains(),
            proxy_url: default_proxy_url(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive; `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also write logs to this file (rotated daily)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "scrapechat=info,tower_http=info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

/// System prompt override. `system` wins over `system_file`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_file: Option<String>,
}

/// The parsed `.scrapechat/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub scraper: ScraperSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub prompt: PromptSection,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Load `config.toml` from `config_dir`, or defaults when it is missing.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(key) = get("SCRAPER_API_KEY") {
            self.scraper.api_key = Some(key);
        }
        if let Some(model) = get("SCRAPECHAT_MODEL") {
            self.model.name = model;
        }
        if let Some(url) = get("SCRAPECHAT_BASE_URL") {
            self.model.base_url = url;
        }
    }

    /// Tokens reserved for the reply.
    pub fn reserved_for_reply(&self) -> usize {
        self.memory
            .reserved_for_reply
            .unwrap_or(self.model.max_tokens as usize)
    }

    /// Resolve the memory section into a turn budget.
    pub fn budget(&self) -> Result<TokenBudget> {
        let limit: ContextLimit = self
            .memory
            .context_limit
            .parse()
            .context("Invalid memory.context_limit")?;
        Ok(TokenBudget::from_limit(
            limit,
            self.memory.window_tokens,
            self.reserved_for_reply(),
        ))
    }

    /// Build the system prompt. Relative `system_file` paths resolve
    /// against `base_dir`.
    pub fn system_prompt(&self, base_dir: &Path) -> Result<SystemPrompt> {
        if let Some(text) = &self.prompt.system {
            return Ok(SystemPrompt::new(text));
        }
        if let Some(file) = &self.prompt.system_file {
            let path = resolve(base_dir, file);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
            return Ok(SystemPrompt::new(&text));
        }
        Ok(SystemPrompt::default())
    }

    /// Human-readable problems; empty when the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.model.api_key.is_none() {
            warnings.push(
                "No model API key configured: set OPENROUTER_API_KEY or model.api_key".to_string(),
            );
        }

        match self.memory.context_limit.parse::<ContextLimit>() {
            Ok(_) => {
                if let Ok(budget) = self.budget()
                    && budget.available() == 0
                {
                    warnings.push(format!(
                        "Reply reserve ({} tokens) leaves no room in a {} token budget",
                        budget.reserved_for_reply, budget.total
                    ));
                }
            }
            Err(_) => warnings.push(format!(
                "Invalid context_limit '{}': should be percentage (e.g., '80%') or number",
                self.memory.context_limit
            )),
        }

        if self.memory.window_tokens == 0 {
            warnings.push("memory.window_tokens must be greater than zero".to_string());
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            warnings.push(format!(
                "model.temperature {} is outside 0.0-2.0",
                self.model.temperature
            ));
        }
        if self.scraper.max_content_length == 0 {
            warnings.push("scraper.max_content_length must be greater than zero".to_string());
        }
        if self.prompt.system.is_none()
            && let Some(file) = &self.prompt.system_file
            && file.trim().is_empty()
        {
            warnings.push("prompt.system_file is empty".to_string());
        }

        warnings
    }
}

/// Resolve `path` against `base` unless it is absolute.
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

/// The default configuration file content written by `init`.
pub fn default_config_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.model.name, "deepseek/deepseek-chat");
        assert_eq!(config.model.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.model.max_tokens, 1536);
        assert!((config.model.temperature - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.memory.window_tokens, 65_536);
        assert_eq!(config.scraper.timeout_secs, 60);
        assert_eq!(config.scraper.max_content_length, 100_000_000);
        assert_eq!(config.model.topic_max_tokens, 20);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_sections() {
        let config = AppConfig::parse(
            r#"
[server]
port = 9000

[model]
name = "openai/gpt-4o-mini"
temperature = 0.1

[memory]
context_limit = "50%"
reserved_for_reply = 512
tokenizer = "cl100k"

[scraper]
proxy_domains = ["example.com"]

[logging]
format = "json"
file = "logs/app.log"
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.model.name, "openai/gpt-4o-mini");
        assert_eq!(config.model.max_tokens, 1536);
        assert_eq!(config.memory.tokenizer, TokenizerKind::Cl100k);
        assert_eq!(config.scraper.proxy_domains, vec!["example.com"]);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.file.as_deref(), Some("logs/app.log"));

        let budget = config.budget().unwrap();
        assert_eq!(budget.total, 32_768);
        assert_eq!(budget.available(), 32_768 - 512);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(AppConfig::parse("[server\nport = 1").is_err());
        assert!(AppConfig::parse("[server]\nport = \"high\"").is_err());
    }

    #[test]
    fn test_reserve_defaults_to_max_tokens() {
        let config = AppConfig::default();
        assert_eq!(config.reserved_for_reply(), 1536);
        assert_eq!(config.budget().unwrap().available(), 65_536 - 1536);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("SCRAPER_API_KEY", "scraper-key"),
            ("SCRAPECHAT_MODEL", "meta/llama"),
            ("SCRAPECHAT_BASE_URL", ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.model.api_key.as_deref(), Some("sk-or-test"));
        assert_eq!(config.scraper.api_key.as_deref(), Some("scraper-key"));
        assert_eq!(config.model.name, "meta/llama");
        // Empty values do not clobber the file setting
        assert_eq!(config.model.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_validate() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("k".into());
        assert!(config.validate().is_empty());

        config.memory.context_limit = "lots".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Invalid context_limit"));

        config.memory.context_limit = "1000".into();
        config.memory.reserved_for_reply = Some(2000);
        assert!(config.validate()[0].contains("leaves no room"));
    }

    #[test]
    fn test_validate_flags_missing_api_key() {
        let warnings = AppConfig::default().validate();
        assert!(warnings.iter().any(|w| w.contains("OPENROUTER_API_KEY")));
    }

    #[test]
    fn test_save_and_load_or_default() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR);

        let loaded = AppConfig::load_or_default(&config_dir).unwrap();
        assert_eq!(loaded.server.port, 8000);

        let mut config = AppConfig::default();
        config.server.port = 8123;
        config.save(&config_dir.join(CONFIG_FILE)).unwrap();

        let loaded = AppConfig::load_or_default(&config_dir).unwrap();
        assert_eq!(loaded.server.port, 8123);
    }

    #[test]
    fn test_api_keys_are_not_written_when_unset() {
        let text = default_config_toml().unwrap();
        assert!(!text.contains("api_key"));
        assert!(text.contains("[memory]"));
        AppConfig::parse(&text).unwrap();
    }

    #[test]
    fn test_system_prompt_sources() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("p.txt"), "From file <documents></documents>").unwrap();

        let mut config = AppConfig::default();
        assert_eq!(config.system_prompt(dir.path()).unwrap(), SystemPrompt::default());

        config.prompt.system_file = Some("p.txt".into());
        let prompt = config.system_prompt(dir.path()).unwrap();
        assert!(prompt.preamble().starts_with("From file"));

        config.prompt.system = Some("Inline".into());
        let prompt = config.system_prompt(dir.path()).unwrap();
        assert!(prompt.preamble().starts_with("Inline"));

        config.prompt.system = None;
        config.prompt.system_file = Some("missing.txt".into());
        assert!(config.system_prompt(dir.path()).is_err());
    }
}
