//! Page fetching.
//!
//! [`Scraper`] is the seam the orchestrator depends on: given a URL it
//! returns the raw markup or an error. Any error is terminal for that
//! attempt; retries are left to the caller (refresh).
//!
//! [`HttpScraper`] does a plain GET with a timeout. Hosts listed in
//! `scraper.proxy_domains` are fetched through the ScraperAPI endpoint when a
//! key is configured, since those sites block direct requests.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;

use crate::config::ScraperSection;

/// Suffix appended to bodies cut at `max_content_length`.
pub const TRUNCATION_SUFFIX: &str = "...";

#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fetch `url` and return its raw body.
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpScraper {
    client: reqwest::Client,
    settings: ScraperSection,
}

impl HttpScraper {
    pub fn new(settings: ScraperSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, settings })
    }

    /// Whether `url` should go through the proxy API.
    pub fn uses_proxy(&self, url: &str) -> bool {
        self.settings.api_key.is_some() && host_matches(url, &self.settings.proxy_domains)
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        match &self.settings.api_key {
            Some(key) if host_matches(url, &self.settings.proxy_domains) => self
                .client
                .get(&self.settings.proxy_url)
                .query(&[("api_key", key.as_str()), ("url", url)]),
            _ => self.client.get(url),
        }
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn fetch(&self, url: &str) -> Result<String> {
        let proxied = self.uses_proxy(url);
        tracing::debug!(url, proxied, "Fetching page");

        let resp = self.request(url).send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::anyhow!(
                    "Timed out after {}s fetching {}",
                    self.settings.timeout_secs,
                    url
                )
            } else {
                anyhow::Error::new(e).context(format!("Failed to fetch {}", url))
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {} fetching {}", status, url);
        }

        let body = resp
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        Ok(truncate_content(body, self.settings.max_content_length))
    }
}

/// Host of `url` equals, or is a subdomain of, one of `domains`.
pub fn host_matches(url: &str, domains: &[String]) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    domains.iter().any(|d| {
        let d = d.trim().trim_start_matches('.').to_ascii_lowercase();
        !d.is_empty() && (host == d || host.ends_with(&format!(".{}", d)))
    })
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str().filter(|h| !h.is_empty())?;
    Some(host.to_ascii_lowercase())
}

/// Cut `body` to at most `max_chars` characters plus [`TRUNCATION_SUFFIX`].
pub fn truncate_content(body: String, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut body = body;
            body.truncate(cut);
            body.push_str(TRUNCATION_SUFFIX);
            body
        }
        None => body,
    }
}

/// Reject anything that is not an absolute http(s) URL with a host.
pub fn validate_url(url: &str) -> Result<Url> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        bail!("URL cannot be empty");
    }
    let parsed = Url::parse(trimmed).with_context(|| format!("Invalid URL: {}", trimmed))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("URL must start with http:// or https://: {}", trimmed);
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        bail!("URL has no host: {}", trimmed);
    }
    Ok(parsed)
}
