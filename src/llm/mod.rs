//! Chat completion client.
//!
//! [`LlmClient`] takes the system text and the trimmed message list and
//! returns the reply text. [`OpenAiCompatClient`] talks to any endpoint that
//! implements `POST {base_url}/chat/completions` (OpenRouter by default).

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ModelSection;
use crate::store::{Message, Role};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f64,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a conversation. An `Ok` reply may still be empty; callers
    /// decide whether that is a failure.
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    settings: ModelSection,
}

impl OpenAiCompatClient {
    pub fn new(settings: ModelSection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, settings })
    }

    /// Reply options from the model settings.
    pub fn default_options(&self) -> CompletionOptions {
        CompletionOptions {
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        options: CompletionOptions,
    ) -> Result<String> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("No model API key configured (set OPENROUTER_API_KEY)"))?;

        let request = ChatRequest {
            model: &self.settings.name,
            messages: build_messages(system, messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        tracing::debug!(
            model = %self.settings.name,
            messages = request.messages.len(),
            max_tokens = options.max_tokens,
            "Sending chat completion"
        );

        let resp = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow!("Model request timed out after {}s", self.settings.timeout_secs)
                } else {
                    anyhow::Error::new(e).context("Failed to send chat completion request")
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .context("Failed to read chat completion response")?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                bail!("Model API error ({}): {}", status, err.error.message);
            }
            bail!("Model API returned HTTP {}: {}", status, body);
        }

        parse_reply(&body)
    }
}

fn build_messages<'a>(system: &'a str, messages: &'a [Message]) -> Vec<ChatMessage<'a>> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(ChatMessage {
        role: "system",
        content: system,
    });
    out.extend(messages.iter().map(|m| ChatMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));
    out
}

/// Extract the first choice's text from a completion body.
fn parse_reply(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).context("Malformed chat completion response")?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Chat completion response has no choices"))?;
    Ok(choice.message.content.unwrap_or_default())
}

/// Instructions for the topic title call.
pub const TOPIC_SYSTEM_PROMPT: &str = "You are a helpful assistant that generates concise topics.";

/// Build the single user message asking for a 2-5 word topic.
pub fn topic_request(transcript: &[Message]) -> Message {
    let mut text = String::from(
        "Based on the following conversation, generate a concise topic (2-5 words) that captures its main subject:\n\n",
    );
    for m in transcript {
        let speaker = match m.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        text.push_str(&format!("{}: {}\n", speaker, m.content));
    }
    text.push_str("\nTopic:");
    Message::user(text)
}

/// Clean a model-produced topic: first line, no quotes or trailing dot.
pub fn clean_topic(reply: &str) -> Option<String> {
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.strip_prefix("Topic:").unwrap_or(line).trim();
    let cleaned = line
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim_end_matches('.')
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.chars().take(80).collect())
    }
}
