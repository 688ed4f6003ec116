//! scrapechat: chat with an LLM grounded in scraped web pages.
//!
//! Pages attached to a conversation are fetched in the background,
//! normalized to markdown and serialized into the system prompt. Every turn
//! builds a memory window that fits the model's token budget: the newest
//! message always, grounding documents next, then as much recent history as
//! still fits.

pub mod chat;
pub mod config;
pub mod context;
pub mod errors;
pub mod llm;
pub mod normalize;
pub mod scrape;
pub mod server;
pub mod store;
pub mod telemetry;

pub use chat::{ChatEvent, ChatOrchestrator, ChatSettings};
pub use errors::{ChatError, ChatResult};
