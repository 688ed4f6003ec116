//! Grounding Context and Rolling Memory
//!
//! Turns a conversation's stored state into the request sent to the model.
//!
//! ## Pipeline
//!
//! - **Serialization**: complete documents become `<document>` sections, in
//!   list order ([`SerializedContext`])
//! - **Prompt**: the sections fill the `<documents>` slot of the system
//!   prompt ([`SystemPrompt`])
//! - **Window**: instructions, context and the most recent messages are fit
//!   into the token budget ([`build_window`])
//!
//! ## Configuration
//!
//! The budget is configured in `.scrapechat/config.toml`:
//!
//! ```toml
//! [memory]
//! window_tokens = 65536
//! context_limit = "100%"   # or an absolute token count
//! tokenizer = "estimate"   # or "cl100k"
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use scrapechat::context::{SerializedContext, SystemPrompt, TokenBudget, build_window};
//!
//! let context = SerializedContext::from_documents(&documents);
//! let window = build_window(counter.as_ref(), &prompt, &context, &history, &current, budget)?;
//! llm.complete(&window.system, &window.messages).await?;
//! ```

mod budget;
mod prompt;
mod serializer;
mod tokens;
mod window;

pub use budget::{ContextLimit, TokenBudget};
pub use prompt::{DEFAULT_SYSTEM_PROMPT, DOCUMENTS_CLOSE, DOCUMENTS_OPEN, SystemPrompt};
pub use serializer::{ContextSection, SerializedContext, serialize};
pub use tokens::{
    ByteEstimator, Cl100kCounter, MESSAGE_OVERHEAD_TOKENS, TokenCounter, TokenizerKind,
    longest_prefix_where,
};
pub use window::{MemoryWindow, TRUNCATION_MARKER, build_window};

/// Model context window in tokens when none is configured.
pub const DEFAULT_WINDOW_TOKENS: usize = 65_536;

/// Tokens held back for the model's reply.
pub const DEFAULT_RESERVED_FOR_REPLY: usize = 1536;
