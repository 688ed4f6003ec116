//! Rolling memory: fit grounding context and dialogue history into a
//! token budget.
//!
//! `build_window` is a pure function of its inputs. It holds no state
//! between turns, so the same conversation state always yields the same
//! window.

use serde::Serialize;

use super::budget::TokenBudget;
use super::prompt::SystemPrompt;
use super::serializer::{ContextSection, SerializedContext};
use super::tokens::{TokenCounter, longest_prefix_where};
use crate::errors::{ChatError, ChatResult};
use crate::store::Message;

/// Appended to a document whose content had to be cut.
pub const TRUNCATION_MARKER: &str = "\n[... content truncated to fit the context window ...]";

/// The budget-constrained request actually sent to the model.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryWindow {
    /// Instructions with the (possibly truncated) documents block.
    pub system: String,
    /// Retained history in chronological order; the last entry is always
    /// the message being answered.
    pub messages: Vec<Message>,
    pub system_tokens: usize,
    pub message_tokens: usize,
    pub budget: TokenBudget,
    pub context_truncated: bool,
    pub sections_included: usize,
    pub sections_dropped: usize,
    pub messages_dropped: usize,
}

impl MemoryWindow {
    pub fn total_tokens(&self) -> usize {
        self.system_tokens + self.message_tokens
    }

    pub fn usage_percentage(&self) -> f32 {
        let available = self.budget.available();
        if available == 0 {
            return 100.0;
        }
        (self.total_tokens() as f32 / available as f32) * 100.0
    }

    pub fn status_summary(&self) -> String {
        format!(
            "Window: {:.1}% used ({} / {} tokens), {} messages kept, {} dropped{}",
            self.usage_percentage(),
            self.total_tokens(),
            self.budget.available(),
            self.messages.len(),
            self.messages_dropped,
            if self.context_truncated {
                format!(
                    ", context truncated ({} of {} documents kept)",
                    self.sections_included,
                    self.sections_included + self.sections_dropped
                )
            } else {
                String::new()
            }
        )
    }
}

/// Build the window for one turn.
///
/// 1. The current message and the bare instructions are mandatory; if they
///    alone exceed `budget.available()` the turn fails with
///    `ContextTooLarge`.
/// 2. The documents block takes what is left after the current message.
///    When it does not fit it is cut from the end: leading documents are
///    kept whole, the first one that does not fit is truncated (tags stay
///    closed), later ones are dropped.
/// 3. Prior history fills the remainder, newest first. The walk stops at
///    the first message that does not fit; everything older is dropped.
pub fn build_window(
    counter: &dyn TokenCounter,
    prompt: &SystemPrompt,
    context: &SerializedContext,
    history: &[Message],
    current: &Message,
    budget: TokenBudget,
) -> ChatResult<MemoryWindow> {
    let available = budget.available();
    let current_tokens = counter.count_message(current);
    let preamble_tokens = counter.count(&prompt.preamble());

    let required = preamble_tokens + current_tokens;
    if required > available {
        return Err(ChatError::ContextTooLarge {
            required,
            available,
        });
    }

    let system_cap = available - current_tokens;
    let fitted = fit_context(counter, prompt, context, system_cap);
    if fitted.truncated {
        tracing::info!(
            kept = fitted.sections_included,
            dropped = fitted.sections_dropped,
            system_tokens = fitted.tokens,
            cap = system_cap,
            "Grounding context truncated to fit budget"
        );
    }

    let mut remaining = available - fitted.tokens - current_tokens;
    let mut kept = Vec::new();
    for message in history.iter().rev() {
        let cost = counter.count_message(message);
        if cost > remaining {
            break;
        }
        remaining -= cost;
        kept.push(message.clone());
    }
    let messages_dropped = history.len() - kept.len();
    if messages_dropped > 0 {
        tracing::info!(
            kept = kept.len(),
            dropped = messages_dropped,
            "Older messages dropped from rolling memory"
        );
    }

    kept.reverse();
    kept.push(current.clone());
    let message_tokens = available - fitted.tokens - remaining;

    tracing::debug!(
        system_tokens = fitted.tokens,
        message_tokens,
        available,
        "Memory window built"
    );

    Ok(MemoryWindow {
        system: fitted.text,
        messages: kept,
        system_tokens: fitted.tokens,
        message_tokens,
        budget,
        context_truncated: fitted.truncated,
        sections_included: fitted.sections_included,
        sections_dropped: fitted.sections_dropped,
        messages_dropped,
    })
}

struct FittedContext {
    text: String,
    tokens: usize,
    truncated: bool,
    sections_included: usize,
    sections_dropped: usize,
}

/// Render the system text under `cap` tokens. The caller guarantees the
/// empty-documents preamble fits.
fn fit_context(
    counter: &dyn TokenCounter,
    prompt: &SystemPrompt,
    context: &SerializedContext,
    cap: usize,
) -> FittedContext {
    let full = prompt.render(&context.render());
    let full_tokens = counter.count(&full);
    if full_tokens <= cap {
        return FittedContext {
            text: full,
            tokens: full_tokens,
            truncated: false,
            sections_included: context.len(),
            sections_dropped: 0,
        };
    }

    let sections = context.sections();
    let render_with = |kept: &[ContextSection]| -> String {
        prompt.render(&SerializedContext::from_sections(kept.to_vec()).render())
    };

    let mut kept: Vec<ContextSection> = Vec::new();
    for section in sections {
        let mut candidate = kept.clone();
        candidate.push(section.clone());
        if counter.count(&render_with(&candidate)) <= cap {
            kept = candidate;
            continue;
        }

        // Cut this section's body; keep it only if some content survives.
        let body = longest_prefix_where(&section.content, |prefix| {
            let mut trial = kept.clone();
            trial.push(ContextSection {
                content: format!("{}{}", prefix, TRUNCATION_MARKER),
                ..section.clone()
            });
            counter.count(&render_with(&trial)) <= cap
        });
        if !body.is_empty() {
            kept.push(ContextSection {
                content: format!("{}{}", body, TRUNCATION_MARKER),
                ..section.clone()
            });
        }
        break;
    }

    let text = render_with(&kept);
    let tokens = counter.count(&text);
    FittedContext {
        text,
        tokens,
        truncated: true,
        sections_included: kept.len(),
        sections_dropped: sections.len() - kept.len(),
    }
}
