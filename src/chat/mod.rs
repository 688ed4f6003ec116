//! Conversation orchestration.
//!
//! [`ChatOrchestrator`] owns the document lifecycle (add, refresh, edit,
//! remove) and runs turns: it assembles the grounding context from the
//! current complete documents, trims history into the token budget, calls
//! the model and records the reply. State changes are published as
//! [`ChatEvent`]s for live subscribers.

pub mod events;
pub mod orchestrator;
pub mod turns;

pub use events::{ChatEvent, EVENT_CHANNEL_CAPACITY, broadcast_event};
pub use orchestrator::{ChatOrchestrator, ChatSettings, ContextSnapshot};
pub use turns::{TurnGuard, TurnLocks, TurnPhase};
