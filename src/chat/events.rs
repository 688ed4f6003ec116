use serde::Serialize;
use tokio::sync::broadcast;

use crate::store::{Conversation, ConversationId, Document, DocumentId, Message};

/// Capacity of the live-update channel. Slow subscribers skip ahead.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State changes pushed to live subscribers (the `/ws` endpoint).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatEvent {
    ConversationCreated {
        conversation: Conversation,
    },
    ConversationUpdated {
        conversation: Conversation,
    },
    ConversationDeleted {
        conversation_id: ConversationId,
    },
    DocumentUpdated {
        document: Document,
    },
    DocumentRemoved {
        conversation_id: ConversationId,
        document_id: DocumentId,
    },
    ContextCleared {
        conversation_id: ConversationId,
        removed: usize,
    },
    MessageAppended {
        conversation_id: ConversationId,
        message: Message,
    },
    TurnFailed {
        conversation_id: ConversationId,
        error: String,
    },
}

/// Serialize and publish an event. Having no subscribers is not an error.
pub fn broadcast_event(tx: &broadcast::Sender<String>, event: &ChatEvent) {
    match serde_json::to_string(event) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize chat event");
        }
    }
}
