//! Typed error hierarchy for scrapechat.
//!
//! `ChatError` is what the orchestrator surfaces to callers. Scrape failures
//! never appear here: they are recorded on the document as its `error`
//! state and the conversation carries on.

use thiserror::Error;

use crate::store::{ConversationId, DocumentId};

/// Errors from the conversation orchestrator and its collaborators.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("LLM request failed: {0}")]
    LlmFailure(String),

    #[error("LLM returned an empty reply")]
    EmptyReply,

    #[error("Context too large: {required} tokens required, {available} available")]
    ContextTooLarge { required: usize, available: usize },

    #[error("Conversation {0} not found")]
    ConversationNotFound(ConversationId),

    #[error("Document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("A reply is already being generated for conversation {0}")]
    TurnInProgress(ConversationId),

    #[error("Nothing to retry: conversation {0} has no unanswered message")]
    NothingToRetry(ConversationId),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::Store(err)
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_too_large_carries_budget() {
        let err = ChatError::ContextTooLarge {
            required: 120,
            available: 80,
        };
        match &err {
            ChatError::ContextTooLarge {
                required,
                available,
            } => {
                assert_eq!(*required, 120);
                assert_eq!(*available, 80);
            }
            _ => panic!("Expected ContextTooLarge"),
        }
        assert!(err.to_string().contains("120"));
        assert!(err.to_string().contains("80"));
    }

    #[test]
    fn not_found_names_the_id() {
        let id = DocumentId::new();
        assert!(ChatError::DocumentNotFound(id).to_string().contains(&id.to_string()));
    }

    #[test]
    fn store_error_converts_from_anyhow() {
        let err: ChatError = anyhow::anyhow!("disk full").into();
        match &err {
            ChatError::Store(inner) => assert_eq!(inner.to_string(), "disk full"),
            _ => panic!("Expected Store"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ChatError::EmptyReply);
        assert_std_error(&ChatError::TurnInProgress(ConversationId::new()));
    }
}
