use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(ConversationId);
id_newtype!(DocumentId);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// One dialogue turn. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::now(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::now(Role::Assistant, content)
    }

    fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Loading,
    Complete,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Loading => "loading",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "loading" => Ok(Self::Loading),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid document status: {}", s)),
        }
    }
}

/// Scrape state of a document. Content only exists on `Complete` and the
/// error message only on `Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentState {
    Pending,
    Loading,
    Complete { processed: String, raw: String },
    Error { message: String },
}

impl DocumentState {
    pub fn status(&self) -> DocumentStatus {
        match self {
            Self::Pending => DocumentStatus::Pending,
            Self::Loading => DocumentStatus::Loading,
            Self::Complete { .. } => DocumentStatus::Complete,
            Self::Error { .. } => DocumentStatus::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub conversation_id: ConversationId,
    pub url: String,
    /// Scrape attempt counter. Completions carrying an older value are stale.
    pub generation: u64,
    #[serde(flatten)]
    pub state: DocumentState,
    pub updated_at: String,
}

impl Document {
    pub fn status(&self) -> DocumentStatus {
        self.state.status()
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state, DocumentState::Complete { .. })
    }

    /// Processed content, present only when the scrape completed.
    pub fn processed(&self) -> Option<&str> {
        match &self.state {
            DocumentState::Complete { processed, .. } => Some(processed),
            _ => None,
        }
    }

    pub fn raw(&self) -> Option<&str> {
        match &self.state {
            DocumentState::Complete { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            DocumentState::Error { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: Option<String>,
    pub created_at: String,
    /// Last activity: bumped on every message append and document change.
    pub updated_at: String,
}

// API view types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub documents: Vec<Document>,
}

/// Result of applying a scrape completion to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Applied,
    /// A newer attempt started, or the document was deleted, after this one.
    Stale,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::User, Role::Assistant] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_document_status_parse_rejects_unknown() {
        assert_eq!(
            "complete".parse::<DocumentStatus>().unwrap(),
            DocumentStatus::Complete
        );
        assert!("done".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_document_serializes_flat_status() {
        let doc = Document {
            id: DocumentId::new(),
            conversation_id: ConversationId::new(),
            url: "https://example.com".into(),
            generation: 2,
            state: DocumentState::Complete {
                processed: "# Title".into(),
                raw: "<h1>Title</h1>".into(),
            },
            updated_at: "2024-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["status"], "complete");
        assert_eq!(json["processed"], "# Title");
        assert_eq!(json["raw"], "<h1>Title</h1>");
        assert_eq!(json["generation"], 2);

        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_error_state_has_no_content() {
        let doc = Document {
            id: DocumentId::new(),
            conversation_id: ConversationId::new(),
            url: "https://example.com".into(),
            generation: 1,
            state: DocumentState::Error {
                message: "404".into(),
            },
            updated_at: String::new(),
        };
        assert_eq!(doc.status(), DocumentStatus::Error);
        assert!(doc.processed().is_none());
        assert!(doc.raw().is_none());
        assert_eq!(doc.error(), Some("404"));
    }

    #[test]
    fn test_ids_parse_from_display() {
        let id = DocumentId::new();
        let parsed: DocumentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ConversationId>().is_err());
    }
}
