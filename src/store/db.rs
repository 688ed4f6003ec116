use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use rusqlite::{Connection, OptionalExtension, params};

use super::models::*;

/// Async-safe handle to the chat database.
///
/// Wraps `ChatDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads. The mutex also makes every closure
/// passed to `call` atomic with respect to every other one.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ChatDb>>,
}

impl DbHandle {
    pub fn new(db: ChatDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ChatDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct ChatDb {
    conn: Connection,
}

impl ChatDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS conversations (
                    id TEXT PRIMARY KEY,
                    title TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS messages (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS documents (
                    id TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                    position INTEGER NOT NULL,
                    url TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    generation INTEGER NOT NULL DEFAULT 0,
                    processed TEXT,
                    raw TEXT,
                    error TEXT,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq);
                CREATE INDEX IF NOT EXISTS idx_documents_conversation ON documents(conversation_id, position);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Conversations ─────────────────────────────────────────────────

    pub fn create_conversation(&self, id: ConversationId, title: Option<&str>) -> Result<Conversation> {
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![id.to_string(), title, ts],
            )
            .context("Failed to insert conversation")?;
        self.get_conversation(id)?
            .context("Conversation not found after insert")
    }

    /// Return the conversation, creating it on first use.
    pub fn ensure_conversation(&self, id: ConversationId) -> Result<Conversation> {
        let ts = now();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO conversations (id, title, created_at, updated_at) VALUES (?1, NULL, ?2, ?2)",
                params![id.to_string(), ts],
            )
            .context("Failed to ensure conversation")?;
        self.get_conversation(id)?
            .context("Conversation not found after ensure")
    }

    pub fn get_conversation(&self, id: ConversationId) -> Result<Option<Conversation>> {
        self.conn
            .query_row(
                "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query conversation")?
            .map(|(id, title, created_at, updated_at)| {
                Ok(Conversation {
                    id: parse_id(&id)?,
                    title,
                    created_at,
                    updated_at,
                })
            })
            .transpose()
    }

    /// Conversations ordered by last activity, newest first.
    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, created_at, updated_at FROM conversations
                 ORDER BY updated_at DESC, created_at DESC",
            )
            .context("Failed to prepare list_conversations")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to query conversations")?;
        let mut conversations = Vec::new();
        for row in rows {
            let (id, title, created_at, updated_at) =
                row.context("Failed to read conversation row")?;
            conversations.push(Conversation {
                id: parse_id(&id)?,
                title,
                created_at,
                updated_at,
            });
        }
        Ok(conversations)
    }

    pub fn set_title(&self, id: ConversationId, title: &str) -> Result<Option<Conversation>> {
        let changed = self
            .conn
            .execute(
                "UPDATE conversations SET title = ?1 WHERE id = ?2",
                params![title, id.to_string()],
            )
            .context("Failed to update conversation title")?;
        if changed == 0 {
            return Ok(None);
        }
        self.get_conversation(id)
    }

    /// Delete a conversation with its messages and documents. Idempotent.
    pub fn delete_conversation(&self, id: ConversationId) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM conversations WHERE id = ?1",
                params![id.to_string()],
            )
            .context("Failed to delete conversation")?;
        Ok(changed > 0)
    }

    fn touch_conversation(&self, id: ConversationId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now(), id.to_string()],
            )
            .context("Failed to touch conversation")?;
        Ok(())
    }

    // ── Messages ──────────────────────────────────────────────────────

    pub fn append_message(&self, conversation_id: ConversationId, message: &Message) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin append_message transaction")?;
        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation_id.to_string(),
                message.role.as_str(),
                message.content,
                message.timestamp
            ],
        )
        .context("Failed to insert message")?;
        self.touch_conversation(conversation_id)?;
        tx.commit().context("Failed to commit message")?;
        Ok(())
    }

    /// Messages in append order.
    pub fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT role, content, created_at FROM messages
                 WHERE conversation_id = ?1 ORDER BY seq",
            )
            .context("Failed to prepare list_messages")?;
        let rows = stmt
            .query_map(params![conversation_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("Failed to query messages")?;
        let mut messages = Vec::new();
        for row in rows {
            let (role, content, timestamp) = row.context("Failed to read message row")?;
            messages.push(Message {
                role: Role::from_str(&role).map_err(|e| anyhow::anyhow!(e))?,
                content,
                timestamp,
            });
        }
        Ok(messages)
    }

    // ── Documents ─────────────────────────────────────────────────────

    /// Insert a new `pending` document at the end of the conversation's list.
    pub fn add_document(&self, conversation_id: ConversationId, url: &str) -> Result<Document> {
        let id = DocumentId::new();
        let max_pos: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(position), -1) FROM documents WHERE conversation_id = ?1",
                params![conversation_id.to_string()],
                |row| row.get(0),
            )
            .context("Failed to get max document position")?;
        self.conn
            .execute(
                "INSERT INTO documents (id, conversation_id, position, url, status, generation, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5)",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    max_pos + 1,
                    url,
                    now()
                ],
            )
            .context("Failed to insert document")?;
        self.touch_conversation(conversation_id)?;
        self.get_document(conversation_id, id)?
            .context("Document not found after insert")
    }

    pub fn get_document(
        &self,
        conversation_id: ConversationId,
        id: DocumentId,
    ) -> Result<Option<Document>> {
        self.conn
            .query_row(
                "SELECT id, conversation_id, url, status, generation, processed, raw, error, updated_at
                 FROM documents WHERE id = ?1 AND conversation_id = ?2",
                params![id.to_string(), conversation_id.to_string()],
                DocumentRow::from_row,
            )
            .optional()
            .context("Failed to query document")?
            .map(DocumentRow::into_document)
            .transpose()
    }

    /// Documents in insertion order.
    pub fn list_documents(&self, conversation_id: ConversationId) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, conversation_id, url, status, generation, processed, raw, error, updated_at
                 FROM documents WHERE conversation_id = ?1 ORDER BY position",
            )
            .context("Failed to prepare list_documents")?;
        let rows = stmt
            .query_map(params![conversation_id.to_string()], DocumentRow::from_row)
            .context("Failed to query documents")?;
        let mut documents = Vec::new();
        for row in rows {
            let r = row.context("Failed to read document row")?;
            documents.push(r.into_document()?);
        }
        Ok(documents)
    }

    /// Start a new scrape attempt: bump the generation, enter `loading`,
    /// drop any previous content, and replace the URL when `new_url` is set.
    /// Returns `None` when the document does not exist.
    pub fn begin_attempt(
        &self,
        conversation_id: ConversationId,
        id: DocumentId,
        new_url: Option<&str>,
    ) -> Result<Option<Document>> {
        let changed = self
            .conn
            .execute(
                "UPDATE documents
                 SET generation = generation + 1, status = 'loading',
                     url = COALESCE(?3, url),
                     processed = NULL, raw = NULL, error = NULL, updated_at = ?4
                 WHERE id = ?1 AND conversation_id = ?2",
                params![id.to_string(), conversation_id.to_string(), new_url, now()],
            )
            .context("Failed to begin scrape attempt")?;
        if changed == 0 {
            return Ok(None);
        }
        self.touch_conversation(conversation_id)?;
        self.get_document(conversation_id, id)
    }

    /// Record a successful scrape, only if `generation` is still current.
    pub fn complete_attempt(
        &self,
        id: DocumentId,
        generation: u64,
        processed: &str,
        raw: &str,
    ) -> Result<AttemptOutcome> {
        let changed = self
            .conn
            .execute(
                "UPDATE documents
                 SET status = 'complete', processed = ?3, raw = ?4, error = NULL, updated_at = ?5
                 WHERE id = ?1 AND generation = ?2 AND status = 'loading'",
                params![id.to_string(), generation as i64, processed, raw, now()],
            )
            .context("Failed to complete scrape attempt")?;
        Ok(if changed == 0 {
            AttemptOutcome::Stale
        } else {
            AttemptOutcome::Applied
        })
    }

    /// Record a failed scrape, only if `generation` is still current.
    pub fn fail_attempt(&self, id: DocumentId, generation: u64, message: &str) -> Result<AttemptOutcome> {
        let changed = self
            .conn
            .execute(
                "UPDATE documents
                 SET status = 'error', error = ?3, processed = NULL, raw = NULL, updated_at = ?4
                 WHERE id = ?1 AND generation = ?2 AND status = 'loading'",
                params![id.to_string(), generation as i64, message, now()],
            )
            .context("Failed to record scrape failure")?;
        Ok(if changed == 0 {
            AttemptOutcome::Stale
        } else {
            AttemptOutcome::Applied
        })
    }

    /// Remove a document. Removing a missing id is a no-op.
    pub fn remove_document(&self, conversation_id: ConversationId, id: DocumentId) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM documents WHERE id = ?1 AND conversation_id = ?2",
                params![id.to_string(), conversation_id.to_string()],
            )
            .context("Failed to delete document")?;
        if changed > 0 {
            self.touch_conversation(conversation_id)?;
        }
        Ok(changed > 0)
    }

    /// Remove every document of a conversation; messages are untouched.
    pub fn clear_documents(&self, conversation_id: ConversationId) -> Result<usize> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM documents WHERE conversation_id = ?1",
                params![conversation_id.to_string()],
            )
            .context("Failed to clear documents")?;
        if changed > 0 {
            self.touch_conversation(conversation_id)?;
        }
        Ok(changed)
    }

    pub fn conversation_detail(&self, id: ConversationId) -> Result<Option<ConversationDetail>> {
        let Some(conversation) = self.get_conversation(id)? else {
            return Ok(None);
        };
        Ok(Some(ConversationDetail {
            conversation,
            messages: self.list_messages(id)?,
            documents: self.list_documents(id)?,
        }))
    }
}

fn parse_id<T: FromStr<Err = uuid::Error>>(s: &str) -> Result<T> {
    s.parse::<T>()
        .with_context(|| format!("Invalid id in database: {}", s))
}

/// Intermediate row struct for reading documents from SQLite before
/// converting column values into a `DocumentState`.
struct DocumentRow {
    id: String,
    conversation_id: String,
    url: String,
    status: String,
    generation: i64,
    processed: Option<String>,
    raw: Option<String>,
    error: Option<String>,
    updated_at: String,
}

impl DocumentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            url: row.get(2)?,
            status: row.get(3)?,
            generation: row.get(4)?,
            processed: row.get(5)?,
            raw: row.get(6)?,
            error: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_document(self) -> Result<Document> {
        let status = DocumentStatus::from_str(&self.status).map_err(|e| anyhow::anyhow!(e))?;
        let state = match status {
            DocumentStatus::Pending => DocumentState::Pending,
            DocumentStatus::Loading => DocumentState::Loading,
            DocumentStatus::Complete => DocumentState::Complete {
                processed: self.processed.unwrap_or_default(),
                raw: self.raw.unwrap_or_default(),
            },
            DocumentStatus::Error => DocumentState::Error {
                message: self.error.unwrap_or_default(),
            },
        };
        Ok(Document {
            id: parse_id(&self.id)?,
            conversation_id: parse_id(&self.conversation_id)?,
            url: self.url,
            generation: self.generation as u64,
            state,
            updated_at: self.updated_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_conversation() -> Result<(ChatDb, ConversationId)> {
        let db = ChatDb::new_in_memory()?;
        let id = ConversationId::new();
        db.create_conversation(id, None)?;
        Ok((db, id))
    }

    #[test]
    fn test_create_database_and_run_migrations() -> Result<()> {
        let db = ChatDb::new_in_memory()?;
        let table_count: i32 = db.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('conversations', 'messages', 'documents')",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(table_count, 3, "Expected 3 tables to exist");
        Ok(())
    }

    #[test]
    fn test_ensure_conversation_is_idempotent() -> Result<()> {
        let db = ChatDb::new_in_memory()?;
        let id = ConversationId::new();
        let first = db.ensure_conversation(id)?;
        let second = db.ensure_conversation(id)?;
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(db.list_conversations()?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_messages_keep_append_order() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        db.append_message(conv, &Message::user("first"))?;
        db.append_message(conv, &Message::assistant("second"))?;
        db.append_message(conv, &Message::user("third"))?;

        let messages = db.list_messages(conv)?;
        let texts: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(messages[1].role, Role::Assistant);
        Ok(())
    }

    #[test]
    fn test_add_document_starts_pending() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let doc = db.add_document(conv, "https://example.com/a")?;
        assert_eq!(doc.status(), DocumentStatus::Pending);
        assert_eq!(doc.generation, 0);
        assert_eq!(doc.conversation_id, conv);
        Ok(())
    }

    #[test]
    fn test_list_documents_in_insertion_order_with_duplicates() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let a = db.add_document(conv, "https://a.test")?;
        let b = db.add_document(conv, "https://b.test")?;
        let c = db.add_document(conv, "https://a.test")?;

        let ids: Vec<DocumentId> = db.list_documents(conv)?.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        Ok(())
    }

    #[test]
    fn test_complete_attempt_populates_content() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let doc = db.add_document(conv, "https://x.test")?;
        let loading = db.begin_attempt(conv, doc.id, None)?.expect("exists");
        assert_eq!(loading.status(), DocumentStatus::Loading);
        assert_eq!(loading.generation, 1);

        let outcome = db.complete_attempt(doc.id, 1, "# Lakers beat Celtics", "<h1>Lakers beat Celtics</h1>")?;
        assert_eq!(outcome, AttemptOutcome::Applied);

        let done = db.get_document(conv, doc.id)?.expect("exists");
        assert_eq!(done.processed(), Some("# Lakers beat Celtics"));
        assert_eq!(done.raw(), Some("<h1>Lakers beat Celtics</h1>"));
        Ok(())
    }

    #[test]
    fn test_stale_completion_is_discarded() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let doc = db.add_document(conv, "https://x.test")?;
        let first = db.begin_attempt(conv, doc.id, None)?.expect("exists");
        let second = db.begin_attempt(conv, doc.id, None)?.expect("exists");
        assert!(second.generation > first.generation);

        assert_eq!(
            db.complete_attempt(doc.id, second.generation, "new", "new-raw")?,
            AttemptOutcome::Applied
        );
        assert_eq!(
            db.complete_attempt(doc.id, first.generation, "old", "old-raw")?,
            AttemptOutcome::Stale
        );

        let current = db.get_document(conv, doc.id)?.expect("exists");
        assert_eq!(current.processed(), Some("new"));
        Ok(())
    }

    #[test]
    fn test_edit_then_failure_keeps_new_url() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let doc = db.add_document(conv, "https://old.test")?;
        let gen1 = db.begin_attempt(conv, doc.id, None)?.expect("exists").generation;
        db.complete_attempt(doc.id, gen1, "old content", "old raw")?;

        let edited = db
            .begin_attempt(conv, doc.id, Some("https://new.test"))?
            .expect("exists");
        assert_eq!(edited.url, "https://new.test");
        assert!(edited.processed().is_none());

        db.fail_attempt(doc.id, edited.generation, "connection refused")?;
        let failed = db.get_document(conv, doc.id)?.expect("exists");
        assert_eq!(failed.id, doc.id);
        assert_eq!(failed.url, "https://new.test");
        assert_eq!(failed.error(), Some("connection refused"));
        assert!(failed.processed().is_none());
        Ok(())
    }

    #[test]
    fn test_completion_after_delete_is_stale() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let doc = db.add_document(conv, "https://x.test")?;
        let generation = db.begin_attempt(conv, doc.id, None)?.expect("exists").generation;
        assert!(db.remove_document(conv, doc.id)?);

        assert_eq!(
            db.complete_attempt(doc.id, generation, "late", "late")?,
            AttemptOutcome::Stale
        );
        assert!(db.get_document(conv, doc.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_remove_document_is_idempotent() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let keep = db.add_document(conv, "https://keep.test")?;
        let gone = db.add_document(conv, "https://gone.test")?;

        assert!(db.remove_document(conv, gone.id)?);
        assert!(!db.remove_document(conv, gone.id)?);
        assert!(!db.remove_document(conv, DocumentId::new())?);

        let remaining = db.list_documents(conv)?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0], keep);
        Ok(())
    }

    #[test]
    fn test_begin_attempt_on_missing_document_returns_none() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        assert!(db.begin_attempt(conv, DocumentId::new(), None)?.is_none());
        Ok(())
    }

    #[test]
    fn test_documents_are_scoped_to_conversation() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let other = ConversationId::new();
        db.create_conversation(other, None)?;
        let doc = db.add_document(conv, "https://x.test")?;

        assert!(db.get_document(other, doc.id)?.is_none());
        assert!(db.begin_attempt(other, doc.id, None)?.is_none());
        assert!(!db.remove_document(other, doc.id)?);
        assert!(db.list_documents(other)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_clear_documents_keeps_messages() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        db.add_document(conv, "https://a.test")?;
        db.add_document(conv, "https://b.test")?;
        db.append_message(conv, &Message::user("hello"))?;

        assert_eq!(db.clear_documents(conv)?, 2);
        assert!(db.list_documents(conv)?.is_empty());
        assert_eq!(db.list_messages(conv)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_delete_conversation_cascades() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        db.add_document(conv, "https://a.test")?;
        db.append_message(conv, &Message::user("hello"))?;

        assert!(db.delete_conversation(conv)?);
        assert!(db.get_conversation(conv)?.is_none());
        assert!(db.list_documents(conv)?.is_empty());
        assert!(db.list_messages(conv)?.is_empty());
        assert!(!db.delete_conversation(conv)?);
        Ok(())
    }

    #[test]
    fn test_set_title() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        let updated = db.set_title(conv, "Game 7 recap")?.expect("exists");
        assert_eq!(updated.title.as_deref(), Some("Game 7 recap"));
        assert!(db.set_title(ConversationId::new(), "x")?.is_none());
        Ok(())
    }

    #[test]
    fn test_conversation_detail_bundles_messages_and_documents() -> Result<()> {
        let (db, conv) = db_with_conversation()?;
        db.add_document(conv, "https://a.test")?;
        db.append_message(conv, &Message::user("hi"))?;

        let detail = db.conversation_detail(conv)?.expect("exists");
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.documents.len(), 1);
        assert!(db.conversation_detail(ConversationId::new())?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_db_handle_call_runs_closure() -> Result<()> {
        let handle = DbHandle::new(ChatDb::new_in_memory()?);
        let id = ConversationId::new();
        let conversation = handle
            .call(move |db| db.ensure_conversation(id))
            .await?;
        assert_eq!(conversation.id, id);
        Ok(())
    }
}
