use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use super::events::{ChatEvent, EVENT_CHANNEL_CAPACITY, broadcast_event};
use super::turns::{TurnLocks, TurnPhase};
use crate::config::AppConfig;
use crate::context::{
    ByteEstimator, ContextSection, MemoryWindow, SerializedContext, SystemPrompt, TokenBudget,
    TokenCounter, build_window,
};
use crate::errors::{ChatError, ChatResult};
use crate::llm::{CompletionOptions, LlmClient, TOPIC_SYSTEM_PROMPT, clean_topic, topic_request};
use crate::normalize::normalize;
use crate::scrape::{Scraper, validate_url};
use crate::store::{
    AttemptOutcome, Conversation, ConversationDetail, ConversationId, DbHandle, Document,
    DocumentId, Message, Role,
};

/// Everything a turn needs besides the collaborators.
#[derive(Clone)]
pub struct ChatSettings {
    pub prompt: SystemPrompt,
    pub budget: TokenBudget,
    pub completion: CompletionOptions,
    pub topic_max_tokens: u32,
    pub counter: Arc<dyn TokenCounter>,
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig, base_dir: &Path) -> Result<Self> {
        Ok(Self {
            prompt: config.system_prompt(base_dir)?,
            budget: config.budget()?,
            completion: CompletionOptions {
                max_tokens: config.model.max_tokens,
                temperature: config.model.temperature,
            },
            topic_max_tokens: config.model.topic_max_tokens,
            counter: config.memory.tokenizer.build()?,
        })
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            prompt: SystemPrompt::default(),
            budget: TokenBudget::new(
                crate::context::DEFAULT_WINDOW_TOKENS,
                crate::context::DEFAULT_RESERVED_FOR_REPLY,
            ),
            completion: CompletionOptions {
                max_tokens: 1536,
                temperature: 0.4,
            },
            topic_max_tokens: 20,
            counter: Arc::new(ByteEstimator),
        }
    }
}

/// What `get_context` returns: the grounding block as the model would see
/// it before budget trimming.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub context: String,
    pub documents: Vec<ContextSection>,
    pub tokens: usize,
}

/// Coordinates documents, history and the two collaborators for every
/// conversation.
///
/// Scrapes run as background tasks. Each one carries the generation it was
/// started with; the store ignores its result if a newer attempt began or
/// the document was deleted in the meantime.
pub struct ChatOrchestrator {
    db: DbHandle,
    scraper: Arc<dyn Scraper>,
    llm: Arc<dyn LlmClient>,
    settings: ChatSettings,
    turns: TurnLocks,
    scrapes: Mutex<JoinSet<()>>,
    events: broadcast::Sender<String>,
}

impl ChatOrchestrator {
    pub fn new(
        db: DbHandle,
        scraper: Arc<dyn Scraper>,
        llm: Arc<dyn LlmClient>,
        settings: ChatSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            db,
            scraper,
            llm,
            settings,
            turns: TurnLocks::new(),
            scrapes: Mutex::new(JoinSet::new()),
            events,
        }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Subscribe to live JSON events.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<String> {
        self.events.clone()
    }

    pub fn turn_phase(&self, conversation_id: ConversationId) -> TurnPhase {
        self.turns.phase(conversation_id)
    }

    fn emit(&self, event: ChatEvent) {
        broadcast_event(&self.events, &event);
    }

    // ── Conversations ───────────────────────────────────────────────

    pub async fn create_conversation(&self, title: Option<String>) -> ChatResult<Conversation> {
        let id = ConversationId::new();
        let conversation = self
            .db
            .call(move |db| db.create_conversation(id, title.as_deref()))
            .await?;
        tracing::info!(conversation_id = %id, "Conversation created");
        self.emit(ChatEvent::ConversationCreated {
            conversation: conversation.clone(),
        });
        Ok(conversation)
    }

    pub async fn list_conversations(&self) -> ChatResult<Vec<Conversation>> {
        Ok(self.db.call(|db| db.list_conversations()).await?)
    }

    pub async fn get_conversation(&self, id: ConversationId) -> ChatResult<ConversationDetail> {
        self.db
            .call(move |db| db.conversation_detail(id))
            .await?
            .ok_or(ChatError::ConversationNotFound(id))
    }

    /// Delete a conversation with its messages and documents. Scrapes still
    /// in flight for it complete into nothing.
    pub async fn delete_conversation(&self, id: ConversationId) -> ChatResult<bool> {
        let deleted = self.db.call(move |db| db.delete_conversation(id)).await?;
        if deleted {
            tracing::info!(conversation_id = %id, "Conversation deleted");
            self.emit(ChatEvent::ConversationDeleted {
                conversation_id: id,
            });
        }
        Ok(deleted)
    }

    // ── Documents ───────────────────────────────────────────────────

    /// Attach a URL and start scraping it. Returns without waiting for the
    /// scrape; the document is `loading` (or `pending` if it was removed
    /// before the scrape could be dispatched).
    pub async fn add_url(&self, conversation_id: ConversationId, url: &str) -> ChatResult<Document> {
        validate_url(url).map_err(|e| ChatError::BadRequest(e.to_string()))?;
        let url = url.trim().to_string();

        let pending = self
            .db
            .call(move |db| {
                db.ensure_conversation(conversation_id)?;
                db.add_document(conversation_id, &url)
            })
            .await?;
        tracing::info!(
            conversation_id = %conversation_id,
            document_id = %pending.id,
            url = %pending.url,
            "Document added"
        );
        self.emit(ChatEvent::DocumentUpdated {
            document: pending.clone(),
        });

        match self.dispatch(conversation_id, pending.id, None).await? {
            Some(loading) => Ok(loading),
            None => Ok(pending),
        }
    }

    /// Re-scrape a document's current URL under the same id.
    pub async fn refresh_url(
        &self,
        conversation_id: ConversationId,
        document_id: DocumentId,
    ) -> ChatResult<Document> {
        self.dispatch(conversation_id, document_id, None)
            .await?
            .ok_or(ChatError::DocumentNotFound(document_id))
    }

    /// Point a document at a new URL and scrape it under the same id.
    pub async fn edit_url(
        &self,
        conversation_id: ConversationId,
        document_id: DocumentId,
        new_url: &str,
    ) -> ChatResult<Document> {
        validate_url(new_url).map_err(|e| ChatError::BadRequest(e.to_string()))?;
        self.dispatch(conversation_id, document_id, Some(new_url.trim().to_string()))
            .await?
            .ok_or(ChatError::DocumentNotFound(document_id))
    }

    /// Remove a document. Removing a missing one is not an error.
    pub async fn delete_url(
        &self,
        conversation_id: ConversationId,
        document_id: DocumentId,
    ) -> ChatResult<()> {
        let removed = self
            .db
            .call(move |db| db.remove_document(conversation_id, document_id))
            .await?;
        if removed {
            tracing::info!(
                conversation_id = %conversation_id,
                document_id = %document_id,
                "Document removed"
            );
            self.emit(ChatEvent::DocumentRemoved {
                conversation_id,
                document_id,
            });
        }
        Ok(())
    }

    pub async fn list_urls(&self, conversation_id: ConversationId) -> ChatResult<Vec<Document>> {
        Ok(self
            .db
            .call(move |db| db.list_documents(conversation_id))
            .await?)
    }

    /// Serialize the current complete documents.
    pub async fn get_context(&self, conversation_id: ConversationId) -> ChatResult<ContextSnapshot> {
        let documents = self.list_urls(conversation_id).await?;
        let context = SerializedContext::from_documents(&documents);
        let rendered = context.render();
        Ok(ContextSnapshot {
            tokens: self.settings.counter.count(&rendered),
            context: rendered,
            documents: context.sections().to_vec(),
        })
    }

    /// Remove every document of a conversation. Messages stay.
    pub async fn clear_context(&self, conversation_id: ConversationId) -> ChatResult<usize> {
        let removed = self
            .db
            .call(move |db| db.clear_documents(conversation_id))
            .await?;
        tracing::info!(conversation_id = %conversation_id, removed, "Context cleared");
        self.emit(ChatEvent::ContextCleared {
            conversation_id,
            removed,
        });
        Ok(removed)
    }

    /// Start a new attempt on a document and spawn its scrape.
    async fn dispatch(
        &self,
        conversation_id: ConversationId,
        document_id: DocumentId,
        new_url: Option<String>,
    ) -> ChatResult<Option<Document>> {
        let started = self
            .db
            .call(move |db| db.begin_attempt(conversation_id, document_id, new_url.as_deref()))
            .await?;
        let Some(document) = started else {
            return Ok(None);
        };

        tracing::info!(
            conversation_id = %conversation_id,
            document_id = %document_id,
            generation = document.generation,
            url = %document.url,
            "Scrape dispatched"
        );
        self.emit(ChatEvent::DocumentUpdated {
            document: document.clone(),
        });

        let task = run_scrape(
            self.db.clone(),
            Arc::clone(&self.scraper),
            self.events.clone(),
            document.clone(),
        );
        let mut scrapes = self.scrapes.lock().unwrap_or_else(|e| e.into_inner());
        while scrapes.try_join_next().is_some() {}
        scrapes.spawn(task);

        Ok(Some(document))
    }

    /// Wait until every scrape spawned so far has finished.
    pub async fn settle(&self) {
        loop {
            let mut pending = {
                let mut scrapes = self.scrapes.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *scrapes)
            };
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Scrape task panicked");
                }
            }
        }
    }

    /// Abort scrapes still in flight.
    pub fn shutdown(&self) {
        let mut scrapes = self.scrapes.lock().unwrap_or_else(|e| e.into_inner());
        if !scrapes.is_empty() {
            tracing::info!(in_flight = scrapes.len(), "Aborting in-flight scrapes");
        }
        scrapes.abort_all();
    }

    // ── Turns ───────────────────────────────────────────────────────

    /// Append a user message and answer it.
    ///
    /// The window is assembled before anything is written, so a message
    /// that cannot fit the budget leaves the conversation untouched. Once
    /// persisted, the user message survives a failed model call and can be
    /// answered by `retry_turn`. No assistant message is written unless the
    /// model produced a non-empty reply.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> ChatResult<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::BadRequest("Message cannot be empty".to_string()));
        }
        let guard = self
            .turns
            .try_begin(conversation_id)
            .ok_or(ChatError::TurnInProgress(conversation_id))?;

        let current = Message::user(text);
        let history = self
            .db
            .call(move |db| db.list_messages(conversation_id))
            .await?;
        let window = match self.assemble_window(conversation_id, &history, &current).await {
            Ok(window) => window,
            Err(e) => return self.finish_turn(conversation_id, Err(e)),
        };

        let to_store = current.clone();
        self.db
            .call(move |db| {
                db.ensure_conversation(conversation_id)?;
                db.append_message(conversation_id, &to_store)
            })
            .await?;
        self.emit(ChatEvent::MessageAppended {
            conversation_id,
            message: current,
        });

        guard.advance(TurnPhase::AwaitingReply);
        let result = self.complete_turn(conversation_id, &window).await;
        self.finish_turn(conversation_id, result)
    }

    /// Answer a trailing user message left unanswered by a failed turn.
    pub async fn retry_turn(&self, conversation_id: ConversationId) -> ChatResult<Message> {
        let guard = self
            .turns
            .try_begin(conversation_id)
            .ok_or(ChatError::TurnInProgress(conversation_id))?;

        let detail = self
            .db
            .call(move |db| {
                Ok(match db.get_conversation(conversation_id)? {
                    Some(_) => Some(db.list_messages(conversation_id)?),
                    None => None,
                })
            })
            .await?;
        let mut history = detail.ok_or(ChatError::ConversationNotFound(conversation_id))?;

        let current = match history.pop() {
            Some(last) if last.role == Role::User => last,
            _ => return Err(ChatError::NothingToRetry(conversation_id)),
        };
        tracing::info!(conversation_id = %conversation_id, "Retrying turn");

        let result = match self.assemble_window(conversation_id, &history, &current).await {
            Ok(window) => {
                guard.advance(TurnPhase::AwaitingReply);
                self.complete_turn(conversation_id, &window).await
            }
            Err(e) => Err(e),
        };
        self.finish_turn(conversation_id, result)
    }

    fn finish_turn(
        &self,
        conversation_id: ConversationId,
        result: ChatResult<Message>,
    ) -> ChatResult<Message> {
        if let Err(e) = &result {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "Turn failed");
            self.emit(ChatEvent::TurnFailed {
                conversation_id,
                error: e.to_string(),
            });
        }
        result
    }

    async fn assemble_window(
        &self,
        conversation_id: ConversationId,
        history: &[Message],
        current: &Message,
    ) -> ChatResult<MemoryWindow> {
        // Always from the store: a document that reached a terminal state
        // before this point must be visible to this turn.
        let documents = self.list_urls(conversation_id).await?;
        let context = SerializedContext::from_documents(&documents);

        let window = build_window(
            self.settings.counter.as_ref(),
            &self.settings.prompt,
            &context,
            history,
            current,
            self.settings.budget,
        )?;
        tracing::info!(
            conversation_id = %conversation_id,
            documents = window.sections_included,
            "{}",
            window.status_summary()
        );
        Ok(window)
    }

    async fn complete_turn(
        &self,
        conversation_id: ConversationId,
        window: &MemoryWindow,
    ) -> ChatResult<Message> {
        let reply = self
            .llm
            .complete(&window.system, &window.messages, self.settings.completion)
            .await
            .map_err(|e| ChatError::LlmFailure(format!("{:#}", e)))?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(ChatError::EmptyReply);
        }

        let message = Message::assistant(reply);
        let to_store = message.clone();
        let stored = self
            .db
            .call(move |db| {
                if db.get_conversation(conversation_id)?.is_none() {
                    return Ok(false);
                }
                db.append_message(conversation_id, &to_store)?;
                Ok(true)
            })
            .await?;
        if !stored {
            return Err(ChatError::ConversationNotFound(conversation_id));
        }

        tracing::info!(
            conversation_id = %conversation_id,
            reply_chars = message.content.len(),
            "Assistant reply appended"
        );
        self.emit(ChatEvent::MessageAppended {
            conversation_id,
            message: message.clone(),
        });
        Ok(message)
    }

    /// Ask the model for a short topic and store it as the title.
    pub async fn generate_title(&self, conversation_id: ConversationId) -> ChatResult<Conversation> {
        let transcript = self
            .get_conversation(conversation_id)
            .await?
            .messages;
        if transcript.is_empty() {
            return Err(ChatError::BadRequest(
                "Conversation has no messages to summarize".to_string(),
            ));
        }

        let recent = recent_fitting(
            self.settings.counter.as_ref(),
            &transcript,
            self.settings.budget.available() / 2,
        );
        let request = topic_request(recent);
        let options = CompletionOptions {
            max_tokens: self.settings.topic_max_tokens,
            temperature: self.settings.completion.temperature,
        };
        let reply = self
            .llm
            .complete(TOPIC_SYSTEM_PROMPT, &[request], options)
            .await
            .map_err(|e| ChatError::LlmFailure(format!("{:#}", e)))?;
        let title = clean_topic(&reply).ok_or(ChatError::EmptyReply)?;

        let conversation = self
            .db
            .call(move |db| db.set_title(conversation_id, &title))
            .await?
            .ok_or(ChatError::ConversationNotFound(conversation_id))?;
        tracing::info!(
            conversation_id = %conversation_id,
            title = conversation.title.as_deref().unwrap_or_default(),
            "Title generated"
        );
        self.emit(ChatEvent::ConversationUpdated {
            conversation: conversation.clone(),
        });
        Ok(conversation)
    }
}

/// Longest suffix of `messages` whose cost fits `max_tokens`.
fn recent_fitting<'a>(
    counter: &dyn TokenCounter,
    messages: &'a [Message],
    max_tokens: usize,
) -> &'a [Message] {
    let mut used = 0;
    let mut start = messages.len();
    for (i, m) in messages.iter().enumerate().rev() {
        used += counter.count_message(m);
        if used > max_tokens {
            break;
        }
        start = i;
    }
    &messages[start..]
}

/// One scrape attempt: fetch, normalize, record under `document.generation`.
async fn run_scrape(
    db: DbHandle,
    scraper: Arc<dyn Scraper>,
    events: broadcast::Sender<String>,
    document: Document,
) {
    let Document {
        id,
        conversation_id,
        url,
        generation,
        ..
    } = document;

    let recorded = match scraper.fetch(&url).await {
        Ok(raw) => {
            let normalized = tokio::task::spawn_blocking(move || normalize(&raw)).await;
            match normalized {
                Ok(page) => {
                    tracing::debug!(
                        document_id = %id,
                        raw_bytes = page.raw.len(),
                        processed_bytes = page.processed.len(),
                        "Page normalized"
                    );
                    db.call(move |db| db.complete_attempt(id, generation, &page.processed, &page.raw))
                        .await
                }
                Err(e) => {
                    let message = format!("Normalization failed: {}", e);
                    db.call(move |db| db.fail_attempt(id, generation, &message)).await
                }
            }
        }
        Err(e) => {
            let message = format!("{:#}", e);
            tracing::warn!(document_id = %id, generation, %url, error = %message, "Scrape failed");
            db.call(move |db| db.fail_attempt(id, generation, &message)).await
        }
    };

    match recorded {
        Ok(AttemptOutcome::Applied) => {
            let updated = db
                .call(move |db| db.get_document(conversation_id, id))
                .await;
            match updated {
                Ok(Some(document)) => {
                    tracing::info!(
                        document_id = %id,
                        generation,
                        status = document.status().as_str(),
                        "Scrape recorded"
                    );
                    broadcast_event(&events, &ChatEvent::DocumentUpdated { document });
                }
                Ok(None) => {}
                Err(e) => tracing::error!(document_id = %id, error = %e, "Failed to reload document"),
            }
        }
        Ok(AttemptOutcome::Stale) => {
            tracing::debug!(
                document_id = %id,
                generation,
                "Discarding stale scrape result"
            );
        }
        Err(e) => {
            let error = format!("{:#}", e);
            tracing::error!(document_id = %id, generation, %error, "Failed to record scrape result");
        }
    }
}
