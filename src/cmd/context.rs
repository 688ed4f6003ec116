//! Context inspection: `scrapechat context <conversation-id>`.

use anyhow::{Context, Result, bail};
use std::path::Path;

use scrapechat::config::{AppConfig, resolve};
use scrapechat::context::SerializedContext;
use scrapechat::store::{ChatDb, ConversationId, DbHandle};

pub async fn cmd_context(project_dir: &Path, config: &AppConfig, conversation_id: &str) -> Result<()> {
    let id: ConversationId = conversation_id
        .parse()
        .with_context(|| format!("Invalid conversation id: {}", conversation_id))?;

    let db_path = resolve(project_dir, &config.server.db_path);
    if !db_path.exists() {
        bail!(
            "No database at {}. Run `scrapechat init` first.",
            db_path.display()
        );
    }
    let db = DbHandle::new(ChatDb::new(&db_path)?);
    let detail = db
        .call(move |db| db.conversation_detail(id))
        .await?
        .with_context(|| format!("Conversation {} not found", id))?;

    let counter = config.memory.tokenizer.build()?;
    let budget = config.budget()?;
    let context = SerializedContext::from_documents(&detail.documents);
    let rendered = context.render();

    println!();
    println!(
        "Conversation {} ({})",
        id,
        detail.conversation.title.as_deref().unwrap_or("untitled")
    );
    println!("Messages: {}", detail.messages.len());
    println!();
    println!("Documents:");
    if detail.documents.is_empty() {
        println!("  (none)");
    }
    for doc in &detail.documents {
        match doc.error() {
            Some(err) => println!("  [{}] {} - {}", doc.status().as_str(), doc.url, err),
            None => println!("  [{}] {}", doc.status().as_str(), doc.url),
        }
    }
    println!();
    println!(
        "Context: {} of {} documents, {} tokens ({} available per turn)",
        context.len(),
        detail.documents.len(),
        counter.count(&rendered),
        budget.available()
    );
    if !rendered.is_empty() {
        println!();
        println!("{}", rendered);
    }

    Ok(())
}
