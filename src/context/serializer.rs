//! Renders a conversation's completed documents into the grounding block.

use serde::Serialize;

use crate::store::Document;

/// One document's contribution to the grounding context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSection {
    /// 1-based position among the serialized documents.
    pub index: usize,
    pub source: String,
    pub content: String,
}

impl ContextSection {
    pub fn render(&self) -> String {
        format!(
            "  <document index=\"{}\">\n    <source>{}</source>\n    <document_content>\n      {}\n    </document_content>\n  </document>",
            self.index, self.source, self.content
        )
    }
}

/// Grounding context derived from the current document set. Never cached:
/// build a fresh one from `list_documents` every time it is needed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SerializedContext {
    sections: Vec<ContextSection>,
}

impl SerializedContext {
    /// Keep only `complete` documents, in list order.
    pub fn from_documents(documents: &[Document]) -> Self {
        let sections = documents
            .iter()
            .filter_map(|doc| doc.processed().map(|content| (doc, content)))
            .enumerate()
            .map(|(i, (doc, content))| ContextSection {
                index: i + 1,
                source: doc.url.clone(),
                content: content.to_string(),
            })
            .collect();
        Self { sections }
    }

    pub fn from_sections(sections: Vec<ContextSection>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[ContextSection] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Sections joined by newlines; empty string when there are none.
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(ContextSection::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Serialize the complete documents of a list into one text block.
pub fn serialize(documents: &[Document]) -> String {
    SerializedContext::from_documents(documents).render()
}
