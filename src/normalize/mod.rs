//! Content Normalizer
//!
//! Converts scraped markup into cleaned Markdown while keeping the original
//! bytes for inspection. Conversion is best effort and never fails:
//!
//! - script, style and similar non-text blocks are removed
//! - page chrome (`nav`, `header`, `footer`, `aside`, `form`, `head`) is dropped
//! - headings, lists, links, emphasis, code blocks and tables become Markdown
//! - text that does not parse as markup is kept verbatim
//!
//! When the Markdown pass yields nothing but whitespace (a page that is all
//! chrome, say) the result falls back to the plain text of the document.

mod html;
mod markdown;

use serde::Serialize;

/// A normalized page. `raw` is the input, untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normalized {
    pub processed: String,
    pub raw: String,
}

pub fn normalize(raw: &str) -> Normalized {
    let stripped = html::strip_raw_text_elements(raw);
    let mut processed = markdown::render(&html::tokenize(&stripped));

    if processed.trim().is_empty() {
        processed = plain_text(&stripped);
        if !processed.is_empty() {
            tracing::debug!(
                chars = processed.len(),
                "Markdown conversion was empty, using plain text"
            );
        }
    }

    Normalized {
        processed,
        raw: raw.to_string(),
    }
}

/// All text runs of a document, whitespace collapsed, tags dropped.
pub fn plain_text(raw: &str) -> String {
    let stripped = html::strip_raw_text_elements(raw);
    let text: Vec<String> = html::tokenize(&stripped)
        .into_iter()
        .filter_map(|token| match token {
            html::Token::Text(t) => Some(html::decode_entities(t)),
            _ => None,
        })
        .collect();
    markdown::collapse_whitespace(&text.join(" ")).trim().to_string()
}
