//! Token counting.
//!
//! The rolling memory guarantee is only as good as the counter. When the
//! model's own tokenizer is not available we over-count: `ByteEstimator`
//! charges one token per UTF-8 byte plus a fixed per-message overhead for
//! role markers. Every token of a byte-level BPE vocabulary covers at least
//! one byte, so the estimate never falls below the real count.

use std::sync::{Arc, OnceLock};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;

use crate::store::Message;

/// Tokens charged per message for role and separator markers.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

pub trait TokenCounter: Send + Sync {
    /// Tokens needed to encode `text`.
    fn count(&self, text: &str) -> usize;

    /// Tokens a chat message costs, including role overhead.
    fn count_message(&self, message: &Message) -> usize {
        self.count(&message.content) + MESSAGE_OVERHEAD_TOKENS
    }
}

/// Upper bound that needs no vocabulary: one token per byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteEstimator;

impl TokenCounter for ByteEstimator {
    fn count(&self, text: &str) -> usize {
        text.len()
    }
}

/// Exact counts for cl100k-family models.
pub struct Cl100kCounter {
    bpe: &'static CoreBPE,
}

impl Cl100kCounter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bpe: cl100k_tokenizer()?,
        })
    }
}

impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

fn cl100k_tokenizer() -> Result<&'static CoreBPE> {
    static TOKENIZER: OnceLock<Result<CoreBPE, String>> = OnceLock::new();
    let tokenizer = TOKENIZER.get_or_init(|| tiktoken_rs::cl100k_base().map_err(|e| e.to_string()));

    match tokenizer {
        Ok(tokenizer) => Ok(tokenizer),
        Err(error) => Err(anyhow!("Failed to load cl100k tokenizer: {}", error)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// Byte-count upper bound, always available
    #[default]
    Estimate,
    /// tiktoken cl100k_base
    Cl100k,
}

impl std::fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenizerKind::Estimate => write!(f, "estimate"),
            TokenizerKind::Cl100k => write!(f, "cl100k"),
        }
    }
}

impl TokenizerKind {
    pub fn build(self) -> Result<Arc<dyn TokenCounter>> {
        Ok(match self {
            TokenizerKind::Estimate => Arc::new(ByteEstimator),
            TokenizerKind::Cl100k => Arc::new(Cl100kCounter::new()?),
        })
    }
}

/// Longest char-boundary prefix of `text` accepted by `fits`, found by
/// binary search. `fits` must be monotonic: if a prefix fits, every shorter
/// one does too. The empty prefix is returned when nothing longer fits.
pub fn longest_prefix_where<'a, F>(text: &'a str, fits: F) -> &'a str
where
    F: Fn(&str) -> bool,
{
    if fits(text) {
        return text;
    }

    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    let (mut lo, mut hi) = (0usize, boundaries.len() - 1);
    while lo < hi {
        let mid = (lo + hi).div_ceil(2);
        if fits(&text[..boundaries[mid]]) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    &text[..boundaries[lo]]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inputs where a fixed bytes-per-token ratio under-counts: digits,
    /// punctuation runs, spaced letters and CJK.
    const HARD_CASES: &[&str] = &[
        "1,2,3,4,5,6,7,8,9",
        "斗鬥闘鬪籐",
        "a b c d e f g h i j k l m n o p",
        "!?!?!?;;;:::...,,,",
        "0x7f 0x80 0xff 0x100",
        "🦀🦀🦀 ферри 日本語のテキスト",
        "<|endoftext|>",
        "\n\t\r\n",
    ];

    #[test]
    fn test_estimator_counts_bytes() {
        assert_eq!(ByteEstimator.count(""), 0);
        assert_eq!(ByteEstimator.count("abc"), 3);
        // Each é is two bytes in UTF-8
        assert_eq!(ByteEstimator.count("ééé"), 6);
    }

    #[test]
    fn test_message_overhead() {
        let msg = Message::user("abcdef");
        assert_eq!(
            ByteEstimator.count_message(&msg),
            6 + MESSAGE_OVERHEAD_TOKENS
        );
    }

    #[test]
    fn test_estimator_never_undercounts_cl100k() {
        let exact = Cl100kCounter::new().unwrap();
        for text in HARD_CASES {
            assert!(
                ByteEstimator.count(text) >= exact.count(text),
                "estimate {} < cl100k {} for {:?}",
                ByteEstimator.count(text),
                exact.count(text),
                text
            );
        }
        let digits: String = (0..500).map(|i| format!("{},", i)).collect();
        assert!(ByteEstimator.count(&digits) >= exact.count(&digits));
    }

    #[test]
    fn test_cl100k_counts_tokens() {
        let counter = Cl100kCounter::new().unwrap();
        assert!(counter.count("hello world") >= 2);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_longest_prefix_within_budget() {
        let fits = |max: usize| move |prefix: &str| ByteEstimator.count(prefix) <= max;
        let text = "abcdefghij";
        assert_eq!(longest_prefix_where(text, fits(4)), "abcd");
        assert_eq!(longest_prefix_where(text, fits(100)), text);
        assert_eq!(longest_prefix_where(text, fits(0)), "");
    }

    #[test]
    fn test_longest_prefix_respects_char_boundaries() {
        // 3 bytes fit one é (2 bytes) but not two
        let prefix = longest_prefix_where("ééé", |p| ByteEstimator.count(p) <= 3);
        assert_eq!(prefix, "é");
    }

    #[test]
    fn test_tokenizer_kind_builds() {
        let counter = TokenizerKind::Estimate.build().unwrap();
        assert_eq!(counter.count("abc"), 3);
        assert_eq!(TokenizerKind::Cl100k.to_string(), "cl100k");
        assert_eq!(TokenizerKind::default(), TokenizerKind::Estimate);
    }
}
