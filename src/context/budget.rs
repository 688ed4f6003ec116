//! Turn budgets and the `memory.context_limit` setting.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Share of the model window the rolling memory may fill, written either
/// as `"80%"` or as a token count like `"32000"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContextLimit {
    Share(f64),
    Tokens(usize),
}

impl ContextLimit {
    /// Tokens this limit allows inside a `window_tokens` model window.
    /// A token count larger than the window is capped at the window.
    pub fn tokens_of(self, window_tokens: usize) -> usize {
        match self {
            ContextLimit::Share(percent) => (window_tokens as f64 * percent / 100.0).floor() as usize,
            ContextLimit::Tokens(tokens) => tokens.min(window_tokens),
        }
    }
}

impl Default for ContextLimit {
    fn default() -> Self {
        ContextLimit::Share(100.0)
    }
}

impl fmt::Display for ContextLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextLimit::Share(percent) => write!(f, "{}%", percent),
            ContextLimit::Tokens(tokens) => write!(f, "{}", tokens),
        }
    }
}

impl FromStr for ContextLimit {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let value = raw.trim();
        if value.is_empty() {
            bail!("context limit is empty");
        }

        match value.strip_suffix('%') {
            Some(percent) => {
                let percent: f64 = percent
                    .trim()
                    .parse()
                    .with_context(|| format!("'{}' is not a percentage", value))?;
                if !(percent > 0.0 && percent <= 100.0) {
                    bail!("context limit must be in (0%, 100%], got {}", value);
                }
                Ok(ContextLimit::Share(percent))
            }
            None => {
                let tokens: usize = value
                    .parse()
                    .with_context(|| format!("'{}' is not a token count", value))?;
                if tokens == 0 {
                    bail!("context limit must be at least one token");
                }
                Ok(ContextLimit::Tokens(tokens))
            }
        }
    }
}

/// Token budget for one turn: the total the request may use and the part
/// of it held back for the model's reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenBudget {
    pub total: usize,
    pub reserved_for_reply: usize,
}

impl TokenBudget {
    pub fn new(total: usize, reserved_for_reply: usize) -> Self {
        Self {
            total,
            reserved_for_reply,
        }
    }

    /// Budget for a model window capped by `limit`.
    pub fn from_limit(limit: ContextLimit, window_tokens: usize, reserved_for_reply: usize) -> Self {
        Self::new(limit.tokens_of(window_tokens), reserved_for_reply)
    }

    /// Tokens available for prompt content (`total - reserved`).
    pub fn available(&self) -> usize {
        self.total.saturating_sub(self.reserved_for_reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_share_and_tokens() {
        assert_eq!("80%".parse::<ContextLimit>().unwrap(), ContextLimit::Share(80.0));
        assert_eq!(" 12.5 % ".parse::<ContextLimit>().unwrap(), ContextLimit::Share(12.5));
        assert_eq!("32000".parse::<ContextLimit>().unwrap(), ContextLimit::Tokens(32_000));
    }

    #[test]
    fn test_parse_rejects_nonsense() {
        for raw in ["", "  ", "lots", "0%", "101%", "-5%", "NaN%", "0", "-10", "1.5"] {
            assert!(raw.parse::<ContextLimit>().is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn test_tokens_of_window() {
        assert_eq!(ContextLimit::Share(50.0).tokens_of(65_536), 32_768);
        assert_eq!(ContextLimit::default().tokens_of(4096), 4096);
        assert_eq!(ContextLimit::Tokens(10_000).tokens_of(65_536), 10_000);
        assert_eq!(ContextLimit::Tokens(100_000).tokens_of(65_536), 65_536);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for limit in [ContextLimit::Share(80.0), ContextLimit::Tokens(50_000)] {
            assert_eq!(limit.to_string().parse::<ContextLimit>().unwrap(), limit);
        }
    }

    #[test]
    fn test_budget_available_saturates() {
        assert_eq!(TokenBudget::new(100, 20).available(), 80);
        assert_eq!(TokenBudget::new(10, 20).available(), 0);
    }

    #[test]
    fn test_budget_from_limit() {
        let budget = TokenBudget::from_limit(ContextLimit::Share(50.0), 1000, 100);
        assert_eq!(budget.total, 500);
        assert_eq!(budget.available(), 400);
    }
}
