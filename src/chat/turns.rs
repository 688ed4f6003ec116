//! Per-conversation turn serialization.
//!
//! At most one turn runs per conversation. A second `send_message` while a
//! turn is active is rejected rather than queued: model calls are not
//! idempotent and interleaved replies would scramble the transcript.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::store::ConversationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    AssemblingContext,
    AwaitingReply,
}

#[derive(Debug, Clone, Default)]
pub struct TurnLocks {
    active: Arc<Mutex<HashMap<ConversationId, TurnPhase>>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationId, TurnPhase>> {
        // The map holds no invariants a panicking holder could break.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the conversation for one turn, or `None` if a turn is running.
    pub fn try_begin(&self, id: ConversationId) -> Option<TurnGuard> {
        let mut active = self.lock();
        if active.contains_key(&id) {
            return None;
        }
        active.insert(id, TurnPhase::AssemblingContext);
        Some(TurnGuard {
            locks: self.clone(),
            id,
        })
    }

    pub fn phase(&self, id: ConversationId) -> TurnPhase {
        self.lock().get(&id).copied().unwrap_or(TurnPhase::Idle)
    }
}

/// Releases the conversation when dropped, on success, error or panic alike.
#[derive(Debug)]
pub struct TurnGuard {
    locks: TurnLocks,
    id: ConversationId,
}

impl TurnGuard {
    pub fn advance(&self, phase: TurnPhase) {
        if let Some(current) = self.locks.lock().get_mut(&self.id) {
            *current = phase;
        }
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_turn_is_rejected() {
        let locks = TurnLocks::new();
        let id = ConversationId::new();
        let guard = locks.try_begin(id);
        assert!(guard.is_some());
        assert!(locks.try_begin(id).is_none());
    }

    #[test]
    fn test_release_on_drop() {
        let locks = TurnLocks::new();
        let id = ConversationId::new();
        {
            let _guard = locks.try_begin(id).unwrap();
            assert_eq!(locks.phase(id), TurnPhase::AssemblingContext);
        }
        assert_eq!(locks.phase(id), TurnPhase::Idle);
        assert!(locks.try_begin(id).is_some());
    }

    #[test]
    fn test_conversations_are_independent() {
        let locks = TurnLocks::new();
        let a = locks.try_begin(ConversationId::new());
        let b = locks.try_begin(ConversationId::new());
        assert!(a.is_some() && b.is_some());
    }

    #[test]
    fn test_advance_phase() {
        let locks = TurnLocks::new();
        let id = ConversationId::new();
        let guard = locks.try_begin(id).unwrap();
        guard.advance(TurnPhase::AwaitingReply);
        assert_eq!(locks.phase(id), TurnPhase::AwaitingReply);
    }
}
