//! Outbound queue: durable, at-least-once messages to provider
//! mirror consumers. Modeled as a trait so a real durable queue can stand
//! in for the in-process test implementation without touching actor code,
//! the same trait-seam shape as decapod's
//! `core::external_action::ExternalCapability` gate.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueMessage {
    #[serde(rename = "DELETE_MIRROR")]
    DeleteMirror {
        canonical_event_id: String,
        target_account_id: String,
        target_calendar_id: String,
    },
    #[serde(rename = "DELETE_USER_MIRRORS")]
    DeleteUserMirrors {
        user_id: String,
        account_id: String,
        provider: String,
    },
}

/// Consumers of these messages must be idempotent and must treat a
/// missing target as a non-error — that contract lives with the
/// consumer, not this trait.
pub trait OutboundQueue: Send + Sync {
    fn enqueue(&self, msg: QueueMessage) -> Result<(), crate::TminusError>;
}

/// In-process, `Vec`-backed queue for tests and local runs. Not durable;
/// a production deployment swaps in a real queue behind [`OutboundQueue`].
#[derive(Default)]
pub struct InMemoryQueue {
    sent: Mutex<Vec<QueueMessage>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<QueueMessage> {
        std::mem::take(&mut *self.sent.lock().expect("queue lock poisoned"))
    }

    pub fn len(&self) -> usize {
        self.sent.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutboundQueue for InMemoryQueue {
    fn enqueue(&self, msg: QueueMessage) -> Result<(), crate::TminusError> {
        self.sent.lock().expect("queue lock poisoned").push(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_and_drain_roundtrip() {
        let queue = InMemoryQueue::new();
        queue
            .enqueue(QueueMessage::DeleteUserMirrors {
                user_id: "u1".to_string(),
                account_id: "acc-1".to_string(),
                provider: "google".to_string(),
            })
            .unwrap();
        assert_eq!(queue.len(), 1);
        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert!(queue.is_empty());
    }
}
