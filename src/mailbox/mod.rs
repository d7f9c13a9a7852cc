//! Inbox plus liveness endpoint.
//!
//! The inbox is the only channel from subagent workers (and other local
//! processes) back into the life loop. It is drained exactly once per epoch.

pub mod server;

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

pub use server::{bind, build_router, evaluate_health, HealthReport, MailboxState};

/// Source prefix that marks an inbox message as a subagent result.
pub const SUBAGENT_SOURCE_PREFIX: &str = "subagent:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxMessage {
    pub message: String,
    pub source: String,
}

impl InboxMessage {
    pub fn is_from_subagent(&self) -> bool {
        self.source.starts_with(SUBAGENT_SOURCE_PREFIX)
    }
}

/// Append-only buffer swapped out wholesale on drain.
#[derive(Debug, Default)]
pub struct Inbox {
    messages: Mutex<Vec<InboxMessage>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, message: InboxMessage) {
        let mut messages = self.messages.lock().unwrap_or_else(|p| p.into_inner());
        messages.push(message);
    }

    /// Take every pending message, leaving the inbox empty.
    pub fn drain(&self) -> Vec<InboxMessage> {
        let mut messages = self.messages.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *messages)
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str, source: &str) -> InboxMessage {
        InboxMessage {
            message: text.into(),
            source: source.into(),
        }
    }

    #[test]
    fn drain_empties_the_inbox() {
        let inbox = Inbox::new();
        inbox.post(msg("a", "kernel"));
        inbox.post(msg("b", "subagent:x"));
        let drained = inbox.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained[1].is_from_subagent());
        assert!(inbox.is_empty());
        assert!(inbox.drain().is_empty());
    }
}
