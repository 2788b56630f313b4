//! Append-only conversation log.
//!
//! The façade is the only writer. Readers take snapshots, so a preload
//! request or ad config never observes a message appended after it was built.

use std::sync::{Arc, PoisonError, RwLock};

use crate::model::ChatMessage;

/// Ordered log of chat messages shared between the façade and its tasks.
///
/// Cloning is cheap and yields a handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    inner: Arc<RwLock<Vec<ChatMessage>>>,
}

impl Conversation {
    /// Create an empty conversation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation seeded with prior history.
    #[must_use]
    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(messages)),
        }
    }

    /// Append a message.
    pub fn push(&self, message: ChatMessage) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Copy of all messages in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if no message has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
