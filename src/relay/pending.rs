use crate::core::UserId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Last unconfirmed message per user, waiting for "Create New Ticket"
///
/// Holds at most one message per user; a newer message replaces the older
/// one. Contents are not durable and vanish on restart.
#[derive(Debug, Default)]
pub struct PendingMessages {
    inner: Mutex<HashMap<UserId, String>>,
}

impl PendingMessages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `text` for `user_id`, returning the message it replaced
    pub fn stash(&self, user_id: UserId, text: impl Into<String>) -> Option<String> {
        self.lock().insert(user_id, text.into())
    }

    /// Remove and return the pending message
    pub fn take(&self, user_id: UserId) -> Option<String> {
        self.lock().remove(&user_id)
    }

    /// Put back a message taken by [`take`](Self::take) unless a newer one arrived meanwhile
    pub fn restore(&self, user_id: UserId, text: String) {
        self.lock().entry(user_id).or_insert(text);
    }

    pub fn clear(&self, user_id: UserId) {
        self.lock().remove(&user_id);
    }

    // The map stays consistent even if a holder panicked; every critical
    // section is a single HashMap call.
    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
