use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One mutex per conversation id.
///
/// Serialises the read-mutate-seal-write sequence for a single conversation
/// while leaving other conversations free to proceed.
#[derive(Default)]
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(conversation_id.to_string()).or_default().clone()
    }

    /// Forget a conversation's mutex if nobody else holds a handle to it.
    pub fn release(&self, conversation_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(conversation_id)
            .is_some_and(|handle| Arc::strong_count(handle) == 1)
        {
            locks.remove(conversation_id);
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock a handle, recovering from poisoning: the guarded unit carries no state.
pub fn acquire(handle: &Mutex<()>) -> MutexGuard<'_, ()> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
