//! Non-blocking bounded LIFO store.
//!
//! Push and pop fail immediately when the stack is full or empty. Blocking
//! semantics live one layer up in [`Coordinator`](crate::coordinator::Coordinator).

use parking_lot::Mutex;

use crate::error::StackError;
use crate::payload::Payload;

/// A mutex-protected stack of payloads with a fixed maximum depth.
///
/// All mutations are serialized by a single lock. There is no ordering
/// guarantee between concurrent callers beyond that serialization.
pub struct BoundedStack {
    entries: Mutex<Vec<Payload>>,
    capacity: usize,
}

impl BoundedStack {
    /// Create an empty stack holding at most `capacity` payloads.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Push a payload on top. Fails with [`StackError::Full`] at capacity.
    pub fn push(&self, payload: Payload) -> Result<(), StackError> {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            return Err(StackError::Full {
                capacity: self.capacity,
            });
        }
        entries.push(payload);
        Ok(())
    }

    /// Remove and return the most recently pushed payload.
    pub fn pop(&self) -> Result<Payload, StackError> {
        self.entries.lock().pop().ok_or(StackError::Empty)
    }

    /// Current depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.lock().len() == self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for BoundedStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedStack")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
