//! Blocking producer/consumer buffer over [`BoundedStack`].
//!
//! The coordinator turns the stack's instant-fail push/pop into operations
//! that wait for a slot, and that any single caller can abandon through its
//! own [`CancellationToken`]:
//!
//! - `blocking_push` waits while the stack is full,
//! - `blocking_pop` waits while the stack is empty,
//! - either returns [`CoordinatorError::Canceled`] as soon as the caller's
//!   token fires, leaving the stack untouched.
//!
//! ## Occupancy counter
//!
//! Occupancy is held in a [`watch`] channel. A waiter parks on
//! [`watch::Receiver::wait_for`] until the counter says a slot might be
//! claimable, then tries to claim it with [`watch::Sender::send_if_modified`].
//! The stack is mutated *inside* that closure, under the channel's write
//! lock, so claim and mutation are one step and occupancy always equals
//! stack depth when any operation completes. A waiter that loses the race
//! simply parks again. There is no queueing order between waiters.
//!
//! Lock order is always occupancy → stack.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{CoordinatorError, StackError};
use crate::payload::Payload;
use crate::stack::BoundedStack;

/// Capacity-gated blocking access to a shared [`BoundedStack`].
pub struct Coordinator {
    stack: BoundedStack,
    occupancy: watch::Sender<usize>,
}

impl Coordinator {
    /// Create a coordinator over an empty stack of `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (occupancy, _) = watch::channel(0);
        Self {
            stack: BoundedStack::new(capacity),
            occupancy,
        }
    }

    /// Push `payload`, waiting while the stack is full.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Canceled`] if `cancel` fires first
    /// - [`CoordinatorError::Desync`] if the stack rejects a claimed slot
    pub async fn blocking_push(
        &self,
        cancel: &CancellationToken,
        payload: Payload,
    ) -> Result<(), CoordinatorError> {
        let capacity = self.stack.capacity();
        let mut rx = self.occupancy.subscribe();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoordinatorError::Canceled),
                ready = rx.wait_for(|depth| *depth < capacity) => {
                    ready.map(|_| ()).map_err(|_| CoordinatorError::Closed)?;
                }
            }

            match self.claim_push(cancel, &payload) {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => {
                    error!(
                        error = %e,
                        occupancy = *self.occupancy.borrow(),
                        "Occupancy counter out of sync on push"
                    );
                    return Err(CoordinatorError::Desync(e));
                }
                // Lost the slot to another pusher, or cancelled.
                None => continue,
            }
        }
    }

    /// Pop the most recently pushed payload, waiting while the stack is empty.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Canceled`] if `cancel` fires first
    /// - [`CoordinatorError::Desync`] if the stack is empty despite a claimed slot
    pub async fn blocking_pop(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Payload, CoordinatorError> {
        let mut rx = self.occupancy.subscribe();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CoordinatorError::Canceled),
                ready = rx.wait_for(|depth| *depth > 0) => {
                    ready.map(|_| ()).map_err(|_| CoordinatorError::Closed)?;
                }
            }

            match self.claim_pop(cancel) {
                Some(Ok(payload)) => return Ok(payload),
                Some(Err(e)) => {
                    error!(
                        error = %e,
                        occupancy = *self.occupancy.borrow(),
                        "Occupancy counter out of sync on pop"
                    );
                    return Err(CoordinatorError::Desync(e));
                }
                None => continue,
            }
        }
    }

    /// Try to take a free slot and push into it, all under the occupancy
    /// lock. `None` means nothing was claimed: the stack was full or `cancel`
    /// had already fired.
    fn claim_push(
        &self,
        cancel: &CancellationToken,
        payload: &Payload,
    ) -> Option<Result<(), StackError>> {
        let capacity = self.stack.capacity();
        let mut claimed = None;
        self.occupancy.send_if_modified(|depth| {
            if *depth >= capacity || cancel.is_cancelled() {
                return false;
            }
            let result = self.stack.push(payload.clone());
            let pushed = result.is_ok();
            if pushed {
                *depth += 1;
            }
            claimed = Some(result);
            pushed
        });
        claimed
    }

    /// Pop counterpart of [`claim_push`](Self::claim_push).
    fn claim_pop(&self, cancel: &CancellationToken) -> Option<Result<Payload, StackError>> {
        let mut claimed = None;
        self.occupancy.send_if_modified(|depth| {
            if *depth == 0 || cancel.is_cancelled() {
                return false;
            }
            let result = self.stack.pop();
            let popped = result.is_ok();
            if popped {
                *depth -= 1;
            }
            claimed = Some(result);
            popped
        });
        claimed
    }

    /// Current value of the occupancy counter.
    #[must_use]
    pub fn occupancy(&self) -> usize {
        *self.occupancy.borrow()
    }

    /// Current stack depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.stack.capacity()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("occupancy", &self.occupancy())
            .field("stack", &self.stack)
            .finish()
    }
}
