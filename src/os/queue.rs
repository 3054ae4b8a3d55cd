//! One-slot queue with overwrite semantics.

use core::time::Duration;

use super::{Mutex, Signal};

/// A bounded queue of capacity one where the producer never blocks: a new
/// element replaces whatever is in the slot. A counting signal implements
/// the consumer-side wait.
///
/// This is the rendezvous shape the command engine needs twice: the awaited
/// command hand-off and the command result. Overwrite-on-full is what makes
/// a timed-out command harmless; its late result just sits in the slot
/// until the next send replaces it or the mismatch check discards it.
pub struct OverwriteQueue<T> {
    slot: Mutex<Option<T>>,
    available: Signal,
}

impl<T> OverwriteQueue<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            available: Signal::new(1),
        }
    }

    /// Replace the slot content. Never blocks.
    pub fn overwrite(&self, value: T) {
        *self.slot.lock() = Some(value);
        self.available.raise();
    }

    /// Take the slot content, waiting up to `timeout` for one to appear.
    /// `Duration::ZERO` polls without blocking. Returns `None` on timeout.
    pub fn receive(&self, timeout: Duration) -> Option<T> {
        loop {
            if !self.available.wait(timeout) {
                return None;
            }
            if let Some(value) = self.slot.lock().take() {
                return Some(value);
            }
            // The signal saturated while the slot was overwritten several
            // times; wait for the next raise.
        }
    }
}

impl<T> Default for OverwriteQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
