//! Reading sequence number.
//!
//! Monotonic across ticks and soft resets, back to 0 on power loss.  The
//! durability comes entirely from the [`SequenceStore`] behind it.

use crate::app::ports::SequenceStore;

pub struct ReadingSequence<Q> {
    store: Q,
}

impl<Q: SequenceStore> ReadingSequence<Q> {
    pub fn new(store: Q) -> Self {
        Self { store }
    }

    /// The id the next recorded reading will carry.
    pub fn current(&self) -> u32 {
        self.store.load()
    }

    /// Move past the current id.
    pub fn advance(&mut self) {
        let next = self.store.load().wrapping_add(1);
        self.store.store(next);
    }
}
