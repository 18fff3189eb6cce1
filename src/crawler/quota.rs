//! Global record quota shared by every extraction unit
//!
//! The quota is the only process-wide mutable counter in the crawl. Workers
//! claim room for a batch with [`Quota::take`] before committing it; the counter
//! only ever grows.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counter of emitted review records against a fixed target
#[derive(Debug)]
pub struct Quota {
    target: u64,
    emitted: AtomicU64,
}

impl Quota {
    /// Creates a quota with nothing emitted yet
    pub fn new(target: u64) -> Self {
        Self {
            target,
            emitted: AtomicU64::new(0),
        }
    }

    /// Returns true once the emitted count has reached the target
    pub fn reached(&self) -> bool {
        self.emitted.load(Ordering::Acquire) >= self.target
    }

    /// Claims room for up to `n` records
    ///
    /// # Arguments
    ///
    /// * `n` - Number of records the caller would like to emit
    ///
    /// # Returns
    ///
    /// The number of records accepted, `min(n, target - emitted)`. The
    /// accepted amount is added to the emitted count atomically and is never
    /// given back.
    pub fn take(&self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }

        let mut accepted = 0;
        // fetch_update retries the closure on contention, so `accepted` always
        // reflects the value that was finally stored.
        let _ = self
            .emitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let room = self.target.saturating_sub(current);
                accepted = n.min(room);
                if accepted == 0 {
                    None
                } else {
                    Some(current + accepted)
                }
            });
        accepted
    }

    /// Records emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Acquire)
    }

    /// Records still wanted before the target is reached
    pub fn remaining(&self) -> u64 {
        self.target.saturating_sub(self.emitted())
    }

    pub fn target(&self) -> u64 {
        self.target
    }
}
