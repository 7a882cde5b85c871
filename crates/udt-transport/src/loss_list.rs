//! # Sender Loss List
//!
//! Sequence numbers the peer reported lost (or that an EXP timeout presumed
//! lost), waiting for one retransmission attempt each.
//!
//! Entries are kept ordered so the oldest loss is retransmitted first: it is
//! the one blocking in-order delivery at the receiver the longest. Inserting a
//! number that is already pending is a no-op.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe ordered set of pending retransmissions.
#[derive(Debug, Default)]
pub struct SenderLossList {
    pending: Mutex<BTreeSet<u64>>,
}

impl SenderLossList {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<u64>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark a sequence number for retransmission.
    /// Returns false if it was already pending.
    pub fn insert(&self, seq: u64) -> bool {
        self.lock().insert(seq)
    }

    /// Insert many sequence numbers under a single lock.
    /// Returns how many were newly added.
    pub fn insert_all(&self, seqs: impl IntoIterator<Item = u64>) -> usize {
        let mut pending = self.lock();
        seqs.into_iter().filter(|&seq| pending.insert(seq)).count()
    }

    /// Lowest pending sequence number.
    pub fn first(&self) -> Option<u64> {
        self.lock().first().copied()
    }

    pub fn remove(&self, seq: u64) -> bool {
        self.lock().remove(&seq)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of sequences pending retransmission.
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
