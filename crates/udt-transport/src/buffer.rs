//! # Send Buffer
//!
//! Holds every data packet that has been transmitted and not yet
//! acknowledged, keyed by sequence number.
//!
//! The map, the unacknowledged counter and the last acknowledged sequence
//! number change together under one mutex, so the counter always equals the
//! number of buffered packets. The counter is mirrored into an atomic so the
//! sender loop can check the flow window without taking the lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::wire::DataPacket;

struct Inner {
    entries: BTreeMap<u64, DataPacket>,
    /// Exclusive upper bound acknowledged by the peer.
    last_ack: u64,
}

/// Sequence number → unacknowledged data packet.
pub struct SendBuffer {
    inner: Mutex<Inner>,
    unacknowledged: AtomicUsize,
}

impl SendBuffer {
    pub fn new() -> Self {
        SendBuffer {
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                last_ack: 0,
            }),
            unacknowledged: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a transmitted packet.
    ///
    /// Returns `false` (and leaves the buffer untouched) if the sequence number
    /// is already buffered.
    pub fn insert(&self, packet: DataPacket) -> bool {
        self.insert_with(packet, |_| Ok::<(), std::convert::Infallible>(()))
            .unwrap_or(false)
    }

    /// Run `transmit` and record the packet, both inside the buffer lock.
    ///
    /// An acknowledgment racing with the transmission cannot observe the
    /// packet as sent but not buffered. The packet is buffered only if
    /// `transmit` succeeds.
    pub fn insert_with<E>(
        &self,
        packet: DataPacket,
        transmit: impl FnOnce(&DataPacket) -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut inner = self.lock();
        if inner.entries.contains_key(&packet.sequence) {
            return Ok(false);
        }
        transmit(&packet)?;
        inner.entries.insert(packet.sequence, packet);
        self.unacknowledged.fetch_add(1, Ordering::AcqRel);
        Ok(true)
    }

    /// Remove every buffered sequence number in `[last_ack, ack_number)` and
    /// advance `last_ack` to `ack_number`.
    ///
    /// Absent numbers are skipped. An `ack_number` at or below the current
    /// `last_ack` removes nothing and leaves `last_ack` unchanged. Returns the
    /// number of packets removed.
    pub fn remove_up_to(&self, ack_number: u64) -> usize {
        let mut inner = self.lock();
        if ack_number <= inner.last_ack {
            return 0;
        }
        let acked: Vec<u64> = inner
            .entries
            .range(inner.last_ack..ack_number)
            .map(|(&seq, _)| seq)
            .collect();
        for seq in &acked {
            inner.entries.remove(seq);
        }
        inner.last_ack = ack_number;
        self.unacknowledged.fetch_sub(acked.len(), Ordering::AcqRel);
        acked.len()
    }

    /// Clone of the buffered packet, if it is still unacknowledged.
    pub fn get(&self, seq: u64) -> Option<DataPacket> {
        self.lock().entries.get(&seq).cloned()
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.lock().entries.contains_key(&seq)
    }

    /// All buffered sequence numbers, ascending.
    pub fn snapshot_keys(&self) -> Vec<u64> {
        self.lock().entries.keys().copied().collect()
    }

    /// Exclusive upper bound acknowledged so far.
    pub fn last_ack(&self) -> u64 {
        self.lock().last_ack
    }

    /// Number of unacknowledged packets. Lock-free.
    pub fn unacknowledged(&self) -> usize {
        self.unacknowledged.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unacknowledged() == 0
    }
}

impl Default for SendBuffer {
    fn default() -> Self {
        Self::new()
    }
}
