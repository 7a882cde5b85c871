//! # Sender Statistics
//!
//! Counters the engine bumps as a side effect of sending and of processing
//! feedback. Shared through an `Arc` so the session owner can read them while
//! the sender loop and the network thread write them.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live sender counters. All updates are relaxed atomic increments.
#[derive(Debug, Default)]
pub struct SenderStats {
    sent_data_packets: AtomicU64,
    retransmitted_data_packets: AtomicU64,
    retransmits_skipped: AtomicU64,
    naks_received: AtomicU64,
    acks_received: AtomicU64,
    ack2_sent: AtomicU64,
    keep_alives_sent: AtomicU64,
    exp_events: AtomicU64,
    bytes_sent: AtomicU64,
}

impl SenderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_sent_data_packets(&self, payload_len: usize) {
        self.sent_data_packets.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub fn inc_retransmitted_data_packets(&self) {
        self.retransmitted_data_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retransmits_skipped(&self) {
        self.retransmits_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_naks_received(&self) {
        self.naks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_acks_received(&self) {
        self.acks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ack2_sent(&self) {
        self.ack2_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_keep_alives_sent(&self) {
        self.keep_alives_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_exp_events(&self) {
        self.exp_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent_data_packets(&self) -> u64 {
        self.sent_data_packets.load(Ordering::Relaxed)
    }

    pub fn retransmitted_data_packets(&self) -> u64 {
        self.retransmitted_data_packets.load(Ordering::Relaxed)
    }

    pub fn naks_received(&self) -> u64 {
        self.naks_received.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> SenderStatsSnapshot {
        SenderStatsSnapshot {
            sent_data_packets: self.sent_data_packets.load(Ordering::Relaxed),
            retransmitted_data_packets: self.retransmitted_data_packets.load(Ordering::Relaxed),
            retransmits_skipped: self.retransmits_skipped.load(Ordering::Relaxed),
            naks_received: self.naks_received.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            ack2_sent: self.ack2_sent.load(Ordering::Relaxed),
            keep_alives_sent: self.keep_alives_sent.load(Ordering::Relaxed),
            exp_events: self.exp_events.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`SenderStats`] for logging and JSON export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SenderStatsSnapshot {
    /// New data packets transmitted (excludes retransmissions).
    pub sent_data_packets: u64,
    /// Retransmissions of buffered packets.
    pub retransmitted_data_packets: u64,
    /// Loss entries dropped because the packet was already acknowledged.
    pub retransmits_skipped: u64,
    pub naks_received: u64,
    pub acks_received: u64,
    pub ack2_sent: u64,
    pub keep_alives_sent: u64,
    /// EXP timeouts that pushed the send buffer into the loss list.
    pub exp_events: u64,
    /// Payload bytes of new data packets.
    pub bytes_sent: u64,
}

impl SenderStatsSnapshot {
    /// Retransmission overhead ratio.
    pub fn retransmit_ratio(&self) -> f64 {
        if self.sent_data_packets == 0 {
            0.0
        } else {
            self.retransmitted_data_packets as f64 / self.sent_data_packets as f64
        }
    }
}
