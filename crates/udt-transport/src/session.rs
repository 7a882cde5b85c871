//! # Session Capabilities
//!
//! Narrow interfaces the sender engine borrows from the connection that owns
//! it: the peer's flow window and socket id, and the receiver-side EXP timer.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Connection parameters the sender reads on every loop iteration.
pub trait SessionContext: Send + Sync {
    /// Maximum number of unacknowledged packets allowed in flight.
    fn flow_window_size(&self) -> usize;

    /// Socket id of the peer, stamped on every outgoing packet.
    fn destination_id(&self) -> u32 {
        0
    }
}

/// Receiver-side expiration timer. Reset whenever a NAK arrives.
pub trait ExpTimer: Send + Sync {
    fn reset_exp_timer(&self);
}

impl<F> ExpTimer for F
where
    F: Fn() + Send + Sync,
{
    fn reset_exp_timer(&self) {
        self()
    }
}

/// Timer that ignores resets.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTimer;

impl ExpTimer for NoopTimer {
    fn reset_exp_timer(&self) {}
}

// ─── Session ────────────────────────────────────────────────────────────────

/// Shared session state. The flow window can be adjusted while the sender
/// runs, e.g. from the available-buffer field of incoming ACKs.
#[derive(Debug)]
pub struct Session {
    flow_window: AtomicUsize,
    destination_id: AtomicU32,
}

impl Session {
    pub fn new(flow_window: usize, destination_id: u32) -> Self {
        Session {
            flow_window: AtomicUsize::new(flow_window),
            destination_id: AtomicU32::new(destination_id),
        }
    }

    pub fn set_flow_window_size(&self, window: usize) {
        self.flow_window.store(window, Ordering::Relaxed);
    }

    /// Set after the handshake tells us the peer's socket id.
    pub fn set_destination_id(&self, id: u32) {
        self.destination_id.store(id, Ordering::Relaxed);
    }
}

impl SessionContext for Session {
    fn flow_window_size(&self) -> usize {
        self.flow_window.load(Ordering::Relaxed)
    }

    fn destination_id(&self) -> u32 {
        self.destination_id.load(Ordering::Relaxed)
    }
}
