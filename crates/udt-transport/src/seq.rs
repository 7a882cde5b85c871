//! # Sequence Space
//!
//! Monotonic data packet sequence numbers and the microsecond clock used to
//! timestamp outgoing packets.
//!
//! Sequence numbers start at 0 and grow by one per packet for the lifetime of
//! the connection. They never wrap; see [`crate::wire::SEQUENCE_MAX`] for the
//! limit imposed by the wire header.

use quanta::Instant;
use std::sync::atomic::{AtomicU64, Ordering};

// ─── Sequence Generator ─────────────────────────────────────────────────────

/// Thread-safe monotonic sequence number generator.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    /// Count of numbers handed out so far; the next number to issue.
    issued: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next sequence number. The first call returns 0.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::AcqRel)
    }

    /// The last number returned by [`next`](Self::next), or `None` before the
    /// first call.
    pub fn current(&self) -> Option<u64> {
        self.issued.load(Ordering::Acquire).checked_sub(1)
    }
}

// ─── TimestampClock ─────────────────────────────────────────────────────────

/// Microsecond clock for packet timestamps.
/// Wraps every ~71 minutes (u32::MAX µs).
pub struct TimestampClock {
    epoch: Instant,
}

impl TimestampClock {
    pub fn new() -> Self {
        TimestampClock {
            epoch: Instant::now(),
        }
    }

    /// Get current timestamp in µs since epoch.
    pub fn now_us(&self) -> u32 {
        let elapsed = self.epoch.elapsed();
        // Truncation matches the 32-bit timestamp field.
        (elapsed.as_micros() as u64 & 0xFFFF_FFFF) as u32
    }
}

impl Default for TimestampClock {
    fn default() -> Self {
        Self::new()
    }
}
