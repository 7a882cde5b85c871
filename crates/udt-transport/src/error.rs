//! Error types for the sender engine, the wire codec and configuration.

use std::io;
use thiserror::Error;

/// Errors surfaced by the sender engine and its runtime handle.
#[derive(Debug, Error)]
pub enum SenderError {
    /// The transmission sink failed while sending new data. Fatal to the worker.
    #[error("transmission failed: {0}")]
    Io(#[from] io::Error),
    /// The worker has stopped and no longer accepts data.
    #[error("sender stopped")]
    Stopped,
    /// The worker thread panicked.
    #[error("sender worker panicked")]
    WorkerPanicked,
}

/// Errors produced while encoding or decoding UDT packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("buffer truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("unsupported control packet type {0:#06x}")]
    UnsupportedControl(u16),
    #[error("sequence number {0} does not fit in 31 bits")]
    SequenceOverflow(u64),
    #[error("message number {0} does not fit in 29 bits")]
    MessageNumberOverflow(u32),
    #[error("loss range starting at {0} has no end")]
    UnterminatedRange(u32),
    #[error("loss range {start}..={end} exceeds the {max}-entry limit")]
    LossRangeTooLarge { start: u32, end: u32, max: u32 },
    #[error("NAK expands to {entries} sequence numbers, limit is {max}")]
    NakTooLarge { entries: u64, max: u64 },
    #[error("payload of {0} bytes exceeds the datagram limit")]
    PayloadTooLarge(usize),
}

impl From<WireError> for io::Error {
    fn from(e: WireError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, e)
    }
}

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read config file: {0}")]
    Read(#[from] io::Error),
    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("poll_timeout_ms must be non-zero")]
    ZeroPollTimeout,
    #[error("session.flow_window must be at least 1")]
    ZeroFlowWindow,
    #[error("max_payload_size {0} is outside 1..={max}", max = crate::wire::MAX_PAYLOAD_LEN)]
    PayloadSize(usize),
}
