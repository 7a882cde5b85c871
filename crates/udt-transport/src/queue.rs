//! # Ingress Queue
//!
//! Bounded handoff between the application and the sender loop. A full queue
//! pushes back on the producer; nothing is ever overwritten.
//!
//! A packet counts as pending from the moment it is offered until the sender
//! loop has finished handling it, so there is no window in which a packet is
//! neither pending nor in the send buffer.

use crossbeam_channel::{
    bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::wire::DataPacket;

/// Default ingress capacity, in packets.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Outcome of a blocking offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// The queue stayed full (for the whole timeout, if one was given).
    Full,
    /// The sender loop is gone.
    Closed,
}

impl Offer {
    pub fn is_accepted(self) -> bool {
        self == Offer::Accepted
    }
}

/// Every producer has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

/// Producer half, held by the application side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: Sender<DataPacket>,
    pending: Arc<AtomicUsize>,
}

/// Consumer half, owned by the sender loop.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: Receiver<DataPacket>,
    pending: Arc<AtomicUsize>,
}

/// Create a bounded ingress queue.
pub fn ingress_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = bounded(capacity);
    let pending = Arc::new(AtomicUsize::new(0));
    (
        QueueProducer {
            tx,
            pending: pending.clone(),
        },
        QueueConsumer { rx, pending },
    )
}

impl QueueProducer {
    /// Non-blocking offer.
    pub fn offer(&self, packet: DataPacket) -> Offer {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let offer = match self.tx.try_send(packet) {
            Ok(()) => Offer::Accepted,
            Err(TrySendError::Full(_)) => Offer::Full,
            Err(TrySendError::Disconnected(_)) => Offer::Closed,
        };
        self.settle(offer)
    }

    /// Offer, waiting at most `timeout` for space.
    pub fn offer_timeout(&self, packet: DataPacket, timeout: Duration) -> Offer {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let offer = match self.tx.send_timeout(packet, timeout) {
            Ok(()) => Offer::Accepted,
            Err(SendTimeoutError::Timeout(_)) => Offer::Full,
            Err(SendTimeoutError::Disconnected(_)) => Offer::Closed,
        };
        self.settle(offer)
    }

    /// Offer, waiting as long as needed for space.
    pub fn offer_blocking(&self, packet: DataPacket) -> Offer {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let offer = match self.tx.send(packet) {
            Ok(()) => Offer::Accepted,
            Err(_) => Offer::Closed,
        };
        self.settle(offer)
    }

    fn settle(&self, offer: Offer) -> Offer {
        if offer != Offer::Accepted {
            self.pending.fetch_sub(1, Ordering::AcqRel);
        }
        offer
    }

    /// Packets offered and not yet handled by the sender loop.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueConsumer {
    /// Wait up to `timeout` for a packet.
    ///
    /// `Ok(None)` on timeout; `Err(QueueClosed)` once every producer has been
    /// dropped and the queue is drained.
    pub fn poll(&self, timeout: Duration) -> Result<Option<DataPacket>, QueueClosed> {
        match self.rx.recv_timeout(timeout) {
            Ok(packet) => Ok(Some(packet)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueueClosed),
        }
    }

    /// The packet last returned by [`poll`](Self::poll) has been dealt with.
    pub fn handled(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Packets sitting in the channel.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
