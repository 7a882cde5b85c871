//! # Sender Engine
//!
//! Reliable transmission of data packets to one peer.
//!
//! [`SenderEngine`] holds all sender state and exposes one loop iteration as
//! [`SenderEngine::step`], so it can be driven deterministically. [`UdtSender`]
//! runs that loop on a dedicated thread and is what applications hold.
//!
//! ## Loop iteration
//!
//! 1. If the loss list has an entry, take the lowest, remove it, and resend the
//!    buffered packet if it is still unacknowledged.
//! 2. Otherwise, if fewer than `flow_window_size()` packets are in flight,
//!    wait briefly on the ingress queue and transmit what arrives.
//! 3. Yield.
//!
//! Retransmission always preempts new data. A retransmission failure is
//! logged and the loop carries on; a failure to transmit new data stops the
//! worker.
//!
//! Feedback (`on_acknowledge`, `on_negative_acknowledge`, `on_exp_timeout`) is
//! called from the network thread and only touches the send buffer and the
//! loss list, never the socket, except for the ACK2 reply.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::buffer::SendBuffer;
use crate::config::SenderConfig;
use crate::error::SenderError;
use crate::loss_list::SenderLossList;
use crate::queue::{ingress_queue, Offer, QueueClosed, QueueConsumer, QueueProducer};
use crate::seq::{SequenceGenerator, TimestampClock};
use crate::session::{ExpTimer, NoopTimer, SessionContext};
use crate::sink::PacketSink;
use crate::stats::SenderStats;
use crate::wire::{
    ControlBody, ControlPacket, DataPacket, MessagePosition, Packet, MESSAGE_NUMBER_MAX,
};

// ─── Progress ───────────────────────────────────────────────────────────────

/// What a single loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// A buffered packet was sent again.
    Retransmitted(u64),
    /// The loss entry was dropped because the packet is no longer buffered.
    Skipped(u64),
    /// The loss entry was dropped after the resend failed.
    RetransmitFailed(u64),
    /// A new packet was transmitted and buffered.
    Sent(u64),
    /// Flow window exhausted; nothing admitted.
    WindowFull,
    /// Nothing arrived within the poll timeout.
    Idle,
    /// Every producer is gone.
    Closed,
}

// ─── Sender Engine ──────────────────────────────────────────────────────────

/// Sender state shared between the worker loop, the application and the
/// network thread delivering feedback.
pub struct SenderEngine {
    config: SenderConfig,
    sink: Arc<dyn PacketSink>,
    session: Arc<dyn SessionContext>,
    timer: Arc<dyn ExpTimer>,
    stats: Arc<SenderStats>,
    buffer: SendBuffer,
    loss_list: SenderLossList,
    sequences: SequenceGenerator,
    message_numbers: AtomicU32,
    clock: TimestampClock,
    /// Largest transmitted sequence number plus one; 0 before the first send.
    largest_sent: AtomicU64,
    stopped: AtomicBool,
}

impl SenderEngine {
    pub fn new(
        config: SenderConfig,
        sink: Arc<dyn PacketSink>,
        session: Arc<dyn SessionContext>,
    ) -> Self {
        SenderEngine {
            config,
            sink,
            session,
            timer: Arc::new(NoopTimer),
            stats: Arc::new(SenderStats::new()),
            buffer: SendBuffer::new(),
            loss_list: SenderLossList::new(),
            sequences: SequenceGenerator::new(),
            message_numbers: AtomicU32::new(0),
            clock: TimestampClock::new(),
            largest_sent: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Timer reset whenever a NAK arrives.
    pub fn with_exp_timer(mut self, timer: Arc<dyn ExpTimer>) -> Self {
        self.timer = timer;
        self
    }

    /// Share an externally owned statistics sink.
    pub fn with_stats(mut self, stats: Arc<SenderStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<SenderStats> {
        &self.stats
    }

    // ── Loop ──

    /// Run one iteration of the sender loop (without the trailing yield).
    ///
    /// Returns `Err` only when new data could not be transmitted.
    pub fn step(&self, queue: &QueueConsumer) -> Result<Progress, SenderError> {
        if let Some(seq) = self.loss_list.first() {
            // TODO: every 16th sequence number, expire loss entries past their
            // TTL and send a message drop request for them.
            self.loss_list.remove(seq);
            return Ok(self.retransmit(seq));
        }

        if self.buffer.unacknowledged() >= self.session.flow_window_size() {
            return Ok(Progress::WindowFull);
        }

        match queue.poll(self.config.poll_timeout) {
            Ok(Some(packet)) => {
                let progress = self.transmit(packet);
                queue.handled();
                progress
            }
            Ok(None) => Ok(Progress::Idle),
            Err(QueueClosed) => Ok(Progress::Closed),
        }
    }

    fn retransmit(&self, seq: u64) -> Progress {
        let Some(packet) = self.buffer.get(seq) else {
            self.stats.inc_retransmits_skipped();
            trace!(seq, "loss entry already acknowledged");
            return Progress::Skipped(seq);
        };
        match self.sink.send(&Packet::Data(packet)) {
            Ok(_) => {
                self.stats.inc_retransmitted_data_packets();
                trace!(seq, "retransmitted");
                Progress::Retransmitted(seq)
            }
            Err(e) => {
                warn!(seq, error = %e, "retransmission failed");
                Progress::RetransmitFailed(seq)
            }
        }
    }

    fn transmit(&self, packet: DataPacket) -> Result<Progress, SenderError> {
        let seq = packet.sequence;
        let payload_len = packet.payload.len();
        let buffered = self
            .buffer
            .insert_with(packet, |p| self.sink.send(&Packet::Data(p.clone())).map(|_| ()))?;
        if !buffered {
            debug!(seq, "sequence number already in flight; dropped");
            return Ok(Progress::Idle);
        }
        self.stats.inc_sent_data_packets(payload_len);
        self.largest_sent.fetch_max(seq + 1, Ordering::Relaxed);
        trace!(seq, len = payload_len, "sent");
        Ok(Progress::Sent(seq))
    }

    // ── Feedback ──

    /// Handle an ACK: everything below `ack_number` has been received.
    ///
    /// Drops the acknowledged packets and answers with an ACK2. A stale or
    /// repeated ACK removes nothing but is still answered.
    pub fn on_acknowledge(&self, ack_number: u64) -> Result<(), SenderError> {
        self.stats.inc_acks_received();
        let removed = self.buffer.remove_up_to(ack_number);
        debug!(ack_number, removed, in_flight = self.buffer.unacknowledged(), "ACK");

        let ack2 = ControlPacket::ack2(self.session.destination_id(), ack_number)
            .with_timestamp(self.clock.now_us());
        self.sink.send(&ack2.into())?;
        self.stats.inc_ack2_sent();
        Ok(())
    }

    /// Handle a NAK. Lost sequence numbers are queued for retransmission by
    /// the loop; nothing is resent from here. Returns how many were new.
    pub fn on_negative_acknowledge(&self, lost: impl IntoIterator<Item = u64>) -> usize {
        let added = self.loss_list.insert_all(lost);
        self.timer.reset_exp_timer();
        self.stats.inc_naks_received();
        debug!(added, pending = self.loss_list.len(), "NAK");
        added
    }

    /// EXP timer fired: presume every unacknowledged packet lost.
    pub fn on_exp_timeout(&self) {
        let keys = self.buffer.snapshot_keys();
        for &seq in &keys {
            debug!(seq, "EXP: queued for retransmission");
        }
        self.loss_list.insert_all(keys);
        self.stats.inc_exp_events();
    }

    /// Route an inbound control packet. Types other than ACK and NAK are
    /// ignored.
    pub fn receive(&self, packet: &ControlPacket) -> Result<(), SenderError> {
        match &packet.body {
            ControlBody::Ack(ack) => self.on_acknowledge(ack.ack_number),
            ControlBody::Nak(nak) => {
                self.on_negative_acknowledge(nak.decoded_loss_info());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn send_keep_alive(&self) -> Result<(), SenderError> {
        let packet = ControlPacket::keep_alive(self.session.destination_id())
            .with_timestamp(self.clock.now_us());
        self.sink.send(&packet.into())?;
        self.stats.inc_keep_alives_sent();
        Ok(())
    }

    // ── Packetisation ──

    /// Stamp a single-packet message with the next sequence number.
    pub fn packetize(&self, payload: Bytes) -> DataPacket {
        let message_number = self.next_message_number();
        self.stamp(payload, message_number, MessagePosition::Solo)
    }

    fn stamp(&self, payload: Bytes, message_number: u32, position: MessagePosition) -> DataPacket {
        DataPacket::new(self.sequences.next(), payload)
            .with_message(message_number, position)
            .with_timestamp(self.clock.now_us())
            .with_destination(self.session.destination_id())
    }

    fn next_message_number(&self) -> u32 {
        self.message_numbers.fetch_add(1, Ordering::Relaxed) & MESSAGE_NUMBER_MAX
    }

    /// Split `data` into packets of at most `max_payload_size` bytes sharing
    /// one message number. A zero payload size is treated as one byte.
    fn fragment(&self, data: Bytes) -> Vec<DataPacket> {
        let max = self.config.max_payload_size.max(1);
        let count = data.len().div_ceil(max);
        let message_number = self.next_message_number();
        (0..count)
            .map(|i| {
                let position = match (i == 0, i + 1 == count) {
                    (true, true) => MessagePosition::Solo,
                    (true, false) => MessagePosition::First,
                    (false, true) => MessagePosition::Last,
                    (false, false) => MessagePosition::Middle,
                };
                let end = ((i + 1) * max).min(data.len());
                self.stamp(data.slice(i * max..end), message_number, position)
            })
            .collect()
    }

    // ── Queries ──

    /// Issue a fresh sequence number.
    pub fn next_sequence_number(&self) -> u64 {
        self.sequences.next()
    }

    /// Last issued sequence number, `None` before the first.
    pub fn current_sequence_number(&self) -> Option<u64> {
        self.sequences.current()
    }

    pub fn largest_sent_sequence_number(&self) -> Option<u64> {
        self.largest_sent.load(Ordering::Relaxed).checked_sub(1)
    }

    /// True while `seq` sits in the send buffer.
    pub fn is_unacknowledged(&self, seq: u64) -> bool {
        self.buffer.contains(seq)
    }

    pub fn is_sent_out(&self, seq: u64) -> bool {
        self.largest_sent_sequence_number()
            .is_some_and(|largest| largest >= seq)
    }

    pub fn has_lost_packets(&self) -> bool {
        !self.loss_list.is_empty()
    }

    /// Packets in flight.
    pub fn unacknowledged(&self) -> usize {
        self.buffer.unacknowledged()
    }

    pub fn last_ack(&self) -> u64 {
        self.buffer.last_ack()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

// ─── Worker ─────────────────────────────────────────────────────────────────

fn sender_worker(engine: Arc<SenderEngine>, queue: QueueConsumer) -> Result<(), SenderError> {
    info!(
        window = engine.session.flow_window_size(),
        destination_id = engine.session.destination_id(),
        "sender started"
    );

    let result = loop {
        if engine.is_stopped() {
            break Ok(());
        }
        match engine.step(&queue) {
            Ok(Progress::Closed) => break Ok(()),
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "data transmission failed, stopping sender");
                break Err(e);
            }
        }
        thread::yield_now();
    };

    engine.stop();
    let stats = engine.stats.snapshot();
    info!(
        sent = stats.sent_data_packets,
        retransmitted = stats.retransmitted_data_packets,
        in_flight = engine.unacknowledged(),
        "sender stopped"
    );
    result
}

// ─── UdtSender ──────────────────────────────────────────────────────────────

/// Handle to a running sender.
///
/// Owns the worker thread and the producer side of the ingress queue. Feedback
/// is delivered through [`engine`](Self::engine). Dropping the handle stops
/// the worker; queued but untransmitted packets are discarded.
pub struct UdtSender {
    engine: Arc<SenderEngine>,
    producer: QueueProducer,
    /// Keeps a message's fragments contiguous in the queue.
    write_lock: Mutex<()>,
    handle: Option<JoinHandle<Result<(), SenderError>>>,
}

impl UdtSender {
    /// Spawn the worker thread for `engine`.
    pub fn spawn(engine: SenderEngine) -> Result<Self, SenderError> {
        let engine = Arc::new(engine);
        let (producer, consumer) = ingress_queue(engine.config.queue_capacity);

        let worker_engine = engine.clone();
        let handle = thread::Builder::new()
            .name(engine.config.thread_name.clone())
            .spawn(move || sender_worker(worker_engine, consumer))?;

        Ok(UdtSender {
            engine,
            producer,
            write_lock: Mutex::new(()),
            handle: Some(handle),
        })
    }

    pub fn engine(&self) -> &Arc<SenderEngine> {
        &self.engine
    }

    pub fn packetize(&self, payload: Bytes) -> DataPacket {
        self.engine.packetize(payload)
    }

    /// Enqueue without waiting.
    pub fn offer(&self, packet: DataPacket) -> Offer {
        if self.engine.is_stopped() {
            return Offer::Closed;
        }
        self.producer.offer(packet)
    }

    /// Enqueue, waiting up to `timeout` for space.
    pub fn offer_timeout(&self, packet: DataPacket, timeout: Duration) -> Offer {
        if self.engine.is_stopped() {
            return Offer::Closed;
        }
        self.producer.offer_timeout(packet, timeout)
    }

    /// Fragment `data` into packets and enqueue them, blocking while the
    /// queue is full. Returns the number of packets queued.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<usize, SenderError> {
        if self.engine.is_stopped() {
            return Err(SenderError::Stopped);
        }
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let packets = self.engine.fragment(data.into());
        let count = packets.len();
        for packet in packets {
            if !self.producer.offer_blocking(packet).is_accepted() {
                return Err(SenderError::Stopped);
            }
        }
        Ok(count)
    }

    /// Packets queued and not yet handled by the worker.
    pub fn pending(&self) -> usize {
        self.producer.len()
    }

    /// True while anything written is still queued, unacknowledged or
    /// scheduled for retransmission.
    pub fn has_outstanding(&self) -> bool {
        self.pending() > 0 || self.engine.unacknowledged() > 0 || self.engine.has_lost_packets()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker and wait for it. Returns the worker's fatal error, if
    /// it died of one.
    pub fn stop(&mut self) -> Result<(), SenderError> {
        self.engine.stop();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SenderError::WorkerPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for UdtSender {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "sender worker exited with error");
        }
    }
}
