//! # Transmission Sinks
//!
//! Where encoded packets leave the engine. A sink delivers each packet
//! immediately and best-effort; reliability is the engine's job.

use crossbeam_channel::Sender;
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::wire::Packet;

/// Outbound packet transport.
pub trait PacketSink: Send + Sync {
    /// Deliver one packet. Returns the number of bytes handed to the
    /// underlying transport.
    fn send(&self, packet: &Packet) -> io::Result<usize>;
}

// ─── UdpSink ────────────────────────────────────────────────────────────────

/// Sends one datagram per packet over a connected UDP socket.
pub struct UdpSink {
    socket: UdpSocket,
    bytes_sent: AtomicU64,
    packets_sent: AtomicU64,
}

impl UdpSink {
    /// `socket` should be bound and connected to the remote peer.
    pub fn new(socket: UdpSocket) -> Self {
        UdpSink {
            socket,
            bytes_sent: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
        }
    }

    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }
}

impl PacketSink for UdpSink {
    fn send(&self, packet: &Packet) -> io::Result<usize> {
        let datagram = packet.encode()?;
        let n = self.socket.send(&datagram)?;
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        Ok(n)
    }
}

// ─── ChannelSink ────────────────────────────────────────────────────────────

/// Hands packets to an in-process peer over a crossbeam channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Packet>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Packet>) -> Self {
        ChannelSink { tx }
    }

    /// Unbounded sink plus the receiving end.
    pub fn unbounded() -> (Self, crossbeam_channel::Receiver<Packet>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (ChannelSink { tx }, rx)
    }
}

impl PacketSink for ChannelSink {
    fn send(&self, packet: &Packet) -> io::Result<usize> {
        let len = packet.encode()?.len();
        self.tx
            .send(packet.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "packet channel closed"))?;
        Ok(len)
    }
}
