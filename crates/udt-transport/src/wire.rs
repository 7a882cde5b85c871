//! # UDT Wire Format
//!
//! Every UDT packet starts with a 16-byte header. The first bit tells data
//! and control packets apart.
//!
//! ## Data Packet
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0|                     Sequence Number (31)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |FF |O|                  Message Number (29)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Timestamp (32, µs)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                   Destination Socket ID (32)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! ## Control Packet
//!
//! ```text
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |1|        Type (15)            |          Reserved (16)         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Additional Info (32)                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Timestamp (32, µs)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                   Destination Socket ID (32)                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The engine keeps sequence numbers as unbounded `u64`. Encoding a number
//! that does not fit the 31-bit field fails with
//! [`WireError::SequenceOverflow`] instead of wrapping.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Header size shared by data and control packets.
pub const HEADER_SIZE: usize = 16;

/// Largest sequence number representable in the 31-bit header field.
pub const SEQUENCE_MAX: u64 = 0x7FFF_FFFF;

/// Largest message number representable in the 29-bit header field.
pub const MESSAGE_NUMBER_MAX: u32 = 0x1FFF_FFFF;

/// Largest UDP payload over IPv4 (65535 - 8 UDP - 20 IP).
pub const MAX_PAYLOAD_LEN: usize = 65_507 - HEADER_SIZE;

/// Upper bound on the span of one decoded NAK range.
pub const MAX_LOSS_RANGE: u32 = 65_536;

/// Upper bound on the sequence numbers one decoded NAK expands to.
pub const MAX_NAK_ENTRIES: u64 = MAX_LOSS_RANGE as u64;

const CONTROL_FLAG: u32 = 0x8000_0000;
const LOSS_RANGE_FLAG: u32 = 0x8000_0000;

fn ensure(available: usize, needed: usize) -> Result<(), WireError> {
    if available < needed {
        return Err(WireError::Truncated { needed, available });
    }
    Ok(())
}

fn encode_sequence(seq: u64) -> Result<u32, WireError> {
    if seq > SEQUENCE_MAX {
        return Err(WireError::SequenceOverflow(seq));
    }
    Ok(seq as u32)
}

fn push_loss_run(out: &mut Vec<u32>, start: u32, end: u32) {
    if start == end {
        out.push(start);
    } else {
        out.push(start | LOSS_RANGE_FLAG);
        out.push(end);
    }
}

// ─── Message Position ────────────────────────────────────────────────────────

/// Position of a data packet within its application message (the FF bits).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessagePosition {
    Middle = 0b00,
    Last = 0b01,
    First = 0b10,
    /// The message fits in a single packet.
    #[default]
    Solo = 0b11,
}

impl MessagePosition {
    fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => MessagePosition::Middle,
            0b01 => MessagePosition::Last,
            0b10 => MessagePosition::First,
            _ => MessagePosition::Solo,
        }
    }
}

// ─── Data Packet ─────────────────────────────────────────────────────────────

/// One sequenced fragment of application payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub sequence: u64,
    pub position: MessagePosition,
    /// Whether the receiver must deliver this message in order.
    pub in_order: bool,
    pub message_number: u32,
    pub timestamp_us: u32,
    pub destination_id: u32,
    pub payload: Bytes,
}

impl DataPacket {
    /// Create a solo, in-order data packet with the given sequence number.
    pub fn new(sequence: u64, payload: Bytes) -> Self {
        DataPacket {
            sequence,
            position: MessagePosition::Solo,
            in_order: true,
            message_number: 0,
            timestamp_us: 0,
            destination_id: 0,
            payload,
        }
    }

    pub fn with_message(mut self, message_number: u32, position: MessagePosition) -> Self {
        self.message_number = message_number;
        self.position = position;
        self
    }

    pub fn with_timestamp(mut self, timestamp_us: u32) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn with_destination(mut self, destination_id: u32) -> Self {
        self.destination_id = destination_id;
        self
    }

    /// Total encoded size (header + payload).
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        let seq = encode_sequence(self.sequence)?;
        if self.message_number > MESSAGE_NUMBER_MAX {
            return Err(WireError::MessageNumberOverflow(self.message_number));
        }
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(WireError::PayloadTooLarge(self.payload.len()));
        }
        buf.reserve(self.encoded_len());
        buf.put_u32(seq);
        buf.put_u32(
            ((self.position as u32) << 30) | ((self.in_order as u32) << 29) | self.message_number,
        );
        buf.put_u32(self.timestamp_us);
        buf.put_u32(self.destination_id);
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    /// Decode the remainder of a data packet whose first word was already read.
    fn decode_after(first: u32, buf: &mut impl Buf) -> Result<Self, WireError> {
        ensure(buf.remaining(), HEADER_SIZE - 4)?;
        let msg = buf.get_u32();
        let timestamp_us = buf.get_u32();
        let destination_id = buf.get_u32();
        let payload = buf.copy_to_bytes(buf.remaining());
        Ok(DataPacket {
            sequence: (first & !CONTROL_FLAG) as u64,
            position: MessagePosition::from_bits(msg >> 30),
            in_order: (msg >> 29) & 1 == 1,
            message_number: msg & MESSAGE_NUMBER_MAX,
            timestamp_us,
            destination_id,
            payload,
        })
    }
}

// ─── Control Types ───────────────────────────────────────────────────────────

/// Control packet types defined by UDT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ControlType {
    Handshake = 0x0000,
    KeepAlive = 0x0001,
    Ack = 0x0002,
    Nak = 0x0003,
    Shutdown = 0x0005,
    Ack2 = 0x0006,
    MessageDropRequest = 0x0007,
}

impl ControlType {
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x0000 => Some(ControlType::Handshake),
            0x0001 => Some(ControlType::KeepAlive),
            0x0002 => Some(ControlType::Ack),
            0x0003 => Some(ControlType::Nak),
            0x0005 => Some(ControlType::Shutdown),
            0x0006 => Some(ControlType::Ack2),
            0x0007 => Some(ControlType::MessageDropRequest),
            _ => None,
        }
    }
}

// ─── Control Bodies ──────────────────────────────────────────────────────────

/// Acknowledgment: everything below `ack_number` has been received.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckBody {
    /// The ACK's own sequence id (header additional-info field).
    pub ack_id: u32,
    /// Exclusive upper bound of received sequence numbers.
    pub ack_number: u64,
    pub rtt_us: u32,
    pub rtt_var_us: u32,
    /// Receiver buffer space, in packets.
    pub available_buffer: u32,
}

/// Negative acknowledgment carrying compressed loss information.
///
/// A word with the high bit set opens an inclusive range closed by the next
/// word; any other word is a single lost sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NakBody {
    loss_info: Vec<u32>,
}

impl NakBody {
    /// Build a NAK from lost sequence numbers, coalescing contiguous runs.
    pub fn from_sequences(seqs: &[u64]) -> Result<Self, WireError> {
        let mut sorted = seqs.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut loss_info = Vec::new();
        let mut iter = sorted.into_iter();
        let Some(first) = iter.next() else {
            return Ok(NakBody { loss_info });
        };
        let mut start = encode_sequence(first)?;
        let mut end = start;

        for seq in iter {
            let seq = encode_sequence(seq)?;
            if seq == end + 1 {
                end = seq;
            } else {
                push_loss_run(&mut loss_info, start, end);
                start = seq;
                end = seq;
            }
        }
        push_loss_run(&mut loss_info, start, end);

        Ok(NakBody { loss_info })
    }

    /// Raw 32-bit loss words as carried on the wire.
    pub fn loss_words(&self) -> &[u32] {
        &self.loss_info
    }

    /// Expand ranges into individual sequence numbers, in wire order.
    ///
    /// A range whose end precedes its start contributes nothing.
    pub fn decoded_loss_info(&self) -> Vec<u64> {
        let mut out = Vec::new();
        let mut words = self.loss_info.iter().copied();
        while let Some(word) = words.next() {
            if word & LOSS_RANGE_FLAG != 0 {
                let start = word & !LOSS_RANGE_FLAG;
                // Validated at decode/construction time.
                let end = words.next().unwrap_or(start);
                out.extend((start as u64)..=(end as u64));
            } else {
                out.push(word as u64);
            }
        }
        out
    }

    fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        let mut loss_info = Vec::with_capacity(buf.remaining() / 4);
        let mut entries: u64 = 0;
        while buf.remaining() >= 4 {
            let word = buf.get_u32();
            if word & LOSS_RANGE_FLAG != 0 {
                let start = word & !LOSS_RANGE_FLAG;
                if buf.remaining() < 4 {
                    return Err(WireError::UnterminatedRange(start));
                }
                let end = buf.get_u32() & !LOSS_RANGE_FLAG;
                if end >= start {
                    if end - start >= MAX_LOSS_RANGE {
                        return Err(WireError::LossRangeTooLarge {
                            start,
                            end,
                            max: MAX_LOSS_RANGE,
                        });
                    }
                    entries += u64::from(end - start) + 1;
                }
                loss_info.push(word);
                loss_info.push(end);
            } else {
                entries += 1;
                loss_info.push(word);
            }
            if entries > MAX_NAK_ENTRIES {
                return Err(WireError::NakTooLarge {
                    entries,
                    max: MAX_NAK_ENTRIES,
                });
            }
        }
        Ok(NakBody { loss_info })
    }
}

/// Typed control packet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlBody {
    KeepAlive,
    Ack(AckBody),
    Nak(NakBody),
    /// Acknowledgment of an acknowledgment, echoing the ack number.
    Ack2 { ack_number: u64 },
    Shutdown,
}

impl ControlBody {
    pub fn control_type(&self) -> ControlType {
        match self {
            ControlBody::KeepAlive => ControlType::KeepAlive,
            ControlBody::Ack(_) => ControlType::Ack,
            ControlBody::Nak(_) => ControlType::Nak,
            ControlBody::Ack2 { .. } => ControlType::Ack2,
            ControlBody::Shutdown => ControlType::Shutdown,
        }
    }
}

// ─── Control Packet ──────────────────────────────────────────────────────────

/// A control packet: common header fields plus a typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPacket {
    pub timestamp_us: u32,
    pub destination_id: u32,
    pub body: ControlBody,
}

impl ControlPacket {
    pub fn new(destination_id: u32, body: ControlBody) -> Self {
        ControlPacket {
            timestamp_us: 0,
            destination_id,
            body,
        }
    }

    pub fn keep_alive(destination_id: u32) -> Self {
        Self::new(destination_id, ControlBody::KeepAlive)
    }

    pub fn ack2(destination_id: u32, ack_number: u64) -> Self {
        Self::new(destination_id, ControlBody::Ack2 { ack_number })
    }

    pub fn with_timestamp(mut self, timestamp_us: u32) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), WireError> {
        let additional = match &self.body {
            ControlBody::Ack(ack) => ack.ack_id,
            ControlBody::Ack2 { ack_number } => encode_sequence(*ack_number)?,
            _ => 0,
        };
        buf.put_u32(CONTROL_FLAG | ((self.body.control_type() as u32) << 16));
        buf.put_u32(additional);
        buf.put_u32(self.timestamp_us);
        buf.put_u32(self.destination_id);

        match &self.body {
            ControlBody::Ack(ack) => {
                buf.put_u32(encode_sequence(ack.ack_number)?);
                buf.put_u32(ack.rtt_us);
                buf.put_u32(ack.rtt_var_us);
                buf.put_u32(ack.available_buffer);
            }
            ControlBody::Nak(nak) => {
                for &word in &nak.loss_info {
                    buf.put_u32(word);
                }
            }
            // Type-only packets carry a 4-byte zero pad.
            ControlBody::KeepAlive | ControlBody::Shutdown => buf.put_u32(0),
            ControlBody::Ack2 { .. } => {}
        }
        Ok(())
    }

    fn decode_after(first: u32, buf: &mut impl Buf) -> Result<Self, WireError> {
        ensure(buf.remaining(), HEADER_SIZE - 4)?;
        let raw_type = ((first & !CONTROL_FLAG) >> 16) as u16;
        let additional = buf.get_u32();
        let timestamp_us = buf.get_u32();
        let destination_id = buf.get_u32();

        let body = match ControlType::from_u16(raw_type) {
            Some(ControlType::KeepAlive) => ControlBody::KeepAlive,
            Some(ControlType::Shutdown) => ControlBody::Shutdown,
            Some(ControlType::Ack2) => ControlBody::Ack2 {
                ack_number: additional as u64,
            },
            Some(ControlType::Ack) => {
                ensure(buf.remaining(), 4)?;
                let ack_number = buf.get_u32() as u64;
                // Light ACKs carry only the ack number.
                let (rtt_us, rtt_var_us, available_buffer) = if buf.remaining() >= 12 {
                    (buf.get_u32(), buf.get_u32(), buf.get_u32())
                } else {
                    (0, 0, 0)
                };
                ControlBody::Ack(AckBody {
                    ack_id: additional,
                    ack_number,
                    rtt_us,
                    rtt_var_us,
                    available_buffer,
                })
            }
            Some(ControlType::Nak) => ControlBody::Nak(NakBody::decode(buf)?),
            _ => return Err(WireError::UnsupportedControl(raw_type)),
        };

        Ok(ControlPacket {
            timestamp_us,
            destination_id,
            body,
        })
    }
}

// ─── Packet ──────────────────────────────────────────────────────────────────

/// Any UDT packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(DataPacket),
    Control(ControlPacket),
}

impl Packet {
    /// Serialize into a fresh buffer.
    pub fn encode(&self) -> Result<BytesMut, WireError> {
        let mut buf = BytesMut::with_capacity(match self {
            Packet::Data(d) => d.encoded_len(),
            Packet::Control(_) => HEADER_SIZE + 16,
        });
        match self {
            Packet::Data(d) => d.encode(&mut buf)?,
            Packet::Control(c) => c.encode(&mut buf)?,
        }
        Ok(buf)
    }

    /// Decode one datagram. Trailing bytes of a data packet are its payload.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, WireError> {
        ensure(buf.remaining(), HEADER_SIZE)?;
        let first = buf.get_u32();
        if first & CONTROL_FLAG == 0 {
            DataPacket::decode_after(first, buf).map(Packet::Data)
        } else {
            ControlPacket::decode_after(first, buf).map(Packet::Control)
        }
    }
}

impl From<DataPacket> for Packet {
    fn from(p: DataPacket) -> Self {
        Packet::Data(p)
    }
}

impl From<ControlPacket> for Packet {
    fn from(p: ControlPacket) -> Self {
        Packet::Control(p)
    }
}
