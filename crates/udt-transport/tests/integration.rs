//! # Integration tests: threaded sender against a simulated peer
//!
//! The sender runs on its own worker thread. The "peer" is the test thread:
//! it reads packets from a channel (or a loopback UDP socket), applies
//! impairment, and feeds ACK/NAK back through the engine's feedback surface.

use bytes::Bytes;
use crossbeam_channel::Receiver;
use std::collections::BTreeSet;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::{Duration, Instant};

use udt_transport::wire::{AckBody, ControlBody, ControlPacket, DataPacket, NakBody, Packet};
use udt_transport::{ChannelSink, SenderConfig, SenderEngine, Session, UdpSink, UdtSender};

// ─── Helpers ────────────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

fn channel_sender(window: usize) -> (UdtSender, Receiver<Packet>, Arc<Session>) {
    let (sink, wire) = ChannelSink::unbounded();
    let session = Arc::new(Session::new(window, 1));
    let engine = SenderEngine::new(SenderConfig::default(), Arc::new(sink), session.clone());
    (UdtSender::spawn(engine).unwrap(), wire, session)
}

fn next_data(wire: &Receiver<Packet>) -> Option<DataPacket> {
    let deadline = Instant::now() + WAIT;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match wire.recv_timeout(left) {
            Ok(Packet::Data(d)) => return Some(d),
            Ok(Packet::Control(_)) => continue,
            Err(_) => return None,
        }
    }
    None
}

/// Data packets that show up within `window`.
fn drain_data(wire: &Receiver<Packet>, window: Duration) -> Vec<u64> {
    let deadline = Instant::now() + window;
    let mut out = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match wire.recv_timeout(left) {
            Ok(Packet::Data(d)) => out.push(d.sequence),
            Ok(Packet::Control(_)) => {}
            Err(_) => break,
        }
    }
    out
}

fn offer_all(sender: &UdtSender, n: usize) {
    for i in 0..n {
        let packet = sender.packetize(Bytes::from(format!("msg-{i}")));
        assert!(sender.offer(packet).is_accepted());
    }
}

// ─── Reliable delivery ──────────────────────────────────────────────────────

#[test]
fn lossy_peer_receives_everything() {
    const TOTAL: u64 = 50;
    let (mut sender, wire, _session) = channel_sender(8);
    offer_all(&sender, TOTAL as usize);

    let engine = sender.engine().clone();
    let mut received = BTreeSet::new();
    let mut dropped = BTreeSet::new();

    while (received.len() as u64) < TOTAL {
        let packet = next_data(&wire).expect("sender stalled");
        let seq = packet.sequence;
        // First transmission of every 7th packet is lost.
        if seq % 7 == 3 && dropped.insert(seq) {
            continue;
        }
        received.insert(seq);

        let ack = (0..).find(|s| !received.contains(s)).unwrap();
        let missing: Vec<u64> = (ack..seq).filter(|s| !received.contains(s)).collect();
        if !missing.is_empty() {
            let nak = NakBody::from_sequences(&missing).unwrap();
            engine
                .receive(&ControlPacket::new(0, ControlBody::Nak(nak)))
                .unwrap();
        }
        engine.on_acknowledge(ack).unwrap();
    }

    assert_eq!(received, (0..TOTAL).collect::<BTreeSet<_>>());
    assert_eq!(engine.unacknowledged(), 0);
    let stats = engine.stats().snapshot();
    assert_eq!(stats.sent_data_packets, TOTAL);
    assert!(stats.retransmitted_data_packets >= dropped.len() as u64);
    sender.stop().unwrap();
}

#[test]
fn flow_window_gates_admission() {
    let (mut sender, wire, session) = channel_sender(2);
    offer_all(&sender, 5);

    assert_eq!(drain_data(&wire, Duration::from_millis(200)), vec![0, 1]);
    assert_eq!(sender.engine().unacknowledged(), 2);

    sender.engine().on_acknowledge(2).unwrap();
    assert_eq!(drain_data(&wire, Duration::from_millis(200)), vec![2, 3]);

    session.set_flow_window_size(4);
    assert_eq!(drain_data(&wire, Duration::from_millis(200)), vec![4]);
    sender.stop().unwrap();
}

#[test]
fn exp_timeout_resends_unacknowledged() {
    let (mut sender, wire, _session) = channel_sender(16);
    offer_all(&sender, 4);
    assert_eq!(drain_data(&wire, Duration::from_millis(200)), vec![0, 1, 2, 3]);

    sender.engine().on_acknowledge(1).unwrap();
    sender.engine().on_exp_timeout();
    assert_eq!(drain_data(&wire, Duration::from_millis(200)), vec![1, 2, 3]);
    assert!(!sender.engine().has_lost_packets());
    sender.stop().unwrap();
}

#[test]
fn write_blocks_until_queue_has_room() {
    let (sink, wire) = ChannelSink::unbounded();
    let config = SenderConfig {
        queue_capacity: 2,
        max_payload_size: 10,
        ..Default::default()
    };
    let engine = SenderEngine::new(config, Arc::new(sink), Arc::new(Session::new(1, 0)));
    let sender = Arc::new(UdtSender::spawn(engine).unwrap());

    // Window 1 and a queue of 2: only 3 of 6 fragments fit before an ACK.
    let writer = {
        let sender = sender.clone();
        std::thread::spawn(move || sender.write(vec![0u8; 60]))
    };
    assert_eq!(drain_data(&wire, Duration::from_millis(100)), vec![0]);
    assert!(!writer.is_finished());

    for ack in 1..=5 {
        sender.engine().on_acknowledge(ack).unwrap();
        assert_eq!(next_data(&wire).map(|d| d.sequence), Some(ack));
    }
    assert_eq!(writer.join().unwrap().unwrap(), 6);
}

#[test]
fn stop_discards_queued_packets() {
    let (mut sender, wire, _session) = channel_sender(0);
    offer_all(&sender, 3);
    sender.stop().unwrap();
    assert!(drain_data(&wire, Duration::from_millis(50)).is_empty());
    assert_eq!(sender.engine().unacknowledged(), 0);
}

#[test]
fn short_write_is_outstanding_until_delivered() {
    let (mut sender, wire, _session) = channel_sender(8);
    assert_eq!(sender.write(&b"tail of the input"[..]).unwrap(), 1);
    assert!(sender.has_outstanding());

    let data = next_data(&wire).expect("queued data never sent");
    assert_eq!(&data.payload[..], b"tail of the input");
    assert!(sender.has_outstanding());

    sender.engine().on_acknowledge(data.sequence + 1).unwrap();
    let deadline = Instant::now() + WAIT;
    while sender.has_outstanding() {
        assert!(Instant::now() < deadline, "acknowledged data still outstanding");
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(sender.engine().unacknowledged(), 0);
    sender.stop().unwrap();
}

// ─── UDP loopback ───────────────────────────────────────────────────────────

#[test]
fn udp_loopback_ack_roundtrip() {
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    peer.set_read_timeout(Some(WAIT)).unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.connect(peer.local_addr().unwrap()).unwrap();
    let local = socket.local_addr().unwrap();

    let session = Arc::new(Session::new(16, 0x55));
    let sink = Arc::new(UdpSink::new(socket));
    let engine = SenderEngine::new(SenderConfig::default(), sink, session);
    let mut sender = UdtSender::spawn(engine).unwrap();
    assert_eq!(sender.write(&b"over the loopback"[..]).unwrap(), 1);

    let mut buf = [0u8; 2048];
    let (len, from) = peer.recv_from(&mut buf).unwrap();
    assert_eq!(from, local);
    let data = match Packet::decode(&mut &buf[..len]).unwrap() {
        Packet::Data(d) => d,
        other => panic!("expected data, got {other:?}"),
    };
    assert_eq!(data.sequence, 0);
    assert_eq!(data.destination_id, 0x55);
    assert_eq!(&data.payload[..], b"over the loopback");

    // The peer's ACK arrives as a datagram; dispatch it as a network thread would.
    let ack = Packet::from(ControlPacket::new(
        0,
        ControlBody::Ack(AckBody {
            ack_id: 1,
            ack_number: 1,
            ..Default::default()
        }),
    ))
    .encode()
    .unwrap();
    match Packet::decode(&mut &ack[..]).unwrap() {
        Packet::Control(ctrl) => sender.engine().receive(&ctrl).unwrap(),
        other => panic!("expected control, got {other:?}"),
    }
    assert_eq!(sender.engine().unacknowledged(), 0);

    let len = peer.recv(&mut buf).unwrap();
    match Packet::decode(&mut &buf[..len]).unwrap() {
        Packet::Control(ctrl) => {
            assert_eq!(ctrl.body, ControlBody::Ack2 { ack_number: 1 });
            assert_eq!(ctrl.destination_id, 0x55);
        }
        other => panic!("expected ACK2, got {other:?}"),
    }
    sender.stop().unwrap();
}
