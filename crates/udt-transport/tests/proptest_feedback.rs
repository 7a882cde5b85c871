//! Property-based tests for ACK/NAK handling.
//!
//! The engine is driven step by step against an in-process channel peer, so
//! every property is checked without timing dependencies.

use bytes::Bytes;
use crossbeam_channel::Receiver;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use udt_transport::queue::{ingress_queue, QueueConsumer};
use udt_transport::wire::Packet;
use udt_transport::{ChannelSink, Progress, SenderConfig, SenderEngine, Session};

struct Rig {
    engine: SenderEngine,
    consumer: QueueConsumer,
    wire: Receiver<Packet>,
}

/// Engine with `n` packets (sequence numbers `0..n`) transmitted and
/// unacknowledged.
fn rig(n: u64) -> Rig {
    let (sink, wire) = ChannelSink::unbounded();
    let config = SenderConfig {
        poll_timeout: Duration::from_millis(1),
        ..Default::default()
    };
    let engine = SenderEngine::new(config, Arc::new(sink), Arc::new(Session::new(usize::MAX, 0)));
    let (producer, consumer) = ingress_queue(n as usize + 1);
    for _ in 0..n {
        assert!(producer.offer(engine.packetize(Bytes::from_static(b"p"))).is_accepted());
    }
    for seq in 0..n {
        assert_eq!(engine.step(&consumer).unwrap(), Progress::Sent(seq));
    }
    wire.try_iter().for_each(drop);
    Rig {
        engine,
        consumer,
        wire,
    }
}

impl Rig {
    /// Step until the loss list is empty; returns the retransmitted sequence
    /// numbers in order.
    fn drain_losses(&self) -> Vec<u64> {
        let mut out = Vec::new();
        while self.engine.has_lost_packets() {
            if let Progress::Retransmitted(seq) = self.engine.step(&self.consumer).unwrap() {
                out.push(seq);
            }
        }
        out
    }
}

const N: u64 = 64;

proptest! {
    #[test]
    fn last_ack_is_running_maximum(acks in proptest::collection::vec(0u64..=N + 8, 1..32)) {
        let rig = rig(N);
        let mut max = 0;
        for &ack in &acks {
            rig.engine.on_acknowledge(ack).unwrap();
            max = max.max(ack);
            prop_assert_eq!(rig.engine.last_ack(), max);
        }
        let expected = N.saturating_sub(max) as usize;
        prop_assert_eq!(rig.engine.unacknowledged(), expected);
        for seq in 0..N {
            prop_assert_eq!(rig.engine.is_unacknowledged(seq), seq >= max);
        }
    }

    #[test]
    fn doubled_acks_match_single(acks in proptest::collection::vec(0u64..=N, 1..16)) {
        let once = rig(N);
        let twice = rig(N);
        for &ack in &acks {
            once.engine.on_acknowledge(ack).unwrap();
            twice.engine.on_acknowledge(ack).unwrap();
            twice.engine.on_acknowledge(ack).unwrap();
        }
        prop_assert_eq!(once.engine.unacknowledged(), twice.engine.unacknowledged());
        prop_assert_eq!(once.engine.last_ack(), twice.engine.last_ack());
    }

    #[test]
    fn each_loss_retransmitted_once_in_order(
        naks in proptest::collection::vec(proptest::collection::vec(0u64..N, 0..8), 1..8)
    ) {
        let rig = rig(N);
        for nak in &naks {
            rig.engine.on_negative_acknowledge(nak.iter().copied());
        }
        let mut expected: Vec<u64> = naks.iter().flatten().copied().collect();
        expected.sort_unstable();
        expected.dedup();

        prop_assert_eq!(rig.drain_losses(), expected.clone());
        let on_wire = rig.wire.try_iter().filter(|p| matches!(p, Packet::Data(_))).count();
        prop_assert_eq!(on_wire, expected.len());
        prop_assert_eq!(rig.engine.stats().naks_received(), naks.len() as u64);
    }

    #[test]
    fn acknowledged_losses_are_never_resent(
        ack in 0u64..=N,
        lost in proptest::collection::vec(0u64..N, 1..16),
    ) {
        let rig = rig(N);
        rig.engine.on_acknowledge(ack).unwrap();
        rig.engine.on_negative_acknowledge(lost.iter().copied());
        let resent = rig.drain_losses();
        prop_assert!(resent.iter().all(|&seq| seq >= ack));
        prop_assert!(!rig.engine.has_lost_packets());
    }
}
