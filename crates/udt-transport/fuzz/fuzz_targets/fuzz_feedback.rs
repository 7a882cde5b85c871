#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Duration;
use udt_transport::queue::ingress_queue;
use udt_transport::wire::Packet;
use udt_transport::{ChannelSink, SenderConfig, SenderEngine, Session};

/// Feed arbitrary datagrams to a sender with packets in flight.
///
/// Malformed or hostile feedback must never panic the engine or leave the
/// in-flight counter out of step with the send buffer.
fuzz_target!(|data: &[u8]| {
    let (sink, _wire) = ChannelSink::unbounded();
    let config = SenderConfig {
        poll_timeout: Duration::from_millis(1),
        ..Default::default()
    };
    let engine = SenderEngine::new(config, Arc::new(sink), Arc::new(Session::new(64, 0)));
    let (producer, consumer) = ingress_queue(16);
    for _ in 0..16 {
        producer.offer(engine.packetize(Bytes::from_static(b"payload")));
    }
    for _ in 0..16 {
        let _ = engine.step(&consumer);
    }

    for chunk in data.chunks(64) {
        if let Ok(Packet::Control(ctrl)) = Packet::decode(&mut &chunk[..]) {
            let _ = engine.receive(&ctrl);
        }
    }
    while engine.has_lost_packets() {
        let _ = engine.step(&consumer);
    }
    assert!(engine.unacknowledged() <= 16);
});
