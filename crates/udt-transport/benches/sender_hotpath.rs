//! Per-packet cost of the sender hot path.
//!
//! - Data packet encode/decode at typical payload sizes
//! - One sender loop step (poll + transmit + buffer insert)
//! - ACK processing over a full send buffer
//! - NAK coalescing and expansion
//!
//! Run with: cargo bench --package udt-transport

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

use udt_transport::queue::ingress_queue;
use udt_transport::sink::PacketSink;
use udt_transport::wire::{DataPacket, NakBody, Packet};
use udt_transport::{SenderConfig, SenderEngine, Session};

/// Sink that only encodes, so the bench measures the engine and not a channel.
struct EncodeOnly;

impl PacketSink for EncodeOnly {
    fn send(&self, packet: &Packet) -> std::io::Result<usize> {
        Ok(packet.encode()?.len())
    }
}

fn engine() -> SenderEngine {
    let config = SenderConfig {
        poll_timeout: Duration::from_millis(1),
        ..Default::default()
    };
    SenderEngine::new(config, Arc::new(EncodeOnly), Arc::new(Session::new(usize::MAX, 7)))
}

// ─── Codec ──────────────────────────────────────────────────────────────────

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("data_packet");
    for size in [64usize, 1456] {
        let packet = Packet::from(DataPacket::new(1234, Bytes::from(vec![0xABu8; size])));
        let encoded = packet.encode().unwrap().freeze();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}"), |b| {
            b.iter(|| black_box(&packet).encode().unwrap());
        });
        group.bench_function(format!("decode_{size}"), |b| {
            b.iter(|| Packet::decode(&mut black_box(encoded.clone())).unwrap());
        });
    }
    group.finish();
}

// ─── Engine ─────────────────────────────────────────────────────────────────

fn bench_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("sender");
    group.throughput(Throughput::Elements(1));

    group.bench_function("step_send", |b| {
        let engine = engine();
        let (producer, consumer) = ingress_queue(1);
        let payload = Bytes::from(vec![0u8; 1456]);
        b.iter(|| {
            producer.offer(engine.packetize(payload.clone()));
            let progress = engine.step(&consumer).unwrap();
            engine.on_acknowledge(engine.current_sequence_number().unwrap_or(0) + 1).unwrap();
            black_box(progress)
        });
    });

    group.bench_function("ack_1024_buffered", |b| {
        b.iter_batched(
            || {
                let engine = engine();
                let (producer, consumer) = ingress_queue(1024);
                for _ in 0..1024 {
                    producer.offer(engine.packetize(Bytes::from_static(b"x")));
                }
                for _ in 0..1024 {
                    engine.step(&consumer).unwrap();
                }
                engine
            },
            |engine| engine.on_acknowledge(1024).unwrap(),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_nak(c: &mut Criterion) {
    let lost: Vec<u64> = (0..512).chain(1000..1010).chain((2000..3000).step_by(3)).collect();
    c.bench_function("nak_from_sequences", |b| {
        b.iter(|| NakBody::from_sequences(black_box(&lost)).unwrap());
    });
    let nak = NakBody::from_sequences(&lost).unwrap();
    c.bench_function("nak_decoded_loss_info", |b| {
        b.iter(|| black_box(&nak).decoded_loss_info());
    });
}

criterion_group!(benches, bench_codec, bench_step, bench_nak);
criterion_main!(benches);
