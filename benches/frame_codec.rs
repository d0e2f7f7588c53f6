//! Frame codec and channel throughput benchmarks.
//!
//! - Codec: encode/decode at several payload sizes
//! - Channel: push N payloads through a channel over an in-memory duplex
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use comet_gateway::{Channel, ChannelConfig, FrameRead, FramedConn, Frame, FrameCodec};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[16, 1024, 64 * 1024];
const PUSH_COUNTS: &[usize] = &[100, 1000];

// ============================================================================
// Benchmark: Codec
// ============================================================================

fn bench_codec(c: &mut Criterion) {
    let codec = FrameCodec::default();

    let mut group = c.benchmark_group("codec");
    for &size in PAYLOAD_SIZES {
        let frame = Frame::binary(vec![0xAB; size]);
        let encoded = codec.encode_to_bytes(&frame).expect("encode");
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &frame, |b, frame| {
            let mut buf = BytesMut::with_capacity(encoded.len());
            b.iter(|| {
                buf.clear();
                codec.encode(black_box(frame), &mut buf).expect("encode");
            });
        });

        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| codec.decode(black_box(encoded)).expect("decode"));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Channel Push
// ============================================================================

fn bench_channel_push(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let mut group = c.benchmark_group("channel_push");
    group.sample_size(20);

    for &count in PUSH_COUNTS {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("push", count), &count, |b, &count| {
            b.to_async(&rt).iter(|| push_through_channel(count));
        });
    }
    group.finish();
}

async fn push_through_channel(count: usize) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let channel = Channel::new(
        "bench",
        Box::new(FramedConn::new(local)),
        ChannelConfig::new().with_queue_capacity(64),
    )
    .expect("channel");
    let mut peer = FramedConn::new(remote);

    let producer = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            let payload = Bytes::from_static(&[0u8; 128]);
            for _ in 0..count {
                channel.push(payload.clone()).await.expect("push");
            }
        })
    };

    for _ in 0..count {
        black_box(peer.read_frame().await.expect("read"));
    }

    producer.await.expect("producer");
    channel.close().await.expect("close");
}

criterion_group!(benches, bench_codec, bench_channel_push);
criterion_main!(benches);
