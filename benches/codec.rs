//! Frame codec benchmark suite.
//!
//! Benchmarks the inbound hot path:
//! - Whole response frames, with and without a length prefix
//! - Frames split across two deliveries
//! - Batch encoding
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use swaggersocket::protocol::codec::{self, Decoded, FrameDecoder};
use swaggersocket::{Identity, Request};

// ============================================================================
// Fixtures
// ============================================================================

const BATCH_SIZES: &[usize] = &[1, 10, 100];

fn response_frame(count: usize) -> String {
    let responses: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"uuid":"req-{i}","statusCode":200,"reasonPhrase":"OK","path":"/echo","dataFormat":"text/plain","messageBody":"payload {i}"}}"#
            )
        })
        .collect();
    format!(r#"{{"identity":"bench","responses":[{}]}}"#, responses.join(","))
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &count in BATCH_SIZES {
        let frame = response_frame(count);
        let prefixed = format!("{}<->{frame}", frame.len());

        group.bench_with_input(BenchmarkId::new("whole", count), &frame, |b, frame| {
            let mut decoder = FrameDecoder::default();
            b.iter(|| {
                let decoded = decoder.decode(black_box(frame));
                assert!(matches!(decoded, Decoded::Parsed(_)));
            });
        });

        group.bench_with_input(BenchmarkId::new("prefixed", count), &prefixed, |b, frame| {
            let mut decoder = FrameDecoder::default();
            b.iter(|| decoder.decode(black_box(frame)));
        });

        group.bench_with_input(BenchmarkId::new("split", count), &frame, |b, frame| {
            let (head, tail) = frame.split_at(frame.len() / 2);
            let mut decoder = FrameDecoder::default();
            b.iter(|| {
                let _ = decoder.decode(black_box(head));
                decoder.decode(black_box(tail))
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let identity = Identity::new("bench");

    for &count in BATCH_SIZES {
        let requests: Vec<Request> = (0..count)
            .map(|i| {
                Request::post("/echo")
                    .with_data_format("application/json")
                    .with_data(format!(r#"{{"n":{i}}}"#))
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("batch", count), &requests, |b, requests| {
            b.iter(|| codec::encode_batch(black_box(requests.iter()), &identity));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
