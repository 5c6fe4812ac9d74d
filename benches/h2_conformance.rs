//! Conformance engine benchmarks
//!
//! Measures the hot paths of a test run:
//! - raw and typed frame encoding
//! - frame decoding from a buffer
//! - HPACK round trips through a connection-sized context
//! - result recording under contention
//!
//! Run with: cargo bench --bench h2_conformance

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use h2conform::h2::frames::{FrameType, GoawayFrame, RstStreamFrame};
use h2conform::h2::{ErrorCode, Frame, FrameCodec, FRAME_HEADER_SIZE};
use h2conform::{record_result, TestCase, TestGroup, TestResult};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn bench_raw_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("raw_frame_encode");

    group.bench_function("rst_stream_short", |b| {
        b.iter(|| {
            let wire = FrameCodec::encode_raw_frame(
                black_box(FrameType::RstStream.as_u8()),
                black_box(0),
                black_box(1),
                black_box(b"\x00\x00\x00"),
            );
            black_box(wire);
        });
    });

    for size in [16usize, 1024, 16384] {
        let payload = vec![0xa5u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("with_len", size), &payload, |b, payload| {
            b.iter(|| {
                let wire = FrameCodec::encode_raw_frame_with_len(0x0, 0x1, 1, black_box(size as u32 + 1), payload);
                black_box(wire);
            });
        });
    }

    group.finish();
}

fn bench_typed_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("typed_frame_encode");

    group.bench_function("goaway", |b| {
        let frame = GoawayFrame::new(7, ErrorCode::ProtocolError, Bytes::from_static(b"bad frame"));
        b.iter(|| black_box(FrameCodec::encode_goaway_frame(black_box(&frame))));
    });

    group.bench_function("rst_stream", |b| {
        let frame = RstStreamFrame::new(1, ErrorCode::FrameSizeError);
        b.iter(|| black_box(FrameCodec::encode_rst_stream_frame(black_box(&frame))));
    });

    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let wire = FrameCodec::encode_raw_frame(FrameType::Data.as_u8(), 0x1, 1, &[0u8; 1024]);

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("data_1k", |b| {
        b.iter(|| {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            header.copy_from_slice(&wire[..FRAME_HEADER_SIZE]);
            let (_, _, _, len) = FrameCodec::decode_header(&header);
            let payload = wire.slice(FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len);
            black_box(Frame::from_parts(header, payload));
        });
    });
    group.finish();
}

fn bench_hpack(c: &mut Criterion) {
    let headers: Vec<(&[u8], &[u8])> = vec![
        (&b":method"[..], &b"GET"[..]),
        (&b":scheme"[..], &b"http"[..]),
        (&b":path"[..], &b"/"[..]),
        (&b":authority"[..], &b"127.0.0.1:8080"[..]),
    ];

    c.bench_function("hpack_round_trip", |b| {
        let mut encoder = hpack::Encoder::new();
        let mut decoder = hpack::Decoder::new();
        b.iter(|| {
            let block = encoder.encode(headers.iter().copied());
            black_box(decoder.decode(&block).ok());
        });
    });
}

fn suite(cases: usize) -> (Arc<TestGroup>, Vec<Arc<TestCase>>) {
    let root = TestGroup::root("bench");
    let group = root.add_test_group("6", "Frame Definitions");
    let cases = (0..cases)
        .map(|i| group.add_test_case(TestCase::server(format!("case {}", i), "MUST", |_, _| Ok(()))))
        .collect();
    (root, cases)
}

fn bench_record_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_result");

    group.bench_function("single_thread", |b| {
        let (_root, cases) = suite(1);
        let result = TestResult::passed(Duration::from_millis(3));
        b.iter(|| record_result(&cases[0], black_box(result.clone())));
    });

    for threads in [2usize, 8] {
        group.bench_with_input(BenchmarkId::new("contended", threads), &threads, |b, &threads| {
            let (_root, cases) = suite(threads);
            b.iter(|| {
                thread::scope(|scope| {
                    for case in &cases {
                        scope.spawn(move || {
                            for _ in 0..100 {
                                record_result(case, TestResult::failed("no GOAWAY", Duration::ZERO));
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(frames, bench_raw_frame_encode, bench_typed_frame_encode, bench_frame_decode);
criterion_group!(hpack_benches, bench_hpack);
criterion_group!(results, bench_record_result);

criterion_main!(frames, hpack_benches, results);
