//! Performance benchmarks for the wsout outbound engine.
//!
//! Run with: `cargo bench`

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use wsout::extensions;
use wsout::protocol::mask::apply_mask;
use wsout::{FrameData, FrameOptions, MaskKeySource, OpCode, frame, is_valid_utf8};

// =============================================================================
// Frame Encoding Benchmarks
// =============================================================================

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for (label, size) in [("small_10b", 10), ("medium_1kb", 1024), ("large_64kb", 65536)] {
        let payload = vec![0xAB_u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("{label}_unmasked"), |b| {
            b.iter(|| {
                frame(
                    FrameData::Owned(black_box(payload.clone())),
                    FrameOptions {
                        fin: true,
                        rsv1: false,
                        opcode: OpCode::Binary,
                        mask: None,
                    },
                )
            })
        });

        group.bench_function(format!("{label}_masked"), |b| {
            let mut keys = MaskKeySource::random();
            b.iter(|| {
                frame(
                    FrameData::Owned(black_box(payload.clone())),
                    FrameOptions {
                        fin: true,
                        rsv1: false,
                        opcode: OpCode::Binary,
                        mask: Some(&mut keys),
                    },
                )
            })
        });
    }

    // Zero-copy path: large read-only payload, no masking.
    let shared = bytes::Bytes::from(vec![0xAB_u8; 65536]);
    group.throughput(Throughput::Bytes(65536));
    group.bench_function("large_64kb_read_only", |b| {
        b.iter(|| {
            frame(
                FrameData::ReadOnly(black_box(shared.clone())),
                FrameOptions {
                    fin: true,
                    rsv1: false,
                    opcode: OpCode::Binary,
                    mask: None,
                },
            )
        })
    });

    group.finish();
}

// =============================================================================
// Masking Benchmarks
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");
    let mask = [0x37, 0xFA, 0x21, 0x3D];

    for (label, size) in [
        ("64b", 64),
        ("1kb", 1024),
        ("64kb", 65536),
        ("1mb", 1024 * 1024),
    ] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("apply_mask_{label}"), |b| {
            let mut data = vec![0xAB_u8; size];
            b.iter(|| {
                apply_mask(black_box(&mut data), mask);
            })
        });
    }

    group.bench_function("next_key_pooled", |b| {
        let mut keys = MaskKeySource::random();
        b.iter(|| {
            // Draws through the pool, amortizing one refill per 2048 keys.
            frame(
                FrameData::Owned(Vec::new()),
                FrameOptions {
                    fin: true,
                    rsv1: false,
                    opcode: OpCode::Ping,
                    mask: Some(&mut keys),
                },
            )
        })
    });

    group.finish();
}

// =============================================================================
// Validation Benchmarks
// =============================================================================

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");

    // Below the scanner/stdlib cutover.
    let short_ascii = b"short message".to_vec();
    group.throughput(Throughput::Bytes(short_ascii.len() as u64));
    group.bench_function("utf8_short_ascii", |b| {
        b.iter(|| is_valid_utf8(black_box(&short_ascii)))
    });

    let long_ascii = vec![b'a'; 4096];
    group.throughput(Throughput::Bytes(4096));
    group.bench_function("utf8_4kb_ascii", |b| {
        b.iter(|| is_valid_utf8(black_box(&long_ascii)))
    });

    let multibyte: Vec<u8> = "héllo wörld ".repeat(300).into_bytes();
    group.throughput(Throughput::Bytes(multibyte.len() as u64));
    group.bench_function("utf8_multibyte", |b| {
        b.iter(|| is_valid_utf8(black_box(&multibyte)))
    });

    group.finish();
}

// =============================================================================
// Extension Header Benchmarks
// =============================================================================

fn bench_extensions(c: &mut Criterion) {
    let mut group = c.benchmark_group("extensions");

    let header = "permessage-deflate; server_no_context_takeover; \
                  client_max_window_bits=12, permessage-deflate";

    group.bench_function("parse_header", |b| {
        b.iter(|| extensions::parse(black_box(header)))
    });

    let offers = extensions::parse(header).unwrap();
    group.bench_function("format_header", |b| {
        b.iter(|| extensions::format(black_box(&offers)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encoding,
    bench_masking,
    bench_validation,
    bench_extensions
);

criterion_main!(benches);
