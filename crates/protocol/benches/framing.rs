//! Benchmarks for frame reassembly
//!
//! Measures reassembly throughput for:
//! - Full 256-byte read chunks of short ELM327 responses
//! - Byte-at-a-time delivery (worst case for chunk boundaries)

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use protocol::{DEFAULT_READ_CHUNK_SIZE, FrameReassembler};

fn sample_stream(len: usize) -> Vec<u8> {
    b"41 0C 1A F8\r"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

fn benchmark_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");

    let chunk = sample_stream(DEFAULT_READ_CHUNK_SIZE);
    group.throughput(Throughput::Bytes(chunk.len() as u64));

    group.bench_function("full_chunk", |b| {
        let mut reassembler = FrameReassembler::new();
        b.iter(|| reassembler.feed(black_box(&chunk)))
    });

    group.bench_function("byte_at_a_time", |b| {
        let mut reassembler = FrameReassembler::new();
        b.iter(|| {
            for byte in black_box(&chunk) {
                reassembler.feed(std::slice::from_ref(byte));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_reassembly);
criterion_main!(benches);
