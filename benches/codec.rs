//! 와이어 코덱 벤치마크

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use dtp::{FileId, FileMeta, Message};

fn chunk_message(payload_len: usize) -> Message {
    Message::FileChunk {
        file_id: FileId::generate(),
        meta: FileMeta::new("bench.bin", 1 << 30, payload_len).unwrap(),
        chunk_index: 42,
        payload: Bytes::from(vec![0x5Au8; payload_len]),
    }
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_chunk");

    for size in [1024usize, 16 * 1024, 60 * 1024] {
        let message = chunk_message(size);
        let frame = message.encode();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &message, |b, m| {
            b.iter(|| black_box(m.encode()))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &frame, |b, f| {
            b.iter(|| black_box(Message::decode(f).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
