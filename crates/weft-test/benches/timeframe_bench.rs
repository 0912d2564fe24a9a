//! Benchmarks for timeframe algebra

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use weft_core::{FeedKey, Timeframe};

fn feed(i: u64) -> FeedKey {
    let mut key = [0u8; 32];
    key[..8].copy_from_slice(&i.to_le_bytes());
    FeedKey::new(key)
}

fn timeframe(feeds: u64, base: u64) -> Timeframe {
    let mut tf = Timeframe::new();
    for i in 0..feeds {
        tf.set(feed(i), base + i);
    }
    tf
}

fn bench_merge(c: &mut Criterion) {
    let t1 = timeframe(100, 10);
    let t2 = timeframe(100, 500);
    c.bench_function("timeframe_merge_100", |b| {
        b.iter(|| black_box(&t1).merge(black_box(&t2)))
    });
}

fn bench_diff(c: &mut Criterion) {
    let have = timeframe(100, 10);
    let want = timeframe(100, 500);
    c.bench_function("timeframe_diff_100", |b| {
        b.iter(|| Timeframe::diff(black_box(&have), black_box(&want)))
    });
}

fn bench_covers(c: &mut Criterion) {
    let tf = timeframe(100, 500);
    let probe = feed(50);
    c.bench_function("timeframe_covers", |b| {
        b.iter(|| black_box(&tf).covers(black_box(&probe), black_box(400)))
    });
}

fn bench_advance(c: &mut Criterion) {
    let probe = feed(0);
    c.bench_function("timeframe_advance_contiguous", |b| {
        b.iter_batched(
            || Timeframe::new(),
            |mut tf| {
                for seq in 0..64 {
                    tf.advance(probe, seq);
                }
                tf
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_merge, bench_diff, bench_covers, bench_advance);
criterion_main!(benches);
