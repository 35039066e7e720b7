use core::hint::black_box;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{SeedableRng, seq::SliceRandom};
use tabletio::{
    ByteKey, KeyRange, RangeTracker, SampleEntry, SplitOptions, SplitReducer, WorkUnit, split,
};

/// Evenly spaced 8-byte sample keys, 64 MiB apart.
fn synthetic_samples(count: u64) -> Vec<SampleEntry> {
    let step = u64::MAX / (count + 1);
    (1..=count)
        .map(|i| SampleEntry {
            row_key: ByteKey::from((i * step).to_be_bytes().to_vec()),
            offset_bytes: i << 26,
        })
        .collect()
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");
    for count in [1_000_u64, 10_000, 50_000] {
        let samples = synthetic_samples(count);
        let options = SplitOptions::new(16 << 20).unwrap();
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("samples", count), &samples, |b, samples| {
            b.iter(|| black_box(split(samples, &KeyRange::ALL, &options)));
        });
    }
    group.finish();
}

fn bench_plan(c: &mut Criterion) {
    let samples = synthetic_samples(20_000);
    let options = SplitOptions::new(8 << 20).unwrap();
    let reducer = SplitReducer::new(options.hard_split_ceiling());
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);

    c.bench_function("plan/split+reduce+shuffle", |b| {
        b.iter(|| {
            let mut units = reducer.reduce(split(&samples, &KeyRange::ALL, &options));
            units.shuffle(&mut rng);
            black_box(units)
        });
    });
}

fn bench_tracker(c: &mut Criterion) {
    const KEYS: u64 = 4096;
    let keys: Vec<ByteKey> = (0..KEYS)
        .map(|i| ByteKey::from((i << 48).to_be_bytes().to_vec()))
        .collect();

    let mut group = c.benchmark_group("tracker");
    group.throughput(Throughput::Elements(KEYS));
    group.bench_function("record_consumed", |b| {
        b.iter(|| {
            let tracker = RangeTracker::new(WorkUnit::new(KeyRange::ALL, 0));
            for key in &keys {
                black_box(tracker.record_consumed(key).unwrap());
            }
        });
    });
    group.bench_function("try_split_at_fraction", |b| {
        b.iter(|| {
            let tracker = RangeTracker::new(WorkUnit::new(KeyRange::ALL, 1 << 30));
            black_box(tracker.try_split_at_fraction(0.5))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_split, bench_plan, bench_tracker);
criterion_main!(benches);
