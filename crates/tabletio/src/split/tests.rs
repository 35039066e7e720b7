use crate::{
    ByteKey, KeyRange, RemoteError, SampleEntry, SampleKeyProvider, SampleSource, SplitOptions,
    SplitReducer, TableRef, WorkUnit, estimated_size_bytes, split, split_unit,
};
use portable_atomic::{AtomicUsize, Ordering};
use std::{sync::Arc, time::Duration};

fn range(start: &str, end: &str) -> KeyRange {
    KeyRange::new(start, end).unwrap()
}

fn samples(entries: &[(&str, u64)]) -> Vec<SampleEntry> {
    entries
        .iter()
        .map(|(key, offset)| SampleEntry::new(*key, *offset))
        .collect()
}

fn options(desired: u64) -> SplitOptions {
    SplitOptions::new(desired).unwrap()
}

/// Sorted units must tile `expected` with no gap and no overlap.
fn assert_tiles(units: &[WorkUnit], expected: &KeyRange) {
    let mut sorted: Vec<_> = units.iter().map(|u| u.range.clone()).collect();
    sorted.sort_by(|a, b| a.start().cmp(b.start()));
    assert_eq!(sorted.first().unwrap().start(), expected.start());
    assert_eq!(sorted.last().unwrap().end(), expected.end());
    for pair in sorted.windows(2) {
        assert!(!pair[0].end().is_empty(), "open range before {:?}", pair[1]);
        assert_eq!(pair[0].end(), pair[1].start(), "gap or overlap");
    }
}

#[test]
fn splits_regions_by_desired_size() {
    let samples = samples(&[("d", 300), ("m", 900)]);
    let user = range("a", "z");
    let units = split(&samples, &user, &options(300));

    assert_eq!(
        units,
        vec![
            WorkUnit::new(range("a", "d"), 300),
            WorkUnit::new(KeyRange::new("d", vec![b'h', 0x80]).unwrap(), 300),
            WorkUnit::new(KeyRange::new(vec![b'h', 0x80], "m").unwrap(), 300),
            WorkUnit::new(range("m", "z"), 0),
        ]
    );
    assert_tiles(&units, &user);
}

#[test]
fn unbounded_user_range_gets_open_fallback_unit() {
    let samples = samples(&[("d", 300), ("m", 900)]);
    let units = split(&samples, &KeyRange::ALL, &options(1_000));
    assert_eq!(
        units,
        vec![
            WorkUnit::new(range("", "d"), 300),
            WorkUnit::new(range("d", "m"), 600),
            WorkUnit::new(KeyRange::starting_at("m"), 0),
        ]
    );
}

#[test]
fn terminal_sample_suppresses_fallback() {
    let samples = samples(&[("d", 300), ("", 500)]);
    let units = split(&samples, &KeyRange::ALL, &options(1_000));
    assert_eq!(
        units,
        vec![
            WorkUnit::new(range("", "d"), 300),
            WorkUnit::new(KeyRange::starting_at("d"), 200),
        ]
    );
}

#[test]
fn zero_samples_yield_the_user_range() {
    let user = range("c", "f");
    assert_eq!(
        split(&[], &user, &options(1)),
        vec![WorkUnit::new(user.clone(), 0)]
    );
    assert_eq!(
        split(&[], &KeyRange::ALL, &options(1)),
        vec![WorkUnit::new(KeyRange::ALL, 0)]
    );
}

#[test]
fn degenerate_and_out_of_order_samples_are_skipped() {
    let samples = samples(&[("d", 100), ("d", 150), ("b", 175), ("k", 400)]);
    let units = split(&samples, &KeyRange::ALL, &options(10_000));
    assert_eq!(
        units,
        vec![
            WorkUnit::new(range("", "d"), 100),
            WorkUnit::new(range("d", "k"), 300),
            WorkUnit::new(KeyRange::starting_at("k"), 0),
        ]
    );
    assert_tiles(&units, &KeyRange::ALL);
}

#[test]
fn regions_outside_user_range_are_dropped() {
    let samples = samples(&[("c", 100), ("f", 200), ("j", 300), ("", 400)]);
    let user = range("f", "j");
    let units = split(&samples, &user, &options(1_000));
    assert_eq!(units, vec![WorkUnit::new(user.clone(), 100)]);
    assert_eq!(estimated_size_bytes(&samples, &user), 100);
}

#[test]
fn estimate_counts_unclipped_regions() {
    let samples = samples(&[("d", 300), ("m", 900)]);
    assert_eq!(estimated_size_bytes(&samples, &range("a", "z")), 900);
    assert_eq!(estimated_size_bytes(&samples, &range("e", "f")), 600);
    assert_eq!(estimated_size_bytes(&samples, &KeyRange::starting_at("m")), 0);
}

#[test]
fn small_desired_size_is_raised_for_huge_tables() {
    let samples = samples(&[("m", 8_000), ("", 16_000)]);
    let options = SplitOptions::builder(1).max_size_splits(4).build().unwrap();
    let units = split(&samples, &KeyRange::ALL, &options);
    // 16_000 / 4 = 4_000 bytes per unit: two parts below "m", one open unit.
    assert_eq!(units.len(), 3);
    assert_tiles(&units, &KeyRange::ALL);
}

#[test]
fn sub_unit_sizes_sum_to_region_size() {
    let samples = samples(&[("a", 0), ("z", 1_000)]);
    let units = split(&samples, &range("a", "z"), &options(300));
    assert_eq!(units.len(), 4);
    let sizes: Vec<u64> = units.iter().map(|u| u.estimated_size_bytes).collect();
    assert_eq!(sizes, vec![250, 250, 250, 250]);

    let units = split(&samples, &range("a", "z"), &options(333));
    assert_eq!(units.iter().map(|u| u.estimated_size_bytes).sum::<u64>(), 1_000);
}

#[test]
fn narrow_region_falls_back_to_one_unit() {
    let samples = vec![
        SampleEntry::new("a", 0),
        SampleEntry::new(ByteKey::from(vec![b'a', 0]), 10_000),
    ];
    let units = split(&samples, &KeyRange::new("a", vec![b'a', 0]).unwrap(), &options(1));
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].estimated_size_bytes, 10_000);
}

#[test]
fn split_unit_resplits_by_estimate() {
    let unit = WorkUnit::new(range("a", "q"), 900);
    let parts = split_unit(&unit, 300).unwrap();
    assert_eq!(parts.len(), 3);
    assert_tiles(&parts, &unit.range);

    let open = WorkUnit::new(KeyRange::starting_at("q"), 900);
    assert_eq!(split_unit(&open, 300).unwrap(), vec![open]);
}

#[test]
fn split_unit_rejects_zero_unit_size() {
    let unit = WorkUnit::new(range("a", "q"), 900);
    assert!(matches!(
        split_unit(&unit, 0),
        Err(crate::Error::Configuration { .. })
    ));
}

#[test]
fn split_count_is_capped_for_tiny_unit_sizes() {
    let unit = WorkUnit::new(range("a", "z"), 1 << 34);
    let parts = split_unit(&unit, 1).unwrap();
    assert_eq!(parts.len(), crate::DEFAULT_HARD_SPLIT_CEILING);
    assert_tiles(&parts, &unit.range);
    assert_eq!(parts.iter().map(|u| u.estimated_size_bytes).sum::<u64>(), 1 << 34);

    let options = SplitOptions::builder(1)
        .max_size_splits(u64::MAX)
        .hard_split_ceiling(64)
        .build()
        .unwrap();
    let units = split(&samples(&[("m", 1 << 40), ("", 1 << 41)]), &range("a", "z"), &options);
    assert_eq!(units.len(), 128);
    assert_tiles(&units, &range("a", "z"));
}

#[test]
fn reducer_leaves_small_inputs_alone() {
    let units = vec![
        WorkUnit::new(range("a", "b"), 1),
        WorkUnit::new(range("b", "c"), 2),
    ];
    assert_eq!(SplitReducer::new(2).reduce(units.clone()), units);
}

#[test]
fn reducer_merges_contiguous_runs() {
    let samples: Vec<_> = (1..=100_u64)
        .map(|i| SampleEntry::new(format!("k{i:03}"), i * 10))
        .collect();
    let units = split(&samples, &KeyRange::ALL, &options(1_000));
    assert_eq!(units.len(), 101);

    let reducer = SplitReducer::new(7);
    let reduced = reducer.reduce(units.clone());
    assert!(reduced.len() <= 7);
    assert_tiles(&reduced, &KeyRange::ALL);
    assert_eq!(
        reduced.iter().map(|u| u.estimated_size_bytes).sum::<u64>(),
        units.iter().map(|u| u.estimated_size_bytes).sum::<u64>()
    );
}

#[test]
fn reducer_respects_ceiling_for_any_length() {
    for len in [1_usize, 2, 15, 16, 17, 100, 15_361, 40_000] {
        let units: Vec<_> = (0..len)
            .map(|i| {
                let start = format!("{i:08}");
                let end = format!("{:08}", i + 1);
                WorkUnit::new(range(&start, &end), 1)
            })
            .collect();
        assert!(SplitReducer::new(16).reduce(units.clone()).len() <= 16);
        assert!(
            SplitReducer::new(crate::DEFAULT_HARD_SPLIT_CEILING).reduce(units).len()
                <= crate::DEFAULT_HARD_SPLIT_CEILING
        );
    }
}

#[test]
fn options_reject_zero_values() {
    assert!(SplitOptions::new(0).is_err());
    assert!(SplitOptions::builder(1).max_size_splits(0).build().is_err());
    assert!(SplitOptions::builder(1).hard_split_ceiling(0).build().is_err());
    let options = SplitOptions::new(5).unwrap();
    assert_eq!(options.max_size_splits(), crate::DEFAULT_MAX_SIZE_SPLITS);
    assert_eq!(options.hard_split_ceiling(), crate::DEFAULT_HARD_SPLIT_CEILING);
}

#[cfg(feature = "serde")]
#[test]
fn work_units_serialize_for_shipping() {
    let unit = WorkUnit::new(range("a", "b"), 42);
    let json = serde_json::to_string(&unit).unwrap();
    let back: WorkUnit = serde_json::from_str(&json).unwrap();
    assert_eq!(back, unit);
}

struct SlowSource {
    calls: AtomicUsize,
}

impl SampleSource for SlowSource {
    fn fetch_samples(&self, _: &TableRef) -> Result<Vec<SampleEntry>, RemoteError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        std::thread::sleep(Duration::from_millis(50));
        Ok(samples(&[("m", 10), ("", 20)]))
    }
}

#[test]
fn concurrent_first_access_fetches_once() {
    let source = Arc::new(SlowSource {
        calls: AtomicUsize::new(0),
    });
    let provider = SampleKeyProvider::new(TableRef::new("t").unwrap(), source.clone());
    assert!(!provider.is_fetched());

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| provider.sample_keys())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(source.calls.load(Ordering::Acquire), 1);
    for samples in results {
        assert_eq!(samples.unwrap().len(), 2);
    }
    assert!(provider.is_fetched());
    provider.sample_keys().unwrap();
    assert_eq!(source.calls.load(Ordering::Acquire), 1);
}

#[test]
fn preset_samples_skip_the_remote_call() {
    let source = Arc::new(SlowSource {
        calls: AtomicUsize::new(0),
    });
    let provider = SampleKeyProvider::with_samples(
        TableRef::new("t").unwrap(),
        source.clone(),
        samples(&[("k", 1)]),
    );
    assert_eq!(provider.sample_keys().unwrap().len(), 1);
    assert_eq!(source.calls.load(Ordering::Acquire), 0);
}
