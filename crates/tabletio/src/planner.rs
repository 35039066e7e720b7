use crate::{
    KeyRange, ReadOptions, Result, RowSource, SampleEntry, SampleKeyProvider, SampleSource,
    ScanAdvancer, ScanReader, SplitOptions, SplitReducer, TableRef, WorkUnit, split,
};
use rand::{Rng, seq::SliceRandom};
use std::sync::Arc;

/// Plans and reads parallel scans of one table.
///
/// Sample keys are fetched once per planner and reused by every plan.
///
/// # Example
/// ```
/// # #[cfg(feature = "memory")]
/// # {
/// use std::sync::Arc;
/// use tabletio::{KeyRange, MemoryTable, ScanPlanner, SingleRow, SplitOptions, TableRef, ReadOptions};
///
/// let table = TableRef::new("users").unwrap();
/// let store = Arc::new(MemoryTable::new(1 << 20));
/// let planner = ScanPlanner::from_source(table, store);
///
/// let units = planner
///     .plan_splits(&KeyRange::ALL, &SplitOptions::new(64 << 20).unwrap())
///     .unwrap();
/// for unit in units {
///     let mut reader = planner.open_reader(unit, ReadOptions::default(), SingleRow);
///     let mut more = reader.start().unwrap();
///     while more {
///         let _row = reader.current();
///         more = reader.advance().unwrap();
///     }
///     reader.close();
/// }
/// # }
/// ```
pub struct ScanPlanner {
    samples: SampleKeyProvider,
    rows: Arc<dyn RowSource>,
}

impl ScanPlanner {
    pub fn new(
        table: TableRef,
        sample_source: Arc<dyn SampleSource>,
        row_source: Arc<dyn RowSource>,
    ) -> Self {
        Self {
            samples: SampleKeyProvider::new(table, sample_source),
            rows: row_source,
        }
    }

    /// Uses one collaborator for both sampling and row streaming.
    pub fn from_source<S>(table: TableRef, source: Arc<S>) -> Self
    where
        S: SampleSource + RowSource + 'static,
    {
        Self::new(table, source.clone(), source)
    }

    pub fn table(&self) -> &TableRef {
        self.samples.table()
    }

    /// # Errors
    ///
    /// Returns [`Error::Unavailable`](crate::Error::Unavailable) if sampling
    /// fails.
    pub fn sample_keys(&self) -> Result<Arc<[SampleEntry]>> {
        self.samples.sample_keys()
    }

    /// Upper-bound estimate of the bytes stored in `user_range`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`](crate::Error::Unavailable) if sampling
    /// fails.
    pub fn estimated_size_bytes(&self, user_range: &KeyRange) -> Result<u64> {
        let samples = self.samples.sample_keys()?;
        Ok(crate::estimated_size_bytes(&samples, user_range))
    }

    /// Plans work units over `user_range`, in random order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`](crate::Error::Unavailable) if sampling
    /// fails. Sampling anomalies never fail a plan.
    pub fn plan_splits(&self, user_range: &KeyRange, options: &SplitOptions) -> Result<Vec<WorkUnit>> {
        self.plan_splits_with_rng(user_range, options, &mut rand::rng())
    }

    /// Like [`plan_splits`](Self::plan_splits), shuffling with `rng`.
    ///
    /// Units are split in key order, reduced to at most
    /// [`SplitOptions::hard_split_ceiling`] units, then shuffled so parallel
    /// workers do not all start on adjacent regions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unavailable`](crate::Error::Unavailable) if sampling
    /// fails.
    pub fn plan_splits_with_rng<R>(
        &self,
        user_range: &KeyRange,
        options: &SplitOptions,
        rng: &mut R,
    ) -> Result<Vec<WorkUnit>>
    where
        R: Rng + ?Sized,
    {
        let samples = self.samples.sample_keys()?;
        let units = split(&samples, user_range, options);
        let mut units = SplitReducer::new(options.hard_split_ceiling()).reduce(units);
        units.shuffle(rng);

        #[cfg(feature = "tracing")]
        tracing::info!(
            table = %self.table(),
            range = %user_range,
            samples = samples.len(),
            units = units.len(),
            "planned scan"
        );
        Ok(units)
    }

    /// Opens a reader over `unit`. Nothing is fetched until
    /// [`ScanReader::start`].
    pub fn open_reader<A: ScanAdvancer>(
        &self,
        unit: WorkUnit,
        options: ReadOptions,
        advancer: A,
    ) -> ScanReader<A> {
        ScanReader::new(self.table().clone(), self.rows.clone(), unit, options, advancer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cell, Error, MemoryTable, ReadOptions, Row, SingleRow};
    use bytes::Bytes;
    use rand::{SeedableRng, rngs::StdRng};

    fn loaded(rows: usize) -> (TableRef, MemoryTable) {
        let table = TableRef::new("plan").unwrap();
        let mem = MemoryTable::new(500);
        for i in 0..rows {
            let cell = Cell {
                family: "cf".into(),
                qualifier: Bytes::from_static(b"q"),
                timestamp_micros: 0,
                value: Bytes::from(vec![0_u8; 40]),
            };
            mem.insert(&table, Row::new(format!("user{i:05}"), vec![cell]));
        }
        (table, mem)
    }

    fn sorted(units: &[WorkUnit]) -> Vec<KeyRange> {
        let mut ranges: Vec<_> = units.iter().map(|u| u.range.clone()).collect();
        ranges.sort_by(|a, b| a.start().cmp(b.start()));
        ranges
    }

    #[test]
    fn plans_tile_the_requested_range() {
        let (table, mem) = loaded(1_000);
        let planner = ScanPlanner::from_source(table, Arc::new(mem.clone()));
        let options = SplitOptions::new(2_000).unwrap();

        for user_range in [
            KeyRange::ALL,
            KeyRange::new("user00100", "user00900").unwrap(),
            KeyRange::starting_at("user00500"),
        ] {
            let units = planner
                .plan_splits_with_rng(&user_range, &options, &mut StdRng::seed_from_u64(7))
                .unwrap();
            assert!(units.len() > 1);
            let ranges = sorted(&units);
            assert_eq!(ranges.first().unwrap().start(), user_range.start());
            assert_eq!(ranges.last().unwrap().end(), user_range.end());
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end(), pair[1].start());
            }
        }
        assert_eq!(mem.sample_fetches(), 1);
    }

    #[test]
    fn shuffle_is_seedable() {
        let (table, mem) = loaded(1_000);
        let planner = ScanPlanner::from_source(table, Arc::new(mem));
        let options = SplitOptions::new(2_000).unwrap();
        let plan = |seed| {
            planner
                .plan_splits_with_rng(&KeyRange::ALL, &options, &mut StdRng::seed_from_u64(seed))
                .unwrap()
        };
        assert_eq!(plan(42), plan(42));
        assert_eq!(sorted(&plan(1)), sorted(&plan(2)));
    }

    #[test]
    fn plans_respect_hard_ceiling() {
        let (table, mem) = loaded(1_000);
        let planner = ScanPlanner::from_source(table, Arc::new(mem));
        let options = SplitOptions::builder(100).hard_split_ceiling(4).build().unwrap();
        let units = planner.plan_splits(&KeyRange::ALL, &options).unwrap();
        assert!(units.len() <= 4);
        assert_eq!(
            units.iter().map(|u| u.estimated_size_bytes).sum::<u64>(),
            planner.estimated_size_bytes(&KeyRange::ALL).unwrap()
        );
    }

    #[test]
    fn planned_units_read_every_row_once() {
        let (table, mem) = loaded(300);
        let planner = ScanPlanner::from_source(table.clone(), Arc::new(mem.clone()));
        let units = planner
            .plan_splits(&KeyRange::ALL, &SplitOptions::new(1_000).unwrap())
            .unwrap();

        let mut keys = Vec::new();
        for unit in units {
            let mut reader = planner.open_reader(unit, ReadOptions::default(), SingleRow);
            let mut more = reader.start().unwrap();
            while more {
                keys.extend(reader.take_current().map(|r| r.key));
                more = reader.advance().unwrap();
            }
        }
        keys.sort();
        let expected: Vec<_> = mem.rows(&table).into_iter().map(|r| r.key).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn sampling_failure_surfaces_and_is_retried() {
        let (table, mem) = loaded(10);
        mem.fail_sample_fetches(1);
        let planner = ScanPlanner::from_source(table, Arc::new(mem.clone()));
        let options = SplitOptions::new(1_000).unwrap();

        assert!(matches!(
            planner.plan_splits(&KeyRange::ALL, &options),
            Err(Error::Unavailable { .. })
        ));
        assert!(planner.plan_splits(&KeyRange::ALL, &options).is_ok());
        assert_eq!(mem.sample_fetches(), 2);
    }
}
