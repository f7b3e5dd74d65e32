use core::time::Duration;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Allocation, CounterKey, CounterSnapshot, Error, IdentifierLookup, Result, SequenceStore,
    StoreError,
};

type Row = Arc<Mutex<Option<CounterSnapshot>>>;

/// An in-process [`SequenceStore`].
///
/// Each counter row sits behind its own lock, held for the whole allocation
/// including `finish`, so allocations on one key are serialized while other
/// keys proceed independently. A row that fails its first allocation is left
/// absent, exactly as a rolled-back insert would be.
///
/// Business identifiers registered through
/// [`MemoryStore::insert_business_identifier`] back the safety-net lookup.
///
/// Counters live only as long as the store, so this is suited to tests,
/// single-process tools and embedding; use a durable store when multiple
/// processes share a numbering scheme.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<CounterKey, Row>>,
    business: RwLock<HashMap<String, HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a business row of `sequence_type` carries `identifier`.
    pub fn insert_business_identifier(
        &self,
        sequence_type: impl Into<String>,
        identifier: impl Into<String>,
    ) {
        self.business
            .write()
            .entry(sequence_type.into())
            .or_default()
            .insert(identifier.into());
    }

    fn row(&self, key: &CounterKey) -> Row {
        Arc::clone(self.rows.lock().entry(key.clone()).or_default())
    }
}

impl IdentifierLookup for MemoryStore {
    fn exists(&self, sequence_type: &str, identifier: &str) -> Result<bool, StoreError> {
        Ok(self
            .business
            .read()
            .get(sequence_type)
            .is_some_and(|ids| ids.contains(identifier)))
    }
}

impl SequenceStore for MemoryStore {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, finish)))]
    fn allocate<T, F>(&self, key: &CounterKey, count: u64, timeout: Duration, finish: F) -> Result<T>
    where
        F: FnOnce(Allocation, &dyn IdentifierLookup) -> Result<T>,
    {
        let row = self.row(key);
        let mut guard = row
            .try_lock_for(timeout)
            .ok_or(StoreError::Timeout(timeout))?;

        let current = guard.as_ref().map_or(0, |r| r.current_sequence);
        let last = current
            .checked_add(count)
            .ok_or_else(|| Error::FormatOverflow {
                value: u64::MAX,
                width: crate::MAX_NUMBER_LENGTH,
            })?;
        let allocation = Allocation::ending_at(last, count);

        let value = finish(allocation, self)?;

        let now = Utc::now();
        match guard.as_mut() {
            Some(row) => {
                row.current_sequence = last;
                row.updated_at = now;
            }
            None => {
                *guard = Some(CounterSnapshot {
                    current_sequence: last,
                    created_at: now,
                    updated_at: now,
                });
            }
        }
        Ok(value)
    }

    fn snapshot(&self, key: &CounterKey) -> Result<Option<CounterSnapshot>, StoreError> {
        let row = match self.rows.lock().get(key) {
            Some(row) => Arc::clone(row),
            None => return Ok(None),
        };
        let snapshot = row.lock().clone();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::thread::scope;

    use super::*;
    use crate::DateKey;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn key(sequence_type: &str, day: u32) -> CounterKey {
        CounterKey::new(sequence_type, DateKey::from_ymd(2025, 1, day).unwrap())
    }

    fn take(store: &MemoryStore, key: &CounterKey, count: u64) -> Allocation {
        store.allocate(key, count, TIMEOUT, |a, _| Ok(a)).unwrap()
    }

    #[test]
    fn first_allocation_starts_at_one() {
        let store = MemoryStore::new();
        let k = key("sales_order", 19);
        assert_eq!(store.snapshot(&k).unwrap(), None);

        assert_eq!(take(&store, &k, 1), Allocation { first: 1, last: 1 });
        assert_eq!(take(&store, &k, 3), Allocation { first: 2, last: 4 });
        assert_eq!(store.snapshot(&k).unwrap().unwrap().current_sequence, 4);
    }

    #[test]
    fn keys_are_independent() {
        let store = MemoryStore::new();
        take(&store, &key("sales_order", 19), 5);
        assert_eq!(take(&store, &key("sales_order", 20), 1).first, 1);
        assert_eq!(take(&store, &key("return_order", 19), 1).first, 1);
    }

    #[test]
    fn failed_finish_rolls_back() {
        let store = MemoryStore::new();
        let k = key("sales_order", 19);

        let res: Result<()> = store.allocate(&k, 1, TIMEOUT, |_, _| {
            Err(StoreError::Conflict("forced".into()).into())
        });
        assert!(res.unwrap_err().is_retryable());
        assert_eq!(store.snapshot(&k).unwrap(), None);

        take(&store, &k, 2);
        let _ = store.allocate(&k, 5, TIMEOUT, |_, _| -> Result<()> {
            Err(StoreError::Conflict("forced".into()).into())
        });
        assert_eq!(store.snapshot(&k).unwrap().unwrap().current_sequence, 2);
        assert_eq!(take(&store, &k, 1).first, 3);
    }

    #[test]
    fn lookup_sees_registered_business_rows() {
        let store = MemoryStore::new();
        store.insert_business_identifier("sales_order", "SO202501190001");
        assert!(store.exists("sales_order", "SO202501190001").unwrap());
        assert!(!store.exists("sales_order", "SO202501190002").unwrap());
        assert!(!store.exists("return_order", "SO202501190001").unwrap());
    }

    #[test]
    fn contended_row_times_out() {
        let store = MemoryStore::new();
        let k = key("sales_order", 19);
        let held = store.row(&k);
        let _guard = held.lock();

        let err = store
            .allocate(&k, 1, Duration::from_millis(20), |a, _| Ok(a))
            .unwrap_err();
        assert_eq!(
            err,
            Error::RetryableConflict(StoreError::Timeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn concurrent_allocations_never_overlap() {
        let store = MemoryStore::new();
        let k = key("sales_order", 19);
        let threads = num_cpus::get().max(4);

        let mut ranges: Vec<Allocation> = scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let store = &store;
                    let k = &k;
                    s.spawn(move || {
                        (0..200)
                            .map(|i| take(store, k, 1 + ((t + i) % 3) as u64))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        ranges.sort_by_key(|a| a.first);
        let mut expected = 1;
        for range in &ranges {
            assert_eq!(range.first, expected, "gap or overlap at {range:?}");
            expected = range.last + 1;
        }
        let last = store.snapshot(&k).unwrap().unwrap().current_sequence;
        assert_eq!(last + 1, expected);
    }
}
