//! Ordered, duplicate-tolerant secondary index over a single typed column.
//!
//! Backed by a `BTreeSet` the same way a B-tree index is, keyed on the
//! column's [`Value`] with an insertion counter as tiebreaker so duplicate
//! keys come back out in the order they went in, matching the teacher's
//! `IndexKey { value, row_id }` composition.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;

use framedb_primitives::Value;

mod error;
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// One indexed key pointing at the record that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexEntry {
    pub key: Value,
    pub data_offset: u64,
    pub data_length: u32,
    pub sequence: u64,
}

/// Wraps an [`IndexEntry`] with an insertion counter so the backing
/// `BTreeSet` can hold duplicate keys while still ordering primarily by key
/// and, among ties, by insertion order.
#[derive(Clone, Debug)]
struct Slot {
    key: Value,
    insertion_seq: u64,
    entry: IndexEntry,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.insertion_seq == other.insertion_seq
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then(self.insertion_seq.cmp(&other.insertion_seq))
    }
}

/// An ordered collection of [`IndexEntry`] keyed by [`Value`].
#[derive(Debug, Default)]
pub struct Index {
    slots: BTreeSet<Slot>,
    next_insertion_seq: u64,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// O(log n). Duplicate keys are preserved in insertion order. Rejects
    /// NaN float keys with a coercion error, per the index's ordering
    /// contract; callers whose column's uniqueness is owned upstream (e.g. a
    /// primary key) are responsible for rejecting duplicate keys themselves.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn insert(&mut self, key: Value, offset: u64, length: u32, sequence: u64) -> Result<()> {
        if key.is_nan() {
            return Err(Error::NanKey);
        }
        let insertion_seq = self.next_insertion_seq;
        self.next_insertion_seq += 1;
        self.slots.insert(Slot {
            key: key.clone(),
            insertion_seq,
            entry: IndexEntry {
                key,
                data_offset: offset,
                data_length: length,
                sequence,
            },
        });
        Ok(())
    }

    /// Returns an empty iterator (rather than panicking) when `min > max`.
    /// `BTreeSet::range` requires a non-inverted bound, but a caller-supplied
    /// min/max pair is not guaranteed to be ordered correctly (e.g. a cursor
    /// binding SQLite's WHERE-clause constraints in the order they appear).
    fn key_range(&self, min: &Value, max: &Value) -> Box<dyn Iterator<Item = &IndexEntry> + '_> {
        if min > max {
            return Box::new(std::iter::empty());
        }
        let lo = Slot {
            key: min.clone(),
            insertion_seq: 0,
            entry: IndexEntry {
                key: min.clone(),
                data_offset: 0,
                data_length: 0,
                sequence: 0,
            },
        };
        let hi = Slot {
            key: max.clone(),
            insertion_seq: u64::MAX,
            entry: IndexEntry {
                key: max.clone(),
                data_offset: 0,
                data_length: 0,
                sequence: 0,
            },
        };
        Box::new(
            self.slots
                .range((Bound::Included(lo), Bound::Included(hi)))
                .map(|slot| &slot.entry),
        )
    }

    /// All entries with exactly equal key, in insertion order.
    pub fn search(&self, key: &Value) -> Vec<IndexEntry> {
        self.key_range(key, key).cloned().collect()
    }

    /// Arbitrary one match; for a unique column this is the only entry.
    pub fn search_first(&self, key: &Value) -> Option<IndexEntry> {
        self.key_range(key, key).next().cloned()
    }

    /// Type-specialized fast path for an `i64` key.
    pub fn search_first_int64(&self, key: i64) -> Option<IndexEntry> {
        self.search_first(&Value::I64(key))
    }

    /// Type-specialized fast path for a string key.
    pub fn search_first_string(&self, key: &str) -> Option<IndexEntry> {
        self.search_first(&Value::String(key.to_string()))
    }

    /// Inclusive on both ends.
    pub fn range(&self, min: &Value, max: &Value) -> Vec<IndexEntry> {
        self.key_range(min, max).cloned().collect()
    }

    /// All entries, in key order (ties in insertion order).
    pub fn all(&self) -> Vec<IndexEntry> {
        self.slots.iter().map(|slot| slot.entry.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn all_is_always_sorted_by_key(keys in proptest::collection::vec(any::<i64>(), 0..50)) {
            let mut idx = Index::new();
            for (i, k) in keys.iter().enumerate() {
                idx.insert(Value::I64(*k), 0, 1, i as u64 + 1).unwrap();
            }
            let returned: Vec<i64> = idx.all().into_iter().map(|e| match e.key {
                Value::I64(v) => v,
                _ => unreachable!(),
            }).collect();
            let mut expected = keys.clone();
            expected.sort();
            prop_assert_eq!(returned, expected);
        }
    }
}
