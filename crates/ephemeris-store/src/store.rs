//! The append-only interval store.
//!
//! # Design
//!
//! - **Append-only**: records are never modified or removed.
//! - **Overlap allowed**: independent writers may cover the same instant;
//!   they are reconciled at read time by [`IntervalStore::merge`].
//! - **Insertion order is precedence**: among records covering one point,
//!   the later-inserted record wins on key collisions.

use ephemeris_types::Time;
use serde::{Serialize, Serializer};

use crate::{IntervalRecord, Overlay, StoreError};

/// An ordered collection of `[low, high)` -> value records.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalStore<V> {
    /// All records, in insertion order.
    records: Vec<IntervalRecord<V>>,
}

impl<V> Default for IntervalStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IntervalStore<V> {
    /// Create a new empty store.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Rebuild a store by replaying exported records in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReplayFailed`] naming the first record whose
    /// range is invalid.
    pub fn from_records<I>(records: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = IntervalRecord<V>>,
    {
        let mut store = Self::new();
        for (index, record) in records.into_iter().enumerate() {
            let (low, high, value) = record.into_parts();
            store
                .insert(low, high, value)
                .map_err(|source| StoreError::ReplayFailed {
                    index,
                    source: Box::new(source),
                })?;
        }
        Ok(store)
    }

    /// Return the number of records in the store.
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Return whether the store has no records.
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, in insertion order.
    pub fn records(&self) -> &[IntervalRecord<V>] {
        &self.records
    }

    /// Append `value` over `[low, high)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRange`] if `low >= high`. The store is
    /// left untouched.
    pub fn insert(&mut self, low: Time, high: Time, value: V) -> Result<(), StoreError> {
        let record = IntervalRecord::new(low, high, value)?;
        self.records.push(record);
        Ok(())
    }

    /// Every value whose interval contains `point`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no interval contains `point`.
    pub fn query(&self, point: Time) -> Result<Vec<&V>, StoreError> {
        let hits: Vec<&V> = self
            .records
            .iter()
            .filter(|record| record.contains(point))
            .map(IntervalRecord::value)
            .collect();
        if hits.is_empty() {
            return Err(StoreError::NotFound { point });
        }
        Ok(hits)
    }

    /// Consume the store, returning its records in insertion order.
    pub fn into_records(self) -> Vec<IntervalRecord<V>> {
        self.records
    }
}

impl<V: Overlay + Default + Clone> IntervalStore<V> {
    /// Combine every value covering `point` into one, later records on top.
    ///
    /// A point with no history yields `V::default()` rather than an error:
    /// "nothing committed yet" is a valid state for callers.
    pub fn merge(&self, point: Time) -> V {
        let Ok(hits) = self.query(point) else {
            return V::default();
        };
        let mut merged = V::default();
        for value in hits {
            merged.overlay(value);
        }
        merged
    }
}

impl<V: Serialize> Serialize for IntervalStore<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lettered_store() -> IntervalStore<&'static str> {
        let mut store = IntervalStore::new();
        store.insert(0.0, 3.0, "Record A").unwrap();
        store.insert(3.0, 4.0, "Record B").unwrap();
        store.insert(0.0, 2.0, "Record C").unwrap();
        store.insert(2.0, 4.0, "Record D").unwrap();
        store.insert(8.0, 9.0, "Record E").unwrap();
        store
    }

    #[test]
    fn query_returns_covering_values_in_store_order() {
        let store = lettered_store();
        assert_eq!(store.query(2.1).unwrap(), vec![&"Record A", &"Record D"]);
        assert_eq!(store.query(8.0).unwrap(), vec![&"Record E"]);
    }

    #[test]
    fn query_outside_every_interval_is_not_found() {
        let store = lettered_store();
        assert_eq!(
            store.query(5.0),
            Err(StoreError::NotFound { point: 5.0 })
        );
        // Upper bounds are exclusive.
        assert!(store.query(9.0).is_err());
    }

    #[test]
    fn invalid_insert_leaves_store_untouched() {
        let mut store = lettered_store();
        let result = store.insert(2.0, 0.0, "Record F");
        assert_eq!(
            result,
            Err(StoreError::InvalidRange {
                low: 2.0,
                high: 0.0
            })
        );
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn merge_of_empty_history_is_empty() {
        let store: IntervalStore<BTreeMap<String, i32>> = IntervalStore::new();
        assert!(store.merge(0.0).is_empty());
    }

    #[test]
    fn merge_overlays_in_insertion_order() {
        let mut store = IntervalStore::new();
        store
            .insert(0.0, 10.0, BTreeMap::from([("a", 1), ("shared", 1)]))
            .unwrap();
        store
            .insert(5.0, 10.0, BTreeMap::from([("b", 2), ("shared", 2)]))
            .unwrap();

        let early = store.merge(1.0);
        assert_eq!(early, BTreeMap::from([("a", 1), ("shared", 1)]));

        let late = store.merge(6.0);
        assert_eq!(late, BTreeMap::from([("a", 1), ("b", 2), ("shared", 2)]));
    }

    #[test]
    fn replay_reports_the_offending_record() {
        let good = IntervalRecord::new(0.0, 1.0, 1).unwrap();
        let store = IntervalStore::from_records(vec![good]).unwrap();
        assert_eq!(store.len(), 1);

        let records: Vec<IntervalRecord<i32>> =
            serde_json::from_str("[[0.0, 1.0, 1], [1.0, 2.0, 2]]").unwrap();
        let replayed = IntervalStore::from_records(records).unwrap();
        assert_eq!(replayed.len(), 2);
    }

    #[test]
    fn serializes_as_sequence_of_triples() {
        let mut store = IntervalStore::new();
        store.insert(0.0, 1.0, 7).unwrap();
        store.insert(1.0, 2.0, 8).unwrap();
        let json = serde_json::to_string(&store).unwrap();
        assert_eq!(json, "[[0.0,1.0,7],[1.0,2.0,8]]");
    }
}
