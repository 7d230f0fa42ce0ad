//! Property tests for the interval store's range and merge invariants.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;

use ephemeris_store::{IntervalRecord, IntervalStore, StoreError};
use proptest::prelude::*;

/// Bounds drawn on a 1/8 grid so half-open edges are hit exactly.
fn bound() -> impl Strategy<Value = f64> {
    (-800_i32..800).prop_map(|n| f64::from(n) / 8.0)
}

fn valid_range() -> impl Strategy<Value = (f64, f64)> {
    (bound(), 1_i32..400).prop_map(|(low, width)| (low, low + f64::from(width) / 8.0))
}

/// Two ranges that always overlap: one starts on the 1/8 grid inside the
/// other. `swap` decides which of the two is inserted first.
fn overlapping_ranges() -> impl Strategy<Value = ((f64, f64), (f64, f64))> {
    (bound(), 1_i32..400)
        .prop_flat_map(|(low, width)| (Just(low), Just(width), 0..width, 1_i32..400, any::<bool>()))
        .prop_map(|(low, width, offset, other_width, swap)| {
            let outer = (low, low + f64::from(width) / 8.0);
            let inner_low = low + f64::from(offset) / 8.0;
            let inner = (inner_low, inner_low + f64::from(other_width) / 8.0);
            if swap { (inner, outer) } else { (outer, inner) }
        })
}

proptest! {
    #[test]
    fn inserted_value_is_visible_exactly_inside_its_range(
        (low, high) in valid_range(),
        point in bound(),
    ) {
        let mut store = IntervalStore::new();
        store.insert(low, high, "v").unwrap();

        let inside = low <= point && point < high;
        let hit = store.query(point).map(|values| values.contains(&&"v")).unwrap_or(false);
        prop_assert_eq!(hit, inside);

        // Both edges behave as [low, high).
        prop_assert!(store.query(low).is_ok());
        prop_assert!(store.query(high).is_err());
    }

    #[test]
    fn inverted_or_empty_ranges_always_fail_without_mutation(
        high in bound(),
        gap in 0_i32..400,
    ) {
        let low = high + f64::from(gap) / 8.0;
        let mut store = IntervalStore::new();
        store.insert(-1000.0, -999.0, 0).unwrap();

        let result = store.insert(low, high, 1);
        prop_assert_eq!(result, Err(StoreError::InvalidRange { low, high }));
        prop_assert_eq!(store.len(), 1);
    }

    #[test]
    fn last_inserted_wins_on_shared_keys(
        ((low_a, high_a), (low_b, high_b)) in overlapping_ranges(),
    ) {
        let lo = low_a.max(low_b);
        prop_assert!(lo < high_a.min(high_b));

        let mut store = IntervalStore::new();
        store.insert(low_a, high_a, BTreeMap::from([("k", 'A'), ("a", 'A')])).unwrap();
        store.insert(low_b, high_b, BTreeMap::from([("k", 'B'), ("b", 'B')])).unwrap();

        let merged = store.merge(lo);
        prop_assert_eq!(merged.get("k"), Some(&'B'));
        prop_assert_eq!(merged.get("a"), Some(&'A'));
        prop_assert_eq!(merged.get("b"), Some(&'B'));
    }

    #[test]
    fn export_then_replay_preserves_every_merge(
        ranges in prop::collection::vec(valid_range(), 1..12),
        points in prop::collection::vec(bound(), 1..24),
    ) {
        let mut store = IntervalStore::new();
        for (i, (low, high)) in ranges.iter().enumerate() {
            let value = BTreeMap::from([(format!("r{}", i % 3), i), ("all".to_owned(), i)]);
            store.insert(*low, *high, value).unwrap();
        }

        let json = serde_json::to_string(&store).unwrap();
        let exported: Vec<IntervalRecord<BTreeMap<String, usize>>> =
            serde_json::from_str(&json).unwrap();
        let replayed = IntervalStore::from_records(exported).unwrap();

        prop_assert_eq!(replayed.len(), store.len());
        for point in points {
            prop_assert_eq!(replayed.merge(point), store.merge(point));
        }
    }
}

#[test]
fn nan_bounds_are_invalid() {
    let mut store = IntervalStore::new();
    assert!(store.insert(f64::NAN, 1.0, ()).is_err());
    assert!(store.insert(0.0, f64::NAN, ()).is_err());
    assert!(store.is_empty());
}
