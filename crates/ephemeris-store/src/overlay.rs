//! Overlay merge for values read from overlapping intervals.

use std::collections::BTreeMap;

/// A value that can absorb a later value on top of itself.
///
/// Merging is top-level only: keys present in `top` replace the
/// accumulator's entries wholesale, keys absent from `top` are kept.
pub trait Overlay {
    /// Lay `top` over `self`. `top` wins on every shared key.
    fn overlay(&mut self, top: &Self);
}

impl<K: Ord + Clone, V: Clone> Overlay for BTreeMap<K, V> {
    fn overlay(&mut self, top: &Self) {
        for (key, value) in top {
            self.insert(key.clone(), value.clone());
        }
    }
}
