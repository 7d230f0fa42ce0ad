//! Interval records: the unit of storage and of export.

use ephemeris_types::Time;
use serde::{Deserialize, Serialize, Serializer};

use crate::StoreError;

/// An immutable binding of the range `[low, high)` to a value.
///
/// Serialized as the triple `[low, high, value]`. Deserialization re-checks
/// the range, so an exported record can never smuggle in `low >= high`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    try_from = "(Time, Time, V)",
    bound(deserialize = "V: Deserialize<'de>")
)]
pub struct IntervalRecord<V> {
    /// Inclusive lower bound.
    low: Time,
    /// Exclusive upper bound.
    high: Time,
    /// The stored value.
    value: V,
}

impl<V> IntervalRecord<V> {
    /// Build a record, validating that `low < high`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRange`] if `low >= high` or either bound
    /// is `NaN`.
    pub fn new(low: Time, high: Time, value: V) -> Result<Self, StoreError> {
        // Written as a negated `<` so that NaN bounds are rejected too.
        if !(low < high) {
            return Err(StoreError::InvalidRange { low, high });
        }
        Ok(Self { low, high, value })
    }

    /// Inclusive lower bound.
    pub const fn low(&self) -> Time {
        self.low
    }

    /// Exclusive upper bound.
    pub const fn high(&self) -> Time {
        self.high
    }

    /// The stored value.
    pub const fn value(&self) -> &V {
        &self.value
    }

    /// Whether `point` lies in `[low, high)`.
    pub fn contains(&self, point: Time) -> bool {
        self.low <= point && point < self.high
    }

    /// Split the record into its parts.
    pub fn into_parts(self) -> (Time, Time, V) {
        (self.low, self.high, self.value)
    }
}

impl<V> TryFrom<(Time, Time, V)> for IntervalRecord<V> {
    type Error = StoreError;

    fn try_from((low, high, value): (Time, Time, V)) -> Result<Self, Self::Error> {
        Self::new(low, high, value)
    }
}

impl<V: Serialize> Serialize for IntervalRecord<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.low, self.high, &self.value).serialize(serializer)
    }
}
