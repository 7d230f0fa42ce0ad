//! Temporal interval store for the Ephemeris simulation.
//!
//! The store maps left-inclusive, right-exclusive time ranges `[low, high)`
//! to values. Reading a point returns every value whose range contains it,
//! in insertion order.
//!
//! ```text
//! 0  1  2  3  4  5  6  7  8  9
//! [A      )[B)            [E)
//! [C   )[D   )
//!        ^       ^        ^  ^
//! ```
//!
//! # Modules
//!
//! - [`overlay`] -- The [`Overlay`] merge contract used by [`IntervalStore::merge`]
//! - [`record`] -- [`IntervalRecord`], the exported `(low, high, value)` triple
//! - [`store`] -- [`IntervalStore`] itself

pub mod overlay;
pub mod record;
pub mod store;

pub use overlay::Overlay;
pub use record::IntervalRecord;
pub use store::IntervalStore;

use ephemeris_types::Time;

/// Errors that can occur during interval store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The range is empty, inverted, or not comparable (`NaN` bound).
    #[error("invalid range [{low}, {high}): low must be strictly less than high")]
    InvalidRange {
        /// Requested lower bound.
        low: Time,
        /// Requested upper bound.
        high: Time,
    },

    /// No stored interval contains the queried point.
    #[error("no interval contains t = {point}")]
    NotFound {
        /// The queried instant.
        point: Time,
    },

    /// An exported record could not be replayed into a fresh store.
    #[error("record {index} could not be replayed: {source}")]
    ReplayFailed {
        /// Position of the record in the exported sequence.
        index: usize,
        /// The underlying validation error.
        source: Box<StoreError>,
    },
}
