//! The run artifact: every engine's committed history as JSON.
//!
//! ```json
//! {
//!   "run_id": "0190c5d2-...",
//!   "name": "Two Body",
//!   "created_at": "2026-01-01T00:00:00Z",
//!   "engines": {
//!     "orbits": [[-999999999.0, 0.0, {"Body1": {...}, "Body2": {...}}], ...]
//!   }
//! }
//! ```
//!
//! Records keep store order, so replaying them with
//! [`IntervalStore::from_records`] rebuilds identical merges.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::Path;

use chrono::{DateTime, Utc};
use ephemeris_core::driver::Simulation;
use ephemeris_store::{IntervalRecord, IntervalStore, StoreError};
use ephemeris_types::{EngineId, RunId, StateMap};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;

/// One run's exported history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunExport {
    /// Time-ordered run identifier.
    pub run_id: RunId,
    /// Configured run name.
    pub name: String,
    /// When the artifact was produced.
    pub created_at: DateTime<Utc>,
    /// Engine name to its records in store order.
    pub engines: BTreeMap<EngineId, Vec<IntervalRecord<StateMap>>>,
}

impl RunExport {
    /// Collect the history of every simulation.
    pub fn new(run_id: RunId, name: String, simulations: Vec<Simulation>) -> Self {
        let engines = simulations
            .into_iter()
            .map(|simulation| {
                let engine = simulation.engine().clone();
                (engine, simulation.into_store().into_records())
            })
            .collect();
        Self {
            run_id,
            name,
            created_at: Utc::now(),
            engines,
        }
    }

    /// Total records across every engine.
    pub fn record_count(&self) -> usize {
        self.engines.values().map(Vec::len).sum()
    }

    /// Write the artifact as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> Result<(), EngineError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!(
            path = %path.display(),
            run_id = %self.run_id,
            engines = self.engines.len(),
            records = self.record_count(),
            "Store exported"
        );
        Ok(())
    }

    /// Read an artifact written by [`RunExport::write_to`].
    pub fn read_from(path: &Path) -> Result<Self, EngineError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Rebuild every engine's store from its records.
    pub fn replay(self) -> Result<BTreeMap<EngineId, IntervalStore<StateMap>>, StoreError> {
        self.engines
            .into_iter()
            .map(|(engine, records)| IntervalStore::from_records(records).map(|store| (engine, store)))
            .collect()
    }
}
