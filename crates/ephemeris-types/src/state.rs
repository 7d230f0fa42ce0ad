//! State containers shared by the store, the query interpreter, and the
//! simulation driver.
//!
//! Agent state is free-form: each agent maps field names to numbers or
//! nested mappings (e.g. `position: {x, y, z}`), so it is carried as a
//! [`serde_json::Value`]. The containers are ordered maps to keep iteration
//! deterministic.

use std::collections::BTreeMap;

use crate::ids::{AgentId, EngineId};

/// A point in simulated time. Totally ordered for finite values.
pub type Time = f64;

/// A field value: number, nested mapping, or list.
pub type Value = serde_json::Value;

/// A field-name to value mapping (one agent's state).
pub type Fields = serde_json::Map<String, Value>;

/// Agent name to agent state.
pub type StateMap = BTreeMap<AgentId, Value>;

/// Engine name to the merged state of its agents as of some instant.
pub type Universe = BTreeMap<EngineId, StateMap>;

/// Field carrying an agent's simulated time.
pub const TIME_FIELD: &str = "time";

/// Field carrying an agent's next adaptive step length.
pub const TIME_STEP_FIELD: &str = "timeStep";

/// Read a numeric field from an agent state, if present and numeric.
pub fn numeric_field(state: &Value, field: &str) -> Option<f64> {
    state.get(field).and_then(Value::as_f64)
}

/// Read an agent's `time` field.
pub fn time_of(state: &Value) -> Option<Time> {
    numeric_field(state, TIME_FIELD)
}
