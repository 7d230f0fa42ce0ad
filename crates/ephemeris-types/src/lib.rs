//! Shared type definitions for the Ephemeris simulation.
//!
//! # Modules
//!
//! - [`ids`] -- Name-backed agent and engine identifiers, UUID run ids
//! - [`state`] -- Agent state, state maps, and the engine-keyed universe

pub mod ids;
pub mod state;

pub use ids::{AgentId, EngineId, RunId};
pub use state::{
    Fields, StateMap, TIME_FIELD, TIME_STEP_FIELD, Time, Universe, Value, numeric_field, time_of,
};
