//! Producer functions: the pluggable computations behind each rule.
//!
//! A producer receives the resolved inputs of its rule positionally (one
//! argument per `Tuple` item, or a single argument otherwise) and returns
//! the value written at the rule's production target. Producers are pure;
//! the resolver calls each at most once per step.
//!
//! Rules name their producer by string. [`ProducerRegistry`] maps those
//! names to implementations and ships the built-in two-body physics:
//!
//! | Name | Arguments | Result |
//! |------|-----------|--------|
//! | `propagate_velocity` | `dt, r, v, r_other, m_other` | `v - m_other * (r - r_other) / \|r - r_other\|^3 * dt` |
//! | `propagate_position` | `dt, r, v` | `r + v * dt` |
//! | `propagate_mass` | `m` | `m` |
//! | `identity` | `x` | `x` |
//! | `timestep_manager` | any | `physics.fixed_time_step` |
//! | `time_manager` | `t, dt` | `t + dt` |
//!
//! Vectors are mappings with numeric `x`, `y`, and `z` fields.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ephemeris_types::{Fields, Value};
use nalgebra::Vector3;
use serde_json::Number;

use crate::config::PhysicsConfig;

/// Errors a producer can return.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProducerError {
    /// Wrong number of arguments.
    #[error("expected {expected} argument(s), got {actual}")]
    Arity {
        /// Number of arguments the producer takes.
        expected: usize,
        /// Number of arguments it was given.
        actual: usize,
    },

    /// An argument has the wrong shape.
    #[error("argument {index} must be {expected}, got {found}")]
    ArgumentType {
        /// Zero-based argument position.
        index: usize,
        /// What the producer needed.
        expected: &'static str,
        /// The offending value, rendered.
        found: String,
    },

    /// The result cannot be represented (NaN or infinite).
    #[error("result is not finite: {what}")]
    NonFinite {
        /// Which quantity diverged.
        what: &'static str,
    },

    /// A user-supplied producer failed.
    #[error("{reason}")]
    Failed {
        /// Explanation supplied by the producer.
        reason: String,
    },
}

/// A pure computation from resolved inputs to one output value.
pub trait Producer: Send + Sync {
    /// Compute the output from positional `args`.
    ///
    /// # Errors
    ///
    /// Returns [`ProducerError`] if the arguments are unusable or the
    /// result is not representable.
    fn produce(&self, args: &[Value]) -> Result<Value, ProducerError>;
}

impl<F> Producer for F
where
    F: Fn(&[Value]) -> Result<Value, ProducerError> + Send + Sync,
{
    fn produce(&self, args: &[Value]) -> Result<Value, ProducerError> {
        self(args)
    }
}

/// Named producers available to rule tables.
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    producers: BTreeMap<String, Arc<dyn Producer>>,
}

impl fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("names", &self.producers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProducerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in physics producers.
    pub fn with_builtins(physics: &PhysicsConfig) -> Self {
        let mut registry = Self::new();
        let fixed_step = physics.fixed_time_step;
        registry.register("propagate_velocity", propagate_velocity);
        registry.register("propagate_position", propagate_position);
        registry.register("propagate_mass", propagate_mass);
        registry.register("identity", identity);
        registry.register("time_manager", time_manager);
        registry.register("timestep_manager", move |_: &[Value]| number(fixed_step, "time step"));
        registry
    }

    /// Register `producer` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, producer: impl Producer + 'static) {
        self.producers.insert(name.into(), Arc::new(producer));
    }

    /// Look up a producer by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Producer>> {
        self.producers.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.producers.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Built-in producers
// ---------------------------------------------------------------------------

// Vector3 operators are f64 arithmetic and cannot overflow-panic.
#[allow(clippy::arithmetic_side_effects)]
fn propagate_velocity(args: &[Value]) -> Result<Value, ProducerError> {
    let [dt, position, velocity, other_position, other_mass] = exact::<5>(args)?;
    let dt = scalar(dt, 0)?;
    let r = vector(position, 1)?;
    let v = vector(velocity, 2)?;
    let r_other = vector(other_position, 3)?;
    let m_other = scalar(other_mass, 4)?;

    let separation = r - r_other;
    let distance = separation.norm();
    let acceleration = -m_other * separation / distance.powi(3);
    vector_value(&(v + acceleration * dt), "velocity")
}

#[allow(clippy::arithmetic_side_effects)]
fn propagate_position(args: &[Value]) -> Result<Value, ProducerError> {
    let [dt, position, velocity] = exact::<3>(args)?;
    let dt = scalar(dt, 0)?;
    let r = vector(position, 1)?;
    let v = vector(velocity, 2)?;
    vector_value(&(r + v * dt), "position")
}

fn propagate_mass(args: &[Value]) -> Result<Value, ProducerError> {
    let [mass] = exact::<1>(args)?;
    scalar(mass, 0)?;
    Ok(mass.clone())
}

fn identity(args: &[Value]) -> Result<Value, ProducerError> {
    let [value] = exact::<1>(args)?;
    Ok(value.clone())
}

fn time_manager(args: &[Value]) -> Result<Value, ProducerError> {
    let [time, step] = exact::<2>(args)?;
    number(scalar(time, 0)? + scalar(step, 1)?, "time")
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn exact<const N: usize>(args: &[Value]) -> Result<&[Value; N], ProducerError> {
    match args.try_into() {
        Ok(array) => Ok(array),
        Err(std::array::TryFromSliceError { .. }) => Err(ProducerError::Arity {
            expected: N,
            actual: args.len(),
        }),
    }
}

fn scalar(value: &Value, index: usize) -> Result<f64, ProducerError> {
    value.as_f64().ok_or_else(|| ProducerError::ArgumentType {
        index,
        expected: "a number",
        found: value.to_string(),
    })
}

fn vector(value: &Value, index: usize) -> Result<Vector3<f64>, ProducerError> {
    let component = |axis: &str| value.get(axis).and_then(Value::as_f64);
    match (component("x"), component("y"), component("z")) {
        (Some(x), Some(y), Some(z)) => Ok(Vector3::new(x, y, z)),
        _ => Err(ProducerError::ArgumentType {
            index,
            expected: "an {x, y, z} vector",
            found: value.to_string(),
        }),
    }
}

fn number(value: f64, what: &'static str) -> Result<Value, ProducerError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or(ProducerError::NonFinite { what })
}

fn vector_value(v: &Vector3<f64>, what: &'static str) -> Result<Value, ProducerError> {
    let mut fields = Fields::new();
    fields.insert("x".to_owned(), number(v.x, what)?);
    fields.insert("y".to_owned(), number(v.y, what)?);
    fields.insert("z".to_owned(), number(v.z, what)?);
    Ok(Value::Object(fields))
}
