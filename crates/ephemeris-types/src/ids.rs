//! Type-safe identifier wrappers.
//!
//! Agents and engines are addressed by the names they are declared under in
//! the configuration, so their IDs wrap a [`String`]. Simulation runs get a
//! time-ordered UUID v7 so exported artifacts sort by creation.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around a declared name with standard derives.
macro_rules! define_name_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from a declared name.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Borrow the declared name.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner name.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name_id! {
    /// Name of an agent (an independently clocked simulated body).
    AgentId
}

define_name_id! {
    /// Name of an engine (a collection of agents sharing one rule graph).
    EngineId
}

/// Unique identifier for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn name_ids_serialize_as_plain_strings() {
        let id = AgentId::new("Body1");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"Body1\""));
    }

    #[test]
    fn name_ids_work_as_map_keys_looked_up_by_str() {
        let mut map = BTreeMap::new();
        map.insert(AgentId::new("Body2"), 2);
        map.insert(AgentId::new("Body1"), 1);
        assert_eq!(map.get("Body1"), Some(&1));
        let order: Vec<&str> = map.keys().map(AgentId::as_str).collect();
        assert_eq!(order, vec!["Body1", "Body2"]);
    }

    #[test]
    fn run_ids_are_time_ordered() {
        let first = RunId::new();
        let second = RunId::new();
        assert!(first <= second);
        assert_ne!(first.into_inner(), Uuid::nil());
    }

    #[test]
    fn display_matches_inner() {
        let engine = EngineId::from("orbits");
        assert_eq!(engine.to_string(), "orbits");
        let run = RunId::new();
        assert_eq!(run.to_string(), run.into_inner().to_string());
    }
}
