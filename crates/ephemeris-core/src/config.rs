//! Configuration loading and typed config structures for the Ephemeris
//! simulation.
//!
//! The configuration lives in `ephemeris.yaml`. This module defines
//! strongly-typed structs that mirror the YAML structure, and provides a
//! loader that reads and validates the file. Every section has defaults;
//! an empty file yields the built-in two-body scenario.

use std::collections::BTreeMap;
use std::path::Path;

use ephemeris_query::Query;
use ephemeris_types::{AgentId, EngineId, TIME_FIELD, TIME_STEP_FIELD, Time, Value};
use serde::Deserialize;
use serde_json::json;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EphemerisConfig {
    /// Run-level settings (name, iteration count, read offset).
    #[serde(default)]
    pub simulation: SimulationSettings,

    /// Parameters of the built-in producer functions.
    #[serde(default)]
    pub physics: PhysicsConfig,

    /// External query parser invocation.
    #[serde(default)]
    pub parser: ParserConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the store is exported after a run.
    #[serde(default)]
    pub export: ExportConfig,

    /// Engine name -> initial state and producer rules.
    #[serde(default = "default_engines")]
    pub engines: BTreeMap<EngineId, EngineConfig>,
}

impl Default for EphemerisConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSettings::default(),
            physics: PhysicsConfig::default(),
            parser: ParserConfig::default(),
            logging: LoggingConfig::default(),
            export: ExportConfig::default(),
            engines: default_engines(),
        }
    }
}

impl EphemerisConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `EPHEMERIS_PARSER` overrides `parser.command`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.parser.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let read_offset = self.simulation.read_offset;
        if !(read_offset.is_finite() && read_offset > 0.0) {
            return Err(ConfigError::Invalid {
                reason: format!("simulation.read_offset must be positive, got {read_offset}"),
            });
        }
        if !self.simulation.seed_low.is_finite() {
            return Err(ConfigError::Invalid {
                reason: "simulation.seed_low must be finite".to_owned(),
            });
        }
        if !self.physics.fixed_time_step.is_finite() {
            return Err(ConfigError::Invalid {
                reason: "physics.fixed_time_step must be finite".to_owned(),
            });
        }
        if self.engines.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "at least one engine must be configured".to_owned(),
            });
        }
        Ok(())
    }
}

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationSettings {
    /// Human-readable run name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Driver iterations per engine.
    #[serde(default = "default_iterations")]
    pub iterations: u64,

    /// How far before an agent's clock its snapshot is read, so the read
    /// lands inside the last committed interval rather than on its edge.
    ///
    /// Must stay below every agent's `timeStep`. A shorter step puts the
    /// read in an older interval, the agent recomputes a time it already
    /// committed, and the run stops with a clock regression.
    #[serde(default = "default_read_offset")]
    pub read_offset: Time,

    /// Lower bound of the seed interval holding the initial state.
    #[serde(default = "default_seed_low")]
    pub seed_low: Time,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            iterations: default_iterations(),
            read_offset: default_read_offset(),
            seed_low: default_seed_low(),
        }
    }
}

/// Parameters of the built-in producer functions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhysicsConfig {
    /// Step length returned by `timestep_manager`.
    ///
    /// Defaults to 0.01, the initial `timeStep` of the built-in bodies, so
    /// the default scenario keeps a constant step for the whole run.
    #[serde(default = "default_fixed_time_step")]
    pub fixed_time_step: Time,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fixed_time_step: default_fixed_time_step(),
        }
    }
}

/// External query parser invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParserConfig {
    /// Program that reads an expression on stdin and prints its JSON AST.
    #[serde(default = "default_parser_command")]
    pub command: String,

    /// Extra arguments for the parser program.
    #[serde(default)]
    pub args: Vec<String>,
}

impl ParserConfig {
    /// Apply `EPHEMERIS_PARSER` on top of the configured command.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("EPHEMERIS_PARSER") {
            self.command = val;
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            command: default_parser_command(),
            args: Vec::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Store export settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExportConfig {
    /// Path of the JSON artifact written after a run.
    #[serde(default = "default_export_path")]
    pub path: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            path: default_export_path(),
        }
    }
}

/// One engine: its agents' initial state and their producer rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Agent name -> initial field mapping (must carry `time` and
    /// `timeStep`).
    pub initial_state: BTreeMap<AgentId, Value>,

    /// Agent name -> ordered producer rules.
    pub agents: BTreeMap<AgentId, Vec<RuleConfig>>,
}

/// One declared producer rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RuleConfig {
    /// What the function consumes.
    pub consumed: QuerySpec,
    /// Where the function's result is written.
    pub produced: QuerySpec,
    /// Registered producer function name.
    pub function: String,
}

impl RuleConfig {
    /// Build a rule from already-parsed queries.
    pub fn from_queries(consumed: Query, produced: Query, function: &str) -> Self {
        Self {
            consumed: QuerySpec::Ast(consumed),
            produced: QuerySpec::Ast(produced),
            function: function.to_owned(),
        }
    }
}

/// A query as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QuerySpec {
    /// Dependency-expression text, handed to the AST provider.
    Text(String),
    /// A pre-parsed AST in the `{kind, content}` wire form.
    Ast(Query),
}

// ---------------------------------------------------------------------------
// Built-in two-body scenario
// ---------------------------------------------------------------------------

/// Rules for one body orbiting `other`.
fn body_rules(other: &str) -> Vec<RuleConfig> {
    let prev = |field: &str| Query::prev(Query::base(field));
    vec![
        RuleConfig::from_queries(
            Query::Tuple(vec![
                prev(TIME_STEP_FIELD),
                prev("position"),
                prev("velocity"),
                Query::access(Query::agent(other), "position"),
                Query::access(Query::agent(other), "mass"),
            ]),
            Query::base("velocity"),
            "propagate_velocity",
        ),
        RuleConfig::from_queries(
            Query::Tuple(vec![
                prev(TIME_STEP_FIELD),
                prev("position"),
                Query::base("velocity"),
            ]),
            Query::base("position"),
            "propagate_position",
        ),
        RuleConfig::from_queries(
            Query::Tuple(vec![prev("mass")]),
            Query::base("mass"),
            "propagate_mass",
        ),
        RuleConfig::from_queries(
            Query::Tuple(vec![prev(TIME_FIELD), Query::base(TIME_STEP_FIELD)]),
            Query::base(TIME_FIELD),
            "time_manager",
        ),
        RuleConfig::from_queries(
            Query::Tuple(vec![Query::base("velocity")]),
            Query::base(TIME_STEP_FIELD),
            "timestep_manager",
        ),
    ]
}

fn default_engines() -> BTreeMap<EngineId, EngineConfig> {
    let initial_state = BTreeMap::from([
        (
            AgentId::new("Body1"),
            json!({
                "time": 0.0,
                "timeStep": 0.01,
                "position": {"x": -0.73, "y": 0.0, "z": 0.0},
                "velocity": {"x": 0.0, "y": -0.0015, "z": 0.0},
                "mass": 1.0
            }),
        ),
        (
            AgentId::new("Body2"),
            json!({
                "time": 0.0,
                "timeStep": 0.01,
                "position": {"x": 60.34, "y": 0.0, "z": 0.0},
                "velocity": {"x": 0.0, "y": 0.13, "z": 0.0},
                "mass": 0.123
            }),
        ),
    ]);
    let agents = BTreeMap::from([
        (AgentId::new("Body1"), body_rules("Body2")),
        (AgentId::new("Body2"), body_rules("Body1")),
    ]);
    BTreeMap::from([(
        EngineId::new("orbits"),
        EngineConfig {
            initial_state,
            agents,
        },
    )])
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_name() -> String {
    "Two Body".to_owned()
}

const fn default_iterations() -> u64 {
    500
}

const fn default_read_offset() -> Time {
    0.001
}

const fn default_seed_low() -> Time {
    -999_999_999.0
}

const fn default_fixed_time_step() -> Time {
    0.01
}

fn default_parser_command() -> String {
    "query-parser".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_export_path() -> String {
    "data.json".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EphemerisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.iterations, 500);
        assert_eq!(config.engines.len(), 1);
        let orbits = config.engines.get("orbits").unwrap();
        assert_eq!(orbits.agents.get("Body1").map(Vec::len), Some(5));
        assert_eq!(orbits.initial_state.len(), 2);
    }

    #[test]
    fn default_step_matches_seeded_step() {
        let config = EphemerisConfig::default();
        let orbits = config.engines.get("orbits").unwrap();
        for state in orbits.initial_state.values() {
            assert_eq!(
                state.get(TIME_STEP_FIELD).and_then(Value::as_f64),
                Some(config.physics.fixed_time_step)
            );
        }
    }

    #[test]
    fn parse_empty_yaml() {
        let config = EphemerisConfig::parse("").unwrap();
        assert_eq!(config.simulation, SimulationSettings::default());
        assert_eq!(config.engines, default_engines());
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = r"
simulation:
  iterations: 25
logging:
  level: debug
  json: true
";
        let config = EphemerisConfig::parse(yaml).unwrap();
        assert_eq!(config.simulation.iterations, 25);
        assert_eq!(config.simulation.name, "Two Body");
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.export.path, "data.json");
    }

    #[test]
    fn parse_engine_with_text_and_inline_queries() {
        let yaml = r"
simulation:
  name: Clock Only
  read_offset: 0.0001
engines:
  clocks:
    initial_state:
      A: { time: 0.0, timeStep: 1.0 }
    agents:
      A:
        - consumed: '(prev!(time), timeStep)'
          produced: time
          function: time_manager
        - consumed: { kind: Prev, content: { kind: Base, content: timeStep } }
          produced: { kind: Base, content: timeStep }
          function: identity
";
        let config = EphemerisConfig::parse(yaml).unwrap();
        let engine = config.engines.get("clocks").unwrap();
        let rules = engine.agents.get("A").unwrap();
        assert_eq!(
            rules.first().map(|r| &r.consumed),
            Some(&QuerySpec::Text("(prev!(time), timeStep)".to_owned()))
        );
        assert_eq!(
            rules.get(1).map(|r| &r.consumed),
            Some(&QuerySpec::Ast(Query::prev(Query::base("timeStep"))))
        );
        assert_eq!(
            rules.get(1).map(|r| &r.produced),
            Some(&QuerySpec::Ast(Query::base("timeStep")))
        );
    }

    #[test]
    fn non_positive_read_offset_is_invalid() {
        let result = EphemerisConfig::parse("simulation:\n  read_offset: 0.0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn empty_engine_table_is_invalid() {
        let result = EphemerisConfig::parse("engines: {}\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let result = EphemerisConfig::parse("simulation: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}
