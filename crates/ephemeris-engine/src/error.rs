//! Error types for the simulation binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup, simulation, and export.

/// Top-level error for the simulation binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ephemeris_core::config::ConfigError,
    },

    /// Building or running a simulation failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: ephemeris_core::runner::RunnerError,
    },

    /// Reading or writing the export artifact failed.
    #[error("export I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Encoding or decoding the export artifact failed.
    #[error("export encoding error: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The logging filter could not be parsed.
    #[error("invalid log filter `{filter}`: {message}")]
    Logging {
        /// The rejected filter directive.
        filter: String,
        /// Description of the parse failure.
        message: String,
    },
}
