//! Query AST, state interpreter, and AST providers for the Ephemeris
//! simulation.
//!
//! # Modules
//!
//! - [`ast`] -- The closed [`Query`] sum type and its wire form
//! - [`interpret`] -- [`QueryContext`]: `resolve` and `write` over a
//!   committed snapshot and an in-progress state
//! - [`provider`] -- The [`AstProvider`] capability and its implementations

pub mod ast;
pub mod interpret;
pub mod provider;

pub use ast::{Query, QueryKind};
pub use interpret::QueryContext;
pub use provider::{AstProvider, CommandAstProvider, JsonAstProvider};

/// Errors raised while interpreting a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The query cannot name a writable location.
    #[error("{kind} cannot be written to (in `{query}`)")]
    IllegalWriteTarget {
        /// The offending node kind.
        kind: QueryKind,
        /// The full query, rendered.
        query: String,
    },

    /// A field had to be set on a value that is not a mapping.
    #[error("`{query}` does not hold a mapping")]
    NotAMapping {
        /// The container query, rendered.
        query: String,
    },
}

/// Errors raised by an [`AstProvider`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The parser process could not be started.
    #[error("failed to start query parser `{program}`: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Talking to the parser process failed.
    #[error("query parser I/O failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The parser process exited unsuccessfully.
    #[error("query parser `{program}` exited with {status}: {stderr}")]
    ExitStatus {
        /// The program that failed.
        program: String,
        /// Rendered exit status.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },

    /// The parser output is not a valid query AST.
    #[error("malformed query AST: {source}")]
    Malformed {
        /// The underlying decode error.
        source: serde_json::Error,
    },
}
