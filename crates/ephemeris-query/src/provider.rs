//! AST providers: turn dependency-expression text into [`Query`] values.
//!
//! The query language itself lives outside this workspace. The engine only
//! needs something that maps text to a well-typed AST, once per rule at
//! construction time, so that capability is the [`AstProvider`] trait.
//!
//! - [`CommandAstProvider`] pipes the text through an external parser
//!   process and decodes the JSON it prints.
//! - [`JsonAstProvider`] treats the text as the JSON wire form directly.

use std::io::Write as _;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::{ProviderError, Query};

/// A source of parsed queries.
pub trait AstProvider {
    /// Parse one dependency expression.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the expression cannot be turned into a
    /// [`Query`]. Callers treat this as fatal for engine construction.
    fn parse(&self, expression: &str) -> Result<Query, ProviderError>;
}

/// Decodes expressions that are already in the `{kind, content}` wire form.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAstProvider;

impl AstProvider for JsonAstProvider {
    fn parse(&self, expression: &str) -> Result<Query, ProviderError> {
        decode(expression.as_bytes())
    }
}

/// Runs an external parser: expression on stdin, JSON AST on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAstProvider {
    /// Program to execute.
    program: String,
    /// Arguments passed before the expression is written to stdin.
    args: Vec<String>,
}

impl CommandAstProvider {
    /// Create a provider for `program` invoked with `args`.
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// The program this provider executes.
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl AstProvider for CommandAstProvider {
    fn parse(&self, expression: &str) -> Result<Query, ProviderError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProviderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(expression.as_bytes())?;
            // Dropping stdin closes the pipe so the parser sees EOF.
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ProviderError::ExitStatus {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let query = decode(&output.stdout)?;
        debug!(program = %self.program, %query, "parsed dependency expression");
        Ok(query)
    }
}

fn decode(bytes: &[u8]) -> Result<Query, ProviderError> {
    serde_json::from_slice(bytes).map_err(|source| ProviderError::Malformed { source })
}
