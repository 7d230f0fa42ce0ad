//! The query AST: a closed set of field-access expressions.
//!
//! Queries are produced by an external parser and arrive in the tagged wire
//! form `{"kind": "...", "content": ...}`:
//!
//! ```json
//! {"kind": "Tuple", "content": [
//!     {"kind": "Prev", "content": {"kind": "Base", "content": "time"}},
//!     {"kind": "Base", "content": "timeStep"}
//! ]}
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::QueryError;

/// A field-access expression relative to an agent's state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content")]
pub enum Query {
    /// Read from the previous committed snapshot instead of the state under
    /// construction.
    Prev(Box<Query>),
    /// The whole subject: its in-progress state, or its previous snapshot
    /// inside [`Query::Prev`].
    Root,
    /// Another agent's previous committed state.
    Agent(String),
    /// A nested field on the value produced by `base`.
    Access {
        /// The query producing the container.
        base: Box<Query>,
        /// The field read from (or written into) the container.
        field: String,
    },
    /// A named field on the subject.
    Base(String),
    /// An ordered list of queries, passed as positional arguments.
    Tuple(Vec<Query>),
}

/// The variant of a [`Query`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// [`Query::Prev`]
    Prev,
    /// [`Query::Root`]
    Root,
    /// [`Query::Agent`]
    Agent,
    /// [`Query::Access`]
    Access,
    /// [`Query::Base`]
    Base,
    /// [`Query::Tuple`]
    Tuple,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prev => "Prev",
            Self::Root => "Root",
            Self::Agent => "Agent",
            Self::Access => "Access",
            Self::Base => "Base",
            Self::Tuple => "Tuple",
        };
        f.write_str(name)
    }
}

impl Query {
    /// Shorthand for `Base(field)`.
    pub fn base(field: impl Into<String>) -> Self {
        Self::Base(field.into())
    }

    /// Shorthand for `Prev(inner)`.
    pub fn prev(inner: Self) -> Self {
        Self::Prev(Box::new(inner))
    }

    /// Shorthand for `Agent(id)`.
    pub fn agent(id: impl Into<String>) -> Self {
        Self::Agent(id.into())
    }

    /// Shorthand for `Access { base, field }`.
    pub fn access(base: Self, field: impl Into<String>) -> Self {
        Self::Access {
            base: Box::new(base),
            field: field.into(),
        }
    }

    /// Return the variant of this query.
    pub const fn kind(&self) -> QueryKind {
        match self {
            Self::Prev(_) => QueryKind::Prev,
            Self::Root => QueryKind::Root,
            Self::Agent(_) => QueryKind::Agent,
            Self::Access { .. } => QueryKind::Access,
            Self::Base(_) => QueryKind::Base,
            Self::Tuple(_) => QueryKind::Tuple,
        }
    }

    /// Check that this query names a writable location.
    ///
    /// Legal targets are `Root` (a discard), `Base`, and `Access` chains
    /// that bottom out in `Root` or `Base`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::IllegalWriteTarget`] naming the first
    /// `Prev`, `Tuple`, or `Agent` node found on the write path.
    pub fn check_write_target(&self) -> Result<(), QueryError> {
        match self {
            Self::Root | Self::Base(_) => Ok(()),
            Self::Access { base, .. } => base.check_write_target(),
            Self::Prev(_) | Self::Tuple(_) | Self::Agent(_) => Err(QueryError::IllegalWriteTarget {
                kind: self.kind(),
                query: self.to_string(),
            }),
        }
    }

    /// Every agent named through `Agent(id)` anywhere in the query.
    pub fn referenced_agents(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_agents(&mut out);
        out
    }

    fn collect_agents<'q>(&'q self, out: &mut Vec<&'q str>) {
        match self {
            Self::Agent(id) => out.push(id),
            Self::Prev(inner) => inner.collect_agents(out),
            Self::Access { base, .. } => base.collect_agents(out),
            Self::Tuple(items) => {
                for item in items {
                    item.collect_agents(out);
                }
            }
            Self::Root | Self::Base(_) => {}
        }
    }
}

/// Renders the query in the dependency-expression syntax, e.g.
/// `(prev!(time), agent!(Body2).mass)`.
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prev(inner) => write!(f, "prev!({inner})"),
            Self::Root => f.write_str("root!()"),
            Self::Agent(id) => write!(f, "agent!({id})"),
            Self::Access { base, field } => write!(f, "{base}.{field}"),
            Self::Base(field) => f.write_str(field),
            Self::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}
