//! Query interpreter: reads against a frozen snapshot plus the state under
//! construction, and writes into the state under construction.
//!
//! # Read scopes
//!
//! | Query | current scope | inside `Prev` |
//! |-------|---------------|---------------|
//! | `Base(f)` | `new_state[agent].f` | `universe[engine][agent].f` |
//! | `Root` | `new_state[agent]` | `universe[engine][agent]` |
//! | `Agent(id)` | `universe[engine][id]` | `universe[engine][id]` |
//!
//! `Agent(id)` never sees `id`'s in-progress state. Cross-agent reads are
//! always one committed step stale, so agents cannot race each other
//! within one step.

use std::borrow::Cow;

use ephemeris_types::{AgentId, EngineId, Fields, StateMap, Universe, Value};

use crate::{Query, QueryError};

static ROOT: Query = Query::Root;

/// The fixed inputs of one evaluation: which engine and agent a query is
/// relative to, and the committed snapshot it may read from.
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    /// Engine the subject belongs to.
    pub engine: &'a EngineId,
    /// The subject agent.
    pub agent: &'a AgentId,
    /// The frozen committed snapshot.
    pub universe: &'a Universe,
}

impl<'a> QueryContext<'a> {
    /// Create a context for `agent` in `engine`.
    pub const fn new(engine: &'a EngineId, agent: &'a AgentId, universe: &'a Universe) -> Self {
        Self {
            engine,
            agent,
            universe,
        }
    }

    /// Resolve `query` to a value, or `None` if any part of it is absent.
    ///
    /// For a `Tuple`, the result is an array of the resolved items and is
    /// absent as soon as one item is.
    pub fn resolve(&self, new_state: &StateMap, query: &Query) -> Option<Value> {
        self.lookup(new_state, query, false).map(Cow::into_owned)
    }

    /// Write `value` at the location named by `query` in `new_state`.
    ///
    /// Missing intermediate mappings are created. Writing to `Root` is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::IllegalWriteTarget`] for `Prev`, `Tuple`, or
    /// `Agent` on the write path, and [`QueryError::NotAMapping`] when a
    /// field must be set on an existing non-mapping value.
    pub fn write(
        &self,
        new_state: &mut StateMap,
        query: &Query,
        value: Value,
    ) -> Result<(), QueryError> {
        let (parent, field) = match query {
            Query::Root => return Ok(()),
            Query::Base(field) => (&ROOT, field),
            Query::Access { base, field } => (base.as_ref(), field),
            Query::Prev(_) | Query::Tuple(_) | Query::Agent(_) => {
                return Err(QueryError::IllegalWriteTarget {
                    kind: query.kind(),
                    query: query.to_string(),
                });
            }
        };
        let container = self.location_mut(new_state, parent)?;
        let fields = as_fields(container, parent)?;
        fields.insert(field.clone(), value);
        Ok(())
    }

    fn lookup<'s>(
        &'s self,
        new_state: &'s StateMap,
        query: &Query,
        previous: bool,
    ) -> Option<Cow<'s, Value>> {
        match query {
            Query::Base(field) => {
                let subject = if previous {
                    self.committed(self.agent.as_str())?
                } else {
                    new_state.get(self.agent)?
                };
                subject.get(field).map(Cow::Borrowed)
            }
            Query::Prev(inner) => self.lookup(new_state, inner, true),
            Query::Root => {
                if previous {
                    self.committed(self.agent.as_str()).map(Cow::Borrowed)
                } else {
                    new_state.get(self.agent).map(Cow::Borrowed)
                }
            }
            Query::Agent(id) => self.committed(id).map(Cow::Borrowed),
            Query::Access { base, field } => match self.lookup(new_state, base, previous)? {
                Cow::Borrowed(value) => value.get(field).map(Cow::Borrowed),
                Cow::Owned(mut value) => value.get_mut(field).map(Value::take).map(Cow::Owned),
            },
            Query::Tuple(items) => items
                .iter()
                .map(|item| self.lookup(new_state, item, previous).map(Cow::into_owned))
                .collect::<Option<Vec<Value>>>()
                .map(|values| Cow::Owned(Value::Array(values))),
        }
    }

    /// The committed state of `agent` in this context's engine.
    fn committed(&self, agent: &str) -> Option<&'a Value> {
        self.universe.get(self.engine)?.get(agent)
    }

    /// Walk to the container named by `query`, creating empty mappings on
    /// the way.
    fn location_mut<'s>(
        &self,
        new_state: &'s mut StateMap,
        query: &Query,
    ) -> Result<&'s mut Value, QueryError> {
        match query {
            Query::Root => Ok(new_state
                .entry(self.agent.clone())
                .or_insert_with(|| Value::Object(Fields::new()))),
            Query::Base(field) => {
                let subject = self.location_mut(new_state, &ROOT)?;
                let fields = as_fields(subject, &ROOT)?;
                Ok(fields
                    .entry(field.clone())
                    .or_insert_with(|| Value::Object(Fields::new())))
            }
            Query::Access { base, field } => {
                let container = self.location_mut(new_state, base)?;
                let fields = as_fields(container, base)?;
                Ok(fields
                    .entry(field.clone())
                    .or_insert_with(|| Value::Object(Fields::new())))
            }
            Query::Prev(_) | Query::Tuple(_) | Query::Agent(_) => {
                Err(QueryError::IllegalWriteTarget {
                    kind: query.kind(),
                    query: query.to_string(),
                })
            }
        }
    }
}

fn as_fields<'v>(value: &'v mut Value, at: &Query) -> Result<&'v mut Fields, QueryError> {
    value.as_object_mut().ok_or_else(|| QueryError::NotAMapping {
        query: at.to_string(),
    })
}
