//! The state resolver: computes one engine's next state from a frozen
//! snapshot by firing producer rules as their inputs become available.
//!
//! # Algorithm
//!
//! 1. Every `(agent, rule)` pair of the engine starts on the worklist, in
//!    agent order then declaration order.
//! 2. Each pass resolves every pending rule's consumed query against the
//!    snapshot and the state built so far. A rule whose inputs are all
//!    present fires once: its producer runs and the output is written at
//!    the produced location. A rule with a missing input is deferred.
//! 3. The step succeeds when the worklist is empty. A pass that fires
//!    nothing means the remaining rules wait on each other or on data that
//!    will never appear, and the step fails with [`StepError::Deadlock`].
//!
//! Each productive pass removes at least one rule, so a step runs at most
//! as many passes as the engine has rules.

use std::fmt;

use ephemeris_query::{Query, QueryContext, QueryError};
use ephemeris_types::{AgentId, EngineId, StateMap, Universe, Value};
use tracing::{debug, warn};

use crate::graph::{GraphError, ProducerRule, RuleGraph};
use crate::producer::ProducerError;

/// A rule left on the worklist when resolution stalled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckRule {
    /// Agent owning the rule.
    pub agent: AgentId,
    /// Rule position in the agent's list.
    pub index: usize,
    /// Producer name.
    pub function: String,
    /// The consumed query that never resolved, rendered.
    pub consumed: String,
}

impl fmt::Display for StuckRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {} <- {}",
            self.agent, self.index, self.function, self.consumed
        )
    }
}

fn render_stuck(stuck: &[StuckRule]) -> String {
    stuck
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised during one step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The engine has no rules in the graph.
    #[error("cannot step: {source}")]
    Graph {
        /// The lookup failure.
        #[from]
        source: GraphError,
    },

    /// A full pass fired no rule.
    #[error("resolution deadlock in engine {engine}: {}", render_stuck(.stuck))]
    Deadlock {
        /// The engine being stepped.
        engine: EngineId,
        /// Every rule still pending.
        stuck: Vec<StuckRule>,
    },

    /// A producer rejected its inputs.
    #[error("engine {engine}, agent {agent}, rule {index} ({function}): {source}")]
    Producer {
        /// The engine being stepped.
        engine: EngineId,
        /// Agent owning the rule.
        agent: AgentId,
        /// Rule position in the agent's list.
        index: usize,
        /// Producer name.
        function: String,
        /// The producer failure.
        source: ProducerError,
    },

    /// The output could not be written at the produced location.
    #[error("engine {engine}, agent {agent}, rule {index}: {source}")]
    Write {
        /// The engine being stepped.
        engine: EngineId,
        /// Agent owning the rule.
        agent: AgentId,
        /// Rule position in the agent's list.
        index: usize,
        /// The write failure.
        source: QueryError,
    },
}

/// Evaluates a [`RuleGraph`] one step at a time.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'g> {
    graph: &'g RuleGraph,
}

struct Pending<'g> {
    agent: &'g AgentId,
    index: usize,
    rule: &'g ProducerRule,
}

impl<'g> Resolver<'g> {
    /// Create a resolver over `graph`.
    pub const fn new(graph: &'g RuleGraph) -> Self {
        Self { graph }
    }

    /// Resolve the next state of every agent in `engine`.
    ///
    /// `universe` is read-only for the whole step; cross-agent reads
    /// through `Agent(id)` therefore never see output produced during this
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Deadlock`] when a pass makes no progress,
    /// [`StepError::Producer`] or [`StepError::Write`] when a firing rule
    /// fails, and [`StepError::Graph`] for an unknown engine.
    pub fn step(&self, engine: &EngineId, universe: &Universe) -> Result<StateMap, StepError> {
        let agents = self.graph.agents(engine)?;
        let mut pending: Vec<Pending<'g>> = agents
            .iter()
            .flat_map(|(agent, rules)| {
                rules
                    .iter()
                    .enumerate()
                    .map(move |(index, rule)| Pending { agent, index, rule })
            })
            .collect();

        let mut new_state = StateMap::new();
        let mut passes: usize = 0;
        while !pending.is_empty() {
            passes = passes.saturating_add(1);
            let before = pending.len();
            let mut deferred = Vec::with_capacity(before);

            for item in pending {
                let ctx = QueryContext::new(engine, item.agent, universe);
                let Some(inputs) = ctx.resolve(&new_state, item.rule.consumed()) else {
                    deferred.push(item);
                    continue;
                };
                let args = arguments(item.rule.consumed(), inputs);
                let output = item.rule.function().produce(&args).map_err(|source| {
                    StepError::Producer {
                        engine: engine.clone(),
                        agent: item.agent.clone(),
                        index: item.index,
                        function: item.rule.function_name().to_owned(),
                        source,
                    }
                })?;
                ctx.write(&mut new_state, item.rule.produced(), output)
                    .map_err(|source| StepError::Write {
                        engine: engine.clone(),
                        agent: item.agent.clone(),
                        index: item.index,
                        source,
                    })?;
            }

            if deferred.len() == before {
                let stuck: Vec<StuckRule> = deferred
                    .iter()
                    .map(|item| StuckRule {
                        agent: item.agent.clone(),
                        index: item.index,
                        function: item.rule.function_name().to_owned(),
                        consumed: item.rule.consumed().to_string(),
                    })
                    .collect();
                warn!(engine = %engine, passes, stuck = stuck.len(), "Resolution deadlock");
                return Err(StepError::Deadlock {
                    engine: engine.clone(),
                    stuck,
                });
            }
            pending = deferred;
        }

        debug!(engine = %engine, passes, agents = new_state.len(), "Step resolved");
        Ok(new_state)
    }
}

/// Spread a resolved tuple into positional arguments; anything else is a
/// single argument.
fn arguments(consumed: &Query, inputs: Value) -> Vec<Value> {
    match (is_tuple(consumed), inputs) {
        (true, Value::Array(items)) => items,
        (_, single) => vec![single],
    }
}

fn is_tuple(query: &Query) -> bool {
    match query {
        Query::Tuple(_) => true,
        Query::Prev(inner) => is_tuple(inner),
        _ => false,
    }
}
