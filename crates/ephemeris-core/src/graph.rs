//! The dependency graph: every engine's agents and their producer rules.
//!
//! [`GraphBuilder`] turns configured rule tables into a [`RuleGraph`] once,
//! at construction time. Every query is parsed through the
//! [`AstProvider`], every function name is looked up in the
//! [`ProducerRegistry`], and the structural checks run before anything is
//! simulated:
//!
//! - production targets must be writable (`Root`, `Base`, `Access`)
//! - no agent produces the same location twice, or a location nested
//!   inside another one it produces
//! - `Agent(id)` must name an agent of the same engine
//! - every agent declares at least one rule
//!
//! The resulting graph is immutable and shared by reference.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ephemeris_query::{AstProvider, ProviderError, Query, QueryError};
use ephemeris_types::{AgentId, EngineId};
use tracing::{debug, info};

use crate::config::{EngineConfig, QuerySpec};
use crate::producer::{Producer, ProducerRegistry};

/// Errors raised while building a [`RuleGraph`]. All of them abort
/// simulation setup.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The engine is not part of the graph.
    #[error("unknown engine {engine}")]
    UnknownEngine {
        /// The engine that was looked up.
        engine: EngineId,
    },

    /// A dependency expression could not be parsed.
    #[error("engine {engine}, agent {agent}, rule {index}: {source}")]
    Parse {
        /// Engine owning the rule.
        engine: EngineId,
        /// Agent owning the rule.
        agent: AgentId,
        /// Rule position in the agent's list.
        index: usize,
        /// The provider failure.
        source: ProviderError,
    },

    /// A rule produces into a location that cannot be written.
    #[error("engine {engine}, agent {agent}, rule {index}: {source}")]
    IllegalWriteTarget {
        /// Engine owning the rule.
        engine: EngineId,
        /// Agent owning the rule.
        agent: AgentId,
        /// Rule position in the agent's list.
        index: usize,
        /// The rejected target.
        source: QueryError,
    },

    /// A rule names a producer that is not registered.
    #[error("engine {engine}, agent {agent}, rule {index}: unknown function `{function}`")]
    UnknownFunction {
        /// Engine owning the rule.
        engine: EngineId,
        /// Agent owning the rule.
        agent: AgentId,
        /// Rule position in the agent's list.
        index: usize,
        /// The missing function name.
        function: String,
    },

    /// A rule reads `agent!(id)` for an agent that does not exist.
    #[error("engine {engine}, agent {agent}: reference to unknown agent {referenced}")]
    UnknownAgent {
        /// Engine owning the rule.
        engine: EngineId,
        /// Agent owning the rule.
        agent: AgentId,
        /// The missing agent.
        referenced: String,
    },

    /// A rule reads `agent!(id)` for an agent of a different engine.
    #[error(
        "engine {engine}, agent {agent}: {referenced} belongs to engine {owner}; \
         cross-engine references are not supported"
    )]
    CrossEngineReference {
        /// Engine owning the rule.
        engine: EngineId,
        /// Agent owning the rule.
        agent: AgentId,
        /// The referenced agent.
        referenced: String,
        /// The engine that declares the referenced agent.
        owner: EngineId,
    },

    /// Two rules of one agent produce the same location.
    #[error("engine {engine}, agent {agent}: `{target}` is produced by rules {first} and {second}")]
    DuplicateProducer {
        /// Engine owning the rules.
        engine: EngineId,
        /// Agent owning the rules.
        agent: AgentId,
        /// The shared target, rendered.
        target: String,
        /// Index of the first rule.
        first: usize,
        /// Index of the second rule.
        second: usize,
    },

    /// An agent declares no rules and could never produce a state.
    #[error("engine {engine}, agent {agent}: no producer rules declared")]
    EmptyAgent {
        /// Engine owning the agent.
        engine: EngineId,
        /// The agent without rules.
        agent: AgentId,
    },
}

/// One `(consumed, produced, function)` triple of an agent.
#[derive(Clone)]
pub struct ProducerRule {
    consumed: Query,
    produced: Query,
    function_name: String,
    function: Arc<dyn Producer>,
}

impl fmt::Debug for ProducerRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerRule")
            .field("consumed", &self.consumed.to_string())
            .field("produced", &self.produced.to_string())
            .field("function", &self.function_name)
            .finish()
    }
}

impl ProducerRule {
    /// Create a rule, checking that `produced` is writable.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::IllegalWriteTarget`] if `produced` contains a
    /// `Prev`, `Tuple`, or `Agent` node on its write path.
    pub fn new(
        consumed: Query,
        produced: Query,
        function_name: impl Into<String>,
        function: Arc<dyn Producer>,
    ) -> Result<Self, QueryError> {
        produced.check_write_target()?;
        Ok(Self {
            consumed,
            produced,
            function_name: function_name.into(),
            function,
        })
    }

    /// What the rule reads.
    pub const fn consumed(&self) -> &Query {
        &self.consumed
    }

    /// Where the rule writes.
    pub const fn produced(&self) -> &Query {
        &self.produced
    }

    /// The registered name of the rule's producer.
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// The producer itself.
    pub fn function(&self) -> &dyn Producer {
        self.function.as_ref()
    }
}

/// Agent name to ordered producer rules.
pub type AgentRules = BTreeMap<AgentId, Vec<ProducerRule>>;

/// Immutable engine -> agent -> rules table.
#[derive(Debug, Clone, Default)]
pub struct RuleGraph {
    engines: BTreeMap<EngineId, AgentRules>,
}

impl RuleGraph {
    /// Validate and freeze a rule table.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EmptyAgent`], [`GraphError::DuplicateProducer`],
    /// [`GraphError::UnknownAgent`], or [`GraphError::CrossEngineReference`]
    /// for the first structural problem found.
    pub fn new(engines: BTreeMap<EngineId, AgentRules>) -> Result<Self, GraphError> {
        let graph = Self { engines };
        for (engine, agents) in &graph.engines {
            for (agent, rules) in agents {
                if rules.is_empty() {
                    return Err(GraphError::EmptyAgent {
                        engine: engine.clone(),
                        agent: agent.clone(),
                    });
                }
                check_duplicates(engine, agent, rules)?;
                for rule in rules {
                    graph.check_references(engine, agent, rule)?;
                }
            }
        }
        Ok(graph)
    }

    /// The agents and rules of `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownEngine`] if the engine is not part of
    /// the graph.
    pub fn agents(&self, engine: &EngineId) -> Result<&AgentRules, GraphError> {
        self.engines
            .get(engine)
            .ok_or_else(|| GraphError::UnknownEngine {
                engine: engine.clone(),
            })
    }

    /// Engine names in sorted order.
    pub fn engines(&self) -> impl Iterator<Item = &EngineId> {
        self.engines.keys()
    }

    /// Total number of rules across every engine.
    pub fn rule_count(&self) -> usize {
        self.engines
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    fn check_references(
        &self,
        engine: &EngineId,
        agent: &AgentId,
        rule: &ProducerRule,
    ) -> Result<(), GraphError> {
        let local = self.engines.get(engine);
        for referenced in rule.consumed.referenced_agents() {
            if local.is_some_and(|agents| agents.contains_key(referenced)) {
                continue;
            }
            let owner = self
                .engines
                .iter()
                .find(|(_, agents)| agents.contains_key(referenced))
                .map(|(owner, _)| owner.clone());
            return Err(match owner {
                Some(owner) => GraphError::CrossEngineReference {
                    engine: engine.clone(),
                    agent: agent.clone(),
                    referenced: referenced.to_owned(),
                    owner,
                },
                None => GraphError::UnknownAgent {
                    engine: engine.clone(),
                    agent: agent.clone(),
                    referenced: referenced.to_owned(),
                },
            });
        }
        Ok(())
    }
}

/// Outputs are write-once per step, so one agent may not produce the same
/// location twice. `Root` targets discard their value and may repeat.
fn check_duplicates(
    engine: &EngineId,
    agent: &AgentId,
    rules: &[ProducerRule],
) -> Result<(), GraphError> {
    let mut seen: Vec<(Vec<&str>, usize)> = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        let Some(path) = target_path(&rule.produced) else {
            continue;
        };
        // `position` and `position.x` overlap just as `x` and `x` do.
        let overlap = seen
            .iter()
            .find(|(other, _)| path.starts_with(other) || other.starts_with(&path));
        if let Some(&(_, first)) = overlap {
            return Err(GraphError::DuplicateProducer {
                engine: engine.clone(),
                agent: agent.clone(),
                target: rule.produced.to_string(),
                first,
                second: index,
            });
        }
        seen.push((path, index));
    }
    Ok(())
}

/// The field path a production target writes, or `None` for a `Root`
/// discard. `Base(f)` and `Access(Root, f)` both write `[f]`.
fn target_path(query: &Query) -> Option<Vec<&str>> {
    let mut path = Vec::new();
    let mut node = query;
    loop {
        match node {
            Query::Access { base, field } => {
                path.push(field.as_str());
                node = base.as_ref();
            }
            Query::Base(field) => {
                path.push(field.as_str());
                break;
            }
            _ => break,
        }
    }
    path.reverse();
    (!path.is_empty()).then_some(path)
}

/// Builds a [`RuleGraph`] from configured rule tables.
pub struct GraphBuilder<'a> {
    provider: &'a dyn AstProvider,
    producers: &'a ProducerRegistry,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder that parses with `provider` and resolves function
    /// names against `producers`.
    pub const fn new(provider: &'a dyn AstProvider, producers: &'a ProducerRegistry) -> Self {
        Self {
            provider,
            producers,
        }
    }

    /// Parse, resolve, and validate every engine's rules.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphError`] encountered. Parsing happens once
    /// per query, here; nothing is parsed during simulation.
    pub fn build(&self, engines: &BTreeMap<EngineId, EngineConfig>) -> Result<RuleGraph, GraphError> {
        let mut table = BTreeMap::new();
        for (engine, config) in engines {
            let mut agents = AgentRules::new();
            for (agent, rules) in &config.agents {
                let mut built = Vec::with_capacity(rules.len());
                for (index, rule) in rules.iter().enumerate() {
                    let parse = |spec: &QuerySpec| {
                        self.query(spec).map_err(|source| GraphError::Parse {
                            engine: engine.clone(),
                            agent: agent.clone(),
                            index,
                            source,
                        })
                    };
                    let consumed = parse(&rule.consumed)?;
                    let produced = parse(&rule.produced)?;
                    let function = self.producers.get(&rule.function).ok_or_else(|| {
                        GraphError::UnknownFunction {
                            engine: engine.clone(),
                            agent: agent.clone(),
                            index,
                            function: rule.function.clone(),
                        }
                    })?;
                    let rule = ProducerRule::new(consumed, produced, &rule.function, function)
                        .map_err(|source| GraphError::IllegalWriteTarget {
                            engine: engine.clone(),
                            agent: agent.clone(),
                            index,
                            source,
                        })?;
                    debug!(
                        engine = %engine,
                        agent = %agent,
                        index,
                        consumed = %rule.consumed(),
                        produced = %rule.produced(),
                        function = rule.function_name(),
                        "Rule registered"
                    );
                    built.push(rule);
                }
                agents.insert(agent.clone(), built);
            }
            table.insert(engine.clone(), agents);
        }

        let graph = RuleGraph::new(table)?;
        info!(
            engines = graph.engines.len(),
            rules = graph.rule_count(),
            "Dependency graph built"
        );
        Ok(graph)
    }

    fn query(&self, spec: &QuerySpec) -> Result<Query, ProviderError> {
        match spec {
            QuerySpec::Text(text) => self.provider.parse(text),
            QuerySpec::Ast(query) => Ok(query.clone()),
        }
    }
}
