//! The simulation driver: advances each agent's clock by reading committed
//! history, stepping the resolver, and committing the result.
//!
//! # Cycle
//!
//! For every iteration, for every agent in sorted order:
//!
//! 1. Merge the store at `clock - read_offset`. The offset keeps the read
//!    strictly inside the last committed interval instead of on its
//!    upper edge.
//! 2. If the merged snapshot does not yet hold every agent, skip the agent
//!    for this iteration.
//! 3. Step the engine against the snapshot and keep the agent's entry.
//! 4. Commit `{agent: state}` over `[clock, state.time)` and move the clock
//!    to `state.time`.
//!
//! An agent with a short step commits several intervals while a peer with
//! a long step commits one. No agent reads a peer's uncommitted output.

use std::sync::Arc;

use ephemeris_store::{IntervalStore, StoreError};
use ephemeris_types::{
    AgentId, EngineId, StateMap, TIME_STEP_FIELD, Time, Universe, Value, numeric_field, time_of,
};
use tracing::{debug, info};

use crate::clock::{AgentClocks, ClockError};
use crate::config::SimulationSettings;
use crate::graph::{GraphError, RuleGraph};
use crate::resolver::{Resolver, StepError};

/// Errors that abort a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The engine is not part of the rule graph.
    #[error("graph error: {source}")]
    Graph {
        /// The lookup failure.
        #[from]
        source: GraphError,
    },

    /// The initial state does not satisfy the clock-seed contract.
    #[error("invalid initial state for engine {engine}: {reason}")]
    InitialState {
        /// The engine being constructed.
        engine: EngineId,
        /// What is wrong with the initial state.
        reason: String,
    },

    /// A step failed.
    #[error("step failed: {source}")]
    Step {
        /// The underlying step error.
        #[from]
        source: StepError,
    },

    /// The store rejected a commit.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// A clock refused to advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The resolved state has no numeric `time` to advance to.
    #[error("engine {engine}, agent {agent}: resolved state has no numeric time")]
    MissingTime {
        /// The engine being stepped.
        engine: EngineId,
        /// The agent whose state lacks a time.
        agent: AgentId,
    },
}

/// One committed interval, as seen by a [`CycleObserver`].
#[derive(Debug, Clone, Copy)]
pub struct CycleCommit<'a> {
    /// Zero-based driver iteration.
    pub iteration: u64,
    /// The engine being simulated.
    pub engine: &'a EngineId,
    /// The agent that advanced.
    pub agent: &'a AgentId,
    /// Start of the committed interval (the agent's previous clock).
    pub low: Time,
    /// End of the committed interval (the agent's new clock).
    pub high: Time,
    /// The committed state.
    pub state: &'a Value,
}

/// Callback invoked after every committed interval.
///
/// Implementations can stream cycles to a transport layer or collect them
/// for inspection.
pub trait CycleObserver {
    /// Called once per commit, after the store and clock are updated.
    fn on_commit(&mut self, commit: &CycleCommit<'_>);
}

/// A no-op observer.
pub struct NoOpObserver;

impl CycleObserver for NoOpObserver {
    fn on_commit(&mut self, _commit: &CycleCommit<'_>) {}
}

/// Counts from one [`Simulation::simulate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationReport {
    /// Iterations executed.
    pub iterations: u64,
    /// Intervals committed.
    pub commits: u64,
    /// Agent cycles skipped because history was incomplete.
    pub skipped: u64,
}

/// One engine's simulation: its rules, store, and clocks.
#[derive(Debug)]
pub struct Simulation {
    graph: Arc<RuleGraph>,
    engine: EngineId,
    agents: Vec<AgentId>,
    store: IntervalStore<StateMap>,
    clocks: AgentClocks,
    read_offset: Time,
}

impl Simulation {
    /// Validate `initial_state`, seed the store, and start every clock at
    /// the agent's initial `time`.
    ///
    /// The seed interval is `[settings.seed_low, latest initial time)`, so
    /// the first read of every agent observes the whole initial state.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Graph`] if `engine` is not in the graph,
    /// [`SimulationError::InitialState`] if the initial agents differ from
    /// the declared agents or an agent lacks a finite numeric `time` or
    /// `timeStep`, and [`SimulationError::Store`] if the seed interval is
    /// empty.
    pub fn new(
        graph: Arc<RuleGraph>,
        engine: EngineId,
        initial_state: StateMap,
        settings: &SimulationSettings,
    ) -> Result<Self, SimulationError> {
        let agents: Vec<AgentId> = graph.agents(&engine)?.keys().cloned().collect();
        if agents.is_empty() {
            return Err(SimulationError::InitialState {
                engine,
                reason: "no agents declared".to_owned(),
            });
        }
        if !initial_state.keys().eq(agents.iter()) {
            return Err(SimulationError::InitialState {
                reason: format!(
                    "initial agents {:?} do not match declared agents {:?}",
                    initial_state.keys().map(AgentId::as_str).collect::<Vec<_>>(),
                    agents.iter().map(AgentId::as_str).collect::<Vec<_>>(),
                ),
                engine,
            });
        }

        let mut initial_clocks = Vec::with_capacity(agents.len());
        for (agent, state) in &initial_state {
            let time = time_of(state).filter(|t| t.is_finite());
            let step = numeric_field(state, TIME_STEP_FIELD).filter(|s| s.is_finite());
            match (time, step) {
                (Some(time), Some(_)) => initial_clocks.push((agent.clone(), time)),
                _ => {
                    return Err(SimulationError::InitialState {
                        reason: format!("agent {agent} needs finite numeric time and timeStep"),
                        engine,
                    });
                }
            }
        }

        let latest = initial_clocks
            .iter()
            .map(|(_, time)| *time)
            .fold(Time::NEG_INFINITY, Time::max);
        let mut store = IntervalStore::new();
        store.insert(settings.seed_low, latest, initial_state)?;

        info!(
            engine = %engine,
            agents = agents.len(),
            seed_low = settings.seed_low,
            seed_high = latest,
            "Simulation seeded"
        );

        Ok(Self {
            graph,
            engine,
            agents,
            store,
            clocks: AgentClocks::new(initial_clocks),
            read_offset: settings.read_offset,
        })
    }

    /// Run `iterations` driver iterations without an observer.
    ///
    /// # Errors
    ///
    /// See [`Simulation::simulate_with`].
    pub fn simulate(&mut self, iterations: u64) -> Result<SimulationReport, SimulationError> {
        self.simulate_with(iterations, &mut NoOpObserver)
    }

    /// Run `iterations` driver iterations, reporting every commit to
    /// `observer`.
    ///
    /// # Errors
    ///
    /// Returns the first [`SimulationError`]: a failed step, a resolved
    /// state without a numeric `time`, or a time that does not move the
    /// agent's clock forward. Work committed before the failure stays in
    /// the store.
    pub fn simulate_with(
        &mut self,
        iterations: u64,
        observer: &mut dyn CycleObserver,
    ) -> Result<SimulationReport, SimulationError> {
        let resolver = Resolver::new(&self.graph);
        let mut report = SimulationReport::default();

        for iteration in 0..iterations {
            for agent in &self.agents {
                let clock = self
                    .clocks
                    .get(agent)
                    .ok_or_else(|| ClockError::UnknownAgent {
                        agent: agent.clone(),
                    })?;
                let snapshot = self.store.merge(clock - self.read_offset);
                if !snapshot.keys().eq(self.agents.iter()) {
                    debug!(
                        engine = %self.engine,
                        agent = %agent,
                        clock,
                        known = snapshot.len(),
                        "History incomplete, skipping agent"
                    );
                    report.skipped = report.skipped.saturating_add(1);
                    continue;
                }

                let universe = Universe::from([(self.engine.clone(), snapshot)]);
                let mut new_state = resolver.step(&self.engine, &universe)?;
                let missing_time = || SimulationError::MissingTime {
                    engine: self.engine.clone(),
                    agent: agent.clone(),
                };
                let state = new_state.remove(agent).ok_or_else(missing_time)?;
                let time = time_of(&state).ok_or_else(missing_time)?;

                self.clocks.advance(agent, time)?;
                self.store
                    .insert(clock, time, StateMap::from([(agent.clone(), state)]))?;
                report.commits = report.commits.saturating_add(1);

                debug!(
                    engine = %self.engine,
                    agent = %agent,
                    iteration,
                    low = clock,
                    high = time,
                    "Interval committed"
                );
                if let Some(state) = self
                    .store
                    .records()
                    .last()
                    .and_then(|record| record.value().get(agent))
                {
                    observer.on_commit(&CycleCommit {
                        iteration,
                        engine: &self.engine,
                        agent,
                        low: clock,
                        high: time,
                        state,
                    });
                }
            }
            report.iterations = report.iterations.saturating_add(1);
        }

        Ok(report)
    }

    /// The engine this simulation drives.
    pub const fn engine(&self) -> &EngineId {
        &self.engine
    }

    /// Declared agents in driver order.
    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// The committed history.
    pub const fn store(&self) -> &IntervalStore<StateMap> {
        &self.store
    }

    /// Consume the simulation, keeping its history.
    pub fn into_store(self) -> IntervalStore<StateMap> {
        self.store
    }

    /// Per-agent clocks.
    pub const fn clocks(&self) -> &AgentClocks {
        &self.clocks
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use ephemeris_query::Query;
    use serde_json::json;

    use super::*;
    use crate::config::PhysicsConfig;
    use crate::graph::{AgentRules, ProducerRule};
    use crate::producer::ProducerRegistry;

    fn clock_rules(registry: &ProducerRegistry) -> Vec<ProducerRule> {
        vec![
            ProducerRule::new(
                Query::Tuple(vec![Query::prev(Query::base("time")), Query::prev(Query::base("timeStep"))]),
                Query::base("time"),
                "time_manager",
                registry.get("time_manager").unwrap(),
            )
            .unwrap(),
            ProducerRule::new(
                Query::prev(Query::base("timeStep")),
                Query::base("timeStep"),
                "identity",
                registry.get("identity").unwrap(),
            )
            .unwrap(),
        ]
    }

    fn graph(agents: &[&str]) -> Arc<RuleGraph> {
        let registry = ProducerRegistry::with_builtins(&PhysicsConfig::default());
        let rules: AgentRules = agents
            .iter()
            .map(|name| (AgentId::new(*name), clock_rules(&registry)))
            .collect();
        Arc::new(RuleGraph::new(BTreeMap::from([(EngineId::new("e"), rules)])).unwrap())
    }

    fn initial(states: &[(&str, Value)]) -> StateMap {
        states
            .iter()
            .map(|(name, state)| (AgentId::new(*name), state.clone()))
            .collect()
    }

    #[derive(Default)]
    struct Recorder {
        commits: Vec<(String, Time, Time)>,
    }

    impl CycleObserver for Recorder {
        fn on_commit(&mut self, commit: &CycleCommit<'_>) {
            self.commits
                .push((commit.agent.to_string(), commit.low, commit.high));
        }
    }

    #[test]
    fn seeds_store_and_clocks() {
        let sim = Simulation::new(
            graph(&["A", "B"]),
            EngineId::new("e"),
            initial(&[
                ("A", json!({"time": 0.0, "timeStep": 1.0})),
                ("B", json!({"time": 0.0, "timeStep": 2.0})),
            ]),
            &SimulationSettings::default(),
        )
        .unwrap();
        assert_eq!(sim.store().len(), 1);
        let record = sim.store().records().first().unwrap();
        assert!(record.contains(-1.0));
        assert!(!record.contains(0.0));
        assert_eq!(sim.clocks().get(&AgentId::new("B")), Some(0.0));
        assert_eq!(sim.agents().len(), 2);
    }

    #[test]
    fn mismatched_initial_agents_are_rejected() {
        let result = Simulation::new(
            graph(&["A", "B"]),
            EngineId::new("e"),
            initial(&[("A", json!({"time": 0.0, "timeStep": 1.0}))]),
            &SimulationSettings::default(),
        );
        assert!(matches!(result, Err(SimulationError::InitialState { .. })));
    }

    #[test]
    fn missing_clock_fields_are_rejected() {
        for state in [json!({"time": 0.0}), json!({"timeStep": 1.0}), json!({"time": "0", "timeStep": 1.0})] {
            let result = Simulation::new(
                graph(&["A"]),
                EngineId::new("e"),
                initial(&[("A", state)]),
                &SimulationSettings::default(),
            );
            assert!(matches!(result, Err(SimulationError::InitialState { .. })));
        }
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let result = Simulation::new(
            graph(&["A"]),
            EngineId::new("elsewhere"),
            initial(&[("A", json!({"time": 0.0, "timeStep": 1.0}))]),
            &SimulationSettings::default(),
        );
        assert!(matches!(result, Err(SimulationError::Graph { .. })));
    }

    #[test]
    fn faster_agent_runs_ahead_and_slower_peer_waits() {
        let mut sim = Simulation::new(
            graph(&["A", "B"]),
            EngineId::new("e"),
            initial(&[
                ("A", json!({"time": 0.0, "timeStep": 1.0})),
                ("B", json!({"time": 0.0, "timeStep": 2.0})),
            ]),
            &SimulationSettings::default(),
        )
        .unwrap();
        let mut recorder = Recorder::default();
        let report = sim.simulate_with(3, &mut recorder).unwrap();

        // Iteration 2: B at clock 4 reads at 4 - ε, where A has no
        // committed interval yet, so B is skipped.
        assert_eq!(
            report,
            SimulationReport {
                iterations: 3,
                commits: 5,
                skipped: 1
            }
        );
        assert_eq!(sim.clocks().get(&AgentId::new("A")), Some(3.0));
        assert_eq!(sim.clocks().get(&AgentId::new("B")), Some(4.0));
        let expected: Vec<(String, Time, Time)> = vec![
            ("A".to_owned(), 0.0, 1.0),
            ("B".to_owned(), 0.0, 2.0),
            ("A".to_owned(), 1.0, 2.0),
            ("B".to_owned(), 2.0, 4.0),
            ("A".to_owned(), 2.0, 3.0),
        ];
        assert_eq!(recorder.commits, expected);
        // seed + one record per commit
        assert_eq!(sim.store().len(), 6);
    }

    #[test]
    fn commits_hold_only_the_stepping_agent() {
        let mut sim = Simulation::new(
            graph(&["A", "B"]),
            EngineId::new("e"),
            initial(&[
                ("A", json!({"time": 0.0, "timeStep": 1.0})),
                ("B", json!({"time": 0.0, "timeStep": 1.0})),
            ]),
            &SimulationSettings::default(),
        )
        .unwrap();
        sim.simulate(1).unwrap();
        for record in sim.store().records().iter().skip(1) {
            assert_eq!(record.value().len(), 1);
        }
        let snapshot = sim.store().merge(0.5);
        assert_eq!(
            snapshot.get("A"),
            Some(&json!({"time": 1.0, "timeStep": 1.0}))
        );
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn zero_iterations_commit_nothing() {
        let mut sim = Simulation::new(
            graph(&["A"]),
            EngineId::new("e"),
            initial(&[("A", json!({"time": 0.0, "timeStep": 1.0}))]),
            &SimulationSettings::default(),
        )
        .unwrap();
        assert_eq!(sim.simulate(0).unwrap(), SimulationReport::default());
        assert_eq!(sim.store().len(), 1);
    }
}
