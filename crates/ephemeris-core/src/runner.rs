//! Run orchestration: build every configured engine and drive it for the
//! configured number of iterations.
//!
//! Engines share one [`RuleGraph`] but no state, so they run one after the
//! other, each with its own store and clocks.

use std::sync::Arc;

use ephemeris_query::AstProvider;
use ephemeris_types::{AgentId, EngineId, Time};
use tracing::{info, warn};

use crate::config::EphemerisConfig;
use crate::driver::{CycleObserver, Simulation, SimulationError, SimulationReport};
use crate::graph::{GraphBuilder, GraphError};
use crate::producer::ProducerRegistry;

/// Errors that can occur while setting up or running simulations.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The dependency graph could not be built.
    #[error("graph error: {source}")]
    Graph {
        /// The underlying graph error.
        #[from]
        source: GraphError,
    },

    /// A simulation failed to start or to run.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: SimulationError,
    },
}

/// Outcome of running one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    /// The engine that ran.
    pub engine: EngineId,
    /// Commit and skip counts.
    pub report: SimulationReport,
    /// Every agent's clock after the run, in agent order.
    pub final_clocks: Vec<(AgentId, Time)>,
    /// Records in the engine's store, seed included.
    pub records: usize,
}

/// Build the rule graph once and one [`Simulation`] per configured engine.
///
/// # Errors
///
/// Returns [`RunnerError::Graph`] for any parse, lookup, or structural
/// failure, and [`RunnerError::Simulation`] for an invalid initial state.
pub fn build_simulations(
    config: &EphemerisConfig,
    provider: &dyn AstProvider,
    producers: &ProducerRegistry,
) -> Result<Vec<Simulation>, RunnerError> {
    let graph = Arc::new(GraphBuilder::new(provider, producers).build(&config.engines)?);
    let mut simulations = Vec::with_capacity(config.engines.len());
    for (engine, engine_config) in &config.engines {
        simulations.push(Simulation::new(
            Arc::clone(&graph),
            engine.clone(),
            engine_config.initial_state.clone(),
            &config.simulation,
        )?);
    }
    Ok(simulations)
}

/// Drive `simulation` for `iterations` iterations.
///
/// # Errors
///
/// Returns [`RunnerError::Simulation`] if a cycle fails. Committed history
/// up to the failure remains available on `simulation`.
pub fn run_simulation(
    simulation: &mut Simulation,
    iterations: u64,
    observer: &mut dyn CycleObserver,
) -> Result<SimulationResult, RunnerError> {
    info!(
        engine = %simulation.engine(),
        agents = simulation.agents().len(),
        iterations,
        "Simulation starting"
    );

    let report = simulation.simulate_with(iterations, observer)?;

    Ok(SimulationResult {
        engine: simulation.engine().clone(),
        report,
        final_clocks: simulation
            .clocks()
            .iter()
            .map(|(agent, clock)| (agent.clone(), clock))
            .collect(),
        records: simulation.store().len(),
    })
}

/// Log the end-of-run summary for one engine.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        engine = %result.engine,
        iterations = result.report.iterations,
        commits = result.report.commits,
        skipped = result.report.skipped,
        records = result.records,
        "Simulation ended"
    );

    for (agent, clock) in &result.final_clocks {
        info!(engine = %result.engine, agent = %agent, clock, "Final clock");
    }

    if result.report.commits == 0 {
        warn!(engine = %result.engine, "Simulation ended with no committed intervals");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ephemeris_query::JsonAstProvider;

    use super::*;
    use crate::driver::NoOpObserver;

    #[test]
    fn default_config_builds_one_simulation() {
        let config = EphemerisConfig::default();
        let producers = ProducerRegistry::with_builtins(&config.physics);
        let simulations = build_simulations(&config, &JsonAstProvider, &producers).unwrap();
        assert_eq!(simulations.len(), 1);
        assert_eq!(simulations.first().map(|s| s.engine().as_str()), Some("orbits"));
    }

    #[test]
    fn run_reports_final_clocks() {
        let config = EphemerisConfig::default();
        let producers = ProducerRegistry::with_builtins(&config.physics);
        let mut simulations = build_simulations(&config, &JsonAstProvider, &producers).unwrap();
        let simulation = simulations.first_mut().unwrap();

        let result = run_simulation(simulation, 10, &mut NoOpObserver).unwrap();
        log_simulation_end(&result);

        assert_eq!(result.report.commits, 20);
        assert_eq!(result.records, 21);
        assert_eq!(result.final_clocks.len(), 2);
        for (_, clock) in &result.final_clocks {
            assert!((clock - 0.1).abs() < 1e-9);
        }
    }

    #[test]
    fn missing_producer_fails_the_build() {
        let config = EphemerisConfig::default();
        let producers = ProducerRegistry::new();
        let result = build_simulations(&config, &JsonAstProvider, &producers);
        assert!(matches!(
            result,
            Err(RunnerError::Graph {
                source: GraphError::UnknownFunction { .. }
            })
        ));
    }
}
