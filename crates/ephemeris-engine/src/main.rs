//! Simulation binary for Ephemeris.
//!
//! This is the main entry point that wires together configuration, the
//! dependency graph, the per-engine simulations, and the store export.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the path given as the first argument
//!    (default `ephemeris.yaml`), falling back to built-in defaults
//! 2. Initialize structured logging (tracing)
//! 3. Build the AST provider and the producer registry
//! 4. Build the dependency graph and one simulation per engine
//! 5. Run every simulation for the configured iterations
//! 6. Export every engine's store to the configured JSON artifact

mod error;
mod export;
mod observer;

use std::path::{Path, PathBuf};

use ephemeris_core::config::{EphemerisConfig, LoggingConfig};
use ephemeris_core::producer::ProducerRegistry;
use ephemeris_core::runner;
use ephemeris_query::CommandAstProvider;
use ephemeris_types::RunId;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::export::RunExport;
use crate::observer::LoggingObserver;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "ephemeris.yaml";

/// Commits between progress lines.
const PROGRESS_EVERY: u64 = 100;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, graph construction, a simulation,
/// or the export fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is configured from it, so the
    //    fallback is reported once the subscriber exists.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging)?;
    info!("ephemeris-engine starting");
    if from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }
    info!(
        name = config.simulation.name,
        iterations = config.simulation.iterations,
        read_offset = config.simulation.read_offset,
        engines = config.engines.len(),
        parser = config.parser.command,
        "Configuration ready"
    );

    // 3. Parsing capability and producer functions.
    let provider = CommandAstProvider::new(config.parser.command.clone(), config.parser.args.clone());
    let producers = ProducerRegistry::with_builtins(&config.physics);

    // 4. Graph and simulations.
    let mut simulations = runner::build_simulations(&config, &provider, &producers)
        .map_err(EngineError::from)?;

    // 5. Run.
    let run_id = RunId::new();
    info!(run_id = %run_id, "Run starting");
    let mut observer = LoggingObserver::new(PROGRESS_EVERY);
    for simulation in &mut simulations {
        let result = runner::run_simulation(simulation, config.simulation.iterations, &mut observer)
            .map_err(EngineError::from)?;
        runner::log_simulation_end(&result);
    }

    // 6. Export.
    let export = RunExport::new(run_id, config.simulation.name.clone(), simulations);
    export.write_to(Path::new(&config.export.path))?;

    info!(
        run_id = %run_id,
        commits = observer.commits(),
        "ephemeris-engine shutdown complete"
    );
    Ok(())
}

/// Load configuration from `path`, or the defaults if it does not exist.
///
/// Returns the configuration and whether it came from the file.
fn load_config(path: &Path) -> Result<(EphemerisConfig, bool), EngineError> {
    if path.exists() {
        Ok((EphemerisConfig::from_file(path)?, true))
    } else {
        Ok((EphemerisConfig::parse("")?, false))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| EngineError::Logging {
            filter: logging.level.clone(),
            message: e.to_string(),
        })?,
    };

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
    Ok(())
}
