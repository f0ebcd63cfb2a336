//! Orchestration Layer
//!
//! This crate drives the COLA particle-mesh kernel across tasks:
//! - JSON configuration and validation
//! - Slab domain decomposition of the mesh and the particle lattice
//! - A thread-backed communicator with abort propagation
//! - Ghost plane exchange and particle migration protocols
//! - 2LPT (optionally non-Gaussian) initial conditions
//! - The COLA kick-drift-kick integrator
//! - The distributed coordinator that runs one thread per task

#![warn(missing_docs)]

pub mod comm;
pub mod config;
pub mod context;
pub mod distributed;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod force;
pub mod initial_conditions;
pub mod integrator;
pub mod migration;

pub use comm::ThreadComm;
pub use config::SimulationConfig;
pub use distributed::{run_distributed, run_single_instance, InitialState, SimulationOutput};
pub use domain::Decomposition;
pub use error::SimulationError;

/// Run a simulation described by `config` from generated initial conditions.
///
/// Single-task runs stay on the calling thread; anything larger runs one
/// thread per task.
///
/// # Example
/// ```no_run
/// use cola_orchestrator::{run_simulation, SimulationConfig};
///
/// let config = SimulationConfig::load("configs/small_box.json")?;
/// let output = run_simulation(&config)?;
/// println!("{} particles at a = {}", output.particles.len(), output.scale_factor);
/// # Ok::<(), cola_orchestrator::SimulationError>(())
/// ```
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationOutput, SimulationError> {
    if config.tasks == 1 {
        run_single_instance(config, InitialState::Generate)
    } else {
        run_distributed(config, InitialState::Generate)
    }
}

/// Load a configuration file and run it.
pub fn run_from_file(config_path: &str) -> Result<SimulationOutput, SimulationError> {
    tracing::info!("Loading configuration: {}", config_path);
    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);
    run_simulation(&config)
}
