//! Distributed execution coordinator
//!
//! Runs one task per thread inside a `std::thread::scope`, so every task
//! borrows the same read-only [`SharedContext`]. Tasks talk only through
//! their [`ThreadComm`] endpoints. When any task fails, it aborts the others;
//! the coordinator then reports the root cause rather than the peers'
//! "aborted" errors.

use std::thread;

use cola_kernel::{Communicator, ParticleArrays, SingleTask};

use crate::comm::ThreadComm;
use crate::config::SimulationConfig;
use crate::context::{SharedContext, TaskContext};
use crate::error::SimulationError;
use crate::initial_conditions::generate;
use crate::integrator::ColaIntegrator;

/// Where the particles of a run come from.
#[derive(Debug, Clone)]
pub enum InitialState {
    /// Draw 2LPT initial conditions from the configured power spectrum
    Generate,
    /// Start from caller-supplied particles at the initial scale factor.
    /// Positions are wrapped into the box and handed to their owning tasks.
    Particles(ParticleArrays),
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct SimulationOutput {
    /// Final particles from every task, sorted by id
    pub particles: ParticleArrays,
    /// Scale factor the particles were evolved to
    pub scale_factor: f64,
    /// Number of timesteps executed
    pub steps: usize,
    /// Number of tasks that ran
    pub tasks: usize,
}

impl SimulationOutput {
    /// Peculiar velocity of particle `i` in km/s.
    pub fn peculiar_velocity_kms(&self, i: usize) -> [f64; 3] {
        let p = &self.particles.vel;
        let to_kms = 100.0 / self.scale_factor;
        [
            p[0][i] as f64 * to_kms,
            p[1][i] as f64 * to_kms,
            p[2][i] as f64 * to_kms,
        ]
    }
}

/// Run a simulation with `config.tasks` tasks, one thread each.
///
/// This function:
/// 1. Validates the configuration and builds the shared context
/// 2. Creates one communicator endpoint and task context per task
/// 3. Runs initial conditions and the integrator on every task in parallel
/// 4. Merges the particles of all tasks, sorted by id
///
/// A task that fails aborts the whole run; the first error that is not a
/// peer abort is returned.
pub fn run_distributed(
    config: &SimulationConfig,
    initial: InitialState,
) -> Result<SimulationOutput, SimulationError> {
    let shared = SharedContext::new(config)?;
    tracing::info!(
        "Starting '{}' on {} tasks: {}^3 particles, {}^3 mesh, {} steps",
        config.name,
        config.tasks,
        config.nsample,
        config.nmesh,
        config.nsteps
    );

    let initial = &initial;
    let results: Vec<Result<(ParticleArrays, f64), SimulationError>> = thread::scope(|scope| {
        let handles: Vec<_> = ThreadComm::group(config.tasks)
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                // Built outside the thread: if spawning fails the dropped
                // context still aborts the peers.
                let task = TaskContext::new(&shared, comm);
                thread::Builder::new()
                    .name(format!("task-{}", rank))
                    .spawn_scoped(scope, move || run_task(task, initial))
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or(Err(SimulationError::TaskPanicked { task: rank })),
                Err(e) => Err(SimulationError::ResourceExhaustion(format!(
                    "cannot spawn thread for task {}: {}",
                    rank, e
                ))),
            })
            .collect()
    });

    let (parts, scale_factors) = collect_results(results)?;
    let output = merge(parts, scale_factors, config)?;
    tracing::info!(
        "Run '{}' finished at a = {:.5} with {} particles",
        config.name,
        output.scale_factor,
        output.particles.len()
    );
    Ok(output)
}

/// Run a single-task simulation on the calling thread.
///
/// `config.tasks` is ignored.
pub fn run_single_instance(
    config: &SimulationConfig,
    initial: InitialState,
) -> Result<SimulationOutput, SimulationError> {
    let mut config = config.clone();
    config.tasks = 1;
    let shared = SharedContext::new(&config)?;
    tracing::info!(
        "Starting '{}' single-task: {}^3 particles, {}^3 mesh, {} steps",
        config.name,
        config.nsample,
        config.nmesh,
        config.nsteps
    );
    let task = TaskContext::new(&shared, SingleTask::new());
    let (particles, a) = run_task(task, &initial)?;
    merge(vec![particles], vec![a], &config)
}

fn run_task<C: Communicator>(
    mut task: TaskContext<'_, C>,
    initial: &InitialState,
) -> Result<(ParticleArrays, f64), SimulationError> {
    match evolve(&mut task, initial) {
        Ok(a) => Ok((task.finish(), a)),
        Err(e) => {
            if !e.is_peer_abort() {
                tracing::error!("Task {} failed: {}", task.rank(), e);
            }
            task.fail(&e);
            Err(e)
        }
    }
}

fn evolve<C: Communicator>(
    task: &mut TaskContext<'_, C>,
    initial: &InitialState,
) -> Result<f64, SimulationError> {
    match initial {
        InitialState::Generate => generate(task)?,
        InitialState::Particles(all) => take_owned(task, all)?,
    }
    let mut integrator = ColaIntegrator::new(task.shared, task.rank())?;
    integrator.run(task)
}

/// Copy the supplied particles that fall in this task's slab.
fn take_owned<C: Communicator>(
    task: &mut TaskContext<'_, C>,
    all: &ParticleArrays,
) -> Result<(), SimulationError> {
    let decomposition = &task.shared.decomposition;
    let rank = task.rank();
    for i in 0..all.len() {
        let mut p = all.get(i);
        for x in p.pos.iter_mut() {
            *x = decomposition.wrap(*x);
        }
        if decomposition.task_for_position(p.pos[0]) == rank {
            if task.particles.len() == task.capacity {
                return Err(SimulationError::ResourceExhaustion(format!(
                    "task {} received more than {} supplied particles; increase the buffer factor",
                    rank, task.capacity
                )));
            }
            task.particles.push(p);
        }
    }
    tracing::debug!("Task {}: took {} supplied particles", rank, task.particles.len());
    Ok(())
}

/// Split per-task results, preferring a root-cause error over peer aborts.
fn collect_results(
    results: Vec<Result<(ParticleArrays, f64), SimulationError>>,
) -> Result<(Vec<ParticleArrays>, Vec<f64>), SimulationError> {
    let mut parts = Vec::with_capacity(results.len());
    let mut scale_factors = Vec::with_capacity(results.len());
    let mut first_error: Option<SimulationError> = None;
    for result in results {
        match result {
            Ok((particles, a)) => {
                parts.push(particles);
                scale_factors.push(a);
            }
            Err(e) => {
                let replace = match &first_error {
                    None => true,
                    Some(current) => current.is_peer_abort() && !e.is_peer_abort(),
                };
                if replace {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok((parts, scale_factors)),
    }
}

fn merge(
    parts: Vec<ParticleArrays>,
    scale_factors: Vec<f64>,
    config: &SimulationConfig,
) -> Result<SimulationOutput, SimulationError> {
    let tasks = parts.len();
    let mut particles = ParticleArrays::with_capacity(parts.iter().map(ParticleArrays::len).sum());
    for mut part in parts {
        particles.append(&mut part);
    }
    particles.sort_by_id();

    let scale_factor = scale_factors.first().copied().unwrap_or(config.final_scale_factor());
    if scale_factors.iter().any(|&a| a != scale_factor) {
        return Err(SimulationError::Configuration(
            "tasks finished at different scale factors".to_string(),
        ));
    }
    Ok(SimulationOutput {
        particles,
        scale_factor,
        steps: config.nsteps,
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cola_kernel::CommError;

    fn peer_abort() -> SimulationError {
        SimulationError::Communication(CommError::PeerAborted {
            peer: 1,
            reason: "boom".to_string(),
        })
    }

    #[test]
    fn root_cause_beats_peer_aborts() {
        let results = vec![
            Err(peer_abort()),
            Err(SimulationError::ResourceExhaustion("full".to_string())),
            Err(peer_abort()),
        ];
        let err = collect_results(results).unwrap_err();
        assert!(matches!(err, SimulationError::ResourceExhaustion(_)));
    }

    #[test]
    fn merged_particles_are_sorted() {
        let mut a = ParticleArrays::new();
        let mut b = ParticleArrays::new();
        for id in [4u64, 0, 2] {
            a.push(cola_kernel::Particle {
                id,
                ..Default::default()
            });
        }
        for id in [3u64, 1] {
            b.push(cola_kernel::Particle {
                id,
                ..Default::default()
            });
        }
        let config = SimulationConfig::default();
        let out = merge(vec![a, b], vec![1.0, 1.0], &config).unwrap();
        assert_eq!(out.particles.id, vec![0, 1, 2, 3, 4]);
        assert_eq!(out.tasks, 2);
    }

    #[test]
    fn peculiar_velocity_scales_with_a() {
        let mut particles = ParticleArrays::new();
        particles.push(cola_kernel::Particle {
            id: 0,
            vel: [0.5, -1.0, 0.0],
            ..Default::default()
        });
        let out = SimulationOutput {
            particles,
            scale_factor: 0.5,
            steps: 1,
            tasks: 1,
        };
        assert_eq!(out.peculiar_velocity_kms(0), [100.0, -200.0, 0.0]);
    }
}
