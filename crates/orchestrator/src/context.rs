//! Simulation context objects
//!
//! [`SharedContext`] is built once before any task starts and is only read
//! afterwards; every task thread borrows it. [`TaskContext`] is the mutable
//! state private to one task.

use cola_kernel::{Communicator, Cosmology, ParticleArrays, PowerSpectrum, TimeKernels};

use crate::config::SimulationConfig;
use crate::domain::Decomposition;
use crate::error::SimulationError;

/// Run-wide read-only state.
#[derive(Debug, Clone)]
pub struct SharedContext {
    /// Validated configuration
    pub config: SimulationConfig,
    /// Slab tables
    pub decomposition: Decomposition,
    /// Background cosmology and growth factors
    pub cosmology: Cosmology,
    /// Kick/drift kernels
    pub kernels: TimeKernels,
    /// Normalised linear power spectrum at z = 0
    pub spectrum: PowerSpectrum,
}

impl SharedContext {
    /// Validate `config` and derive everything the tasks share.
    pub fn new(config: &SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let decomposition = Decomposition::from_config(config)?;
        let cosmology = config.cosmology();
        let spectrum = config.power_spectrum()?;
        tracing::info!(
            "Cosmology: Omega_m={}, Omega_Lambda={}, D1(a_init)={:.6}, sigma8={:.4}",
            cosmology.omega_m(),
            cosmology.omega_lambda(),
            cosmology.growth_d1(config.initial_scale_factor()),
            spectrum.sigma(cola_kernel::spectrum::SIGMA8_RADIUS)
        );
        Ok(Self {
            config: config.clone(),
            decomposition,
            cosmology,
            kernels: config.time_kernels(),
            spectrum,
        })
    }
}

/// State owned by a single task.
///
/// Dropping a context that never reached [`TaskContext::finish`] (an error
/// return or a panic) aborts the run so no peer stays blocked.
pub struct TaskContext<'a, C: Communicator> {
    /// Run-wide state
    pub shared: &'a SharedContext,
    /// Message passing endpoint
    pub comm: C,
    /// Particles currently owned
    pub particles: ParticleArrays,
    /// Maximum number of particles this task may hold
    pub capacity: usize,
    finished: bool,
}

impl<'a, C: Communicator> TaskContext<'a, C> {
    /// Context for the task behind `comm`, with an empty particle store.
    pub fn new(shared: &'a SharedContext, comm: C) -> Self {
        let rank = comm.rank();
        let capacity = shared
            .decomposition
            .particle_capacity(rank, shared.config.buffer);
        Self {
            shared,
            comm,
            particles: ParticleArrays::with_capacity(capacity),
            capacity,
            finished: false,
        }
    }

    /// Index of this task
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// `(start, count)` of the mesh planes owned by this task
    pub fn mesh_slab(&self) -> (usize, usize) {
        self.shared.decomposition.slices_owned(self.rank())
    }

    /// Mark the task as completed and hand out its particles.
    pub fn finish(mut self) -> ParticleArrays {
        self.finished = true;
        std::mem::take(&mut self.particles)
    }

    /// Abort every task with the given reason.
    pub fn fail(&mut self, error: &SimulationError) {
        if !error.is_peer_abort() {
            self.comm.abort(&error.to_string());
        }
        self.finished = true;
    }
}

impl<C: Communicator> Drop for TaskContext<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            self.comm.abort("task exited before finishing");
        }
    }
}
