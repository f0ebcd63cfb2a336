//! Particle-mesh displacement field
//!
//! One force evaluation is a fixed pipeline over the task's slab:
//! CIC deposit, ghost accumulate, forward FFT, then per axis the Poisson
//! solve, an inverse FFT, a ghost fetch and CIC interpolation back onto the
//! particles. The fetch of one axis travels while the next axis is being
//! transformed.

use cola_kernel::cic::{self, GhostedSlab};
use cola_kernel::poisson::displacement_modes;
use cola_kernel::{Communicator, Filter, ForceKernel, ParticleArrays, Real, SlabFft, SlabField};

use crate::domain::Decomposition;
use crate::error::SimulationError;
use crate::exchange::{GhostExchange, PendingExchange};

/// Mesh buffers and FFT plans of one task, reused for every force evaluation.
pub struct ParticleMesh {
    fft: SlabFft,
    density: SlabField,
    component: SlabField,
    exchange: GhostExchange,
    n: usize,
    x_start: usize,
    local_nx: usize,
    box_size: f64,
    scale: Real,
    mass: Real,
    filter: Filter,
    kernel: ForceKernel,
}

impl ParticleMesh {
    /// Allocate the slab buffers of task `rank`.
    ///
    /// `mass` is the mass of one particle in units of the mean mass per cell.
    pub fn new(
        decomposition: &Decomposition,
        rank: usize,
        mass: f64,
        filter: Filter,
        kernel: ForceKernel,
    ) -> Result<Self, SimulationError> {
        let n = decomposition.nmesh();
        let (x_start, local_nx) = decomposition.slices_owned(rank);
        Ok(Self {
            fft: SlabFft::new(decomposition.mesh().clone(), rank),
            density: SlabField::zeroed(n, x_start, local_nx)?,
            component: SlabField::zeroed(n, x_start, local_nx)?,
            exchange: GhostExchange::new(decomposition, rank),
            n,
            x_start,
            local_nx,
            box_size: decomposition.box_size(),
            scale: decomposition.grid_scale(),
            mass: mass as Real,
            filter,
            kernel,
        })
    }

    /// Overwrite `particles.disp` with the PM displacement field at every
    /// particle. Collective: every task must call it.
    pub fn compute_displacements<C: Communicator>(
        &mut self,
        particles: &mut ParticleArrays,
        comm: &mut C,
    ) -> Result<(), SimulationError> {
        let mut slab = GhostedSlab::zeroed(self.n, self.x_start, self.local_nx);
        cic::deposit(&mut slab, particles.positions(), self.scale, self.mass)?;
        let slab = self.exchange.start_accumulate(slab, comm)?.wait(comm)?;
        tracing::trace!("Task {}: slab mass {:.6}", comm.rank(), slab.owned_sum());

        // Mean density is one per cell.
        let overdensity: Vec<Real> = slab.owned().iter().map(|&rho| rho - 1.0).collect();
        self.density.load_real(&overdensity)?;
        self.fft.forward(&mut self.density, comm)?;

        let mut in_flight: Option<(usize, PendingExchange)> = None;
        for axis in 0..3 {
            displacement_modes(
                &self.density,
                &mut self.component,
                axis,
                self.box_size,
                self.filter,
                self.kernel,
            )?;
            self.fft.inverse(&mut self.component, comm)?;
            let slab = GhostedSlab::from_field(&self.component)?;
            let pending = self.exchange.start_fetch(slab, axis as u8, comm)?;
            if let Some((done, previous)) = in_flight.replace((axis, pending)) {
                interpolate_axis(previous, done, particles, self.scale, comm)?;
            }
        }
        if let Some((done, last)) = in_flight.take() {
            interpolate_axis(last, done, particles, self.scale, comm)?;
        }
        Ok(())
    }
}

fn interpolate_axis<C: Communicator>(
    pending: PendingExchange,
    axis: usize,
    particles: &mut ParticleArrays,
    scale: Real,
    comm: &mut C,
) -> Result<(), SimulationError> {
    let slab = pending.wait(comm)?;
    let ParticleArrays { pos, disp, .. } = particles;
    cic::interpolate(&slab, [&pos[0], &pos[1], &pos[2]], scale, &mut disp[axis])?;
    Ok(())
}

/// Sample a real-space field at `positions` after fetching its ghost plane.
///
/// `component` tags the exchange so several fields can be sampled back to
/// back without their ghost planes mixing.
pub fn sample_field<C: Communicator>(
    field: &SlabField,
    component: u8,
    exchange: &GhostExchange,
    positions: [&[Real]; 3],
    scale: Real,
    out: &mut [Real],
    comm: &mut C,
) -> Result<(), SimulationError> {
    let slab = GhostedSlab::from_field(field)?;
    let slab = exchange.start_fetch(slab, component, comm)?.wait(comm)?;
    cic::interpolate(&slab, positions, scale, out)?;
    Ok(())
}
