//! COLA kick-drift-kick time stepping
//!
//! Positions live on the step boundaries `a_i`, momenta on the midpoints
//! `a_{i+1/2}`. With COLA enabled the momenta only carry the residual with
//! respect to the 2LPT trajectory, whose own motion is added analytically in
//! every drift and restored into the momenta at the end.

use cola_kernel::integrate::bisect;
use cola_kernel::{Communicator, Cosmology, ParticleArrays, Real};

use crate::config::{SimulationConfig, StepSpacing};
use crate::context::{SharedContext, TaskContext};
use crate::error::SimulationError;
use crate::force::ParticleMesh;
use crate::migration::migrate;

/// Stage of the integrator. Transitions are logged at trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Initial conditions in place, nothing evolved yet
    Initialized,
    /// Depositing and solving for the PM displacement field
    ForceEvaluation,
    /// Updating momenta
    Kick,
    /// Updating positions
    Drift,
    /// Moving particles to their new owners
    Migration,
    /// Final kick done and LPT velocities restored
    Finalized,
}

/// Step boundaries `a_0 .. a_n` between the initial and final scale factor.
pub fn step_schedule(config: &SimulationConfig, cosmology: &Cosmology) -> Vec<f64> {
    let n = config.nsteps;
    let (a0, af) = (config.initial_scale_factor(), config.final_scale_factor());
    let fraction = |i: usize| i as f64 / n as f64;
    let mut schedule: Vec<f64> = match config.integrator.step_spacing {
        StepSpacing::ScaleFactor => (0..=n).map(|i| a0 + (af - a0) * fraction(i)).collect(),
        StepSpacing::Redshift => (0..=n)
            .map(|i| 1.0 / (1.0 / a0 + (1.0 / af - 1.0 / a0) * fraction(i)))
            .collect(),
        StepSpacing::Growth => {
            let (g0, gf) = (cosmology.growth_d1(a0), cosmology.growth_d1(af));
            (0..=n)
                .map(|i| {
                    let target = g0 + (gf - g0) * fraction(i);
                    bisect(|a| cosmology.growth_d1(a), target, a0, af)
                })
                .collect()
        }
    };
    // Pin the end points exactly.
    schedule[0] = a0;
    schedule[n] = af;
    schedule
}

/// Leapfrog driver of one task.
pub struct ColaIntegrator<'a> {
    shared: &'a SharedContext,
    schedule: Vec<f64>,
    mesh: Option<ParticleMesh>,
    use_cola: bool,
    phase: Phase,
}

impl<'a> ColaIntegrator<'a> {
    /// Integrator for task `rank`. The PM buffers are only allocated when
    /// mesh forces are enabled.
    pub fn new(shared: &'a SharedContext, rank: usize) -> Result<Self, SimulationError> {
        let config = &shared.config;
        let mesh = if config.force.mesh_force {
            Some(ParticleMesh::new(
                &shared.decomposition,
                rank,
                config.particle_mass(),
                config.force.filter,
                config.force.kernel,
            )?)
        } else {
            None
        };
        Ok(Self {
            shared,
            schedule: step_schedule(config, &shared.cosmology),
            mesh,
            use_cola: config.integrator.use_cola,
            phase: Phase::Initialized,
        })
    }

    /// Step boundaries
    pub fn schedule(&self) -> &[f64] {
        &self.schedule
    }

    /// Current stage
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        if phase != self.phase {
            tracing::trace!("Integrator phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn midpoint(&self, i: usize) -> f64 {
        0.5 * (self.schedule[i] + self.schedule[i + 1])
    }

    /// Evolve the task's particles through every step and return the final
    /// scale factor. Collective: every task must call it.
    pub fn run<C: Communicator>(
        &mut self,
        task: &mut TaskContext<'_, C>,
    ) -> Result<f64, SimulationError> {
        let nsteps = self.schedule.len() - 1;
        let rank = task.rank();
        let mut a_kick = self.schedule[0];

        for step in 0..nsteps {
            let (a, a_next) = (self.schedule[step], self.schedule[step + 1]);
            let a_mid = self.midpoint(step);
            if rank == 0 {
                tracing::info!(
                    "Step {}/{}: a = {:.5} -> {:.5} (z = {:.3})",
                    step + 1,
                    nsteps,
                    a,
                    a_next,
                    1.0 / a_next - 1.0
                );
            }

            self.evaluate_forces(task)?;
            self.kick(&mut task.particles, a_kick, a_mid, a);
            a_kick = a_mid;
            self.drift(&mut task.particles, a, a_next, a_mid);

            self.enter(Phase::Migration);
            let stats = migrate(
                &mut task.particles,
                task.capacity,
                &self.shared.decomposition,
                &mut task.comm,
            )?;
            tracing::debug!(
                "Task {}: step {} migration sent {}, received {}, holding {}",
                rank,
                step + 1,
                stats.sent,
                stats.received,
                task.particles.len()
            );
        }

        let a_final = self.schedule[nsteps];
        self.evaluate_forces(task)?;
        self.kick(&mut task.particles, a_kick, a_final, a_final);
        self.finalize(&mut task.particles, a_final);
        Ok(a_final)
    }

    fn evaluate_forces<C: Communicator>(
        &mut self,
        task: &mut TaskContext<'_, C>,
    ) -> Result<(), SimulationError> {
        self.enter(Phase::ForceEvaluation);
        let Some(mesh) = self.mesh.as_mut() else {
            return Ok(());
        };
        mesh.compute_displacements(&mut task.particles, &mut task.comm)?;

        let local_max = task
            .particles
            .disp
            .iter()
            .flat_map(|axis| axis.iter())
            .fold(0.0f64, |m, &v| m.max((v as f64).abs()));
        let global_max = task.comm.all_reduce_max(local_max)?;
        if task.rank() == 0 {
            tracing::debug!("Max PM displacement {:.4e} Mpc/h", global_max);
        }
        Ok(())
    }

    /// Kick momenta from `ai` to `af` with forces evaluated at `ac`.
    ///
    /// Without mesh forces the residual force is zero and nothing changes.
    pub fn kick(&mut self, particles: &mut ParticleArrays, ai: f64, af: f64, ac: f64) {
        self.enter(Phase::Kick);
        if self.mesh.is_none() {
            return;
        }
        let cosmology = &self.shared.cosmology;
        let factor = (1.5 * cosmology.omega_m() * self.shared.kernels.kick(ai, af, ac)) as Real;
        let (d1, d2_residual) = if self.use_cola {
            let d1 = cosmology.growth_d1(ac);
            (d1 as Real, (cosmology.growth_d2(ac) - d1 * d1) as Real)
        } else {
            (0.0, 0.0)
        };
        let ParticleArrays {
            vel, za, lpt, disp, ..
        } = particles;
        for axis in 0..3 {
            for (i, v) in vel[axis].iter_mut().enumerate() {
                let lpt_force = d1 * za[axis][i] + d2_residual * lpt[axis][i];
                *v += factor * (disp[axis][i] - lpt_force);
            }
        }
    }

    /// Drift positions from `ai` to `af` with momenta taken at `ac`.
    pub fn drift(&mut self, particles: &mut ParticleArrays, ai: f64, af: f64, ac: f64) {
        self.enter(Phase::Drift);
        let cosmology = &self.shared.cosmology;
        let decomposition = &self.shared.decomposition;
        let k = self.shared.kernels.drift(ai, af, ac) as Real;
        let (dd1, dd2) = if self.use_cola {
            (
                (cosmology.growth_d1(af) - cosmology.growth_d1(ai)) as Real,
                (cosmology.growth_d2(af) - cosmology.growth_d2(ai)) as Real,
            )
        } else {
            (0.0, 0.0)
        };
        let ParticleArrays {
            pos, vel, za, lpt, ..
        } = particles;
        for axis in 0..3 {
            for (i, x) in pos[axis].iter_mut().enumerate() {
                let moved = *x + vel[axis][i] * k + dd1 * za[axis][i] + dd2 * lpt[axis][i];
                *x = decomposition.wrap(moved);
            }
        }
    }

    /// Restore the LPT part of the momenta at scale factor `a`.
    pub fn finalize(&mut self, particles: &mut ParticleArrays, a: f64) {
        self.enter(Phase::Finalized);
        if !self.use_cola {
            return;
        }
        let cosmology = &self.shared.cosmology;
        let q = cosmology.q_factor(a);
        let v1 = (q * cosmology.growth_d1_rate(a)) as Real;
        let v2 = (q * cosmology.growth_d2_rate(a)) as Real;
        let ParticleArrays { vel, za, lpt, .. } = particles;
        for axis in 0..3 {
            for (i, v) in vel[axis].iter_mut().enumerate() {
                *v += v1 * za[axis][i] + v2 * lpt[axis][i];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpectrumConfig;
    use cola_kernel::Particle;

    fn config(spacing: StepSpacing) -> SimulationConfig {
        let mut config = SimulationConfig {
            nmesh: 8,
            nsample: 8,
            box_size: 64.0,
            init_redshift: 9.0,
            nsteps: 5,
            spectrum: SpectrumConfig::Flat { amplitude: 1.0 },
            ..SimulationConfig::default()
        };
        config.cosmology.sigma8 = None;
        config.integrator.step_spacing = spacing;
        config
    }

    #[test]
    fn schedules_span_the_run() {
        for spacing in [StepSpacing::ScaleFactor, StepSpacing::Redshift, StepSpacing::Growth] {
            let c = config(spacing);
            let schedule = step_schedule(&c, &c.cosmology());
            assert_eq!(schedule.len(), 6);
            assert_eq!(schedule[0], 0.1);
            assert_eq!(schedule[5], 1.0);
            assert!(schedule.windows(2).all(|w| w[1] > w[0]), "{:?}", spacing);
        }
    }

    #[test]
    fn redshift_spacing_is_uniform_in_one_plus_z() {
        let c = config(StepSpacing::Redshift);
        let schedule = step_schedule(&c, &c.cosmology());
        for (i, a) in schedule.iter().enumerate() {
            let expected = 10.0 - 9.0 * i as f64 / 5.0;
            assert!((1.0 / a - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn growth_spacing_is_uniform_in_d1() {
        let c = config(StepSpacing::Growth);
        let cosmology = c.cosmology();
        let schedule = step_schedule(&c, &cosmology);
        let d: Vec<f64> = schedule.iter().map(|&a| cosmology.growth_d1(a)).collect();
        let step = d[1] - d[0];
        for w in d.windows(2) {
            assert!((w[1] - w[0] - step).abs() < 1e-8);
        }
    }

    #[test]
    fn cola_drift_without_forces_follows_zeldovich() {
        let mut c = config(StepSpacing::ScaleFactor);
        c.force.mesh_force = false;
        let shared = SharedContext::new(&c).unwrap();
        let mut integrator = ColaIntegrator::new(&shared, 0).unwrap();
        let mut particles = ParticleArrays::new();
        let a0 = c.initial_scale_factor();
        let d0 = shared.cosmology.growth_d1(a0);
        particles.push(Particle {
            id: 0,
            pos: [(10.0 + 0.5 * d0) as Real, 10.0, 10.0],
            za: [0.5, 0.0, 0.0],
            ..Particle::default()
        });
        integrator.kick(&mut particles, a0, 0.2, a0);
        integrator.drift(&mut particles, a0, 0.4, 0.2);
        let expected = 10.0 + 0.5 * shared.cosmology.growth_d1(0.4);
        assert!((particles.pos[0][0] as f64 - expected).abs() < 1e-12);
        assert_eq!(particles.vel[0][0], 0.0);

        integrator.finalize(&mut particles, 0.4);
        assert_eq!(integrator.phase(), Phase::Finalized);
        let v = shared.cosmology.q_factor(0.4) * shared.cosmology.growth_d1_rate(0.4) * 0.5;
        assert!((particles.vel[0][0] as f64 - v).abs() < 1e-12);
    }

    #[test]
    fn phase_tracks_the_last_operation() {
        let c = config(StepSpacing::ScaleFactor);
        let shared = SharedContext::new(&c).unwrap();
        let mut integrator = ColaIntegrator::new(&shared, 0).unwrap();
        assert_eq!(integrator.phase(), Phase::Initialized);
        let mut particles = ParticleArrays::new();
        particles.push(Particle::default());

        integrator.kick(&mut particles, 0.1, 0.15, 0.1);
        assert_eq!(integrator.phase(), Phase::Kick);
        integrator.drift(&mut particles, 0.1, 0.2, 0.15);
        assert_eq!(integrator.phase(), Phase::Drift);
        integrator.drift(&mut particles, 0.2, 0.3, 0.25);
        assert_eq!(integrator.phase(), Phase::Drift);
        integrator.finalize(&mut particles, 0.3);
        assert_eq!(integrator.phase(), Phase::Finalized);
    }

    #[test]
    fn kick_subtracts_lpt_force() {
        let c = config(StepSpacing::ScaleFactor);
        let shared = SharedContext::new(&c).unwrap();
        let mut integrator = ColaIntegrator::new(&shared, 0).unwrap();
        let ac = 0.3;
        let d1 = shared.cosmology.growth_d1(ac);
        let mut particles = ParticleArrays::new();
        particles.push(Particle {
            id: 0,
            za: [1.0, 0.0, 0.0],
            ..Particle::default()
        });
        // A PM field equal to the linear prediction leaves the residual untouched.
        particles.disp[0][0] = d1 as Real;
        integrator.kick(&mut particles, 0.25, 0.35, ac);
        assert!(particles.vel[0][0].abs() < 1e-12);
    }

    #[test]
    fn positions_wrap_after_drift() {
        let mut c = config(StepSpacing::ScaleFactor);
        c.integrator.use_cola = false;
        let shared = SharedContext::new(&c).unwrap();
        let mut integrator = ColaIntegrator::new(&shared, 0).unwrap();
        let mut particles = ParticleArrays::new();
        particles.push(Particle {
            id: 0,
            pos: [63.9, 0.05, 32.0],
            vel: [1000.0, -1000.0, 0.0],
            ..Particle::default()
        });
        integrator.drift(&mut particles, 0.5, 0.6, 0.55);
        for axis in 0..3 {
            let x = particles.pos[axis][0];
            assert!((0.0..64.0).contains(&x), "axis {} at {}", axis, x);
        }
    }
}
