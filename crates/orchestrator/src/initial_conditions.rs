//! Second-order Lagrangian perturbation theory initial conditions
//!
//! A Gaussian realisation of the linear density field is drawn in Fourier
//! space, turned into the Zel'dovich and second-order displacement fields,
//! and interpolated onto a regular particle lattice. Optionally the density
//! field is made non-Gaussian through a quadratic term in the primordial
//! potential.
//!
//! The realisation depends only on the seed and the mesh size: every
//! `(kx, ky)` column has its own random stream, seeded from a table drawn
//! once from the master seed, so any slab split produces the same modes.

use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cola_kernel::field::frequency;
use cola_kernel::poisson::{map_modes, Mode};
use cola_kernel::{
    Communicator, Complex, KernelError, Particle, ParticleArrays, Real, SampledTable, SlabFft,
    SlabField,
};

use crate::config::{LptOrder, NonGaussianConfig};
use crate::context::{SharedContext, TaskContext};
use crate::error::SimulationError;
use crate::exchange::GhostExchange;
use crate::force::sample_field;
use crate::migration::migrate;

/// `c / H0` in Mpc/h.
const HUBBLE_RADIUS: f64 = 2997.92458;

/// Exchange ids of the displacement components.
const ZA_COMPONENTS: [u8; 3] = [0, 1, 2];
const LPT_COMPONENTS: [u8; 3] = [3, 4, 5];

/// Draws the Fourier modes of a Gaussian random field.
#[derive(Debug, Clone)]
pub struct ModeGenerator {
    n: usize,
    box_size: f64,
    seeds: Vec<u64>,
    sphere_mode: bool,
}

impl ModeGenerator {
    /// Generator for an `n^3` mesh over a box of side `box_size`.
    ///
    /// With `sphere_mode` only modes with `|k|` below the Nyquist wavenumber
    /// are populated.
    pub fn new(n: usize, box_size: f64, seed: u64, sphere_mode: bool) -> Self {
        let mut master = ChaCha8Rng::seed_from_u64(seed);
        let seeds = (0..n * n).map(|_| master.gen::<u64>()).collect();
        Self {
            n,
            box_size,
            seeds,
            sphere_mode,
        }
    }

    /// `(phase, uniform)` pairs for `kz = 0..=n/2` of column `(i, j)`.
    fn column(&self, i: usize, j: usize) -> Vec<(f64, f64)> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seeds[i * self.n + j]);
        (0..=self.n / 2)
            .map(|_| {
                let phase = rng.gen::<f64>();
                let u = rng.gen::<f64>();
                (phase, u)
            })
            .collect()
    }

    /// Whether a mode carries power: not k = 0, not on a Nyquist plane and,
    /// in sphere mode, inside the Nyquist sphere.
    pub fn keeps(&self, mode: &Mode) -> bool {
        if mode.k2 == 0.0 || mode.nyquist.iter().any(|&q| q) {
            return false;
        }
        !self.sphere_mode || mode.k2.sqrt() < PI * self.n as f64 / self.box_size
    }

    /// Fill `field` with modes of variance `power(k) / V`.
    ///
    /// `power` is evaluated at `|k|` in h/Mpc. The result is Hermitian, so
    /// its inverse transform is real.
    pub fn fill<P>(&self, field: &mut SlabField, power: P) -> Result<(), KernelError>
    where
        P: Fn(f64) -> f64,
    {
        let n = self.n;
        if field.n() != n {
            return Err(KernelError::SizeMismatch {
                what: "mode grid",
                expected: n,
                actual: field.n(),
            });
        }
        let volume = self.box_size.powi(3);
        let fundamental = 2.0 * PI / self.box_size;
        let even = n % 2 == 0;
        let mut modes = vec![Complex::new(0.0, 0.0); field.local_nx() * n * n];

        for lx in 0..field.local_nx() {
            let ix = field.x_start() + lx;
            let px = (n - ix) % n;
            let kx = fundamental * frequency(ix, n) as f64;
            for iy in 0..n {
                let py = (n - iy) % n;
                let ky = fundamental * frequency(iy, n) as f64;
                let own = self.column(ix, iy);
                let partner = self.column(px, py);
                for iz in 0..n {
                    let kz = fundamental * frequency(iz, n) as f64;
                    let mode = Mode {
                        index: [ix, iy, iz],
                        k: [kx, ky, kz],
                        k2: kx * kx + ky * ky + kz * kz,
                        nyquist: [
                            even && ix == n / 2,
                            even && iy == n / 2,
                            even && iz == n / 2,
                        ],
                    };
                    if !self.keeps(&mode) {
                        continue;
                    }
                    // Only half the modes are independent; the rest are the
                    // conjugates of their partner at -k.
                    let ((phase, u), conjugate) = if iz > 0 && 2 * iz < n {
                        (own[iz], false)
                    } else if iz == 0 {
                        if (ix, iy) <= (px, py) {
                            (own[0], false)
                        } else {
                            (partner[0], true)
                        }
                    } else {
                        (partner[n - iz], true)
                    };
                    let variance = power(mode.k2.sqrt()).max(0.0) / volume;
                    let amplitude = (-variance * (1.0 - u).ln()).sqrt();
                    let angle = 2.0 * PI * phase;
                    let sign = if conjugate { -1.0 } else { 1.0 };
                    modes[field.index(lx, iy, iz)] = Complex::new(
                        (amplitude * angle.cos()) as Real,
                        (sign * amplitude * angle.sin()) as Real,
                    );
                }
            }
        }
        field.load_modes(modes)
    }
}

/// `i k_axis c / k^2`: Zel'dovich displacement along `axis`.
fn zeldovich_modes(
    delta: &SlabField,
    out: &mut SlabField,
    axis: usize,
    box_size: f64,
) -> Result<(), KernelError> {
    map_modes(delta, out, box_size, |mode, c| {
        if mode.k2 == 0.0 {
            return Complex::new(0.0, 0.0);
        }
        let f = (mode.k[axis] / mode.k2) as Real;
        Complex::new(-c.im * f, c.re * f)
    })
}

/// Second-order displacement modes along each axis, from the density modes.
///
/// The second-order potential obeys `lap phi2 = sum_{a<b} phi_aa phi_bb - phi_ab^2`
/// with `phi_ab = k_a k_b delta / k^2`; the displacement is `grad phi2`.
struct SecondOrder {
    source: SlabField,
}

impl SecondOrder {
    fn build<C: Communicator>(
        delta: &SlabField,
        work: &mut SlabField,
        fft: &mut SlabFft,
        box_size: f64,
        comm: &mut C,
    ) -> Result<Self, SimulationError> {
        type Values = Result<Vec<Real>, KernelError>;
        let mut hessian = |a: usize, b: usize, work: &mut SlabField, comm: &mut C| -> Values {
            map_modes(delta, work, box_size, |mode, c| {
                if mode.k2 == 0.0 {
                    return Complex::new(0.0, 0.0);
                }
                c * ((mode.k[a] * mode.k[b] / mode.k2) as Real)
            })?;
            fft.inverse(work, comm)?;
            work.real_values()
        };

        let xx = hessian(0, 0, work, comm)?;
        let yy = hessian(1, 1, work, comm)?;
        let zz = hessian(2, 2, work, comm)?;
        let mut source: Vec<Real> = (0..xx.len())
            .map(|i| xx[i] * yy[i] + xx[i] * zz[i] + yy[i] * zz[i])
            .collect();
        drop((xx, yy, zz));
        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let off = hessian(a, b, work, comm)?;
            for (s, v) in source.iter_mut().zip(&off) {
                *s -= v * v;
            }
        }

        let mut field = SlabField::zeroed(delta.n(), delta.x_start(), delta.local_nx())?;
        field.load_real(&source)?;
        fft.forward(&mut field, comm)?;
        Ok(Self { source: field })
    }

    /// `-i k_axis S / k^2`, with the `1/n^3` of the round trip folded in.
    fn displacement_modes(
        &self,
        out: &mut SlabField,
        axis: usize,
        box_size: f64,
    ) -> Result<(), KernelError> {
        let n = self.source.n() as f64;
        let norm = 1.0 / (n * n * n);
        map_modes(&self.source, out, box_size, |mode, s| {
            if mode.k2 == 0.0 {
                return Complex::new(0.0, 0.0);
            }
            let f = (-mode.k[axis] / mode.k2 * norm) as Real;
            Complex::new(-s.im * f, s.re * f)
        })
    }
}

/// Quadratic correction `Phi + f_NL K(k) (Phi^2 - <Phi^2>)` of a Gaussian
/// primordial potential. Without a kernel table `K = 1` (local type).
struct PrimordialCorrection {
    fnl: f64,
    kernel: Option<SampledTable>,
}

impl PrimordialCorrection {
    fn new(settings: &NonGaussianConfig) -> Result<Self, SimulationError> {
        let kernel = match &settings.kernel {
            Some(samples) => Some(SampledTable::from_samples(samples)?),
            None => None,
        };
        Ok(Self {
            fnl: settings.fnl,
            kernel,
        })
    }

    /// Replace the potential modes in `phi` by their corrected values and
    /// return the global `<Phi^2>`.
    ///
    /// The unnormalised inverse transform of `phi` is the potential on the
    /// mesh. Modes the generator leaves empty stay empty. Collective.
    fn apply<C: Communicator>(
        &self,
        phi: &mut SlabField,
        work: &mut SlabField,
        generator: &ModeGenerator,
        box_size: f64,
        fft: &mut SlabFft,
        comm: &mut C,
    ) -> Result<f64, SimulationError> {
        let gaussian: Vec<Complex<Real>> = phi.modes()?.to_vec();
        fft.inverse(phi, comm)?;
        let values = phi.real_values()?;
        let n = phi.n();
        let cells = (n * n * n) as f64;
        let local_sq: f64 = values.iter().map(|&v| (v as f64) * (v as f64)).sum();
        let mean_sq = comm.all_reduce_sum(local_sq)? / cells;
        let quadratic: Vec<Real> = values.iter().map(|&v| v * v - mean_sq as Real).collect();
        work.load_real(&quadratic)?;
        fft.forward(work, comm)?;

        let x_start = phi.x_start();
        map_modes(work, phi, box_size, |mode, q| {
            if !generator.keeps(mode) {
                return Complex::new(0.0, 0.0);
            }
            let [ix, iy, iz] = mode.index;
            let phi_k = gaussian[((ix - x_start) * n + iy) * n + iz];
            let k = mode.k2.sqrt();
            let weight = self.kernel.as_ref().map_or(1.0, |t| t.interpolate_clamped(k));
            phi_k + q * ((self.fnl * weight / cells) as Real)
        })?;
        Ok(mean_sq)
    }
}

/// Density modes with a local-type (or kernel-weighted) quadratic term in
/// the primordial potential.
fn non_gaussian_density<C: Communicator>(
    shared: &SharedContext,
    settings: &NonGaussianConfig,
    generator: &ModeGenerator,
    delta: &mut SlabField,
    work: &mut SlabField,
    fft: &mut SlabFft,
    comm: &mut C,
) -> Result<(), SimulationError> {
    let spectrum = &shared.spectrum;
    if !spectrum.has_transfer() {
        return Err(SimulationError::Configuration(
            "non-Gaussian initial conditions need a transfer function".to_string(),
        ));
    }
    let correction = PrimordialCorrection::new(settings)?;
    let cosmology = &shared.cosmology;
    let box_size = shared.config.box_size;
    let a_fnl = 1.0 / (1.0 + settings.redshift);
    let growth = a_fnl / (cosmology.omega_m() * cosmology.growth_d1(a_fnl));
    let alpha = |k: f64| {
        let t = spectrum.transfer(k).unwrap_or(0.0);
        2.0 / 3.0 * k * k * t * HUBBLE_RADIUS * HUBBLE_RADIUS * growth
    };

    generator.fill(delta, |k| {
        let a = alpha(k);
        if a > 0.0 {
            spectrum.power(k) / (a * a)
        } else {
            0.0
        }
    })?;
    let mean_sq = correction.apply(delta, work, generator, box_size, fft, comm)?;
    map_modes(delta, work, box_size, |mode, phi| {
        phi * (alpha(mode.k2.sqrt()) as Real)
    })?;
    std::mem::swap(delta, work);
    tracing::info!(
        "Non-Gaussian potential: fnl={}, z_fnl={}, <Phi^2>={:.4e}",
        correction.fnl,
        settings.redshift,
        mean_sq
    );
    Ok(())
}

/// Lay down this task's lattice particles with 2LPT displacements and
/// velocities, then migrate them to their owning slabs.
///
/// Collective: every task must call it.
pub fn generate<C: Communicator>(task: &mut TaskContext<'_, C>) -> Result<(), SimulationError> {
    let shared = task.shared;
    let config = &shared.config;
    let decomposition = &shared.decomposition;
    let rank = task.rank();
    let (n, ns) = (config.nmesh, config.nsample);
    let box_size = config.box_size;
    let (x_start, local_nx) = decomposition.slices_owned(rank);

    let mut fft = SlabFft::new(decomposition.mesh().clone(), rank);
    let mut delta = SlabField::zeroed(n, x_start, local_nx)?;
    let mut work = SlabField::zeroed(n, x_start, local_nx)?;
    let generator = ModeGenerator::new(n, box_size, config.seed, config.sphere_mode);

    match &config.non_gaussian {
        Some(settings) => non_gaussian_density(
            shared,
            settings,
            &generator,
            &mut delta,
            &mut work,
            &mut fft,
            &mut task.comm,
        )?,
        None => generator.fill(&mut delta, |k| shared.spectrum.power(k))?,
    }

    // Lattice, in grid units for interpolation.
    let (p_start, p_count) = decomposition.particle_slices_owned(rank);
    let local = p_count * ns * ns;
    if local > task.capacity {
        return Err(SimulationError::ResourceExhaustion(format!(
            "task {} needs {} lattice particles but has room for {}",
            rank, local, task.capacity
        )));
    }
    let grid = |i: usize| (i * n) as Real / ns as Real;
    let mut lattice: [Vec<Real>; 3] = Default::default();
    task.particles = ParticleArrays::with_capacity(task.capacity);
    for i in p_start..p_start + p_count {
        for j in 0..ns {
            for k in 0..ns {
                task.particles.push(Particle {
                    id: ((i * ns + j) * ns + k) as u64,
                    ..Particle::default()
                });
                lattice[0].push(grid(i));
                lattice[1].push(grid(j));
                lattice[2].push(grid(k));
            }
        }
    }
    let lattice_ref = [&lattice[0][..], &lattice[1][..], &lattice[2][..]];
    let exchange = GhostExchange::new(decomposition, rank);

    for axis in 0..3 {
        zeldovich_modes(&delta, &mut work, axis, box_size)?;
        fft.inverse(&mut work, &mut task.comm)?;
        sample_field(
            &work,
            ZA_COMPONENTS[axis],
            &exchange,
            lattice_ref,
            1.0,
            &mut task.particles.za[axis],
            &mut task.comm,
        )?;
    }
    if config.lpt_order == LptOrder::Second {
        let second = SecondOrder::build(&delta, &mut work, &mut fft, box_size, &mut task.comm)?;
        for axis in 0..3 {
            second.displacement_modes(&mut work, axis, box_size)?;
            fft.inverse(&mut work, &mut task.comm)?;
            sample_field(
                &work,
                LPT_COMPONENTS[axis],
                &exchange,
                lattice_ref,
                1.0,
                &mut task.particles.lpt[axis],
                &mut task.comm,
            )?;
        }
    }
    drop(lattice);

    let cosmology = &shared.cosmology;
    let a0 = config.initial_scale_factor();
    let (d1, d2) = (cosmology.growth_d1(a0) as Real, cosmology.growth_d2(a0) as Real);
    let q = cosmology.q_factor(a0);
    let (v1, v2) = (
        (q * cosmology.growth_d1_rate(a0)) as Real,
        (q * cosmology.growth_d2_rate(a0)) as Real,
    );
    let spacing = box_size / ns as f64;
    let mut sum_sq = [0.0f64; 2];
    let particles = &mut task.particles;
    for idx in 0..particles.len() {
        let id = particles.id[idx] as usize;
        let lattice_index = [id / (ns * ns), (id / ns) % ns, id % ns];
        for axis in 0..3 {
            let za = particles.za[axis][idx];
            let lpt = particles.lpt[axis][idx];
            let q_axis = (lattice_index[axis] as f64 * spacing) as Real;
            particles.pos[axis][idx] = decomposition.wrap(q_axis + d1 * za + d2 * lpt);
            particles.vel[axis][idx] = if config.integrator.use_cola {
                0.0
            } else {
                v1 * za + v2 * lpt
            };
            sum_sq[0] += (za as f64).powi(2);
            sum_sq[1] += (lpt as f64).powi(2);
        }
    }

    let total = config.particle_count() as f64;
    let za_rms = (task.comm.all_reduce_sum(sum_sq[0])? / total).sqrt();
    let lpt_rms = (task.comm.all_reduce_sum(sum_sq[1])? / total).sqrt();
    if rank == 0 {
        tracing::info!(
            "Initial conditions at a={:.5}: rms ZA displacement {:.4} Mpc/h (x D1 = {:.4}), rms 2LPT {:.4} Mpc/h",
            a0,
            za_rms,
            za_rms * d1 as f64,
            lpt_rms
        );
    }

    let stats = migrate(
        &mut task.particles,
        task.capacity,
        decomposition,
        &mut task.comm,
    )?;
    tracing::debug!(
        "Task {}: {} particles after initial migration ({} left the lattice slab)",
        rank,
        task.particles.len(),
        stats.sent
    );
    Ok(())
}
