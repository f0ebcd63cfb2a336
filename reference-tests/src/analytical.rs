//! Analytical reference solutions for COLA validation.
//!
//! Provides closed-form solutions against which simulated particles can be
//! compared for quantitative accuracy assessment.

use cola_kernel::{Cosmology, Particle, ParticleArrays, Real};

/// Zel'dovich pancake: a single plane wave along x.
///
/// For a one-dimensional perturbation the Zel'dovich approximation is the
/// exact solution of the collisionless equations until shells cross:
///
/// ```text
/// x(q, a) = q + D1(a) A sin(k q),    k = 2 pi / L
/// p(q, a) = Q(a) D1'(a) A sin(k q)
/// ```
///
/// where:
/// - `q` is the Lagrangian coordinate along x
/// - `A` is the displacement amplitude at `D1 = 1`
/// - `Q(a) = a^3 E(a)` converts `dx/da` into canonical momentum
///
/// Shells first cross at `q = L/2` once `D1 A k = 1`.
#[derive(Debug, Clone, Copy)]
pub struct PlaneWave {
    /// Periodic box side L (Mpc/h)
    pub box_size: f64,
    /// Displacement amplitude A at unit growth (Mpc/h)
    pub amplitude: f64,
}

impl PlaneWave {
    /// Create a plane wave with an explicit amplitude.
    pub fn new(box_size: f64, amplitude: f64) -> Self {
        Self {
            box_size,
            amplitude,
        }
    }

    /// Create a plane wave that has reached `fraction` of shell crossing at
    /// `D1 = 1`.
    pub fn with_crossing_fraction(box_size: f64, fraction: f64) -> Self {
        let k = 2.0 * std::f64::consts::PI / box_size;
        Self::new(box_size, fraction / k)
    }

    /// Wavenumber of the fundamental mode
    pub fn wavenumber(&self) -> f64 {
        2.0 * std::f64::consts::PI / self.box_size
    }

    /// Growth factor at which shells first cross
    pub fn crossing_growth(&self) -> f64 {
        1.0 / (self.amplitude * self.wavenumber())
    }

    /// Displacement at unit growth for Lagrangian coordinate `q`
    pub fn displacement(&self, q: f64) -> f64 {
        self.amplitude * (self.wavenumber() * q).sin()
    }

    /// Eulerian x coordinate for growth `d1`, wrapped into the box
    pub fn position(&self, q: f64, d1: f64) -> f64 {
        (q + d1 * self.displacement(q)).rem_euclid(self.box_size)
    }

    /// Canonical momentum along x at scale factor `a`
    pub fn momentum(&self, q: f64, cosmology: &Cosmology, a: f64) -> f64 {
        cosmology.q_factor(a) * cosmology.growth_d1_rate(a) * self.displacement(q)
    }

    /// Lattice particles displaced to scale factor `a`.
    ///
    /// With `cola` the stored momentum is the residual relative to the
    /// Zel'dovich trajectory, which vanishes; otherwise it is the full
    /// Zel'dovich momentum.
    pub fn particles(&self, nsample: usize, cosmology: &Cosmology, a: f64, cola: bool) -> ParticleArrays {
        let d1 = cosmology.growth_d1(a);
        let mut particles = ParticleArrays::with_capacity(nsample.pow(3));
        for id in 0..(nsample as u64).pow(3) {
            let q = lattice_position(id, nsample, self.box_size);
            let vel = if cola { 0.0 } else { self.momentum(q[0], cosmology, a) };
            particles.push(Particle {
                id,
                pos: [self.position(q[0], d1) as Real, q[1] as Real, q[2] as Real],
                vel: [vel as Real, 0.0, 0.0],
                za: [self.displacement(q[0]) as Real, 0.0, 0.0],
                lpt: [0.0; 3],
            });
        }
        particles
    }
}

/// Lagrangian position of the lattice particle with id `(i ns + j) ns + k`.
pub fn lattice_position(id: u64, nsample: usize, box_size: f64) -> [f64; 3] {
    let ns = nsample as u64;
    let spacing = box_size / nsample as f64;
    [
        (id / (ns * ns)) as f64 * spacing,
        ((id / ns) % ns) as f64 * spacing,
        (id % ns) as f64 * spacing,
    ]
}

/// Shortest signed offset `x - q` in a periodic box of side `box_size`.
pub fn periodic_offset(x: f64, q: f64, box_size: f64) -> f64 {
    let d = (x - q).rem_euclid(box_size);
    if d >= 0.5 * box_size {
        d - box_size
    } else {
        d
    }
}

/// Linear growth factor in Einstein-de Sitter, normalised to `D1(1) = 1`
pub fn eds_growth_d1(a: f64) -> f64 {
    a
}

/// Second-order growth factor in Einstein-de Sitter
pub fn eds_growth_d2(a: f64) -> f64 {
    -3.0 / 7.0 * a * a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crossing_fraction() {
        let wave = PlaneWave::with_crossing_fraction(64.0, 0.5);
        assert!((wave.crossing_growth() - 2.0).abs() < 1e-12);
        assert!((wave.displacement(16.0) - wave.amplitude).abs() < 1e-12);
        assert!(wave.displacement(32.0).abs() < 1e-12);
    }

    #[test]
    fn test_eds_growth_matches_cosmology() {
        let eds = Cosmology::new(1.0, 0.0);
        for &a in &[0.02, 0.1, 0.5, 1.0] {
            let d1 = eds.growth_d1(a);
            assert!((d1 - eds_growth_d1(a)).abs() < 1e-6 * a, "D1({}) = {}", a, d1);
            let d2 = eds.growth_d2(a);
            assert!((d2 - eds_growth_d2(a)).abs() < 1e-5 * a * a, "D2({}) = {}", a, d2);
        }
    }

    #[test]
    fn test_periodic_offset() {
        assert_eq!(periodic_offset(1.0, 63.0, 64.0), 2.0);
        assert_eq!(periodic_offset(63.0, 1.0, 64.0), -2.0);
        assert_eq!(periodic_offset(10.0, 4.0, 64.0), 6.0);
    }

    #[test]
    fn test_particles_start_on_the_wave() {
        let eds = Cosmology::new(1.0, 0.0);
        let wave = PlaneWave::with_crossing_fraction(16.0, 0.5);
        let particles = wave.particles(4, &eds, 0.5, false);
        assert_eq!(particles.len(), 64);
        for i in 0..particles.len() {
            let q = lattice_position(particles.id[i], 4, 16.0);
            let expected = wave.position(q[0], eds.growth_d1(0.5));
            assert!((particles.pos[0][i] as f64 - expected).abs() < 1e-5);
            assert_eq!(particles.pos[1][i] as f64, q[1]);
            let p = wave.momentum(q[0], &eds, 0.5);
            assert!((particles.vel[0][i] as f64 - p).abs() < 1e-5 * p.abs().max(1.0));
        }
    }
}
