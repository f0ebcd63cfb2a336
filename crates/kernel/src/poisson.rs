//! Fourier-space Poisson solve and force extraction.
//!
//! With the overdensity `delta(k)` in hand, the potential is
//! `phi(k) = -delta(k) / k^2` and the displacement field that drives the
//! particles is `-i k phi(k) = i k delta(k) / k^2`. The zero mode has no
//! force and is set to zero. Derivatives along an axis sitting on its
//! Nyquist plane are zeroed so the inverse transform stays real.
//!
//! [`ForceKernel::FiniteDifference`] replaces `k^2` by the eigenvalue of the
//! seven-point Laplacian and `k` by that of the two-point centred gradient.
//! With CIC on both ends this gives the exact force between parallel sheets
//! two or more cells apart, where the continuum kernel rings.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::field::{frequency, SlabField};
use crate::{Complex, Real};

/// Optional smoothing applied to the force field in Fourier space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Filter {
    /// No smoothing.
    #[default]
    None,
    /// Gaussian window `exp(-(k R)^2 / 2)` with `R = scale` (box units).
    Gaussian {
        /// Smoothing radius.
        scale: f64,
    },
    /// Top hat in k: modes with `k R > 1` are removed.
    SharpK {
        /// Smoothing radius.
        scale: f64,
    },
}

impl Filter {
    /// Window value at wavenumber `k`.
    pub fn window(&self, k: f64) -> f64 {
        match *self {
            Filter::None => 1.0,
            Filter::Gaussian { scale } => (-0.5 * (k * scale).powi(2)).exp(),
            Filter::SharpK { scale } => {
                if k * scale <= 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Check the smoothing scale.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Filter::None => Ok(()),
            Filter::Gaussian { scale } | Filter::SharpK { scale } => {
                if scale.is_finite() && scale > 0.0 {
                    Ok(())
                } else {
                    Err(format!("filter scale must be positive, got {}", scale))
                }
            }
        }
    }
}

/// Discretisation of the Laplacian and gradient in Fourier space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForceKernel {
    /// `i k / k^2`
    #[default]
    Spectral,
    /// `i sin(k h) / h` over `sum_a (2 sin(k_a h / 2) / h)^2`, with `h` the
    /// cell size
    FiniteDifference,
}

impl ForceKernel {
    /// Factor `g` such that the displacement along `axis` is `i g delta`.
    ///
    /// Zero for the `k = 0` mode.
    pub fn gradient_over_laplacian(&self, mode: &Mode, axis: usize, cell: f64) -> f64 {
        if mode.k2 == 0.0 {
            return 0.0;
        }
        match self {
            ForceKernel::Spectral => mode.k[axis] / mode.k2,
            ForceKernel::FiniteDifference => {
                let laplacian: f64 = mode
                    .k
                    .iter()
                    .map(|&k| (2.0 / cell * (0.5 * k * cell).sin()).powi(2))
                    .sum();
                (mode.k[axis] * cell).sin() / cell / laplacian
            }
        }
    }
}

/// Wavevector of one Fourier mode.
#[derive(Debug, Clone, Copy)]
pub struct Mode {
    /// Global grid indices `(ix, iy, iz)`.
    pub index: [usize; 3],
    /// Physical wavevector `2 pi f / L` per axis.
    pub k: [f64; 3],
    /// `|k|^2`.
    pub k2: f64,
    /// Whether the index of each axis is the Nyquist plane.
    pub nyquist: [bool; 3],
}

/// Write `f(mode, src(k))` into `dst` for every mode of the slab.
///
/// `src` must be in Fourier space. `dst` is overwritten and tagged Fourier.
pub fn map_modes<F>(
    src: &SlabField,
    dst: &mut SlabField,
    box_size: f64,
    f: F,
) -> Result<(), KernelError>
where
    F: Fn(&Mode, Complex<Real>) -> Complex<Real>,
{
    let input = src.modes()?;
    let n = src.n();
    let mut out = Vec::with_capacity(input.len());
    let fundamental = 2.0 * PI / box_size;
    let even = n % 2 == 0;
    for lx in 0..src.local_nx() {
        let ix = src.x_start() + lx;
        let kx = fundamental * frequency(ix, n) as f64;
        for iy in 0..n {
            let ky = fundamental * frequency(iy, n) as f64;
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
                out.push(f(&mode, input[src.index(lx, iy, iz)]));
            }
        }
    }
    dst.load_modes(out)
}

/// Displacement field `i k_axis delta / k^2` of a density field, or its
/// finite-difference counterpart.
///
/// `density` holds the unnormalised forward transform of the overdensity on
/// an `n^3` mesh; the `1/n^3` of the round trip is folded in here, so an
/// inverse transform of `out` yields the displacement in box units.
pub fn displacement_modes(
    density: &SlabField,
    out: &mut SlabField,
    axis: usize,
    box_size: f64,
    filter: Filter,
    kernel: ForceKernel,
) -> Result<(), KernelError> {
    let n = density.n() as f64;
    let norm = 1.0 / (n * n * n);
    let cell = box_size / n;
    map_modes(density, out, box_size, |mode, delta| {
        if mode.k2 == 0.0 || mode.nyquist[axis] {
            return Complex::new(0.0, 0.0);
        }
        let w = filter.window(mode.k2.sqrt());
        let g = kernel.gradient_over_laplacian(mode, axis, cell);
        let factor = (g * w * norm) as Real;
        // i * factor * delta
        Complex::new(-delta.im * factor, delta.re * factor)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleTask;
    use crate::fft::SlabFft;
    use crate::slab::SlabPartition;

    #[test]
    fn filter_windows() {
        assert_eq!(Filter::None.window(10.0), 1.0);
        let g = Filter::Gaussian { scale: 2.0 };
        assert!((g.window(0.5) - (-0.5_f64).exp()).abs() < 1e-12);
        let s = Filter::SharpK { scale: 2.0 };
        assert_eq!(s.window(0.5), 1.0);
        assert_eq!(s.window(0.6), 0.0);
        assert!(Filter::Gaussian { scale: 0.0 }.validate().is_err());
    }

    #[test]
    fn uniform_density_has_no_force() {
        let n = 8;
        let mut fft = SlabFft::new(SlabPartition::balanced(n, 1).unwrap(), 0);
        let mut comm = SingleTask::new();
        let mut density = SlabField::zeroed(n, 0, n).unwrap();
        density.load_real(&vec![1.0; n * n * n]).unwrap();
        fft.forward(&mut density, &mut comm).unwrap();

        let mut force = SlabField::zeroed(n, 0, n).unwrap();
        for axis in 0..3 {
            displacement_modes(
                &density,
                &mut force,
                axis,
                100.0,
                Filter::None,
                ForceKernel::Spectral,
            )
            .unwrap();
            fft.inverse(&mut force, &mut comm).unwrap();
            let max = force
                .real_values()
                .unwrap()
                .iter()
                .fold(0.0 as Real, |m, v| m.max(v.abs()));
            assert!(max < 1e-10, "axis {} force {}", axis, max);
        }
    }

    #[test]
    fn plane_wave_displacement_matches_analytic() {
        // delta = A cos(k x) pulls matter towards x = 0: displacement -A sin(k x) / k.
        let n = 16;
        let box_size = 50.0;
        let amp = 0.1;
        let k = 2.0 * PI / box_size;
        let mut values = vec![0.0; n * n * n];
        for x in 0..n {
            let xp = x as f64 * box_size / n as f64;
            for yz in 0..n * n {
                values[x * n * n + yz] = (amp * (k * xp).cos()) as Real;
            }
        }
        let mut fft = SlabFft::new(SlabPartition::balanced(n, 1).unwrap(), 0);
        let mut comm = SingleTask::new();
        let mut density = SlabField::zeroed(n, 0, n).unwrap();
        density.load_real(&values).unwrap();
        fft.forward(&mut density, &mut comm).unwrap();

        let mut disp = SlabField::zeroed(n, 0, n).unwrap();
        displacement_modes(&density, &mut disp, 0, box_size, Filter::None, ForceKernel::Spectral)
            .unwrap();
        fft.inverse(&mut disp, &mut comm).unwrap();
        for x in 0..n {
            let xp = x as f64 * box_size / n as f64;
            let expected = -amp * (k * xp).sin() / k;
            let got = disp.real_at(x, 3, 5).unwrap() as f64;
            assert!((got - expected).abs() < 1e-6, "x={} got {} expected {}", x, got, expected);
        }
    }

    fn mode(k: [f64; 3]) -> Mode {
        Mode {
            index: [0; 3],
            k,
            k2: k.iter().map(|v| v * v).sum(),
            nyquist: [false; 3],
        }
    }

    #[test]
    fn finite_difference_kernel_tends_to_continuum() {
        let cell = 0.5;
        let small = mode([1e-3, 2e-3, -1e-3]);
        for axis in 0..3 {
            let spectral = ForceKernel::Spectral.gradient_over_laplacian(&small, axis, cell);
            let discrete = ForceKernel::FiniteDifference.gradient_over_laplacian(&small, axis, cell);
            assert!((discrete / spectral - 1.0).abs() < 1e-6);
        }
        assert_eq!(
            ForceKernel::FiniteDifference.gradient_over_laplacian(&mode([0.0; 3]), 0, cell),
            0.0
        );
    }

    #[test]
    fn finite_difference_gradient_vanishes_at_nyquist() {
        let cell = 2.0;
        let nyquist = PI / cell;
        let g = ForceKernel::FiniteDifference.gradient_over_laplacian(
            &mode([nyquist, 0.3, 0.0]),
            0,
            cell,
        );
        assert!(g.abs() < 1e-15, "{}", g);
        // (h / 2) cot(k h / 2) for a wave along x alone.
        let kx = 2.0 * PI / (8.0 * cell);
        let g = ForceKernel::FiniteDifference.gradient_over_laplacian(&mode([kx, 0.0, 0.0]), 0, cell);
        let expected = (kx * cell).sin() / cell / (2.0 / cell * (0.5 * kx * cell).sin()).powi(2);
        assert!((g - expected).abs() < 1e-14);
        assert!(g < 1.0 / kx, "discrete gradient over Laplacian {} vs {}", g, 1.0 / kx);
    }
}
