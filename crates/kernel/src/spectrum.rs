//! Linear power spectrum models and sampled `(k, value)` tables.
//!
//! Wavenumbers are in inverse box length units (h/Mpc for a box in Mpc/h),
//! power in box volume units. Tables are consumed as in-memory sample arrays;
//! reading them from disk is left to the caller.

use std::f64::consts::PI;

use crate::error::KernelError;
use crate::integrate::simpson;

/// Radius of the sphere defining sigma8.
pub const SIGMA8_RADIUS: f64 = 8.0;

const SIGMA_K_MIN: f64 = 1e-5;
const SIGMA_K_MAX: f64 = 1e2;
const SIGMA_INTERVALS: usize = 4096;

/// Tabulated function of `k`, interpolated in log-log space when every
/// value is positive and linearly otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledTable {
    k: Vec<f64>,
    values: Vec<f64>,
    log: bool,
}

impl SampledTable {
    /// Build from `[k, value]` pairs. Needs at least two samples with
    /// positive, strictly increasing `k` and finite values.
    pub fn from_samples(samples: &[[f64; 2]]) -> Result<Self, KernelError> {
        if samples.len() < 2 {
            return Err(KernelError::Table(format!(
                "need at least 2 samples, got {}",
                samples.len()
            )));
        }
        for pair in samples.windows(2) {
            if pair[1][0] <= pair[0][0] {
                return Err(KernelError::Table(format!(
                    "k must increase strictly, found {} after {}",
                    pair[1][0], pair[0][0]
                )));
            }
        }
        if samples[0][0] <= 0.0 {
            return Err(KernelError::Table("k must be positive".to_string()));
        }
        if samples.iter().any(|s| !s[0].is_finite() || !s[1].is_finite()) {
            return Err(KernelError::Table("samples must be finite".to_string()));
        }
        let log = samples.iter().all(|s| s[1] > 0.0);
        let (k, values) = samples
            .iter()
            .map(|s| {
                if log {
                    (s[0].ln(), s[1].ln())
                } else {
                    (s[0].ln(), s[1])
                }
            })
            .unzip();
        Ok(Self { k, values, log })
    }

    /// Smallest and largest tabulated `k`.
    pub fn k_range(&self) -> (f64, f64) {
        (self.k[0].exp(), self.k[self.k.len() - 1].exp())
    }

    /// Interpolated value, or `None` outside the tabulated range.
    pub fn interpolate(&self, k: f64) -> Option<f64> {
        if k <= 0.0 {
            return None;
        }
        let lk = k.ln();
        let last = self.k.len() - 1;
        if lk < self.k[0] || lk > self.k[last] {
            return None;
        }
        let hi = self.k.partition_point(|&x| x < lk).clamp(1, last);
        let lo = hi - 1;
        let t = (lk - self.k[lo]) / (self.k[hi] - self.k[lo]);
        let v = self.values[lo] + t * (self.values[hi] - self.values[lo]);
        Some(if self.log { v.exp() } else { v })
    }

    /// Interpolated value, holding the end samples constant outside the range.
    pub fn interpolate_clamped(&self, k: f64) -> f64 {
        let (kmin, kmax) = self.k_range();
        self.interpolate(k.clamp(kmin, kmax)).unwrap_or(0.0)
    }
}

/// Shape of the linear matter power spectrum.
#[derive(Debug, Clone, PartialEq)]
pub enum PowerModel {
    /// Constant `P(k) = amplitude`.
    Flat {
        /// Power at every k.
        amplitude: f64,
    },
    /// Efstathiou, Bond & White (1992) fit with shape parameter Gamma.
    Efstathiou {
        /// Shape parameter Gamma.
        shape_gamma: f64,
    },
    /// Tabulated `P(k)`; zero outside the table.
    Tabulated(SampledTable),
    /// Tabulated transfer function `T(k)`, `P = k^ns T^2`; zero outside the table.
    Transfer(SampledTable),
}

/// Normalised linear power spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    model: PowerModel,
    spectral_index: f64,
    norm: f64,
}

impl PowerSpectrum {
    /// Unnormalised spectrum with primordial slope `spectral_index`.
    pub fn new(model: PowerModel, spectral_index: f64) -> Self {
        Self {
            model,
            spectral_index,
            norm: 1.0,
        }
    }

    /// Model this spectrum is built on.
    pub fn model(&self) -> &PowerModel {
        &self.model
    }

    /// Whether a transfer function is available (needed for non-Gaussian
    /// initial conditions).
    pub fn has_transfer(&self) -> bool {
        matches!(
            self.model,
            PowerModel::Efstathiou { .. } | PowerModel::Transfer(_)
        )
    }

    /// Matter transfer function, if the model has one.
    pub fn transfer(&self, k: f64) -> Option<f64> {
        match &self.model {
            PowerModel::Efstathiou { shape_gamma } => Some(efstathiou_transfer(k, *shape_gamma)),
            PowerModel::Transfer(table) => table.interpolate(k),
            PowerModel::Flat { .. } | PowerModel::Tabulated(_) => None,
        }
    }

    /// `P(k)` including the normalisation.
    pub fn power(&self, k: f64) -> f64 {
        if k <= 0.0 {
            return 0.0;
        }
        let shape = match &self.model {
            PowerModel::Flat { amplitude } => *amplitude,
            PowerModel::Tabulated(table) => table.interpolate(k).unwrap_or(0.0),
            PowerModel::Efstathiou { .. } | PowerModel::Transfer(_) => {
                let t = self.transfer(k).unwrap_or(0.0);
                k.powf(self.spectral_index) * t * t
            }
        };
        self.norm * shape
    }

    /// RMS linear overdensity in top-hat spheres of radius `r`.
    pub fn sigma(&self, r: f64) -> f64 {
        let (kmin, kmax) = match &self.model {
            PowerModel::Tabulated(t) | PowerModel::Transfer(t) => t.k_range(),
            _ => (SIGMA_K_MIN, SIGMA_K_MAX),
        };
        let integral = simpson(
            |lnk| {
                let k = lnk.exp();
                let w = top_hat_window(k * r);
                k * k * k * self.power(k) * w * w
            },
            kmin.ln(),
            kmax.ln(),
            SIGMA_INTERVALS,
        );
        (integral / (2.0 * PI * PI)).sqrt()
    }

    /// Rescale so that `sigma(8) == sigma8`.
    pub fn normalize_sigma8(&mut self, sigma8: f64) -> Result<(), KernelError> {
        let current = self.sigma(SIGMA8_RADIUS);
        if !(current > 0.0 && current.is_finite()) {
            return Err(KernelError::Table(format!(
                "cannot normalise a spectrum with sigma8 = {}",
                current
            )));
        }
        self.norm *= (sigma8 / current).powi(2);
        tracing::debug!(sigma8, norm = self.norm, "power spectrum normalised");
        Ok(())
    }
}

/// Efstathiou, Bond & White (1992) transfer function.
pub fn efstathiou_transfer(k: f64, shape_gamma: f64) -> f64 {
    let a = 6.4 / shape_gamma;
    let b = 3.0 / shape_gamma;
    let c = 1.7 / shape_gamma;
    let nu = 1.13;
    let q = a * k + (b * k).powf(1.5) + (c * k).powi(2);
    (1.0 + q.powf(nu)).powf(-1.0 / nu)
}

/// Fourier transform of a unit-volume top-hat sphere.
pub fn top_hat_window(x: f64) -> f64 {
    if x < 1e-3 {
        1.0 - x * x / 10.0
    } else {
        3.0 * (x.sin() - x * x.cos()) / (x * x * x)
    }
}
