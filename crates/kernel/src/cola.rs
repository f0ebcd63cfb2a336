//! Kick and drift time kernels.
//!
//! A kick over `[ai, af]` with the force evaluated at `ac` is
//! `p += 1.5 Omega_m * kick(ai, af, ac) * acceleration`; a drift over
//! `[ai, af]` with the momentum taken at `ac` is `x += drift(ai, af, ac) * p`.
//! The COLA kernels assume the residual momentum evolves like
//! `T(a) = a^nLPT` across a step instead of staying constant.

use serde::{Deserialize, Serialize};

use crate::cosmology::Cosmology;
use crate::integrate::simpson;

const KERNEL_INTERVALS: usize = 64;

/// Which family of time kernels the leapfrog uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeStepping {
    /// Modified kernels built on `T(a) = a^nLPT`.
    #[default]
    Cola,
    /// Midpoint rule in `a`.
    Standard,
    /// Exact integrals of `a/Q` and `1/Q` (Quinn et al. 1997).
    Quinn,
}

/// Drift kernel variant used together with [`TimeStepping::Cola`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VelocityKernel {
    /// Residual momentum follows `T(a)` during the drift.
    #[default]
    Full,
    /// Residual momentum frozen during the drift.
    Frozen,
}

/// Kernel factory bound to a background cosmology.
#[derive(Debug, Clone, Copy)]
pub struct TimeKernels {
    cosmology: Cosmology,
    stepping: TimeStepping,
    velocity: VelocityKernel,
    n_lpt: f64,
}

impl TimeKernels {
    /// `n_lpt` must be non-zero when `stepping` is [`TimeStepping::Cola`].
    pub fn new(
        cosmology: Cosmology,
        stepping: TimeStepping,
        velocity: VelocityKernel,
        n_lpt: f64,
    ) -> Self {
        Self {
            cosmology,
            stepping,
            velocity,
            n_lpt,
        }
    }

    fn t(&self, a: f64) -> f64 {
        a.powf(self.n_lpt)
    }

    fn t_derivative(&self, a: f64) -> f64 {
        self.n_lpt * a.powf(self.n_lpt - 1.0)
    }

    /// Momentum kick factor, force evaluated at `ac`.
    pub fn kick(&self, ai: f64, af: f64, ac: f64) -> f64 {
        let c = &self.cosmology;
        match self.stepping {
            TimeStepping::Cola => {
                (self.t(af) - self.t(ai)) * ac / (c.q_factor(ac) * self.t_derivative(ac))
            }
            TimeStepping::Standard => (af - ai) * ac / c.q_factor(ac),
            TimeStepping::Quinn => simpson(|a| a / c.q_factor(a), ai, af, KERNEL_INTERVALS),
        }
    }

    /// Position drift factor, momentum taken at `ac`.
    pub fn drift(&self, ai: f64, af: f64, ac: f64) -> f64 {
        let c = &self.cosmology;
        match (self.stepping, self.velocity) {
            (TimeStepping::Cola, VelocityKernel::Full) => {
                simpson(|a| self.t(a) / c.q_factor(a), ai, af, KERNEL_INTERVALS) / self.t(ac)
            }
            (TimeStepping::Cola, VelocityKernel::Frozen) | (TimeStepping::Quinn, _) => {
                simpson(|a| 1.0 / c.q_factor(a), ai, af, KERNEL_INTERVALS)
            }
            (TimeStepping::Standard, _) => (af - ai) / c.q_factor(ac),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernels(stepping: TimeStepping, velocity: VelocityKernel) -> TimeKernels {
        TimeKernels::new(Cosmology::new(0.3, 0.7), stepping, velocity, -2.5)
    }

    #[test]
    fn all_kernels_agree_for_small_steps() {
        let (ai, af) = (0.5, 0.5001);
        let ac = 0.5 * (ai + af);
        let reference = kernels(TimeStepping::Standard, VelocityKernel::Full);
        for stepping in [TimeStepping::Cola, TimeStepping::Quinn] {
            for velocity in [VelocityKernel::Full, VelocityKernel::Frozen] {
                let k = kernels(stepping, velocity);
                let rel_kick = (k.kick(ai, af, ac) / reference.kick(ai, af, ac) - 1.0).abs();
                let rel_drift = (k.drift(ai, af, ac) / reference.drift(ai, af, ac) - 1.0).abs();
                assert!(rel_kick < 1e-6, "{:?} kick differs by {}", stepping, rel_kick);
                assert!(rel_drift < 1e-6, "{:?}/{:?} drift differs by {}", stepping, velocity, rel_drift);
            }
        }
    }

    #[test]
    fn quinn_kick_in_eds() {
        // Q = a^{3/2}: int a / Q da = 2 (sqrt(af) - sqrt(ai)).
        let k = TimeKernels::new(
            Cosmology::new(1.0, 0.0),
            TimeStepping::Quinn,
            VelocityKernel::Full,
            -2.5,
        );
        let expected = 2.0 * (0.9_f64.sqrt() - 0.4_f64.sqrt());
        assert!((k.kick(0.4, 0.9, 0.6) - expected).abs() < 1e-8);
    }

    #[test]
    fn cola_drift_differs_for_large_steps() {
        let full = kernels(TimeStepping::Cola, VelocityKernel::Full);
        let frozen = kernels(TimeStepping::Cola, VelocityKernel::Frozen);
        let (ai, af) = (0.1, 0.5);
        let ac = 0.3;
        assert!((full.drift(ai, af, ac) - frozen.drift(ai, af, ac)).abs() > 1e-3);
    }
}
