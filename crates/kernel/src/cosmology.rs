//! Background expansion and growth factors.
//!
//! Units: `H0 = 1`, time variable is the scale factor `a`. The quantity
//! `Q(a) = a^3 E(a)` turns the comoving equations of motion into
//! `dx/da = p / Q` and `dp/da = 1.5 Omega_m (a / Q) Disp`.

use crate::integrate::simpson;

const GROWTH_INTERVALS: usize = 512;

/// Flat or curved matter + Lambda background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cosmology {
    omega_m: f64,
    omega_lambda: f64,
    d1_norm: f64,
}

impl Cosmology {
    /// Build the background for present-day density parameters. Curvature
    /// takes up `1 - Omega_m - Omega_Lambda`.
    pub fn new(omega_m: f64, omega_lambda: f64) -> Self {
        let mut c = Self {
            omega_m,
            omega_lambda,
            d1_norm: 1.0,
        };
        c.d1_norm = c.growth_unnormalised(1.0);
        c
    }

    /// Present-day matter density parameter.
    pub fn omega_m(&self) -> f64 {
        self.omega_m
    }

    /// Present-day cosmological constant density parameter.
    pub fn omega_lambda(&self) -> f64 {
        self.omega_lambda
    }

    /// Present-day curvature density parameter.
    pub fn omega_k(&self) -> f64 {
        1.0 - self.omega_m - self.omega_lambda
    }

    /// `E(a) = H(a) / H0`.
    pub fn hubble(&self, a: f64) -> f64 {
        (self.omega_m / (a * a * a) + self.omega_k() / (a * a) + self.omega_lambda).sqrt()
    }

    fn hubble_derivative(&self, a: f64) -> f64 {
        (-3.0 * self.omega_m / a.powi(4) - 2.0 * self.omega_k() / a.powi(3))
            / (2.0 * self.hubble(a))
    }

    /// `Q(a) = a^3 E(a)`.
    pub fn q_factor(&self, a: f64) -> f64 {
        a * a * a * self.hubble(a)
    }

    /// Matter density parameter at scale factor `a`.
    pub fn omega_m_at(&self, a: f64) -> f64 {
        let e = self.hubble(a);
        self.omega_m / (a * a * a * e * e)
    }

    /// `int_0^a da' / (a' E(a'))^3`, with `a' = u^2` to remove the
    /// square-root cusp at the origin.
    fn growth_integral(&self, a: f64) -> f64 {
        let (om, ok, ol) = (self.omega_m, self.omega_k(), self.omega_lambda);
        simpson(
            |u| {
                let u2 = u * u;
                2.0 * u2 * u2 * (om + ok * u2 + ol * u2 * u2 * u2).powf(-1.5)
            },
            0.0,
            a.sqrt(),
            GROWTH_INTERVALS,
        )
    }

    fn growth_unnormalised(&self, a: f64) -> f64 {
        self.hubble(a) * self.growth_integral(a)
    }

    /// Linear growth factor, `D1(1) = 1`.
    pub fn growth_d1(&self, a: f64) -> f64 {
        self.growth_unnormalised(a) / self.d1_norm
    }

    /// `dD1/da`.
    pub fn growth_d1_rate(&self, a: f64) -> f64 {
        let e = self.hubble(a);
        let ae = a * e;
        (self.hubble_derivative(a) * self.growth_integral(a) + e / (ae * ae * ae)) / self.d1_norm
    }

    /// Second-order growth factor, `D2 = -3/7 D1^2 Omega_m(a)^(-1/143)`.
    pub fn growth_d2(&self, a: f64) -> f64 {
        let d1 = self.growth_d1(a);
        -3.0 / 7.0 * d1 * d1 * self.omega_m_at(a).powf(-1.0 / 143.0)
    }

    /// `dD2/da`, using `dln D2 / dln a = 2 Omega_m(a)^(6/11)`.
    pub fn growth_d2_rate(&self, a: f64) -> f64 {
        2.0 * self.omega_m_at(a).powf(6.0 / 11.0) * self.growth_d2(a) / a
    }

    /// Logarithmic growth rate `f = dln D1 / dln a`.
    pub fn growth_rate(&self, a: f64) -> f64 {
        a * self.growth_d1_rate(a) / self.growth_d1(a)
    }
}
