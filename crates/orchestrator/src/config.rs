//! Configuration parsing and validation for COLA simulations

use cola_kernel::{
    Cosmology, Filter, ForceKernel, PowerModel, PowerSpectrum, SampledTable, TimeKernels,
    TimeStepping, VelocityKernel,
};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::SimulationError;

/// Main simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name
    pub name: String,
    /// FFT mesh cells per dimension
    pub nmesh: usize,
    /// Particles per dimension of the initial lattice
    pub nsample: usize,
    /// Comoving box side (Mpc/h)
    pub box_size: f64,
    /// Number of tasks (threads) to split the box over
    #[serde(default = "default_tasks")]
    pub tasks: usize,
    /// Particle buffer size as a multiple of the nominal per-task particle count
    #[serde(default = "default_buffer")]
    pub buffer: f64,
    /// Master random seed of the initial conditions
    pub seed: u64,
    /// Only excite modes inside the Nyquist sphere instead of the whole cube
    #[serde(default)]
    pub sphere_mode: bool,
    /// Redshift of the initial conditions
    pub init_redshift: f64,
    /// Redshift at which the run stops
    #[serde(default)]
    pub final_redshift: f64,
    /// Number of leapfrog steps
    pub nsteps: usize,
    /// Background cosmology
    pub cosmology: CosmologyConfig,
    /// Linear power spectrum at z = 0
    pub spectrum: SpectrumConfig,
    /// Primordial non-Gaussianity; Gaussian initial conditions when absent
    #[serde(default)]
    pub non_gaussian: Option<NonGaussianConfig>,
    /// Time integration options
    #[serde(default)]
    pub integrator: IntegratorConfig,
    /// PM force options
    #[serde(default)]
    pub force: ForceConfig,
    /// Order of the Lagrangian perturbation theory used for the initial conditions
    #[serde(default)]
    pub lpt_order: LptOrder,
}

/// Background cosmology parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosmologyConfig {
    /// Matter density parameter today
    pub omega_m: f64,
    /// Cosmological constant density parameter today
    #[serde(default = "default_omega_lambda")]
    pub omega_lambda: f64,
    /// Baryon density parameter today (only used to derive the spectrum shape)
    #[serde(default = "default_omega_baryon")]
    pub omega_baryon: f64,
    /// Dimensionless Hubble parameter h (only used to derive the spectrum shape)
    #[serde(default = "default_hubble")]
    pub hubble: f64,
    /// Normalise the spectrum to this sigma8; used as given when absent
    #[serde(default)]
    pub sigma8: Option<f64>,
    /// Primordial spectral index n_s
    #[serde(default = "default_spectral_index")]
    pub spectral_index: f64,
}

/// Source of the linear power spectrum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SpectrumConfig {
    /// Constant P(k)
    Flat {
        /// Power (Mpc/h)^3
        amplitude: f64,
    },
    /// Efstathiou, Bond & White fit
    Efstathiou {
        /// Shape parameter Gamma; derived from the cosmology when absent
        #[serde(default)]
        shape_gamma: Option<f64>,
    },
    /// Tabulated P(k) samples `[k, P]`
    Tabulated {
        /// Samples with strictly increasing k
        samples: Vec<[f64; 2]>,
    },
    /// Tabulated transfer function samples `[k, T]`
    Transfer {
        /// Samples with strictly increasing k
        samples: Vec<[f64; 2]>,
    },
}

/// Local or kernel-weighted primordial non-Gaussianity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonGaussianConfig {
    /// Amplitude f_NL
    pub fnl: f64,
    /// Redshift at which the primordial potential is defined
    #[serde(default = "default_fnl_redshift")]
    pub redshift: f64,
    /// Optional Fourier-space kernel `[k, K(k)]` applied to the quadratic term
    #[serde(default)]
    pub kernel: Option<Vec<[f64; 2]>>,
}

/// Spacing of the leapfrog step boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepSpacing {
    /// Uniform in the scale factor
    #[default]
    ScaleFactor,
    /// Uniform in 1 + z
    Redshift,
    /// Uniform in the linear growth factor
    Growth,
}

/// Time integration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratorConfig {
    /// Integrate residuals relative to the 2LPT trajectory
    #[serde(default = "default_true")]
    pub use_cola: bool,
    /// Kick/drift kernel family
    #[serde(default)]
    pub time_stepping: TimeStepping,
    /// Drift kernel variant of the COLA stepping
    #[serde(default)]
    pub velocity_kernel: VelocityKernel,
    /// Exponent of the assumed residual momentum evolution T(a) = a^nLPT
    #[serde(default = "default_n_lpt")]
    pub n_lpt: f64,
    /// Placement of step boundaries
    #[serde(default)]
    pub step_spacing: StepSpacing,
}

/// PM force options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceConfig {
    /// Compute PM forces; when false particles follow their LPT trajectory
    #[serde(default = "default_true")]
    pub mesh_force: bool,
    /// Smoothing of the force field
    #[serde(default)]
    pub filter: Filter,
    /// Fourier-space Laplacian and gradient
    #[serde(default)]
    pub kernel: ForceKernel,
}

/// Order of the initial displacement field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LptOrder {
    /// Zel'dovich approximation only
    First,
    /// Zel'dovich plus second-order displacement
    #[default]
    Second,
}

// Default values
fn default_tasks() -> usize {
    1
}

fn default_buffer() -> f64 {
    1.25
}

fn default_omega_lambda() -> f64 {
    0.7
}

fn default_omega_baryon() -> f64 {
    0.045
}

fn default_hubble() -> f64 {
    0.7
}

fn default_spectral_index() -> f64 {
    1.0
}

fn default_fnl_redshift() -> f64 {
    49.0
}

fn default_true() -> bool {
    true
}

fn default_n_lpt() -> f64 {
    -2.5
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            use_cola: true,
            time_stepping: TimeStepping::default(),
            velocity_kernel: VelocityKernel::default(),
            n_lpt: default_n_lpt(),
            step_spacing: StepSpacing::default(),
        }
    }
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            mesh_force: true,
            filter: Filter::None,
            kernel: ForceKernel::Spectral,
        }
    }
}

impl Default for CosmologyConfig {
    fn default() -> Self {
        Self {
            omega_m: 0.3,
            omega_lambda: default_omega_lambda(),
            omega_baryon: default_omega_baryon(),
            hubble: default_hubble(),
            sigma8: Some(0.8),
            spectral_index: default_spectral_index(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: "cola".to_string(),
            nmesh: 32,
            nsample: 32,
            box_size: 100.0,
            tasks: default_tasks(),
            buffer: default_buffer(),
            seed: 5001,
            sphere_mode: false,
            init_redshift: 9.0,
            final_redshift: 0.0,
            nsteps: 10,
            cosmology: CosmologyConfig::default(),
            spectrum: SpectrumConfig::Efstathiou { shape_gamma: None },
            non_gaussian: None,
            integrator: IntegratorConfig::default(),
            force: ForceConfig::default(),
            lpt_order: LptOrder::default(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> SimulationError {
    SimulationError::Configuration(msg.into())
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, SimulationError> {
        let contents = fs::read_to_string(path).map_err(|source| SimulationError::Io {
            path: path.to_string(),
            source,
        })?;

        let config: SimulationConfig = serde_json::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), SimulationError> {
        // Grid and decomposition
        if self.nmesh < 2 {
            return Err(invalid("nmesh must be at least 2"));
        }
        if self.nsample == 0 {
            return Err(invalid("nsample must be at least 1"));
        }
        if !(self.box_size.is_finite() && self.box_size > 0.0) {
            return Err(invalid("box_size must be positive"));
        }
        if self.tasks == 0 {
            return Err(invalid("tasks must be at least 1"));
        }
        if self.tasks > self.nmesh {
            return Err(invalid(format!(
                "{} tasks cannot share {} mesh planes: every task needs at least one",
                self.tasks, self.nmesh
            )));
        }
        if !(self.buffer >= 1.0) {
            return Err(invalid("buffer must be at least 1.0"));
        }

        // Time range
        if self.nsteps == 0 {
            return Err(invalid("nsteps must be at least 1"));
        }
        if !(self.final_redshift > -1.0) {
            return Err(invalid("final_redshift must be greater than -1"));
        }
        if !(self.init_redshift > self.final_redshift) {
            return Err(invalid("init_redshift must be greater than final_redshift"));
        }

        self.validate_cosmology()?;
        self.validate_spectrum()?;

        // Integrator
        if self.integrator.time_stepping == TimeStepping::Cola
            && (self.integrator.n_lpt == 0.0 || !self.integrator.n_lpt.is_finite())
        {
            return Err(invalid("n_lpt must be finite and non-zero for COLA time stepping"));
        }
        self.force.filter.validate().map_err(invalid)?;

        Ok(())
    }

    fn validate_cosmology(&self) -> Result<(), SimulationError> {
        let c = &self.cosmology;
        if !(c.omega_m > 0.0) {
            return Err(invalid("omega_m must be positive"));
        }
        if !(c.omega_lambda >= 0.0) {
            return Err(invalid("omega_lambda must be non-negative"));
        }
        if !(c.omega_baryon >= 0.0 && c.omega_baryon <= c.omega_m) {
            return Err(invalid("omega_baryon must lie in [0, omega_m]"));
        }
        if !(c.hubble > 0.0) {
            return Err(invalid("hubble must be positive"));
        }
        if let Some(s8) = c.sigma8 {
            if !(s8 > 0.0) {
                return Err(invalid("sigma8 must be positive"));
            }
        }
        let cosmology = self.cosmology();
        let a0 = self.initial_scale_factor();
        let e2 = cosmology.hubble(a0).powi(2);
        if !(e2 > 0.0) {
            return Err(invalid("expansion rate vanishes inside the simulated time range"));
        }
        Ok(())
    }

    fn validate_spectrum(&self) -> Result<(), SimulationError> {
        match &self.spectrum {
            SpectrumConfig::Flat { amplitude } => {
                if !(*amplitude >= 0.0) {
                    return Err(invalid("flat spectrum amplitude must be non-negative"));
                }
            }
            SpectrumConfig::Efstathiou { shape_gamma } => {
                if let Some(g) = shape_gamma {
                    if !(*g > 0.0) {
                        return Err(invalid("shape_gamma must be positive"));
                    }
                }
            }
            SpectrumConfig::Tabulated { samples } | SpectrumConfig::Transfer { samples } => {
                SampledTable::from_samples(samples).map_err(|e| invalid(e.to_string()))?;
            }
        }

        if let Some(ng) = &self.non_gaussian {
            if !ng.fnl.is_finite() {
                return Err(invalid("fnl must be finite"));
            }
            if !(ng.redshift > self.init_redshift) {
                return Err(invalid(
                    "non-Gaussian potential redshift must precede the initial redshift",
                ));
            }
            if !matches!(
                self.spectrum,
                SpectrumConfig::Efstathiou { .. } | SpectrumConfig::Transfer { .. }
            ) {
                return Err(invalid(
                    "non-Gaussian initial conditions need a transfer function (Efstathiou or Transfer spectrum)",
                ));
            }
            if let Some(kernel) = &ng.kernel {
                SampledTable::from_samples(kernel)
                    .map_err(|e| invalid(format!("non-Gaussian kernel: {}", e)))?;
            }
        }
        Ok(())
    }

    /// Scale factor of the initial conditions
    pub fn initial_scale_factor(&self) -> f64 {
        1.0 / (1.0 + self.init_redshift)
    }

    /// Scale factor at the end of the run
    pub fn final_scale_factor(&self) -> f64 {
        1.0 / (1.0 + self.final_redshift)
    }

    /// Background cosmology
    pub fn cosmology(&self) -> Cosmology {
        Cosmology::new(self.cosmology.omega_m, self.cosmology.omega_lambda)
    }

    /// Kick/drift kernels for the configured stepping
    pub fn time_kernels(&self) -> TimeKernels {
        TimeKernels::new(
            self.cosmology(),
            self.integrator.time_stepping,
            self.integrator.velocity_kernel,
            self.integrator.n_lpt,
        )
    }

    /// Efstathiou shape parameter from Sugiyama (1995):
    /// `Gamma = Omega_m h exp(-Omega_b (1 + sqrt(2 h) / Omega_m))`.
    pub fn derived_shape_gamma(&self) -> f64 {
        let c = &self.cosmology;
        c.omega_m * c.hubble * (-c.omega_baryon * (1.0 + (2.0 * c.hubble).sqrt() / c.omega_m)).exp()
    }

    /// Linear power spectrum at z = 0, normalised to sigma8 when requested
    pub fn power_spectrum(&self) -> Result<PowerSpectrum, SimulationError> {
        let model = match &self.spectrum {
            SpectrumConfig::Flat { amplitude } => PowerModel::Flat {
                amplitude: *amplitude,
            },
            SpectrumConfig::Efstathiou { shape_gamma } => PowerModel::Efstathiou {
                shape_gamma: shape_gamma.unwrap_or_else(|| self.derived_shape_gamma()),
            },
            SpectrumConfig::Tabulated { samples } => PowerModel::Tabulated(
                SampledTable::from_samples(samples).map_err(|e| invalid(e.to_string()))?,
            ),
            SpectrumConfig::Transfer { samples } => PowerModel::Transfer(
                SampledTable::from_samples(samples).map_err(|e| invalid(e.to_string()))?,
            ),
        };
        let mut spectrum = PowerSpectrum::new(model, self.cosmology.spectral_index);
        if let Some(s8) = self.cosmology.sigma8 {
            spectrum
                .normalize_sigma8(s8)
                .map_err(|e| invalid(e.to_string()))?;
        }
        Ok(spectrum)
    }

    /// Total number of particles
    pub fn particle_count(&self) -> u64 {
        (self.nsample as u64).pow(3)
    }

    /// Mass per particle in units of the mean mass per mesh cell
    pub fn particle_mass(&self) -> f64 {
        (self.nmesh as f64 / self.nsample as f64).powi(3)
    }
}
