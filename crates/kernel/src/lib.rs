//! COLA Particle-Mesh Kernel
//!
//! This crate provides the per-task compute kernel for a slab-decomposed
//! particle-mesh (PM) N-body code using COLA time integration. Everything in
//! here runs inside a single task; the only way out of a task is the
//! [`Communicator`] trait.
//!
//! # Modules
//! - [`particle`] -- Struct-of-arrays particle storage and the `Particle` transit record.
//! - [`slab`] -- Contiguous x-plane partition tables.
//! - [`field`] -- Slab grid buffers tagged with their current representation.
//! - [`fft`] -- Distributed 3D FFT over x-slabs (transpose based).
//! - [`cic`] -- Cloud-in-cell deposit and interpolation with a one-plane ghost layer.
//! - [`poisson`] -- Fourier-space Poisson solve and force extraction.
//! - [`cosmology`] -- Background expansion and linear/second-order growth factors.
//! - [`cola`] -- Kick and drift time kernels for the COLA and standard leapfrog.
//! - [`spectrum`] -- Power spectrum models, sampled tables and sigma8 normalisation.
//! - [`comm`] -- Message-passing seam between tasks.

#![warn(missing_docs)]

pub mod cic;
pub mod cola;
pub mod comm;
pub mod cosmology;
pub mod error;
pub mod fft;
pub mod field;
pub mod integrate;
pub mod particle;
pub mod poisson;
pub mod slab;
pub mod spectrum;

pub use cola::{TimeKernels, TimeStepping, VelocityKernel};
pub use comm::{CommError, Communicator, SingleTask, Tag};
pub use cosmology::Cosmology;
pub use error::KernelError;
pub use fft::SlabFft;
pub use field::{Representation, SlabField};
pub use particle::{Particle, ParticleArrays};
pub use poisson::{Filter, ForceKernel};
pub use slab::SlabPartition;
pub use spectrum::{PowerModel, PowerSpectrum, SampledTable};

pub use rustfft::num_complex::Complex;

/// Floating point type used for particle and grid storage.
#[cfg(not(feature = "single-precision"))]
pub type Real = f64;

/// Floating point type used for particle and grid storage.
#[cfg(feature = "single-precision")]
pub type Real = f32;
