//! Kernel error type.

use thiserror::Error;

use crate::comm::CommError;
use crate::field::Representation;

/// Errors raised by per-task compute routines.
#[derive(Debug, Error)]
pub enum KernelError {
    /// A grid was read in the wrong representation.
    #[error("{operation}: field holds {found:?} data, expected {expected:?}")]
    Representation {
        /// Operation that attempted the read.
        operation: &'static str,
        /// Representation the operation needs.
        expected: Representation,
        /// Representation the field is actually in.
        found: Representation,
    },

    /// The slab partition cannot be built for the requested sizes.
    #[error("cannot split {planes} planes over {tasks} tasks")]
    Partition {
        /// Number of planes along the decomposed axis.
        planes: usize,
        /// Number of tasks requested.
        tasks: usize,
    },

    /// A particle is not inside the slab of the task depositing or sampling it.
    #[error("coordinate {coordinate} maps to plane {plane}, outside local planes [{start}, {end})")]
    OutsideSlab {
        /// Particle x coordinate in grid units.
        coordinate: f64,
        /// Global plane index the coordinate falls in.
        plane: usize,
        /// First locally owned plane.
        start: usize,
        /// One past the last locally owned plane.
        end: usize,
    },

    /// Two buffers that must agree in size do not.
    #[error("{what}: expected {expected} values, got {actual}")]
    SizeMismatch {
        /// Which buffer.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// A sampled `(k, value)` table is unusable.
    #[error("invalid sample table: {0}")]
    Table(String),

    /// Grid storage could not be allocated.
    #[error("cannot allocate {values} grid values")]
    Allocation {
        /// Number of complex values requested.
        values: usize,
    },

    /// Message passing failed.
    #[error(transparent)]
    Comm(#[from] CommError),
}
