//! Ghost plane exchange between neighbouring slabs
//!
//! Deposits spill one plane past the slab, and interpolation reads one plane
//! past it, always on the high-x side. Two protocols cover both cases:
//!
//! - accumulate: the ghost plane goes to the right neighbour, which adds it
//!   into its first owned plane;
//! - fetch: the first owned plane goes to the left neighbour, which copies it
//!   into its ghost plane. The owner's values are never modified.
//!
//! Starting an exchange consumes the slab and returns a [`PendingExchange`];
//! the slab only comes back from [`PendingExchange::wait`], so nothing can
//! read it before the ghost data has landed.

use cola_kernel::cic::GhostedSlab;
use cola_kernel::{Communicator, KernelError, Real, Tag};

use crate::domain::Decomposition;
use crate::error::SimulationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Accumulate,
    Fetch,
}

/// Neighbour pair of one task.
#[derive(Debug, Clone, Copy)]
pub struct GhostExchange {
    left: usize,
    right: usize,
}

impl GhostExchange {
    /// Neighbours of `rank` in the periodic slab ring.
    pub fn new(decomposition: &Decomposition, rank: usize) -> Self {
        Self {
            left: decomposition.left_neighbor(rank),
            right: decomposition.right_neighbor(rank),
        }
    }

    /// Ship the ghost plane of deposited mass to the right neighbour.
    pub fn start_accumulate<C: Communicator>(
        &self,
        slab: GhostedSlab,
        comm: &mut C,
    ) -> Result<PendingExchange, SimulationError> {
        comm.send(self.right, Tag::GhostMass, slab.ghost_plane().to_vec())?;
        Ok(PendingExchange {
            slab,
            src: self.left,
            tag: Tag::GhostMass,
            mode: Mode::Accumulate,
        })
    }

    /// Ship the first owned plane of field `component` to the left neighbour.
    pub fn start_fetch<C: Communicator>(
        &self,
        slab: GhostedSlab,
        component: u8,
        comm: &mut C,
    ) -> Result<PendingExchange, SimulationError> {
        let tag = Tag::GhostField(component);
        comm.send(self.left, tag, slab.first_plane().to_vec())?;
        Ok(PendingExchange {
            slab,
            src: self.right,
            tag,
            mode: Mode::Fetch,
        })
    }
}

/// An exchange whose outgoing half has been sent.
#[must_use = "ghost data is only applied by PendingExchange::wait"]
pub struct PendingExchange {
    slab: GhostedSlab,
    src: usize,
    tag: Tag,
    mode: Mode,
}

impl PendingExchange {
    /// Block for the neighbour's plane, apply it and return the slab.
    pub fn wait<C: Communicator>(self, comm: &mut C) -> Result<GhostedSlab, SimulationError> {
        let PendingExchange {
            mut slab,
            src,
            tag,
            mode,
        } = self;
        let plane: Vec<Real> = comm.recv(src, tag)?;
        let expected = slab.first_plane().len();
        if plane.len() != expected {
            return Err(KernelError::SizeMismatch {
                what: "ghost plane",
                expected,
                actual: plane.len(),
            }
            .into());
        }
        match mode {
            Mode::Accumulate => {
                for (dst, v) in slab.first_plane_mut().iter_mut().zip(&plane) {
                    *dst += *v;
                }
                // Its mass now lives with the right neighbour.
                slab.ghost_plane_mut().fill(0.0);
            }
            Mode::Fetch => slab.ghost_plane_mut().copy_from_slice(&plane),
        }
        tracing::trace!(?tag, src, "ghost exchange complete");
        Ok(slab)
    }
}
