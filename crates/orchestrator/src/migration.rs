//! Particle migration between slabs
//!
//! After every drift (and once after the initial conditions) each particle
//! must live on the task owning the mesh plane of its x coordinate. Leavers
//! are bucketed per destination; every task then tells every other task how
//! many particles to expect before shipping the non-empty buckets.

use cola_kernel::{Communicator, Particle, ParticleArrays, Tag};

use crate::domain::Decomposition;
use crate::error::SimulationError;

/// Particle traffic of one migration on one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    /// Particles shipped to other tasks
    pub sent: usize,
    /// Particles received from other tasks
    pub received: usize,
}

/// Move every particle to the task owning its position.
///
/// Fails with [`SimulationError::ResourceExhaustion`] when the particles
/// arriving would exceed `capacity`; the caller aborts the run.
pub fn migrate<C: Communicator>(
    particles: &mut ParticleArrays,
    capacity: usize,
    decomposition: &Decomposition,
    comm: &mut C,
) -> Result<MigrationStats, SimulationError> {
    let rank = comm.rank();
    let size = comm.size();

    let mut outgoing: Vec<Vec<Particle>> = vec![Vec::new(); size];
    let mut i = 0;
    while i < particles.len() {
        let owner = decomposition.task_for_position(particles.pos[0][i]);
        if owner == rank {
            i += 1;
        } else {
            // swap_remove moves an unchecked particle into slot i.
            outgoing[owner].push(particles.swap_remove(i));
        }
    }

    let sent: usize = outgoing.iter().map(Vec::len).sum();
    for dest in (0..size).filter(|&d| d != rank) {
        comm.send(dest, Tag::MigrationCount, outgoing[dest].len())?;
    }
    for (dest, bucket) in outgoing.into_iter().enumerate() {
        if dest != rank && !bucket.is_empty() {
            comm.send(dest, Tag::MigrationPayload, bucket)?;
        }
    }

    let mut incoming = vec![0usize; size];
    for src in (0..size).filter(|&s| s != rank) {
        incoming[src] = comm.recv(src, Tag::MigrationCount)?;
    }
    let received: usize = incoming.iter().sum();
    if particles.len() + received > capacity {
        return Err(SimulationError::ResourceExhaustion(format!(
            "task {} would hold {} particles but has room for {}; increase the buffer factor",
            rank,
            particles.len() + received,
            capacity
        )));
    }
    for (src, &count) in incoming.iter().enumerate() {
        if count > 0 {
            let batch: Vec<Particle> = comm.recv(src, Tag::MigrationPayload)?;
            particles.extend(batch);
        }
    }

    tracing::debug!(
        "Task {}: migrated {} particles out, {} in, now holding {}",
        rank,
        sent,
        received,
        particles.len()
    );
    Ok(MigrationStats { sent, received })
}
