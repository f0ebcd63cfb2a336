//! Particle data structures using struct-of-arrays layout.

use crate::Real;

/// A single particle, used when particles travel between tasks.
///
/// `disp` is not carried: it is recomputed at every force evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    /// Global lattice index, unique over the run.
    pub id: u64,
    /// Comoving position (box length units).
    pub pos: [Real; 3],
    /// Canonical momentum `p = Q(a) dx/da`.
    pub vel: [Real; 3],
    /// First-order (Zel'dovich) displacement, normalised to `D1 = 1`.
    pub za: [Real; 3],
    /// Second-order displacement, normalised to `D2 = 1`.
    pub lpt: [Real; 3],
}

/// Struct-of-arrays particle storage.
///
/// All arrays are parallel: index `i` across every array refers to the same
/// particle. Vector quantities are stored as one array per axis so loops over
/// an axis stay contiguous.
#[derive(Debug, Clone, Default)]
pub struct ParticleArrays {
    /// Global lattice index.
    pub id: Vec<u64>,
    /// Positions per axis.
    pub pos: [Vec<Real>; 3],
    /// Momenta per axis. During a COLA run these hold the residual momentum
    /// relative to the LPT trajectory.
    pub vel: [Vec<Real>; 3],
    /// Zel'dovich displacement per axis.
    pub za: [Vec<Real>; 3],
    /// Second-order LPT displacement per axis.
    pub lpt: [Vec<Real>; 3],
    /// PM displacement field sampled at the particle during the current step.
    pub disp: [Vec<Real>; 3],
}

fn axes_with_capacity(capacity: usize) -> [Vec<Real>; 3] {
    [
        Vec::with_capacity(capacity),
        Vec::with_capacity(capacity),
        Vec::with_capacity(capacity),
    ]
}

impl ParticleArrays {
    /// Create an empty particle collection with no particles allocated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection with room for `capacity` particles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: Vec::with_capacity(capacity),
            pos: axes_with_capacity(capacity),
            vel: axes_with_capacity(capacity),
            za: axes_with_capacity(capacity),
            lpt: axes_with_capacity(capacity),
            disp: axes_with_capacity(capacity),
        }
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.id.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Append a particle. Its PM displacement starts at zero.
    pub fn push(&mut self, p: Particle) {
        self.id.push(p.id);
        for axis in 0..3 {
            self.pos[axis].push(p.pos[axis]);
            self.vel[axis].push(p.vel[axis]);
            self.za[axis].push(p.za[axis]);
            self.lpt[axis].push(p.lpt[axis]);
            self.disp[axis].push(0.0);
        }
    }

    /// Copy out particle `i`.
    pub fn get(&self, i: usize) -> Particle {
        Particle {
            id: self.id[i],
            pos: [self.pos[0][i], self.pos[1][i], self.pos[2][i]],
            vel: [self.vel[0][i], self.vel[1][i], self.vel[2][i]],
            za: [self.za[0][i], self.za[1][i], self.za[2][i]],
            lpt: [self.lpt[0][i], self.lpt[1][i], self.lpt[2][i]],
        }
    }

    /// Remove particle `i` in O(1) by moving the last particle into its slot.
    pub fn swap_remove(&mut self, i: usize) -> Particle {
        let p = self.get(i);
        self.id.swap_remove(i);
        for axis in 0..3 {
            self.pos[axis].swap_remove(i);
            self.vel[axis].swap_remove(i);
            self.za[axis].swap_remove(i);
            self.lpt[axis].swap_remove(i);
            self.disp[axis].swap_remove(i);
        }
        p
    }

    /// Append every particle of `batch`.
    pub fn extend<I: IntoIterator<Item = Particle>>(&mut self, batch: I) {
        for p in batch {
            self.push(p);
        }
    }

    /// Append all particles of another collection, draining it.
    pub fn append(&mut self, other: &mut ParticleArrays) {
        self.id.append(&mut other.id);
        for axis in 0..3 {
            self.pos[axis].append(&mut other.pos[axis]);
            self.vel[axis].append(&mut other.vel[axis]);
            self.za[axis].append(&mut other.za[axis]);
            self.lpt[axis].append(&mut other.lpt[axis]);
            self.disp[axis].append(&mut other.disp[axis]);
        }
    }

    /// Reorder particles by ascending id.
    pub fn sort_by_id(&mut self) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_unstable_by_key(|&i| self.id[i]);
        let permute_u64 = |v: &Vec<u64>| order.iter().map(|&i| v[i]).collect::<Vec<_>>();
        let permute = |v: &Vec<Real>| order.iter().map(|&i| v[i]).collect::<Vec<_>>();
        self.id = permute_u64(&self.id);
        for axis in 0..3 {
            self.pos[axis] = permute(&self.pos[axis]);
            self.vel[axis] = permute(&self.vel[axis]);
            self.za[axis] = permute(&self.za[axis]);
            self.lpt[axis] = permute(&self.lpt[axis]);
            self.disp[axis] = permute(&self.disp[axis]);
        }
    }

    /// Borrow the three position arrays.
    pub fn positions(&self) -> [&[Real]; 3] {
        [&self.pos[0], &self.pos[1], &self.pos[2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(id: u64, x: Real) -> Particle {
        Particle {
            id,
            pos: [x, 2.0, 3.0],
            vel: [0.1, 0.2, 0.3],
            za: [1.0, 0.0, -1.0],
            lpt: [0.0, 0.5, 0.0],
        }
    }

    #[test]
    fn empty_particle_arrays() {
        let pa = ParticleArrays::new();
        assert_eq!(pa.len(), 0);
        assert!(pa.is_empty());
    }

    #[test]
    fn push_and_get() {
        let mut pa = ParticleArrays::new();
        pa.push(particle(7, 1.0));
        assert_eq!(pa.len(), 1);
        assert!(!pa.is_empty());
        assert_eq!(pa.get(0), particle(7, 1.0));
        assert_eq!(pa.disp[0][0], 0.0);
    }

    #[test]
    fn swap_remove_moves_last_into_slot() {
        let mut pa = ParticleArrays::new();
        pa.extend([particle(0, 0.0), particle(1, 1.0), particle(2, 2.0)]);
        let removed = pa.swap_remove(0);
        assert_eq!(removed.id, 0);
        assert_eq!(pa.len(), 2);
        assert_eq!(pa.id, vec![2, 1]);
        assert_eq!(pa.pos[0], vec![2.0, 1.0]);
    }

    #[test]
    fn sort_by_id_keeps_rows_together() {
        let mut pa = ParticleArrays::new();
        pa.extend([particle(5, 5.0), particle(1, 1.0), particle(3, 3.0)]);
        pa.sort_by_id();
        assert_eq!(pa.id, vec![1, 3, 5]);
        assert_eq!(pa.pos[0], vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn append_drains_other() {
        let mut a = ParticleArrays::new();
        let mut b = ParticleArrays::new();
        a.push(particle(0, 0.0));
        b.extend([particle(1, 1.0), particle(2, 2.0)]);
        a.append(&mut b);
        assert_eq!(a.len(), 3);
        assert!(b.is_empty());
    }
}
