//! Slab domain decomposition
//!
//! The box is cut into slabs of consecutive x-planes. The FFT mesh is split
//! as evenly as possible over the tasks; the particle lattice follows the
//! mesh: lattice plane `i` belongs to whichever task owns mesh plane
//! `floor(i * nmesh / nsample)`. Both tables are fixed for the whole run.

use cola_kernel::cic::cell_of;
use cola_kernel::{Real, SlabPartition};

use crate::config::SimulationConfig;
use crate::error::SimulationError;

/// Mesh and particle slab tables for one run.
#[derive(Debug, Clone)]
pub struct Decomposition {
    mesh: SlabPartition,
    particles: SlabPartition,
    /// Mesh plane -> owning task
    slab_to_task: Vec<usize>,
    /// Particle lattice plane -> owning task
    part_to_task: Vec<usize>,
    nsample: usize,
    box_size: f64,
}

impl Decomposition {
    /// Decompose `nmesh` mesh planes and `nsample` lattice planes over `tasks`.
    ///
    /// Fails with a configuration error if there are more tasks than mesh
    /// planes.
    pub fn new(
        nmesh: usize,
        nsample: usize,
        tasks: usize,
        box_size: f64,
    ) -> Result<Self, SimulationError> {
        let mesh = SlabPartition::balanced(nmesh, tasks)?;
        let slab_to_task: Vec<usize> = (0..nmesh).map(|p| mesh.task_owning(p)).collect();

        let part_to_task: Vec<usize> = (0..nsample)
            .map(|i| slab_to_task[i * nmesh / nsample])
            .collect();
        let mut counts = vec![0usize; tasks];
        for &t in &part_to_task {
            counts[t] += 1;
        }
        let particles = SlabPartition::from_counts(counts);

        let without_particles = (0..tasks).filter(|&t| particles.count(t) == 0).count();
        tracing::info!(
            "Decomposition: {} tasks, {} mesh planes, {} lattice planes ({} tasks without particles)",
            tasks,
            nmesh,
            nsample,
            without_particles
        );
        for t in 0..tasks {
            tracing::debug!(
                "  Task {}: mesh planes {:?}, lattice planes {:?}",
                t,
                mesh.slices_owned(t),
                particles.slices_owned(t)
            );
        }

        Ok(Self {
            mesh,
            particles,
            slab_to_task,
            part_to_task,
            nsample,
            box_size,
        })
    }

    /// Decomposition described by a configuration
    pub fn from_config(config: &SimulationConfig) -> Result<Self, SimulationError> {
        Self::new(config.nmesh, config.nsample, config.tasks, config.box_size)
    }

    /// Number of tasks
    pub fn tasks(&self) -> usize {
        self.mesh.tasks()
    }

    /// Mesh cells per dimension
    pub fn nmesh(&self) -> usize {
        self.mesh.planes()
    }

    /// Lattice particles per dimension
    pub fn nsample(&self) -> usize {
        self.nsample
    }

    /// Box side length
    pub fn box_size(&self) -> f64 {
        self.box_size
    }

    /// Mesh partition, as used by the FFT
    pub fn mesh(&self) -> &SlabPartition {
        &self.mesh
    }

    /// `(start, count)` of mesh planes owned by `task`
    pub fn slices_owned(&self, task: usize) -> (usize, usize) {
        self.mesh.slices_owned(task)
    }

    /// Task owning mesh plane `plane`
    pub fn task_owning(&self, plane: usize) -> usize {
        self.slab_to_task[plane % self.slab_to_task.len()]
    }

    /// `(start, count)` of lattice planes owned by `task`
    pub fn particle_slices_owned(&self, task: usize) -> (usize, usize) {
        self.particles.slices_owned(task)
    }

    /// Task owning lattice plane `plane`
    pub fn task_owning_particle_plane(&self, plane: usize) -> usize {
        self.part_to_task[plane % self.part_to_task.len()]
    }

    /// Grid units per box length unit
    pub fn grid_scale(&self) -> Real {
        (self.nmesh() as f64 / self.box_size) as Real
    }

    /// Task whose mesh slab contains comoving coordinate `x`
    pub fn task_for_position(&self, x: Real) -> usize {
        let (cell, _) = cell_of(x, self.grid_scale(), self.nmesh());
        self.slab_to_task[cell]
    }

    /// Map a coordinate into `[0, box_size)`
    pub fn wrap(&self, x: Real) -> Real {
        let l = self.box_size as Real;
        let w = x.rem_euclid(l);
        // rem_euclid rounds tiny negatives up to exactly l
        if w >= l {
            0.0
        } else {
            w
        }
    }

    /// Neighbouring task towards lower x (periodic)
    pub fn left_neighbor(&self, task: usize) -> usize {
        (task + self.tasks() - 1) % self.tasks()
    }

    /// Neighbouring task towards higher x (periodic)
    pub fn right_neighbor(&self, task: usize) -> usize {
        (task + 1) % self.tasks()
    }

    /// Particles a task holds right after the lattice is laid down
    pub fn nominal_particles(&self, task: usize) -> usize {
        self.particles.count(task) * self.nsample * self.nsample
    }

    /// Particle storage capacity of a task for the given buffer factor
    pub fn particle_capacity(&self, task: usize, buffer: f64) -> usize {
        let nominal = self.nominal_particles(task).max(self.nsample * self.nsample);
        (nominal as f64 * buffer).ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn more_tasks_than_planes_is_a_configuration_error() {
        let err = Decomposition::new(4, 4, 5, 1.0).unwrap_err();
        assert!(matches!(err, SimulationError::Configuration(_)));
    }

    #[test]
    fn particle_slabs_follow_mesh_slabs() {
        let d = Decomposition::new(8, 4, 2, 64.0).unwrap();
        assert_eq!(d.slices_owned(0), (0, 4));
        assert_eq!(d.slices_owned(1), (4, 4));
        assert_eq!(d.particle_slices_owned(0), (0, 2));
        assert_eq!(d.particle_slices_owned(1), (2, 2));
        assert_eq!(d.nominal_particles(1), 32);
    }

    #[test]
    fn coarse_lattice_can_leave_tasks_empty() {
        let d = Decomposition::new(8, 2, 4, 8.0).unwrap();
        let total: usize = (0..4).map(|t| d.particle_slices_owned(t).1).sum();
        assert_eq!(total, 2);
        assert_eq!(d.task_owning_particle_plane(0), 0);
        assert_eq!(d.task_owning_particle_plane(1), 2);
        // Empty tasks still get room for one lattice plane.
        assert_eq!(d.particle_capacity(1, 1.0), 4);
    }

    #[test]
    fn neighbours_wrap() {
        let d = Decomposition::new(6, 6, 3, 6.0).unwrap();
        assert_eq!(d.left_neighbor(0), 2);
        assert_eq!(d.right_neighbor(2), 0);
        let single = Decomposition::new(6, 6, 1, 6.0).unwrap();
        assert_eq!(single.left_neighbor(0), 0);
        assert_eq!(single.right_neighbor(0), 0);
    }

    #[test]
    fn positions_map_to_mesh_owner() {
        let d = Decomposition::new(8, 8, 2, 80.0).unwrap();
        assert_eq!(d.task_for_position(0.0), 0);
        assert_eq!(d.task_for_position(39.999), 0);
        assert_eq!(d.task_for_position(40.0), 1);
        assert_eq!(d.task_for_position(79.9999), 1);
        assert_eq!(d.task_for_position(80.0), 0);
        assert_eq!(d.task_for_position(-0.5), 1);
    }

    #[test]
    fn wrap_stays_inside_box() {
        let d = Decomposition::new(8, 8, 2, 80.0).unwrap();
        assert_eq!(d.wrap(81.0), 1.0);
        assert_eq!(d.wrap(-1.0), 79.0);
        assert_eq!(d.wrap(-1e-30), 0.0);
    }

    proptest! {
        #[test]
        fn partition_covers_mesh_exactly_once(
            nmesh in 2usize..128,
            nsample in 1usize..128,
            tasks in 1usize..32,
        ) {
            prop_assume!(tasks <= nmesh);
            let d = Decomposition::new(nmesh, nsample, tasks, 1.0).unwrap();
            let mut seen = vec![0usize; nmesh];
            for t in 0..tasks {
                let (start, count) = d.slices_owned(t);
                for p in start..start + count {
                    seen[p] += 1;
                    prop_assert_eq!(d.task_owning(p), t);
                }
            }
            prop_assert!(seen.iter().all(|&c| c == 1));

            let mut lattice = vec![0usize; nsample];
            for t in 0..tasks {
                let (start, count) = d.particle_slices_owned(t);
                for p in start..start + count {
                    lattice[p] += 1;
                    prop_assert_eq!(d.task_owning_particle_plane(p), t);
                }
            }
            prop_assert!(lattice.iter().all(|&c| c == 1));
        }
    }
}
