//! Contiguous partition of one grid axis into per-task slabs.

use crate::error::KernelError;

/// Assignment of `n` planes to `tasks` tasks as contiguous, gap-free ranges.
///
/// Task `t` owns planes `start(t) .. start(t) + count(t)`. Ranges are ordered
/// by task index, so plane ownership is monotone in the plane index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlabPartition {
    n: usize,
    starts: Vec<usize>,
    counts: Vec<usize>,
}

impl SlabPartition {
    /// Split `n` planes as evenly as possible: every task gets `n / tasks`
    /// planes and the first `n % tasks` tasks get one more.
    ///
    /// Fails if `tasks` is zero or exceeds `n`, since every task must own at
    /// least one plane of the FFT mesh.
    pub fn balanced(n: usize, tasks: usize) -> Result<Self, KernelError> {
        if tasks == 0 || tasks > n {
            return Err(KernelError::Partition { planes: n, tasks });
        }
        let base = n / tasks;
        let rem = n % tasks;
        let counts: Vec<usize> = (0..tasks).map(|t| base + usize::from(t < rem)).collect();
        Ok(Self::from_counts(counts))
    }

    /// Build a partition from explicit per-task plane counts. Tasks may own
    /// zero planes.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        let mut starts = Vec::with_capacity(counts.len());
        let mut next = 0;
        for &c in &counts {
            starts.push(next);
            next += c;
        }
        Self {
            n: next,
            starts,
            counts,
        }
    }

    /// Total number of planes.
    pub fn planes(&self) -> usize {
        self.n
    }

    /// Number of tasks.
    pub fn tasks(&self) -> usize {
        self.counts.len()
    }

    /// First plane owned by `task`.
    pub fn start(&self, task: usize) -> usize {
        self.starts[task]
    }

    /// Number of planes owned by `task`.
    pub fn count(&self, task: usize) -> usize {
        self.counts[task]
    }

    /// `(start, count)` of the planes owned by `task`.
    pub fn slices_owned(&self, task: usize) -> (usize, usize) {
        (self.starts[task], self.counts[task])
    }

    /// Task owning `plane` (taken modulo the plane count).
    pub fn task_owning(&self, plane: usize) -> usize {
        let plane = plane % self.n;
        // Last task whose range starts at or before the plane and is non-empty.
        let upper = self.starts.partition_point(|&s| s <= plane);
        (0..upper)
            .rev()
            .find(|&t| self.counts[t] > 0)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn balanced_split_gives_remainder_to_first_tasks() {
        let p = SlabPartition::balanced(10, 3).unwrap();
        assert_eq!(p.slices_owned(0), (0, 4));
        assert_eq!(p.slices_owned(1), (4, 3));
        assert_eq!(p.slices_owned(2), (7, 3));
    }

    #[test]
    fn more_tasks_than_planes_is_rejected() {
        assert!(SlabPartition::balanced(4, 5).is_err());
        assert!(SlabPartition::balanced(4, 0).is_err());
        assert!(SlabPartition::balanced(4, 4).is_ok());
    }

    #[test]
    fn empty_ranges_are_skipped_by_lookup() {
        let p = SlabPartition::from_counts(vec![2, 0, 3]);
        assert_eq!(p.task_owning(1), 0);
        assert_eq!(p.task_owning(2), 2);
        assert_eq!(p.task_owning(4), 2);
        assert_eq!(p.task_owning(5), 0);
    }

    proptest! {
        #[test]
        fn every_plane_owned_exactly_once(n in 1usize..200, t in 1usize..64) {
            prop_assume!(t <= n);
            let p = SlabPartition::balanced(n, t).unwrap();
            let mut owners = vec![0usize; n];
            for task in 0..t {
                let (start, count) = p.slices_owned(task);
                prop_assert!(count >= 1);
                for plane in start..start + count {
                    owners[plane] += 1;
                    prop_assert_eq!(p.task_owning(plane), task);
                }
            }
            prop_assert!(owners.iter().all(|&c| c == 1));
            let max = (0..t).map(|task| p.count(task)).max().unwrap();
            let min = (0..t).map(|task| p.count(task)).min().unwrap();
            prop_assert!(max - min <= 1);
        }
    }
}
