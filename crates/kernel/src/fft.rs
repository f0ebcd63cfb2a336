//! Distributed 3D FFT over x-slabs.
//!
//! The forward transform runs z and y lines inside each owned x-plane,
//! transposes to y-slabs with an all-to-all exchange, runs x lines, and
//! transposes back. Fourier modes therefore live in the same x-slab layout as
//! real-space data, with the slab axis indexing kx. Both directions are
//! unnormalised: forward followed by inverse multiplies every value by `n^3`.

use std::sync::Arc;

use rustfft::{Fft, FftPlanner};

use crate::comm::{Communicator, Tag};
use crate::error::KernelError;
use crate::field::{Representation, SlabField};
use crate::slab::SlabPartition;
use crate::{Complex, Real};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Inverse,
}

/// Planned transforms and work buffers for one task's slab.
pub struct SlabFft {
    n: usize,
    partition: SlabPartition,
    rank: usize,
    forward: Arc<dyn Fft<Real>>,
    inverse: Arc<dyn Fft<Real>>,
    scratch: Vec<Complex<Real>>,
    line: Vec<Complex<Real>>,
    transposed: Vec<Complex<Real>>,
}

impl SlabFft {
    /// Plan transforms for the slab `rank` owns in `partition`. The same
    /// partition is used for the intermediate y-slabs.
    pub fn new(partition: SlabPartition, rank: usize) -> Self {
        let n = partition.planes();
        let mut planner = FftPlanner::<Real>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let local = partition.count(rank) * n * n;
        Self {
            n,
            partition,
            rank,
            forward,
            inverse,
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            line: vec![Complex::new(0.0, 0.0); n],
            transposed: vec![Complex::new(0.0, 0.0); local],
        }
    }

    /// Grid size along each axis.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Transform a real-space field to Fourier space in place.
    pub fn forward<C: Communicator>(
        &mut self,
        field: &mut SlabField,
        comm: &mut C,
    ) -> Result<(), KernelError> {
        let data = field.raw_for(Representation::RealSpace, "forward transform")?;
        self.transform(data, Direction::Forward, comm)?;
        field.set_representation(Representation::FourierSpace);
        Ok(())
    }

    /// Transform a Fourier-space field back to real space in place.
    ///
    /// The result is taken to be real: imaginary parts left over from
    /// rounding are discarded.
    pub fn inverse<C: Communicator>(
        &mut self,
        field: &mut SlabField,
        comm: &mut C,
    ) -> Result<(), KernelError> {
        let data = field.raw_for(Representation::FourierSpace, "inverse transform")?;
        self.transform(data, Direction::Inverse, comm)?;
        for c in data.iter_mut() {
            c.im = 0.0;
        }
        field.set_representation(Representation::RealSpace);
        Ok(())
    }

    fn transform<C: Communicator>(
        &mut self,
        data: &mut [Complex<Real>],
        direction: Direction,
        comm: &mut C,
    ) -> Result<(), KernelError> {
        let n = self.n;
        let plane = n * n;
        let local = self.partition.count(self.rank);
        if data.len() != local * plane {
            return Err(KernelError::SizeMismatch {
                what: "transform slab",
                expected: local * plane,
                actual: data.len(),
            });
        }
        debug_assert_eq!(comm.rank(), self.rank);
        debug_assert_eq!(comm.size(), self.partition.tasks());

        let plan = match direction {
            Direction::Forward => Arc::clone(&self.forward),
            Direction::Inverse => Arc::clone(&self.inverse),
        };

        // z lines are contiguous: one batched call.
        if !data.is_empty() {
            plan.process_with_scratch(data, &mut self.scratch);
        }
        // y lines inside every owned x-plane.
        transform_middle_axis(&*plan, data, local, n, &mut self.line, &mut self.scratch);

        // x-slabs [x][y][z] to y-slabs [y][x][z].
        for dest in 0..self.partition.tasks() {
            let (y0, ny) = self.partition.slices_owned(dest);
            let mut block = Vec::with_capacity(local * ny * n);
            for lx in 0..local {
                let from = (lx * n + y0) * n;
                block.extend_from_slice(&data[from..from + ny * n]);
            }
            comm.send(dest, Tag::TransposeOut, block)?;
        }
        for src in 0..self.partition.tasks() {
            let (x0, nx) = self.partition.slices_owned(src);
            let block: Vec<Complex<Real>> = comm.recv(src, Tag::TransposeOut)?;
            if block.len() != nx * local * n {
                return Err(KernelError::SizeMismatch {
                    what: "transpose block",
                    expected: nx * local * n,
                    actual: block.len(),
                });
            }
            for lx in 0..nx {
                for ly in 0..local {
                    let from = (lx * local + ly) * n;
                    let to = (ly * n + x0 + lx) * n;
                    self.transposed[to..to + n].copy_from_slice(&block[from..from + n]);
                }
            }
        }

        // x lines inside every owned y-plane.
        transform_middle_axis(
            &*plan,
            &mut self.transposed,
            local,
            n,
            &mut self.line,
            &mut self.scratch,
        );

        // Back to x-slabs.
        for dest in 0..self.partition.tasks() {
            let (x0, nx) = self.partition.slices_owned(dest);
            let mut block = Vec::with_capacity(local * nx * n);
            for ly in 0..local {
                let from = (ly * n + x0) * n;
                block.extend_from_slice(&self.transposed[from..from + nx * n]);
            }
            comm.send(dest, Tag::TransposeBack, block)?;
        }
        for src in 0..self.partition.tasks() {
            let (y0, ny) = self.partition.slices_owned(src);
            let block: Vec<Complex<Real>> = comm.recv(src, Tag::TransposeBack)?;
            if block.len() != ny * local * n {
                return Err(KernelError::SizeMismatch {
                    what: "transpose block",
                    expected: ny * local * n,
                    actual: block.len(),
                });
            }
            for ly in 0..ny {
                for lx in 0..local {
                    let from = (ly * local + lx) * n;
                    let to = (lx * n + y0 + ly) * n;
                    data[to..to + n].copy_from_slice(&block[from..from + n]);
                }
            }
        }

        tracing::trace!(?direction, local, n, "slab transform done");
        Ok(())
    }
}

/// Transform along the middle index of `blocks` consecutive `[n][n]` blocks.
fn transform_middle_axis(
    plan: &dyn Fft<Real>,
    data: &mut [Complex<Real>],
    blocks: usize,
    n: usize,
    line: &mut [Complex<Real>],
    scratch: &mut [Complex<Real>],
) {
    for b in 0..blocks {
        let base = b * n * n;
        for c in 0..n {
            for m in 0..n {
                line[m] = data[base + m * n + c];
            }
            plan.process_with_scratch(line, scratch);
            for m in 0..n {
                data[base + m * n + c] = line[m];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleTask;
    use std::f64::consts::PI;

    fn test_field(n: usize) -> SlabField {
        let mut field = SlabField::zeroed(n, 0, n).unwrap();
        let values: Vec<Real> = (0..n * n * n)
            .map(|i| ((i * 7 % 11) as Real) * 0.25 - 1.0)
            .collect();
        field.load_real(&values).unwrap();
        field
    }

    #[test]
    fn round_trip_scales_by_grid_volume() {
        let n = 6;
        let partition = SlabPartition::balanced(n, 1).unwrap();
        let mut fft = SlabFft::new(partition, 0);
        let mut comm = SingleTask::new();
        let mut field = test_field(n);
        let original = field.real_values().unwrap();

        fft.forward(&mut field, &mut comm).unwrap();
        assert_eq!(field.representation(), Representation::FourierSpace);
        fft.inverse(&mut field, &mut comm).unwrap();

        let scale = (n * n * n) as Real;
        for (a, b) in field.real_values().unwrap().iter().zip(&original) {
            assert!((a / scale - b).abs() < 1e-5, "round trip mismatch {} vs {}", a / scale, b);
        }
    }

    #[test]
    fn single_mode_lands_in_expected_bin() {
        let n = 8;
        let mut field = SlabField::zeroed(n, 0, n).unwrap();
        let mut values = vec![0.0; n * n * n];
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    let phase = 2.0 * PI * (x as f64) / n as f64;
                    values[(x * n + y) * n + z] = phase.cos() as Real;
                }
            }
        }
        field.load_real(&values).unwrap();
        let mut fft = SlabFft::new(SlabPartition::balanced(n, 1).unwrap(), 0);
        let mut comm = SingleTask::new();
        fft.forward(&mut field, &mut comm).unwrap();

        let modes = field.modes().unwrap();
        let half = (n * n * n) as Real / 2.0;
        assert!((modes[field.index(1, 0, 0)].re - half).abs() < 1e-3);
        assert!((modes[field.index(n - 1, 0, 0)].re - half).abs() < 1e-3);
        assert!(modes[field.index(0, 0, 0)].norm() < 1e-3);
        assert!(modes[field.index(2, 0, 0)].norm() < 1e-3);
    }

    #[test]
    fn transform_rejects_wrong_representation() {
        let n = 4;
        let mut fft = SlabFft::new(SlabPartition::balanced(n, 1).unwrap(), 0);
        let mut comm = SingleTask::new();
        let mut field = test_field(n);
        assert!(fft.inverse(&mut field, &mut comm).is_err());
    }
}
