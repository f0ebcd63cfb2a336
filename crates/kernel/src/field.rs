//! Slab grid buffers tagged with their current representation.
//!
//! A [`SlabField`] holds `local_nx * n * n` complex values for the x-planes a
//! task owns, stored `[x][y][z]` with z fastest. The same storage holds
//! either real-space values (imaginary parts zero) or Fourier modes; the
//! [`Representation`] tag says which, and every accessor checks it so a
//! stale view can never be read.

use crate::error::KernelError;
use crate::{Complex, Real};

/// Which view of the data a field currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Real-space samples on the mesh.
    RealSpace,
    /// Fourier modes, still distributed over x-slabs (kx is the slab axis).
    FourierSpace,
}

/// One task's slab of a periodic `n^3` grid.
#[derive(Debug, Clone)]
pub struct SlabField {
    n: usize,
    x_start: usize,
    local_nx: usize,
    data: Vec<Complex<Real>>,
    repr: Representation,
}

impl SlabField {
    /// Allocate a zeroed real-space slab.
    pub fn zeroed(n: usize, x_start: usize, local_nx: usize) -> Result<Self, KernelError> {
        let values = local_nx * n * n;
        let mut data = Vec::new();
        data.try_reserve_exact(values)
            .map_err(|_| KernelError::Allocation { values })?;
        data.resize(values, Complex::new(0.0, 0.0));
        Ok(Self {
            n,
            x_start,
            local_nx,
            data,
            repr: Representation::RealSpace,
        })
    }

    /// Grid size along each axis.
    pub fn n(&self) -> usize {
        self.n
    }

    /// First global x-plane of this slab.
    pub fn x_start(&self) -> usize {
        self.x_start
    }

    /// Number of x-planes in this slab.
    pub fn local_nx(&self) -> usize {
        self.local_nx
    }

    /// Number of values per x-plane.
    pub fn plane_len(&self) -> usize {
        self.n * self.n
    }

    /// Current representation.
    pub fn representation(&self) -> Representation {
        self.repr
    }

    /// Flat index of local plane `lx`, row `y`, column `z`.
    #[inline]
    pub fn index(&self, lx: usize, y: usize, z: usize) -> usize {
        (lx * self.n + y) * self.n + z
    }

    fn require(&self, expected: Representation, operation: &'static str) -> Result<(), KernelError> {
        if self.repr == expected {
            Ok(())
        } else {
            Err(KernelError::Representation {
                operation,
                expected,
                found: self.repr,
            })
        }
    }

    /// Zero the whole slab and mark it real-space. Any Fourier data is lost.
    pub fn clear(&mut self) {
        self.data.fill(Complex::new(0.0, 0.0));
        self.repr = Representation::RealSpace;
    }

    /// Overwrite the slab with real values (`local_nx * n * n` of them).
    /// The field becomes real-space; previous Fourier data is invalidated.
    pub fn load_real(&mut self, values: &[Real]) -> Result<(), KernelError> {
        if values.len() != self.data.len() {
            return Err(KernelError::SizeMismatch {
                what: "real-space slab",
                expected: self.data.len(),
                actual: values.len(),
            });
        }
        for (c, &v) in self.data.iter_mut().zip(values) {
            *c = Complex::new(v, 0.0);
        }
        self.repr = Representation::RealSpace;
        Ok(())
    }

    /// Real value at a local grid point.
    pub fn real_at(&self, lx: usize, y: usize, z: usize) -> Result<Real, KernelError> {
        self.require(Representation::RealSpace, "real_at")?;
        Ok(self.data[self.index(lx, y, z)].re)
    }

    /// Copy the real-space values out, plane by plane.
    pub fn real_values(&self) -> Result<Vec<Real>, KernelError> {
        self.require(Representation::RealSpace, "real_values")?;
        Ok(self.data.iter().map(|c| c.re).collect())
    }

    /// Mutable real-space storage. Only the real parts are meaningful; the
    /// field stays tagged real-space.
    pub fn real_mut(&mut self) -> Result<&mut [Complex<Real>], KernelError> {
        self.require(Representation::RealSpace, "real_mut")?;
        Ok(&mut self.data)
    }

    /// Fourier modes of this slab.
    pub fn modes(&self) -> Result<&[Complex<Real>], KernelError> {
        self.require(Representation::FourierSpace, "modes")?;
        Ok(&self.data)
    }

    /// Mutable Fourier modes of this slab.
    pub fn modes_mut(&mut self) -> Result<&mut [Complex<Real>], KernelError> {
        self.require(Representation::FourierSpace, "modes_mut")?;
        Ok(&mut self.data)
    }

    /// Overwrite the slab with Fourier modes, tagging it Fourier-space.
    pub fn load_modes(&mut self, modes: Vec<Complex<Real>>) -> Result<(), KernelError> {
        if modes.len() != self.data.len() {
            return Err(KernelError::SizeMismatch {
                what: "Fourier slab",
                expected: self.data.len(),
                actual: modes.len(),
            });
        }
        self.data = modes;
        self.repr = Representation::FourierSpace;
        Ok(())
    }

    /// Raw storage for the transform, with the tag it must currently carry.
    pub(crate) fn raw_for(
        &mut self,
        expected: Representation,
        operation: &'static str,
    ) -> Result<&mut Vec<Complex<Real>>, KernelError> {
        self.require(expected, operation)?;
        Ok(&mut self.data)
    }

    pub(crate) fn set_representation(&mut self, repr: Representation) {
        self.repr = repr;
    }
}

/// Signed frequency index of grid index `i` on an `n`-point axis.
#[inline]
pub fn frequency(i: usize, n: usize) -> isize {
    if i <= n / 2 {
        i as isize
    } else {
        i as isize - n as isize
    }
}
