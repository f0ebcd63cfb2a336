//! Cloud-in-cell mass assignment and interpolation.
//!
//! Particles are spread over the eight mesh points surrounding them with
//! trilinear weights, and fields are read back with the same weights. A task
//! only handles particles whose cell lies in its own x-planes, so the
//! footprint reaches at most one plane past the slab: the ghost plane of a
//! [`GhostedSlab`].

use crate::error::KernelError;
use crate::field::SlabField;
use crate::Real;

/// Locate coordinate `x` on a periodic `n`-cell axis.
///
/// `scale` converts `x` to grid units. Returns the cell index in `[0, n)` and
/// the fractional offset inside the cell. Every component that needs to know
/// which task owns a particle goes through this function so the answer is
/// identical everywhere.
#[inline]
pub fn cell_of(x: Real, scale: Real, n: usize) -> (usize, Real) {
    let u = x * scale;
    let floor = u.floor();
    let frac = u - floor;
    let cell = (floor as i64).rem_euclid(n as i64) as usize;
    (cell, frac)
}

/// Real-valued slab of `local_nx` owned x-planes plus one ghost plane
/// holding global plane `x_start + local_nx` (mod `n`).
#[derive(Debug, Clone)]
pub struct GhostedSlab {
    n: usize,
    x_start: usize,
    local_nx: usize,
    data: Vec<Real>,
}

impl GhostedSlab {
    /// Zeroed slab, ready for deposit.
    pub fn zeroed(n: usize, x_start: usize, local_nx: usize) -> Self {
        Self {
            n,
            x_start,
            local_nx,
            data: vec![0.0; (local_nx + 1) * n * n],
        }
    }

    /// Copy the owned planes of a real-space field. The ghost plane is zero
    /// until a fetch exchange fills it.
    pub fn from_field(field: &SlabField) -> Result<Self, KernelError> {
        let mut slab = Self::zeroed(field.n(), field.x_start(), field.local_nx());
        let values = field.real_values()?;
        slab.data[..values.len()].copy_from_slice(&values);
        Ok(slab)
    }

    /// Grid size along each axis.
    pub fn n(&self) -> usize {
        self.n
    }

    /// First global plane owned.
    pub fn x_start(&self) -> usize {
        self.x_start
    }

    /// Number of owned planes.
    pub fn local_nx(&self) -> usize {
        self.local_nx
    }

    fn plane_len(&self) -> usize {
        self.n * self.n
    }

    /// The owned planes, without the ghost plane.
    pub fn owned(&self) -> &[Real] {
        &self.data[..self.local_nx * self.plane_len()]
    }

    /// First owned plane.
    pub fn first_plane(&self) -> &[Real] {
        &self.data[..self.plane_len()]
    }

    /// Mutable first owned plane.
    pub fn first_plane_mut(&mut self) -> &mut [Real] {
        let len = self.plane_len();
        &mut self.data[..len]
    }

    /// Ghost plane.
    pub fn ghost_plane(&self) -> &[Real] {
        &self.data[self.local_nx * self.plane_len()..]
    }

    /// Mutable ghost plane.
    pub fn ghost_plane_mut(&mut self) -> &mut [Real] {
        let start = self.local_nx * self.plane_len();
        &mut self.data[start..]
    }

    /// Sum over owned planes.
    pub fn owned_sum(&self) -> f64 {
        self.owned().iter().map(|&v| v as f64).sum()
    }

    /// Sum over every plane including the ghost.
    pub fn total_sum(&self) -> f64 {
        self.data.iter().map(|&v| v as f64).sum()
    }

    #[inline]
    fn index(&self, lx: usize, y: usize, z: usize) -> usize {
        (lx * self.n + y) * self.n + z
    }

    /// Local plane of a global cell, if it is owned.
    fn local_plane(&self, cell: usize, u: Real) -> Result<usize, KernelError> {
        let end = self.x_start + self.local_nx;
        if cell >= self.x_start && cell < end {
            Ok(cell - self.x_start)
        } else {
            Err(KernelError::OutsideSlab {
                coordinate: u as f64,
                plane: cell,
                start: self.x_start,
                end,
            })
        }
    }
}

/// Eight corner weights and indices of one particle.
struct Stencil {
    lx: [usize; 2],
    y: [usize; 2],
    z: [usize; 2],
    wx: [Real; 2],
    wy: [Real; 2],
    wz: [Real; 2],
}

fn stencil(slab: &GhostedSlab, p: [Real; 3], scale: Real) -> Result<Stencil, KernelError> {
    let n = slab.n;
    let (cx, dx) = cell_of(p[0], scale, n);
    let (cy, dy) = cell_of(p[1], scale, n);
    let (cz, dz) = cell_of(p[2], scale, n);
    let lx = slab.local_plane(cx, p[0] * scale)?;
    Ok(Stencil {
        lx: [lx, lx + 1],
        y: [cy, (cy + 1) % n],
        z: [cz, (cz + 1) % n],
        wx: [1.0 - dx, dx],
        wy: [1.0 - dy, dy],
        wz: [1.0 - dz, dz],
    })
}

/// Deposit `mass` per particle at the given positions.
///
/// `scale` converts positions to grid units (`n / box_size`). Every particle
/// must lie in the slab's owned planes.
pub fn deposit(
    slab: &mut GhostedSlab,
    positions: [&[Real]; 3],
    scale: Real,
    mass: Real,
) -> Result<(), KernelError> {
    let count = positions[0].len();
    for i in 0..count {
        let s = stencil(slab, [positions[0][i], positions[1][i], positions[2][i]], scale)?;
        for a in 0..2 {
            for b in 0..2 {
                let w_ab = mass * s.wx[a] * s.wy[b];
                for c in 0..2 {
                    let idx = slab.index(s.lx[a], s.y[b], s.z[c]);
                    slab.data[idx] += w_ab * s.wz[c];
                }
            }
        }
    }
    Ok(())
}

/// Sample the slab at each position with the deposit weights. The ghost
/// plane must already hold the right neighbour's first plane.
pub fn interpolate(
    slab: &GhostedSlab,
    positions: [&[Real]; 3],
    scale: Real,
    out: &mut [Real],
) -> Result<(), KernelError> {
    let count = positions[0].len();
    if out.len() != count {
        return Err(KernelError::SizeMismatch {
            what: "interpolation output",
            expected: count,
            actual: out.len(),
        });
    }
    for (i, value) in out.iter_mut().enumerate() {
        let s = stencil(slab, [positions[0][i], positions[1][i], positions[2][i]], scale)?;
        let mut acc = 0.0;
        for a in 0..2 {
            for b in 0..2 {
                let w_ab = s.wx[a] * s.wy[b];
                for c in 0..2 {
                    acc += w_ab * s.wz[c] * slab.data[slab.index(s.lx[a], s.y[b], s.z[c])];
                }
            }
        }
        *value = acc;
    }
    Ok(())
}
