// src/grid.rs
//
// Scalar 3D grid storage plus the geometry helpers used to size and sweep the
// kernel: zero-padding, destination ranges, index wrapping.

/// Below this many layers an open Z axis is padded to 2n-1 instead of 2n,
/// so a single-layer film keeps a kernel that is one cell thick.
pub const SMALL_N: usize = 5;

pub const X: usize = 0;
pub const Y: usize = 1;
pub const Z: usize = 2;

/// Single-precision scalar field on a 3D grid, x fastest, then y, then z.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid3D {
    /// (nx, ny, nz)
    pub size: [usize; 3],
    pub data: Vec<f32>,
}

impl Grid3D {
    /// Zero-filled grid of the given (nx, ny, nz) size.
    pub fn zeros(size: [usize; 3]) -> Self {
        let n = size[X] * size[Y] * size[Z];
        Self {
            size,
            data: vec![0.0; n],
        }
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> usize {
        self.data.len()
    }

    /// Flat index of (z, y, x).
    #[inline]
    pub fn idx(&self, z: usize, y: usize, x: usize) -> usize {
        debug_assert!(x < self.size[X] && y < self.size[Y] && z < self.size[Z]);
        (z * self.size[Y] + y) * self.size[X] + x
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> f32 {
        self.data[self.idx(z, y, x)]
    }

    #[inline]
    pub fn set(&mut self, z: usize, y: usize, x: usize, v: f32) {
        let i = self.idx(z, y, x);
        self.data[i] = v;
    }

    #[inline]
    pub fn add(&mut self, z: usize, y: usize, x: usize, v: f32) {
        let i = self.idx(z, y, x);
        self.data[i] += v;
    }
}

/// Fatal checks on the kernel geometry. These are configuration bugs, not
/// runtime conditions, so they panic.
pub fn sanity_check(input_size: [usize; 3], cell_size: [f64; 3], lift: f64) {
    for c in 0..3 {
        assert!(
            input_size[c] > 0,
            "kernel: input size must be positive, got {:?}",
            input_size
        );
        assert!(
            cell_size[c] > 0.0 && cell_size[c].is_finite(),
            "kernel: cell size must be positive and finite, got {:?}",
            cell_size
        );
    }
    assert!(lift.is_finite(), "kernel: lift must be finite, got {}", lift);
}

/// Working (padded) size for the kernel.
///
/// - periodic axis: no padding, the convolution wraps
/// - open axis: 2n to avoid wrap-around aliasing, except a thin open Z axis
///   which gets 2n-1
pub fn pad_size(input_size: [usize; 3], pbc: [usize; 3]) -> [usize; 3] {
    let mut padded = [0usize; 3];
    for c in 0..3 {
        padded[c] = if pbc[c] != 0 {
            input_size[c]
        } else if c != Z || input_size[c] > SMALL_N {
            input_size[c] * 2
        } else {
            input_size[c] * 2 - 1
        };
    }
    padded
}

/// Inclusive destination displacement ranges (r1, r2) per axis.
///
/// Open axis: [-(p-1)/2, (p-1)/2]. Periodic axis: every image within
/// `pbc` repetitions, [-(p*pbc - 1), p*pbc - 1].
pub fn kernel_ranges(padded: [usize; 3], pbc: [usize; 3]) -> ([isize; 3], [isize; 3]) {
    let mut r1 = [0isize; 3];
    let mut r2 = [0isize; 3];
    for c in 0..3 {
        let p = padded[c] as isize;
        if pbc[c] == 0 {
            r1[c] = -(p - 1) / 2;
            r2[c] = (p - 1) / 2;
        } else {
            let reach = p * pbc[c] as isize - 1;
            r1[c] = -reach;
            r2[c] = reach;
        }
    }
    // thin films
    if padded[Z] == 1 && pbc[Z] == 0 {
        r2[Z] = 0;
    }
    (r1, r2)
}

/// Map a signed displacement onto [0, n).
#[inline]
pub fn wrap_index(d: isize, n: usize) -> usize {
    d.rem_euclid(n as isize) as usize
}

/// Closest distance (in cells) between two cells whose centres are `d` apart.
/// Touching cells give 0.
#[inline]
pub fn delta_cell(d: isize) -> f64 {
    let a = d.unsigned_abs();
    a.saturating_sub(1) as f64
}
