// src/kernel/tensor.rs

use std::sync::Arc;

use crate::grid::{Grid3D, Z};
use crate::kernel::evaluate::KernelRows;

/// Component names, as used in cache file titles.
pub const COMPONENT_NAMES: [[&str; 3]; 3] = [
    ["N_00", "N_01", "N_02"],
    ["N_10", "N_11", "N_12"],
    ["N_20", "N_21", "N_22"],
];

/// Stray-field kernel K[source][destination].
///
/// Entries below the diagonal share their grid with the transposed entry.
/// For single-layer geometries the XZ/YZ couplings are `None`.
#[derive(Debug, Clone)]
pub struct KernelTensor {
    size: [usize; 3],
    comps: [[Option<Arc<Grid3D>>; 3]; 3],
}

impl KernelTensor {
    /// Build from the upper triangle. `drop_out_of_plane` discards XZ/YZ.
    pub fn from_rows(rows: KernelRows, size: [usize; 3], drop_out_of_plane: bool) -> Self {
        let mut upper: [[Option<Grid3D>; 3]; 3] = Default::default();
        for (i, row) in rows.into_iter().enumerate() {
            for (k, grid) in row.into_iter().enumerate() {
                upper[i][i + k] = Some(grid);
            }
        }
        if drop_out_of_plane {
            upper[0][Z] = None;
            upper[1][Z] = None;
        }
        Self::from_upper(upper, size)
    }

    /// Build from individually supplied upper-triangle grids (j >= i).
    /// Lower-triangle slots of `upper` are ignored.
    pub fn from_upper(upper: [[Option<Grid3D>; 3]; 3], size: [usize; 3]) -> Self {
        let mut comps: [[Option<Arc<Grid3D>>; 3]; 3] = Default::default();
        for (i, row) in upper.into_iter().enumerate() {
            for (j, grid) in row.into_iter().enumerate() {
                if j >= i {
                    comps[i][j] = grid.map(Arc::new);
                }
            }
        }
        for i in 0..3 {
            for j in 0..i {
                comps[i][j] = comps[j][i].clone();
            }
        }
        Self { size, comps }
    }

    /// Padded working size (nx, ny, nz).
    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Component (i, j), if present.
    pub fn get(&self, i: usize, j: usize) -> Option<&Grid3D> {
        self.comps[i][j].as_deref()
    }

    /// Shared handle to component (i, j).
    pub fn component(&self, i: usize, j: usize) -> Option<Arc<Grid3D>> {
        self.comps[i][j].clone()
    }

    /// Value of component (i, j) at wrapped index (z, y, x), if present.
    pub fn value(&self, i: usize, j: usize, z: usize, y: usize, x: usize) -> Option<f32> {
        self.get(i, j).map(|g| g.get(z, y, x))
    }

    /// True when K[j][i] is the same grid as K[i][j] for every pair.
    pub fn is_aliased_symmetric(&self) -> bool {
        (0..3).all(|i| {
            (0..3).all(|j| match (&self.comps[i][j], &self.comps[j][i]) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            })
        })
    }

    /// Largest absolute difference between matching components, or `None`
    /// if the two tensors do not have the same shape.
    pub fn max_abs_diff(&self, other: &KernelTensor) -> Option<f32> {
        if self.size != other.size {
            return None;
        }
        let mut worst = 0.0f32;
        for i in 0..3 {
            for j in i..3 {
                match (self.get(i, j), other.get(i, j)) {
                    (Some(a), Some(b)) => {
                        for (x, y) in a.data.iter().zip(b.data.iter()) {
                            worst = worst.max((x - y).abs());
                        }
                    }
                    (None, None) => {}
                    _ => return None,
                }
            }
        }
        Some(worst)
    }
}
