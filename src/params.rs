// src/params.rs

use serde::{Deserialize, Serialize};

use crate::grid::{pad_size, Z};

/// Integration accuracy: the source face is subdivided until sub-cells are no
/// larger than (distance / accuracy).
pub const DEFAULT_ACCURACY: f64 = 6.0;

/// Everything that determines a kernel. Two keys are equal only if every
/// float is bit-identical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KernelKey {
    /// Logical grid size (nx, ny, nz).
    pub input_size: [usize; 3],
    /// Periodic image count per axis, 0 = open.
    pub pbc: [usize; 3],
    /// Cell size (m).
    pub cell_size: [f64; 3],
    /// Vertical offset of the observation plane (m).
    pub lift: f64,
}

impl KernelKey {
    pub fn new(input_size: [usize; 3], pbc: [usize; 3], cell_size: [f64; 3], lift: f64) -> Self {
        Self {
            input_size,
            pbc,
            cell_size,
            lift,
        }
    }

    /// Padded working size of the kernel grids.
    pub fn padded_size(&self) -> [usize; 3] {
        pad_size(self.input_size, self.pbc)
    }

    /// Single-layer geometry: the XZ and YZ couplings are not needed.
    pub fn is_2d(&self) -> bool {
        self.input_size[Z] == 1
    }

    /// Whether component (i, j), i <= j, is stored for this geometry.
    pub fn has_component(&self, i: usize, j: usize) -> bool {
        !(self.is_2d() && j == Z && i != Z)
    }
}

impl PartialEq for KernelKey {
    fn eq(&self, other: &Self) -> bool {
        self.input_size == other.input_size
            && self.pbc == other.pbc
            && self.lift.to_bits() == other.lift.to_bits()
            && self
                .cell_size
                .iter()
                .zip(other.cell_size.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for KernelKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_bitwise() {
        let a = KernelKey::new([4, 4, 1], [0, 0, 0], [1e-9, 1e-9, 1e-9], 0.0);
        let mut b = a;
        assert_eq!(a, b);
        b.lift = -0.0;
        assert_ne!(a, b, "0.0 and -0.0 are different cache keys");
        b.lift = 0.0;
        b.cell_size[2] = 1.0000000000000002e-9;
        assert_ne!(a, b);
    }

    #[test]
    fn thin_films_drop_out_of_plane_couplings() {
        let k = KernelKey::new([4, 4, 1], [0, 0, 0], [1e-9; 3], 0.0);
        assert!(k.is_2d());
        assert!(k.has_component(0, 0));
        assert!(k.has_component(0, 1));
        assert!(!k.has_component(0, 2));
        assert!(!k.has_component(1, 2));
        assert!(k.has_component(2, 2));
        assert_eq!(k.padded_size(), [8, 8, 1]);
    }
}
