// src/ovf.rs
//
// OOMMF OVF 2.0 scalar files (valuedim 1, "Data Binary 4"), used for the
// kernel cache. One file holds one kernel component.
//
// Binary4 uses little-endian floats and starts with the OVF2 check value
// 1234567.0f. Values are stored x fastest, then y, then z.

use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{KernelError, Result};
use crate::grid::{Grid3D, X, Y, Z};

const CHECK_VALUE: f32 = 1234567.0;

/// Header metadata of a scalar OVF file.
#[derive(Clone, Debug, PartialEq)]
pub struct OvfMeta {
    pub name: String,
    pub unit: String,
    pub mesh_unit: String,
    pub cell_size: [f64; 3],
    pub time: f64,
    /// Extra `# Desc:` lines as (key, value) pairs, written as `key: value`.
    pub desc: Vec<(String, String)>,
}

impl OvfMeta {
    /// Metadata for a dimensionless kernel component on a mesh in metres.
    pub fn kernel_component(name: &str, cell_size: [f64; 3]) -> Self {
        Self {
            name: name.to_string(),
            unit: "1".to_string(),
            mesh_unit: "m".to_string(),
            cell_size,
            time: 0.0,
            desc: vec![],
        }
    }

    pub fn with_desc<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.desc.push((key.into(), value.into()));
        self
    }

    /// Value of a `# Desc: key: value` line.
    pub fn desc_value(&self, key: &str) -> Option<&str> {
        self.desc
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(())
}

/// Write a scalar grid as OVF 2.0 binary4.
pub fn write_ovf2_scalar_binary4(path: &Path, grid: &Grid3D, meta: &OvfMeta) -> Result<()> {
    ensure_parent_dir(path)?;

    let [nx, ny, nz] = grid.size;
    let [dx, dy, dz] = meta.cell_size;

    let mut f = BufWriter::new(File::create(path)?);

    writeln!(f, "# OOMMF OVF 2.0")?;
    writeln!(f, "# Segment count: 1")?;
    writeln!(f, "# Begin: Segment")?;
    writeln!(f, "# Begin: Header")?;
    writeln!(f, "# Title: {}", meta.name)?;
    writeln!(f, "# meshtype: rectangular")?;
    writeln!(f, "# meshunit: {}", meta.mesh_unit)?;

    writeln!(f, "# xmin: 0")?;
    writeln!(f, "# ymin: 0")?;
    writeln!(f, "# zmin: 0")?;
    writeln!(f, "# xmax: {:.17e}", nx as f64 * dx)?;
    writeln!(f, "# ymax: {:.17e}", ny as f64 * dy)?;
    writeln!(f, "# zmax: {:.17e}", nz as f64 * dz)?;

    writeln!(f, "# valuedim: 1")?;
    writeln!(f, "# valuelabels: {}", meta.name)?;
    writeln!(f, "# valueunits: {}", meta.unit)?;

    writeln!(f, "# Desc: Total simulation time:  {:e}  s", meta.time)?;
    for (k, v) in &meta.desc {
        writeln!(f, "# Desc: {}: {}", k, v)?;
    }

    writeln!(f, "# xbase: {:.17e}", 0.5 * dx)?;
    writeln!(f, "# ybase: {:.17e}", 0.5 * dy)?;
    writeln!(f, "# zbase: {:.17e}", 0.5 * dz)?;
    writeln!(f, "# xnodes: {}", nx)?;
    writeln!(f, "# ynodes: {}", ny)?;
    writeln!(f, "# znodes: {}", nz)?;
    writeln!(f, "# xstepsize: {:.17e}", dx)?;
    writeln!(f, "# ystepsize: {:.17e}", dy)?;
    writeln!(f, "# zstepsize: {:.17e}", dz)?;

    writeln!(f, "# End: Header")?;
    writeln!(f, "# Begin: Data Binary 4")?;

    f.write_all(&CHECK_VALUE.to_le_bytes())?;
    for v in &grid.data {
        f.write_all(&v.to_le_bytes())?;
    }

    writeln!(f)?;
    writeln!(f, "# End: Data Binary 4")?;
    writeln!(f, "# End: Segment")?;
    f.flush()?;
    Ok(())
}

/// Raw header fields as read from disk.
#[derive(Debug, Default)]
struct Header {
    title: Option<String>,
    mesh_unit: Option<String>,
    value_dim: Option<String>,
    value_unit: Option<String>,
    time: f64,
    desc: Vec<(String, String)>,
    nodes: [Option<String>; 3],
    step: [Option<String>; 3],
}

fn parse_field<T: std::str::FromStr>(path: &Path, key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| KernelError::BadHeader {
        path: path.to_path_buf(),
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn required<'a>(path: &Path, key: &'static str, v: &'a Option<String>) -> Result<&'a str> {
    v.as_deref().ok_or(KernelError::MissingHeader {
        path: path.to_path_buf(),
        key,
    })
}

fn fmt_nodes(size: [usize; 3]) -> String {
    format!("{}x{}x{}", size[X], size[Y], size[Z])
}

/// Read a scalar OVF 2.0 binary4 file written by `write_ovf2_scalar_binary4`.
///
/// With `expected_size` set, a file for another grid is rejected before any
/// data is read. Node counts that overflow, or that need more bytes than the
/// file holds, are errors rather than allocations.
pub fn read_ovf2_scalar_binary4(
    path: &Path,
    expected_size: Option<[usize; 3]>,
) -> Result<(Grid3D, OvfMeta)> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut r = BufReader::new(file);

    let mut header = Header::default();
    let mut line = String::new();
    let mut in_data = false;
    loop {
        line.clear();
        if r.read_line(&mut line)? == 0 {
            break;
        }
        let body = match line.trim_end().strip_prefix('#') {
            Some(b) => b.trim(),
            None => continue,
        };
        let (key, value) = match body.split_once(':') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim()),
            None => continue,
        };
        match key.as_str() {
            "title" => header.title = Some(value.to_string()),
            "meshunit" => header.mesh_unit = Some(value.to_string()),
            "valuedim" => header.value_dim = Some(value.to_string()),
            "valueunits" => header.value_unit = Some(value.to_string()),
            "xnodes" => header.nodes[X] = Some(value.to_string()),
            "ynodes" => header.nodes[Y] = Some(value.to_string()),
            "znodes" => header.nodes[Z] = Some(value.to_string()),
            "xstepsize" => header.step[X] = Some(value.to_string()),
            "ystepsize" => header.step[Y] = Some(value.to_string()),
            "zstepsize" => header.step[Z] = Some(value.to_string()),
            "desc" => {
                if let Some(t) = value.strip_prefix("Total simulation time:") {
                    let t = t.trim().trim_end_matches('s').trim();
                    header.time = parse_field(path, "Total simulation time", t)?;
                } else if let Some((k, v)) = value.split_once(':') {
                    header.desc.push((k.trim().to_string(), v.trim().to_string()));
                }
            }
            "begin" if value.eq_ignore_ascii_case("Data Binary 4") => {
                in_data = true;
                break;
            }
            "begin" if value.to_ascii_lowercase().starts_with("data") => {
                return Err(KernelError::BadHeader {
                    path: path.to_path_buf(),
                    key: "Begin".to_string(),
                    value: value.to_string(),
                });
            }
            _ => {}
        }
    }
    if !in_data {
        return Err(KernelError::MissingHeader {
            path: path.to_path_buf(),
            key: "Begin: Data Binary 4",
        });
    }

    let dim: usize = parse_field(path, "valuedim", required(path, "valuedim", &header.value_dim)?)?;
    if dim != 1 {
        return Err(KernelError::Mismatch {
            path: path.to_path_buf(),
            field: "valuedim",
            expected: "1".to_string(),
            found: dim.to_string(),
        });
    }

    let keys_nodes = ["xnodes", "ynodes", "znodes"];
    let keys_step = ["xstepsize", "ystepsize", "zstepsize"];
    let mut size = [0usize; 3];
    let mut cell_size = [0.0f64; 3];
    for c in 0..3 {
        size[c] = parse_field(path, keys_nodes[c], required(path, keys_nodes[c], &header.nodes[c])?)?;
        cell_size[c] = parse_field(path, keys_step[c], required(path, keys_step[c], &header.step[c])?)?;
    }

    if let Some(expected) = expected_size {
        if size != expected {
            return Err(KernelError::Mismatch {
                path: path.to_path_buf(),
                field: "grid size",
                expected: fmt_nodes(expected),
                found: fmt_nodes(size),
            });
        }
    }
    let n = size
        .iter()
        .try_fold(1usize, |acc, &s| acc.checked_mul(s))
        .ok_or_else(|| KernelError::BadHeader {
            path: path.to_path_buf(),
            key: "xnodes*ynodes*znodes".to_string(),
            value: fmt_nodes(size),
        })?;
    let fits = n
        .checked_mul(4)
        .and_then(|bytes| u64::try_from(bytes).ok())
        .map_or(false, |bytes| bytes <= file_len);
    if !fits {
        return Err(KernelError::Truncated {
            path: path.to_path_buf(),
            expected: n,
        });
    }

    let mut buf4 = [0u8; 4];
    r.read_exact(&mut buf4)?;
    let check = f32::from_le_bytes(buf4);
    if check != CHECK_VALUE {
        return Err(KernelError::BadCheckValue {
            path: path.to_path_buf(),
            found: check,
        });
    }

    let mut grid = Grid3D::zeros(size);
    for v in grid.data.iter_mut() {
        r.read_exact(&mut buf4).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => KernelError::Truncated {
                path: path.to_path_buf(),
                expected: n,
            },
            _ => KernelError::Io(e),
        })?;
        *v = f32::from_le_bytes(buf4);
    }

    let meta = OvfMeta {
        name: required(path, "Title", &header.title)?.to_string(),
        unit: header.value_unit.unwrap_or_else(|| "1".to_string()),
        mesh_unit: header.mesh_unit.unwrap_or_else(|| "m".to_string()),
        cell_size,
        time: header.time,
        desc: header.desc,
    };
    Ok((grid, meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(size: [usize; 3]) -> Grid3D {
        let mut g = Grid3D::zeros(size);
        for (i, v) in g.data.iter_mut().enumerate() {
            *v = i as f32 * 0.25 - 3.0;
        }
        g
    }

    #[test]
    fn scalar_file_preserves_values_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("N_01.ovf");
        let grid = ramp([4, 3, 2]);
        let meta = OvfMeta::kernel_component("N_01", [1e-9, 2e-9, 0.5e-9]).with_desc("lift", "5e-8");

        write_ovf2_scalar_binary4(&path, &grid, &meta).unwrap();
        let (back, back_meta) = read_ovf2_scalar_binary4(&path, None).unwrap();

        assert_eq!(back, grid);
        assert_eq!(back_meta, meta);
        assert_eq!(back_meta.desc_value("lift"), Some("5e-8"));
    }

    #[test]
    fn truncated_data_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N_00.ovf");
        let grid = ramp([4, 4, 1]);
        write_ovf2_scalar_binary4(&path, &grid, &OvfMeta::kernel_component("N_00", [1.0; 3])).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let cut = bytes.len() - 40;
        std::fs::write(&path, &bytes[..cut]).unwrap();

        let err = read_ovf2_scalar_binary4(&path, None).unwrap_err();
        assert!(matches!(err, KernelError::Truncated { .. }), "{}", err);
    }

    #[test]
    fn text_garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.ovf");
        std::fs::write(&path, "not an ovf file\n").unwrap();
        let err = read_ovf2_scalar_binary4(&path, None).unwrap_err();
        assert!(matches!(err, KernelError::MissingHeader { .. }), "{}", err);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_ovf2_scalar_binary4(&dir.path().join("absent.ovf"), None).unwrap_err();
        assert!(err.is_not_found());
    }

    /// Rewrite the node counts in the text header of a valid file.
    fn with_nodes(bytes: &[u8], nodes: &str) -> Vec<u8> {
        let marker = b"# Begin: Data Binary 4\n";
        let at = bytes
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        let header = std::str::from_utf8(&bytes[..at]).unwrap();
        let header: String = header
            .lines()
            .map(|l| {
                if l.starts_with("# xnodes:") || l.starts_with("# ynodes:") || l.starts_with("# znodes:") {
                    format!("{} {}\n", &l[..9], nodes)
                } else {
                    format!("{}\n", l)
                }
            })
            .collect();
        let mut out = header.into_bytes();
        out.extend_from_slice(&bytes[at..]);
        out
    }

    #[test]
    fn huge_node_counts_are_rejected_without_allocating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N_00.ovf");
        write_ovf2_scalar_binary4(&path, &ramp([4, 4, 1]), &OvfMeta::kernel_component("N_00", [1.0; 3])).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        std::fs::write(&path, with_nodes(&bytes, "200000")).unwrap();
        let err = read_ovf2_scalar_binary4(&path, None).unwrap_err();
        assert!(matches!(err, KernelError::Truncated { .. }), "{}", err);
        let err = read_ovf2_scalar_binary4(&path, Some([4, 4, 1])).unwrap_err();
        assert!(matches!(err, KernelError::Mismatch { field: "grid size", .. }), "{}", err);

        std::fs::write(&path, with_nodes(&bytes, &usize::MAX.to_string())).unwrap();
        let err = read_ovf2_scalar_binary4(&path, None).unwrap_err();
        assert!(matches!(err, KernelError::BadHeader { .. }), "{}", err);
    }

    #[test]
    fn expected_size_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N_11.ovf");
        write_ovf2_scalar_binary4(&path, &ramp([4, 3, 2]), &OvfMeta::kernel_component("N_11", [1.0; 3])).unwrap();
        assert!(read_ovf2_scalar_binary4(&path, Some([4, 3, 2])).is_ok());
        let err = read_ovf2_scalar_binary4(&path, Some([3, 4, 2])).unwrap_err();
        assert!(matches!(err, KernelError::Mismatch { field: "grid size", .. }), "{}", err);
    }
}
