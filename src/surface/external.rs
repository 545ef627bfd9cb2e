//! Surface motion prescribed by external files.
//!
//! One file per physical iteration, named `<prefix>_<iter:05>.dat`. Each
//! data line holds a point index followed by its new absolute coordinates
//! (`point x y` in 2-D, `point x y z` in 3-D). Blank lines and lines starting
//! with `%` or `#` are ignored.

use nalgebra::Point3;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{MotionError, Result};
use crate::mesh::Mesh;

/// Motion file of iteration `iter`.
pub fn motion_file_name(dir: &Path, prefix: &str, iter: usize) -> PathBuf {
    dir.join(format!("{}_{:05}.dat", prefix, iter))
}

/// Parse point positions from a motion file.
pub fn read_motion<R: BufRead>(reader: R, dim: usize) -> Result<Vec<(usize, Point3<f64>)>> {
    let mut records = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < dim + 1 {
            return Err(MotionError::parse(format!(
                "motion file line {}: expected a point index and {} coordinates",
                line_no + 1,
                dim
            )));
        }
        let point: usize = fields[0]
            .parse()
            .map_err(|_| MotionError::parse(format!("motion file line {}: bad point index '{}'", line_no + 1, fields[0])))?;
        let mut xyz = [0.0; 3];
        for d in 0..dim {
            xyz[d] = fields[d + 1].parse().map_err(|_| {
                MotionError::parse(format!("motion file line {}: bad coordinate '{}'", line_no + 1, fields[d + 1]))
            })?;
        }
        records.push((point, Point3::from(xyz)));
    }
    Ok(records)
}

/// Read the motion file of iteration `iter` and store the resulting
/// displacements on the moving boundary vertices.
///
/// Returns the number of vertices updated. Points that are not on a moving
/// marker are skipped with a warning.
pub fn set_external_deformation(mesh: &mut Mesh, dir: &Path, prefix: &str, iter: usize) -> Result<usize> {
    let path = motion_file_name(dir, prefix, iter);
    let file = File::open(&path)?;
    let records = read_motion(BufReader::new(file), mesh.dim)?;
    let updated = apply_motion(mesh, &records);
    log::info!("External motion {}: {} boundary vertices updated", path.display(), updated);
    Ok(updated)
}

/// Convert absolute positions into `var_coord` displacements.
pub fn apply_motion(mesh: &mut Mesh, records: &[(usize, Point3<f64>)]) -> usize {
    let mut lookup: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
    for (m, marker) in mesh.markers.iter().enumerate().filter(|(_, m)| m.moving) {
        for (v, vertex) in marker.vertices.iter().enumerate() {
            lookup.entry(vertex.point).or_default().push((m, v));
        }
    }

    let mut updated = 0;
    let mut skipped = 0;
    for (point, target) in records {
        let Some(slots) = lookup.get(point) else {
            skipped += 1;
            continue;
        };
        let mut d = target - mesh.geometry.nodes[*point];
        if mesh.dim == 2 {
            d.z = 0.0;
        }
        for &(m, v) in slots {
            mesh.markers[m].vertices[v].var_coord = d;
            updated += 1;
        }
    }
    if skipped > 0 {
        log::warn!("External motion: {} points are not on a moving marker and were ignored", skipped);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshGenerator;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_file_name_is_zero_padded() {
        let p = motion_file_name(Path::new("/tmp"), "mesh_motion", 42);
        assert_eq!(p, PathBuf::from("/tmp/mesh_motion_00042.dat"));
    }

    #[test]
    fn test_parse_skips_comments() {
        let text = "% header\n\n3 0.5 0.25\n# note\n7 1.0 2.0\n";
        let recs = read_motion(text.as_bytes(), 2).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].0, 3);
        assert_relative_eq!(recs[1].1.y, 2.0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(read_motion("3 0.5\n".as_bytes(), 2), Err(MotionError::Parse(_))));
        assert!(matches!(read_motion("x 0.5 0.1\n".as_bytes(), 2), Err(MotionError::Parse(_))));
    }

    #[test]
    fn test_external_file_sets_displacements() {
        let mut mesh = MeshGenerator::rectangle_quads(2, 2, 1.0, 1.0);
        let right = mesh.marker_index("right").unwrap();
        mesh.markers[right].moving = true;

        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(motion_file_name(dir.path(), "motion", 3)).unwrap();
        // Node 5 is (1, 0.5) on the right marker; node 4 is interior
        writeln!(f, "5 1.1 0.5").unwrap();
        writeln!(f, "4 0.6 0.5").unwrap();
        drop(f);

        let n = set_external_deformation(&mut mesh, dir.path(), "motion", 3).unwrap();
        assert_eq!(n, 1);
        let v = mesh.markers[right].vertex_of_point(5).unwrap();
        assert_relative_eq!(mesh.markers[right].vertices[v].var_coord.x, 0.1, epsilon = 1e-14);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut mesh = MeshGenerator::rectangle_quads(1, 1, 1.0, 1.0);
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            set_external_deformation(&mut mesh, dir.path(), "motion", 0),
            Err(MotionError::Io(_))
        ));
    }
}
