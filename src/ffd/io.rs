//! FFD box persistence and visualisation output.
//!
//! The box description is a tagged `KEY= value` block that can be appended to
//! a mesh file; everything before the `FFD_NBOX=` line is ignored on read.
//!
//! ```text
//! FFD_NBOX= 1
//! FFD_NLEVEL= 1
//! FFD_TAG= wing
//! FFD_LEVEL= 0
//! FFD_DEGREE_I= 2
//! FFD_DEGREE_J= 1
//! FFD_DEGREE_K= 1
//! FFD_PARENTS= 0
//! FFD_CHILDREN= 0
//! FFD_CORNER_POINTS= 8
//! x y z                      (8 lines)
//! FFD_CONTROL_POINTS= 12
//! i j k x y z                (one line per control point)
//! FFD_SURFACE_POINTS= 2
//! marker_tag point u v w     (one line per surface point)
//! ```

use std::io::{BufRead, Write};

use nalgebra::Point3;

use super::chunk::{FfdBox, SurfacePoint};
use super::hierarchy::FfdArena;
use crate::error::{MotionError, Result};
use crate::mesh::Mesh;

/// Write every box of the arena.
pub fn write_ffd_info<W: Write>(arena: &FfdArena, mesh: &Mesh, mut w: W) -> Result<()> {
    writeln!(w, "FFD_NBOX= {}", arena.len())?;
    writeln!(w, "FFD_NLEVEL= {}", arena.n_levels())?;

    for idx in 0..arena.len() {
        let b = arena.get(idx);
        let [l, m, n] = b.degree();
        writeln!(w, "FFD_TAG= {}", b.tag())?;
        writeln!(w, "FFD_LEVEL= {}", b.level())?;
        writeln!(w, "FFD_DEGREE_I= {}", l)?;
        writeln!(w, "FFD_DEGREE_J= {}", m)?;
        writeln!(w, "FFD_DEGREE_K= {}", n)?;

        let parent_tags = relation_tags(arena, arena.parents_of(idx), b.parents());
        writeln!(w, "FFD_PARENTS= {}", parent_tags.len())?;
        for t in &parent_tags {
            writeln!(w, "{}", t)?;
        }
        let child_tags = relation_tags(arena, arena.children_of(idx), b.children());
        writeln!(w, "FFD_CHILDREN= {}", child_tags.len())?;
        for t in &child_tags {
            writeln!(w, "{}", t)?;
        }

        writeln!(w, "FFD_CORNER_POINTS= 8")?;
        for p in b.corners() {
            writeln!(w, "{:.15e}\t{:.15e}\t{:.15e}", p.x, p.y, p.z)?;
        }

        writeln!(w, "FFD_CONTROL_POINTS= {}", b.n_control_points())?;
        for (i, j, k) in b.cp_indices() {
            let p = b.control_point(i, j, k);
            writeln!(w, "{}\t{}\t{}\t{:.15e}\t{:.15e}\t{:.15e}", i, j, k, p.x, p.y, p.z)?;
        }

        writeln!(w, "FFD_SURFACE_POINTS= {}", b.n_surface_points())?;
        for sp in b.surface_points() {
            let [u, v, wp] = sp.parametric;
            writeln!(
                w,
                "{}\t{}\t{:.15e}\t{:.15e}\t{:.15e}",
                mesh.markers[sp.marker].tag, sp.point, u, v, wp
            )?;
        }
    }
    Ok(())
}

fn relation_tags(arena: &FfdArena, resolved: &[usize], declared: &[String]) -> Vec<String> {
    if resolved.is_empty() {
        declared.to_vec()
    } else {
        resolved.iter().map(|&i| arena.get(i).tag().to_string()).collect()
    }
}

/// Line cursor skipping blank lines.
struct Lines<R: BufRead> {
    inner: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> Lines<R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        for line in self.inner.by_ref() {
            let line = line?;
            self.line_no += 1;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
        Ok(None)
    }

    fn expect_line(&mut self) -> Result<String> {
        self.next_line()?
            .ok_or_else(|| MotionError::parse(format!("unexpected end of FFD block after line {}", self.line_no)))
    }

    fn keyword(&mut self, key: &str) -> Result<String> {
        let line = self.expect_line()?;
        match line.split_once('=') {
            Some((k, v)) if k.trim() == key => Ok(v.trim().to_string()),
            _ => Err(MotionError::parse(format!(
                "line {}: expected '{}=', found '{}'",
                self.line_no, key, line
            ))),
        }
    }

    fn keyword_usize(&mut self, key: &str) -> Result<usize> {
        let v = self.keyword(key)?;
        v.parse()
            .map_err(|_| MotionError::parse(format!("line {}: '{}' is not a count for {}", self.line_no, v, key)))
    }
}

fn parse_numbers<T: std::str::FromStr>(line: &str, count: usize, line_no: usize) -> Result<Vec<T>> {
    let values: Vec<T> = line
        .split_whitespace()
        .map(|s| s.parse::<T>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| MotionError::parse(format!("line {}: malformed numbers '{}'", line_no, line)))?;
    if values.len() < count {
        return Err(MotionError::parse(format!(
            "line {}: expected {} values, found {}",
            line_no,
            count,
            values.len()
        )));
    }
    Ok(values)
}

/// Read an FFD block, resolving marker tags and point indices on `mesh`.
///
/// Boxes stored without surface points get them recomputed by point
/// inversion with the given tolerance and iteration cap. Returns the arena
/// with its hierarchy resolved.
pub fn read_ffd_info<R: BufRead>(reader: R, mesh: &Mesh, tol: f64, max_iterations: usize) -> Result<FfdArena> {
    let mut lines = Lines { inner: reader.lines(), line_no: 0 };

    // Skip the mesh part of the file
    let n_box = loop {
        match lines.next_line()? {
            Some(line) => {
                if let Some(v) = line.strip_prefix("FFD_NBOX=") {
                    break v
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| MotionError::parse(format!("invalid FFD_NBOX value '{}'", v.trim())))?;
                }
            }
            None => return Ok(FfdArena::new()),
        }
    };
    let _n_level = lines.keyword_usize("FFD_NLEVEL")?;

    let mut arena = FfdArena::new();
    let mut recompute = Vec::new();

    for _ in 0..n_box {
        let tag = lines.keyword("FFD_TAG")?;
        let level = lines.keyword_usize("FFD_LEVEL")?;
        let degree = [
            lines.keyword_usize("FFD_DEGREE_I")?,
            lines.keyword_usize("FFD_DEGREE_J")?,
            lines.keyword_usize("FFD_DEGREE_K")?,
        ];
        let mut b = FfdBox::new(&tag, degree)?;
        b.set_level(level);

        let n_parents = lines.keyword_usize("FFD_PARENTS")?;
        for _ in 0..n_parents {
            let t = lines.expect_line()?;
            b.add_parent(&t);
        }
        let n_children = lines.keyword_usize("FFD_CHILDREN")?;
        for _ in 0..n_children {
            let t = lines.expect_line()?;
            b.add_child(&t);
        }

        let n_corners = lines.keyword_usize("FFD_CORNER_POINTS")?;
        if n_corners != 8 {
            return Err(MotionError::parse(format!("FFD box '{}': {} corner points, expected 8", tag, n_corners)));
        }
        for c in 0..8 {
            let line = lines.expect_line()?;
            let v: Vec<f64> = parse_numbers(&line, 3, lines.line_no)?;
            b.set_corner_point(c, Point3::new(v[0], v[1], v[2]));
        }

        let n_cp = lines.keyword_usize("FFD_CONTROL_POINTS")?;
        let expected = b.n_control_points();
        if n_cp != expected {
            return Err(MotionError::DegreeMismatch { tag, degree, expected, found: n_cp });
        }
        for _ in 0..n_cp {
            let line = lines.expect_line()?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return Err(MotionError::parse(format!("line {}: control point needs 6 values", lines.line_no)));
            }
            let ijk: Vec<usize> = parse_numbers(&fields[..3].join(" "), 3, lines.line_no)?;
            let xyz: Vec<f64> = parse_numbers(&fields[3..6].join(" "), 3, lines.line_no)?;
            if ijk[0] > degree[0] || ijk[1] > degree[1] || ijk[2] > degree[2] {
                return Err(MotionError::DegreeMismatch { tag, degree, expected, found: n_cp });
            }
            b.set_control_point(ijk[0], ijk[1], ijk[2], Point3::new(xyz[0], xyz[1], xyz[2]));
        }

        let n_sp = lines.keyword_usize("FFD_SURFACE_POINTS")?;
        for _ in 0..n_sp {
            let line = lines.expect_line()?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return Err(MotionError::parse(format!("line {}: surface point needs 5 values", lines.line_no)));
            }
            let marker = mesh
                .marker_index(fields[0])
                .ok_or_else(|| MotionError::UnknownMarker(fields[0].to_string()))?;
            let point: usize = fields[1]
                .parse()
                .map_err(|_| MotionError::parse(format!("line {}: bad point index '{}'", lines.line_no, fields[1])))?;
            let vertex = mesh.markers[marker].vertex_of_point(point).ok_or_else(|| {
                MotionError::parse(format!("point {} is not on marker '{}'", point, fields[0]))
            })?;
            let uvw: Vec<f64> = parse_numbers(&fields[2..5].join(" "), 3, lines.line_no)?;
            b.add_surface_point(SurfacePoint {
                marker,
                vertex,
                point,
                cartesian: mesh.geometry.nodes[point],
                parametric: [uvw[0], uvw[1], uvw[2]],
            });
        }

        if n_sp == 0 {
            recompute.push(arena.len());
        }
        arena.add(b);
    }

    arena.resolve_hierarchy()?;

    for idx in recompute {
        let b = arena.get_mut(idx);
        log::info!("FFD box '{}': no stored parametric coordinates, recomputing", b.tag());
        b.set_parametric_coord(mesh, tol, max_iterations);
    }

    Ok(arena)
}

/// Legacy VTK structured grid of the control lattice.
pub fn write_paraview<W: Write>(b: &FfdBox, mut w: W) -> Result<()> {
    let [l, m, n] = b.degree();
    writeln!(w, "# vtk DataFile Version 3.0")?;
    writeln!(w, "FFD box {}", b.tag())?;
    writeln!(w, "ASCII")?;
    writeln!(w, "DATASET STRUCTURED_GRID")?;
    writeln!(w, "DIMENSIONS {} {} {}", l + 1, m + 1, n + 1)?;
    writeln!(w, "POINTS {} double", b.n_control_points())?;
    for (i, j, k) in b.cp_indices() {
        let p = b.control_point(i, j, k);
        writeln!(w, "{:.10e} {:.10e} {:.10e}", p.x, p.y, p.z)?;
    }
    Ok(())
}

/// Tecplot ASCII zone of the control lattice.
pub fn write_tecplot<W: Write>(b: &FfdBox, mut w: W) -> Result<()> {
    let [l, m, n] = b.degree();
    writeln!(w, "TITLE = \"FFD box {}\"", b.tag())?;
    writeln!(w, "VARIABLES = \"x\", \"y\", \"z\"")?;
    writeln!(
        w,
        "ZONE T=\"{}\", I={}, J={}, K={}, DATAPACKING=POINT",
        b.tag(),
        l + 1,
        m + 1,
        n + 1
    )?;
    for (i, j, k) in b.cp_indices() {
        let p = b.control_point(i, j, k);
        writeln!(w, "{:.10e}\t{:.10e}\t{:.10e}", p.x, p.y, p.z)?;
    }
    Ok(())
}
