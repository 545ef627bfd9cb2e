//! Structured mesh generators with named boundary markers
//!
//! Used by tests, benchmarks and the demo binary. Boundary markers are named
//! after the side they cover; every marker is created fixed, callers flip
//! `moving` on the ones that carry surface motion.

use crate::mesh::topology::{BoundaryMarker, Element, MarkerKind};
use crate::mesh::Mesh;
use std::collections::HashMap;
use std::f64::consts::PI;

pub struct MeshGenerator;

impl MeshGenerator {
    /// Rectangle [0,lx]×[0,ly] split into nx×ny quadrilaterals
    ///
    /// Markers: "left", "right", "bottom", "top" (all walls).
    pub fn rectangle_quads(nx: usize, ny: usize, lx: f64, ly: f64) -> Mesh {
        let mut mesh = Mesh::new(2);
        let id = Self::structured_nodes_2d(&mut mesh, nx, ny, lx, ly);

        for j in 0..ny {
            for i in 0..nx {
                mesh.add_element(Element::quad([
                    id(i, j),
                    id(i + 1, j),
                    id(i + 1, j + 1),
                    id(i, j + 1),
                ]));
            }
        }

        Self::add_rectangle_markers(&mut mesh, nx, ny);
        mesh.finalize();
        mesh
    }

    /// Rectangle [0,lx]×[0,ly] with every cell split into two triangles
    pub fn rectangle_triangles(nx: usize, ny: usize, lx: f64, ly: f64) -> Mesh {
        let mut mesh = Mesh::new(2);
        let id = Self::structured_nodes_2d(&mut mesh, nx, ny, lx, ly);

        for j in 0..ny {
            for i in 0..nx {
                let (a, b, c, d) = (id(i, j), id(i + 1, j), id(i + 1, j + 1), id(i, j + 1));
                mesh.add_element(Element::triangle([a, b, c]));
                mesh.add_element(Element::triangle([a, c, d]));
            }
        }

        Self::add_rectangle_markers(&mut mesh, nx, ny);
        mesh.finalize();
        mesh
    }

    /// O-grid ring between two circles, quads ordered counter-clockwise
    ///
    /// Markers: "body" (inner circle, wall) and "farfield" (outer circle).
    /// Radial spacing grows geometrically with `stretch` (1.0 = uniform).
    pub fn annulus_quads(n_theta: usize, n_r: usize, r_in: f64, r_out: f64, stretch: f64) -> Mesh {
        let mut mesh = Mesh::new(2);

        // Radial stations
        let mut radii = Vec::with_capacity(n_r + 1);
        let total: f64 = (0..n_r).map(|k| stretch.powi(k as i32)).sum();
        let mut r = r_in;
        radii.push(r);
        for k in 0..n_r {
            r += (r_out - r_in) * stretch.powi(k as i32) / total;
            radii.push(r);
        }

        for &r in &radii {
            for j in 0..n_theta {
                let theta = 2.0 * PI * j as f64 / n_theta as f64;
                mesh.add_node(r * theta.cos(), r * theta.sin(), 0.0);
            }
        }
        let id = |i: usize, j: usize| i * n_theta + (j % n_theta);

        for i in 0..n_r {
            for j in 0..n_theta {
                mesh.add_element(Element::quad([id(i, j), id(i + 1, j), id(i + 1, j + 1), id(i, j + 1)]));
            }
        }

        let inner: Vec<usize> = (0..n_theta).map(|j| id(0, j)).collect();
        let outer: Vec<usize> = (0..n_theta).map(|j| id(n_r, j)).collect();
        mesh.add_marker(BoundaryMarker::new("body", MarkerKind::Wall, &inner));
        mesh.add_marker(BoundaryMarker::new("farfield", MarkerKind::FarField, &outer));
        mesh.finalize();
        mesh
    }

    /// Box [0,lx]×[0,ly]×[0,lz] with every hex cell split into 6 tetrahedra
    ///
    /// Each hexahedral cell is subdivided around the v000 → v111 diagonal;
    /// tets are re-oriented so every signed volume is positive.
    /// Markers: "xmin", "xmax", "ymin", "ymax", "zmin", "zmax".
    pub fn cube_tets(nx: usize, ny: usize, nz: usize, lx: f64, ly: f64, lz: f64) -> Mesh {
        let mut mesh = Mesh::new(3);
        let vertex_map = Self::structured_nodes_3d(&mut mesh, nx, ny, nz, lx, ly, lz);

        for iz in 0..nz {
            for iy in 0..ny {
                for ix in 0..nx {
                    Self::subdivide_hex_6tet(&mut mesh, &vertex_map, ix, iy, iz);
                }
            }
        }

        Self::add_cube_markers(&mut mesh, &vertex_map, nx, ny, nz);
        mesh.finalize();
        mesh
    }

    /// Box [0,lx]×[0,ly]×[0,lz] split into nx×ny×nz hexahedra
    pub fn cube_hexes(nx: usize, ny: usize, nz: usize, lx: f64, ly: f64, lz: f64) -> Mesh {
        let mut mesh = Mesh::new(3);
        let v = Self::structured_nodes_3d(&mut mesh, nx, ny, nz, lx, ly, lz);

        for iz in 0..nz {
            for iy in 0..ny {
                for ix in 0..nx {
                    mesh.add_element(Element::hex([
                        v[&(ix, iy, iz)],
                        v[&(ix + 1, iy, iz)],
                        v[&(ix + 1, iy + 1, iz)],
                        v[&(ix, iy + 1, iz)],
                        v[&(ix, iy, iz + 1)],
                        v[&(ix + 1, iy, iz + 1)],
                        v[&(ix + 1, iy + 1, iz + 1)],
                        v[&(ix, iy + 1, iz + 1)],
                    ]));
                }
            }
        }

        Self::add_cube_markers(&mut mesh, &v, nx, ny, nz);
        mesh.finalize();
        mesh
    }

    fn structured_nodes_2d(
        mesh: &mut Mesh,
        nx: usize,
        ny: usize,
        lx: f64,
        ly: f64,
    ) -> impl Fn(usize, usize) -> usize {
        let dx = lx / nx as f64;
        let dy = ly / ny as f64;
        for j in 0..=ny {
            for i in 0..=nx {
                mesh.add_node(i as f64 * dx, j as f64 * dy, 0.0);
            }
        }
        move |i, j| j * (nx + 1) + i
    }

    fn add_rectangle_markers(mesh: &mut Mesh, nx: usize, ny: usize) {
        let id = |i: usize, j: usize| j * (nx + 1) + i;
        let left: Vec<usize> = (0..=ny).map(|j| id(0, j)).collect();
        let right: Vec<usize> = (0..=ny).map(|j| id(nx, j)).collect();
        let bottom: Vec<usize> = (0..=nx).map(|i| id(i, 0)).collect();
        let top: Vec<usize> = (0..=nx).map(|i| id(i, ny)).collect();
        mesh.add_marker(BoundaryMarker::new("left", MarkerKind::Wall, &left));
        mesh.add_marker(BoundaryMarker::new("right", MarkerKind::Wall, &right));
        mesh.add_marker(BoundaryMarker::new("bottom", MarkerKind::Wall, &bottom));
        mesh.add_marker(BoundaryMarker::new("top", MarkerKind::Wall, &top));
    }

    fn structured_nodes_3d(
        mesh: &mut Mesh,
        nx: usize,
        ny: usize,
        nz: usize,
        lx: f64,
        ly: f64,
        lz: f64,
    ) -> HashMap<(usize, usize, usize), usize> {
        let dx = lx / nx as f64;
        let dy = ly / ny as f64;
        let dz = lz / nz as f64;

        let mut vertex_map = HashMap::new();
        for iz in 0..=nz {
            for iy in 0..=ny {
                for ix in 0..=nx {
                    let node_id = mesh.add_node(ix as f64 * dx, iy as f64 * dy, iz as f64 * dz);
                    vertex_map.insert((ix, iy, iz), node_id);
                }
            }
        }
        vertex_map
    }

    fn add_cube_markers(
        mesh: &mut Mesh,
        v: &HashMap<(usize, usize, usize), usize>,
        nx: usize,
        ny: usize,
        nz: usize,
    ) {
        let face = |pred: &dyn Fn(usize, usize, usize) -> bool| -> Vec<usize> {
            let mut pts: Vec<usize> = v
                .iter()
                .filter(|(key, _)| pred(key.0, key.1, key.2))
                .map(|(_, &n)| n)
                .collect();
            pts.sort_unstable();
            pts
        };
        let sides: [(&str, Vec<usize>); 6] = [
            ("xmin", face(&|i, _, _| i == 0)),
            ("xmax", face(&|i, _, _| i == nx)),
            ("ymin", face(&|_, j, _| j == 0)),
            ("ymax", face(&|_, j, _| j == ny)),
            ("zmin", face(&|_, _, k| k == 0)),
            ("zmax", face(&|_, _, k| k == nz)),
        ];
        for (tag, pts) in sides {
            mesh.add_marker(BoundaryMarker::new(tag, MarkerKind::Wall, &pts));
        }
    }

    /// Subdivide a hex into 6 tets around the v000 → v111 diagonal
    fn subdivide_hex_6tet(
        mesh: &mut Mesh,
        vertex_map: &HashMap<(usize, usize, usize), usize>,
        ix: usize,
        iy: usize,
        iz: usize,
    ) {
        let v000 = vertex_map[&(ix, iy, iz)];
        let v100 = vertex_map[&(ix + 1, iy, iz)];
        let v010 = vertex_map[&(ix, iy + 1, iz)];
        let v110 = vertex_map[&(ix + 1, iy + 1, iz)];
        let v001 = vertex_map[&(ix, iy, iz + 1)];
        let v101 = vertex_map[&(ix + 1, iy, iz + 1)];
        let v011 = vertex_map[&(ix, iy + 1, iz + 1)];
        let v111 = vertex_map[&(ix + 1, iy + 1, iz + 1)];

        let tets = [
            (v000, v100, v110, v111),
            (v000, v100, v111, v101),
            (v000, v010, v110, v111),
            (v000, v010, v111, v011),
            (v000, v001, v111, v101),
            (v000, v001, v111, v011),
        ];

        for &(a, b, c, d) in &tets {
            let p = |n: usize| mesh.geometry.nodes[n];
            let det_j = (p(b) - p(a)).dot(&(p(c) - p(a)).cross(&(p(d) - p(a))));
            // Swap the last two vertices if inverted
            let elem = if det_j < 0.0 { [a, b, d, c] } else { [a, b, c, d] };
            mesh.add_element(Element::tet(elem));
        }
    }
}
