//! Element validity after deformation.
//!
//! Signed areas and volumes of every element, a summary report, and the
//! Laplacian relaxation used by the optional SMOOTH phase. One inverted
//! element makes the finite-volume metrics of the moved grid meaningless.

use crate::mesh::geometry::Geometry;
use crate::mesh::topology::ElementKind;
use crate::mesh::Mesh;
use nalgebra::{Point3, Vector3};

/// Signed-volume summary of a mesh
#[derive(Debug, Clone)]
pub struct MeshQuality {
    /// Minimum signed element volume (must be > 0)
    pub min_volume: f64,
    /// Average signed element volume
    pub avg_volume: f64,
    /// Maximum signed element volume
    pub max_volume: f64,
    /// Index of the element with the smallest volume
    pub min_element: usize,
    /// Number of inverted or collapsed elements (volume <= 0)
    pub num_inverted: usize,
    /// Number of near-degenerate elements (volume < 1% of the average)
    pub num_degenerate: usize,
    /// Total elements
    pub total_elements: usize,
}

impl MeshQuality {
    /// Check if every element is valid
    pub fn is_valid(&self) -> bool {
        self.num_inverted == 0
    }

    /// One-line summary for the log
    pub fn report(&self) -> String {
        format!(
            "Mesh Quality: min_V={:.3e}, avg_V={:.3e}, inverted={}/{}, degenerate={}/{}",
            self.min_volume,
            self.avg_volume,
            self.num_inverted,
            self.total_elements,
            self.num_degenerate,
            self.total_elements
        )
    }
}

/// Signed volume of a tetrahedron
///
/// V = (v1-v0) · ((v2-v0) × (v3-v0)) / 6
///
/// V > 0: valid element
/// V = 0: degenerate (zero volume)
/// V < 0: inverted element
pub fn tet_volume(v0: &Point3<f64>, v1: &Point3<f64>, v2: &Point3<f64>, v3: &Point3<f64>) -> f64 {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let e3 = v3 - v0;
    e1.dot(&e2.cross(&e3)) / 6.0
}

/// Signed area of a triangle in the xy-plane
pub fn triangle_area(v0: &Point3<f64>, v1: &Point3<f64>, v2: &Point3<f64>) -> f64 {
    let a: Vector3<f64> = v1 - v0;
    let b: Vector3<f64> = v2 - v0;
    0.5 * (a.x * b.y - a.y * b.x)
}

/// Hexahedron split into 6 tetrahedra around the 0-6 diagonal
const HEX_TETS: [[usize; 4]; 6] = [
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
    [0, 5, 1, 6],
];

/// Signed area (2-D kinds) or volume (3-D kinds) of an element
///
/// Quadrilaterals and hexahedra are split into triangles/tetrahedra and the
/// parts summed, which is exact for planar quads and trilinear-flat hexes.
pub fn signed_volume(kind: ElementKind, pts: &[Point3<f64>]) -> f64 {
    match kind {
        ElementKind::Triangle => triangle_area(&pts[0], &pts[1], &pts[2]),
        ElementKind::Quadrilateral => {
            triangle_area(&pts[0], &pts[1], &pts[2]) + triangle_area(&pts[0], &pts[2], &pts[3])
        }
        ElementKind::Tetrahedron => tet_volume(&pts[0], &pts[1], &pts[2], &pts[3]),
        ElementKind::Hexahedron => HEX_TETS
            .iter()
            .map(|t| tet_volume(&pts[t[0]], &pts[t[1]], &pts[t[2]], &pts[t[3]]))
            .sum(),
    }
}

/// Smallest signed sub-volume of an element
///
/// A quad can have positive total area while one corner is folded; checking
/// every corner triangle catches that.
pub fn min_corner_volume(kind: ElementKind, pts: &[Point3<f64>]) -> f64 {
    match kind {
        ElementKind::Quadrilateral => [[0, 1, 2], [1, 2, 3], [2, 3, 0], [3, 0, 1]]
            .iter()
            .map(|t| triangle_area(&pts[t[0]], &pts[t[1]], &pts[t[2]]))
            .fold(f64::INFINITY, f64::min),
        ElementKind::Hexahedron => HEX_TETS
            .iter()
            .map(|t| tet_volume(&pts[t[0]], &pts[t[1]], &pts[t[2]], &pts[t[3]]))
            .fold(f64::INFINITY, f64::min),
        _ => signed_volume(kind, pts),
    }
}

/// Assess mesh quality from the smallest corner volume of every element
///
/// Uses parallel computation for large meshes (>1000 elements)
pub fn assess_mesh_quality(mesh: &Mesh) -> MeshQuality {
    let total_elements = mesh.num_elements();

    let volumes: Vec<f64> = if total_elements > 1000 {
        use rayon::prelude::*;
        mesh.connectivity
            .elements
            .par_iter()
            .map(|elem| min_corner_volume(elem.kind, &mesh.element_points(elem)))
            .collect()
    } else {
        mesh.connectivity
            .elements
            .iter()
            .map(|elem| min_corner_volume(elem.kind, &mesh.element_points(elem)))
            .collect()
    };

    summarize(&volumes)
}

fn summarize(volumes: &[f64]) -> MeshQuality {
    let mut min_volume = f64::INFINITY;
    let mut max_volume = f64::NEG_INFINITY;
    let mut min_element = 0;
    let mut sum_volume = 0.0;
    let mut num_inverted = 0;

    for (idx, &v) in volumes.iter().enumerate() {
        if v <= 0.0 {
            num_inverted += 1;
        }
        if v < min_volume {
            min_volume = v;
            min_element = idx;
        }
        max_volume = max_volume.max(v);
        sum_volume += v;
    }

    let total_elements = volumes.len();
    let avg_volume = if total_elements > 0 { sum_volume / total_elements as f64 } else { 0.0 };
    let num_degenerate = volumes
        .iter()
        .filter(|&&v| v > 0.0 && v < 0.01 * avg_volume.abs())
        .count();

    MeshQuality {
        min_volume,
        avg_volume,
        max_volume,
        min_element,
        num_inverted,
        num_degenerate,
        total_elements,
    }
}

/// Relax free nodes toward the centroid of their edge neighbours.
///
/// Each pass sets x ← (1 − α)·x + α·mean(neighbours) from the positions of
/// the previous pass. Nodes flagged in `fixed` keep the prescribed boundary.
pub fn smooth_laplacian(
    geometry: &mut Geometry,
    neighbors: &[Vec<usize>],
    fixed: &[bool],
    iterations: usize,
    alpha: f64,
) {
    for _ in 0..iterations {
        let previous = geometry.nodes.clone();
        for (p, x) in geometry.nodes.iter_mut().enumerate() {
            let around = &neighbors[p];
            if fixed[p] || around.is_empty() {
                continue;
            }
            let centroid = around.iter().map(|&q| previous[q].coords).sum::<Vector3<f64>>() / around.len() as f64;
            *x = Point3::from((1.0 - alpha) * previous[p].coords + alpha * centroid);
        }
    }
}

/// Build node-to-node adjacency from the mesh edges
pub fn build_node_neighbors(mesh: &Mesh) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::new(); mesh.num_nodes()];
    for &(i, j) in &mesh.connectivity.edges {
        neighbors[i].push(j);
        neighbors[j].push(i);
    }
    neighbors
}
