//! Donor search across sliding interfaces
//!
//! Every vertex of a receiving send/receive marker whose matching zone
//! differs from its own zone is located inside a triangle of the donor zone
//! by a brute-force scan. Quadrilaterals are split along the 0-2 diagonal.
//! The search is O(vertices × elements); no spatial index is kept.

use nalgebra::Point3;

use crate::error::{MotionError, Result};
use crate::mesh::{ElementKind, MarkerKind, Mesh};

/// Tolerance on the barycentric weights so points on an edge are found.
pub const BARYCENTRIC_EPS: f64 = 1e-10;

/// Donor triangle of one receiving vertex
#[derive(Debug, Clone, PartialEq)]
pub struct DonorRecord {
    /// Receiving zone, marker, vertex and point
    pub zone: usize,
    pub marker: usize,
    pub vertex: usize,
    pub point: usize,
    pub donor_zone: usize,
    /// Element of the donor zone containing the point
    pub element: usize,
    /// Donor triangle corner points
    pub nodes: [usize; 3],
    pub weights: [f64; 3],
}

impl DonorRecord {
    /// Interpolate a nodal field of the donor zone at the receiving point.
    pub fn interpolate(&self, values: &[f64]) -> f64 {
        self.nodes.iter().zip(&self.weights).map(|(&n, w)| w * values[n]).sum()
    }

    /// Interpolate every variable of a point-major field with `n_var`
    /// values per point.
    pub fn interpolate_vars(&self, values: &[f64], n_var: usize) -> Vec<f64> {
        (0..n_var)
            .map(|v| {
                self.nodes
                    .iter()
                    .zip(&self.weights)
                    .map(|(&n, w)| w * values[n * n_var + v])
                    .sum()
            })
            .collect()
    }
}

/// Linear basis functions of triangle (x0, x1, x2) at `p`, from the area
/// formula.
///
/// Returns `None` for a degenerate triangle.
pub fn barycentric(p: &Point3<f64>, x0: &Point3<f64>, x1: &Point3<f64>, x2: &Point3<f64>) -> Option<[f64; 3]> {
    let a = x0 - x2;
    let b = x1 - x2;
    let area = 0.5 * (a.x * b.y - a.y * b.x).abs();
    if area <= f64::EPSILON * (a.norm() * b.norm()).max(f64::MIN_POSITIVE) {
        return None;
    }
    let s = 0.5 / area;
    let basis = |xj: &Point3<f64>, xk: &Point3<f64>| {
        let a0 = xj.x * xk.y - xk.x * xj.y;
        let b0 = xj.y - xk.y;
        let c0 = xk.x - xj.x;
        s * (a0 + b0 * p.x + c0 * p.y)
    };
    let n = [basis(x1, x2), basis(x2, x0), basis(x0, x1)];
    // The area is unsigned: clockwise triangles flip every basis function
    let orientation = (x1 - x0).x * (x2 - x0).y - (x1 - x0).y * (x2 - x0).x;
    Some(if orientation < 0.0 { n.map(|v| -v) } else { n })
}

fn inside(weights: &[f64; 3]) -> bool {
    weights.iter().all(|&w| (-BARYCENTRIC_EPS..=1.0 + BARYCENTRIC_EPS).contains(&w))
}

/// Corner triples of the triangles making up an element.
fn element_triangles(kind: ElementKind, nodes: &[usize]) -> Vec<[usize; 3]> {
    match kind {
        ElementKind::Triangle => vec![[nodes[0], nodes[1], nodes[2]]],
        ElementKind::Quadrilateral => vec![[nodes[0], nodes[1], nodes[2]], [nodes[0], nodes[2], nodes[3]]],
        _ => Vec::new(),
    }
}

/// First donor triangle of `donor` containing `p`.
fn find_donor(donor: &Mesh, p: &Point3<f64>) -> Option<(usize, [usize; 3], [f64; 3])> {
    let x = &donor.geometry.nodes;
    for (e, elem) in donor.connectivity.elements.iter().enumerate() {
        for tri in element_triangles(elem.kind, &elem.nodes) {
            if let Some(w) = barycentric(p, &x[tri[0]], &x[tri[1]], &x[tri[2]]) {
                if inside(&w) {
                    return Some((e, tri, w));
                }
            }
        }
    }
    None
}

/// Locate the donor of every receiving sliding-interface vertex.
///
/// Vertices without a containing donor element are left out and reported
/// with a warning.
pub fn locate_donors(zones: &[&Mesh]) -> Result<Vec<DonorRecord>> {
    let mut records = Vec::new();
    let mut missing = 0;

    for (z, mesh) in zones.iter().enumerate() {
        for (m, marker) in mesh.markers.iter().enumerate() {
            if marker.kind != (MarkerKind::SendReceive { receive: true }) {
                continue;
            }
            for (v, vertex) in marker.vertices.iter().enumerate() {
                let Some(dz) = vertex.matching_zone.filter(|&dz| dz != z) else {
                    continue;
                };
                let donor = zones.get(dz).ok_or_else(|| {
                    MotionError::config(format!("marker '{}' of zone {} matches missing zone {}", marker.tag, z, dz))
                })?;
                if mesh.dim != 2 || donor.dim != 2 {
                    return Err(MotionError::Unsupported("sliding interfaces in 3-D".to_string()));
                }

                let p = mesh.geometry.nodes[vertex.point];
                match find_donor(donor, &p) {
                    Some((element, nodes, weights)) => records.push(DonorRecord {
                        zone: z,
                        marker: m,
                        vertex: v,
                        point: vertex.point,
                        donor_zone: dz,
                        element,
                        nodes,
                        weights,
                    }),
                    None => {
                        missing += 1;
                        log::trace!("No donor for point {} of zone {} in zone {}", vertex.point, z, dz);
                    }
                }
            }
        }
    }

    if missing > 0 {
        log::warn!("Sliding interfaces: {} receiving points have no donor element", missing);
    }
    log::info!("Sliding interfaces: {} donor records", records.len());
    Ok(records)
}

/// Refresh donors after relative motion.
///
/// Records whose triangle still contains the point only get new weights;
/// the others are searched again. Returns the number of records re-located.
pub fn update_donors(records: &mut Vec<DonorRecord>, zones: &[&Mesh]) -> usize {
    let mut relocated = 0;
    records.retain_mut(|r| {
        let p = zones[r.zone].geometry.nodes[r.point];
        let donor = zones[r.donor_zone];
        let x = &donor.geometry.nodes;
        if let Some(w) = barycentric(&p, &x[r.nodes[0]], &x[r.nodes[1]], &x[r.nodes[2]]) {
            if inside(&w) {
                r.weights = w;
                return true;
            }
        }
        relocated += 1;
        match find_donor(donor, &p) {
            Some((element, nodes, weights)) => {
                r.element = element;
                r.nodes = nodes;
                r.weights = weights;
                true
            }
            None => {
                log::warn!("Sliding interface point {} of zone {} lost its donor", r.point, r.zone);
                false
            }
        }
    });
    relocated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{BoundaryMarker, MeshGenerator};
    use approx::assert_relative_eq;

    /// Zone 1 is a unit square; zone 0 receives at the given points.
    fn two_zones(points: &[(f64, f64)]) -> (Mesh, Mesh) {
        let donor = MeshGenerator::rectangle_quads(2, 2, 1.0, 1.0);
        let mut recv = Mesh::new(2);
        let ids: Vec<usize> = points.iter().map(|&(x, y)| recv.add_node(x, y, 0.0)).collect();
        let mut marker = BoundaryMarker::new("interface", MarkerKind::SendReceive { receive: true }, &ids);
        for v in &mut marker.vertices {
            v.matching_zone = Some(1);
        }
        recv.add_marker(marker);
        (recv, donor)
    }

    #[test]
    fn test_weights_reproduce_linear_field() {
        let x0 = Point3::new(0.0, 0.0, 0.0);
        let x1 = Point3::new(2.0, 0.0, 0.0);
        let x2 = Point3::new(0.0, 1.0, 0.0);
        let p = Point3::new(0.5, 0.25, 0.0);
        for (a, b, c) in [(x0, x1, x2), (x0, x2, x1)] {
            let w = barycentric(&p, &a, &b, &c).unwrap();
            assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-14);
            let x = w[0] * a.x + w[1] * b.x + w[2] * c.x;
            let y = w[0] * a.y + w[1] * b.y + w[2] * c.y;
            assert_relative_eq!(x, p.x, epsilon = 1e-14);
            assert_relative_eq!(y, p.y, epsilon = 1e-14);
        }
    }

    #[test]
    fn test_degenerate_triangle() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 1.0, 0.0);
        let c = Point3::new(2.0, 2.0, 0.0);
        assert!(barycentric(&Point3::new(0.5, 0.5, 0.0), &a, &b, &c).is_none());
    }

    #[test]
    fn test_locate_and_interpolate() {
        let (recv, donor) = two_zones(&[(0.3, 0.6), (1.0, 0.5), (2.0, 2.0)]);
        let records = locate_donors(&[&recv, &donor]).unwrap();
        // The third point lies outside the donor zone
        assert_eq!(records.len(), 2);

        let field: Vec<f64> = donor.geometry.nodes.iter().map(|p| 3.0 * p.x - p.y + 1.0).collect();
        for r in &records {
            let p = recv.geometry.nodes[r.point];
            assert_relative_eq!(r.interpolate(&field), 3.0 * p.x - p.y + 1.0, epsilon = 1e-12);
            assert_eq!(r.donor_zone, 1);
        }
    }

    #[test]
    fn test_first_element_wins_on_shared_edge() {
        // x = 0.5 is the edge between the first two quads of the bottom row
        let (recv, donor) = two_zones(&[(0.5, 0.25)]);
        let records = locate_donors(&[&recv, &donor]).unwrap();
        assert_eq!(records[0].element, 0);
    }

    #[test]
    fn test_same_zone_is_skipped() {
        let (mut recv, donor) = two_zones(&[(0.3, 0.6)]);
        recv.markers[0].vertices[0].matching_zone = Some(0);
        assert!(locate_donors(&[&recv, &donor]).unwrap().is_empty());
    }

    #[test]
    fn test_three_dimensional_is_unsupported() {
        let (mut recv, _) = two_zones(&[(0.3, 0.6)]);
        recv.dim = 3;
        let donor = MeshGenerator::cube_hexes(1, 1, 1, 1.0, 1.0, 1.0);
        assert!(matches!(locate_donors(&[&recv, &donor]), Err(MotionError::Unsupported(_))));
    }

    #[test]
    fn test_update_after_sliding() {
        let (recv, mut donor) = two_zones(&[(0.3, 0.6)]);
        let mut records = locate_donors(&[&recv, &donor]).unwrap();
        let before = records[0].element;

        for p in &mut donor.geometry.nodes {
            p.x -= 0.5;
        }
        let relocated = update_donors(&mut records, &[&recv, &donor]);
        assert_eq!(relocated, 1);
        assert_ne!(records[0].element, before);
        assert_relative_eq!(records[0].weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }
}
