//! Algebraic (inverse-distance) volume deformation.
//!
//! Every free point receives the weighted mean of the boundary displacements
//! with weights w = 1/dᵖ. Boundary points keep their prescribed value, so
//! fixed markers act as zero-displacement anchors.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

/// Distance below which a free point is treated as sitting on a source
const COINCIDENT_DISTANCE: f64 = 1e-12;

/// Interpolate the prescribed boundary displacements into the volume.
///
/// # Arguments
/// * `nodes` - Point coordinates
/// * `prescribed` - Displacement of each boundary point, `None` for free points
/// * `power` - Inverse-distance exponent
pub fn inverse_distance_displacements(
    nodes: &[Point3<f64>],
    prescribed: &[Option<Vector3<f64>>],
    power: f64,
) -> Vec<Vector3<f64>> {
    let sources: Vec<(Point3<f64>, Vector3<f64>)> = nodes
        .iter()
        .zip(prescribed)
        .filter_map(|(x, d)| d.map(|d| (*x, d)))
        .collect();

    if sources.is_empty() {
        return vec![Vector3::zeros(); nodes.len()];
    }

    nodes
        .par_iter()
        .zip(prescribed.par_iter())
        .map(|(x, fixed)| match fixed {
            Some(d) => *d,
            None => interpolate(x, &sources, power),
        })
        .collect()
}

fn interpolate(x: &Point3<f64>, sources: &[(Point3<f64>, Vector3<f64>)], power: f64) -> Vector3<f64> {
    let mut num = Vector3::zeros();
    let mut den = 0.0;
    for (xs, ds) in sources {
        let dist = (x - xs).norm();
        if dist < COINCIDENT_DISTANCE {
            return *ds;
        }
        let w = dist.powf(-power);
        num += w * ds;
        den += w;
    }
    num / den
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_midpoint_gets_mean_of_symmetric_sources() {
        let nodes = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        let prescribed = vec![Some(Vector3::zeros()), Some(Vector3::new(0.4, 0.0, 0.0)), None];
        let d = inverse_distance_displacements(&nodes, &prescribed, 2.0);
        assert_relative_eq!(d[2].x, 0.2, epsilon = 1e-14);
        assert_relative_eq!(d[1].x, 0.4);
    }

    #[test]
    fn test_nearer_source_dominates() {
        let nodes = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.9, 0.0, 0.0),
        ];
        let prescribed = vec![Some(Vector3::zeros()), Some(Vector3::new(0.0, 1.0, 0.0)), None];
        let d = inverse_distance_displacements(&nodes, &prescribed, 3.0);
        assert!(d[2].y > 0.9 && d[2].y < 1.0);
    }

    #[test]
    fn test_no_sources_means_no_motion() {
        let nodes = vec![Point3::new(0.0, 0.0, 0.0); 3];
        let d = inverse_distance_displacements(&nodes, &[None, None, None], 2.0);
        assert!(d.iter().all(|v| v.norm() == 0.0));
    }
}
