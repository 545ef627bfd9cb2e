//! Grid velocities of time-spectral instances from a truncated Fourier fit
//! of the point coordinates across all instances.
//!
//! Only modes up to the Nyquist-limited degree ⌊(n−1)/2⌋ are kept.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use std::f64::consts::PI;

use crate::mesh::{Mesh, MeshHierarchy};

/// Highest Fourier degree resolvable with `n` instances.
pub fn highest_degree(n: usize) -> usize {
    n.saturating_sub(1) / 2
}

/// Fourier-fitted velocity of one coordinate sampled at n equally spaced
/// instances over `period`.
pub fn fourier_derivative(samples: &[f64], period: f64) -> Vec<f64> {
    let n = samples.len();
    let nf = n as f64;
    let interval = 2.0 * PI / nf;
    let degree = highest_degree(n);

    let mut a = vec![0.0; degree + 1];
    let mut b = vec![0.0; degree + 1];
    for m in 0..=degree {
        for (k, &x) in samples.iter().enumerate() {
            let theta = m as f64 * k as f64 * interval;
            a[m] += 2.0 / nf * theta.cos() * x;
            b[m] += 2.0 / nf * theta.sin() * x;
        }
    }

    let rate = 2.0 * PI / period;
    (0..n)
        .map(|k| {
            let phase = k as f64 * interval;
            (1..=degree)
                .map(|m| {
                    let mf = m as f64;
                    rate * mf * (b[m] * (mf * phase).cos() - a[m] * (mf * phase).sin())
                })
                .sum()
        })
        .collect()
}

/// Velocities of every point at every instance.
///
/// `coords[instance][point]`; returns `velocity[instance][point]`.
pub fn fourier_velocities(coords: &[Vec<Point3<f64>>], period: f64) -> Vec<Vec<Vector3<f64>>> {
    let n = coords.len();
    if n == 0 {
        return Vec::new();
    }
    let n_points = coords[0].len();

    let per_point: Vec<Vec<Vector3<f64>>> = (0..n_points)
        .into_par_iter()
        .map(|p| {
            let mut v = vec![Vector3::zeros(); n];
            for d in 0..3 {
                let samples: Vec<f64> = coords.iter().map(|c| c[p][d]).collect();
                for (k, dv) in fourier_derivative(&samples, period).into_iter().enumerate() {
                    v[k][d] = dv;
                }
            }
            v
        })
        .collect();

    (0..n)
        .map(|k| per_point.iter().map(|v| v[k]).collect())
        .collect()
}

/// Set the grid velocity of every instance mesh and of every coarse level.
///
/// Each item pairs the fine mesh of one instance with its hierarchy, in
/// instance order.
pub fn time_spectral_velocities<'a, I>(instances: I, period: f64)
where
    I: IntoIterator<Item = (&'a mut Mesh, &'a mut MeshHierarchy)>,
{
    let mut instances: Vec<(&mut Mesh, &mut MeshHierarchy)> = instances.into_iter().collect();

    let coords: Vec<Vec<Point3<f64>>> = instances.iter().map(|(m, _)| m.geometry.nodes.clone()).collect();
    for ((mesh, _), v) in instances.iter_mut().zip(fourier_velocities(&coords, period)) {
        mesh.grid_velocity = v;
    }

    let n_levels = instances.iter().map(|(_, h)| h.num_levels()).min().unwrap_or(0);
    for level in 0..n_levels {
        let coords: Vec<Vec<Point3<f64>>> = instances.iter().map(|(_, h)| h.levels[level].nodes.clone()).collect();
        for ((_, h), v) in instances.iter_mut().zip(fourier_velocities(&coords, period)) {
            h.levels[level].grid_velocity = v;
        }
    }
    log::debug!(
        "Time-spectral grid velocities: {} instances, {} coarse levels, Fourier degree {}",
        instances.len(),
        n_levels,
        highest_degree(instances.len())
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_highest_degree() {
        assert_eq!(highest_degree(1), 0);
        assert_eq!(highest_degree(3), 1);
        assert_eq!(highest_degree(4), 1);
        assert_eq!(highest_degree(7), 3);
    }

    #[test]
    fn test_sine_velocity_is_exact() {
        let period = 2.5;
        let w = 2.0 * PI / period;
        for n in [3usize, 5, 6] {
            let t: Vec<f64> = (0..n).map(|k| k as f64 * period / n as f64).collect();
            let x: Vec<f64> = t.iter().map(|&t| 1.0 + 0.3 * (w * t + 0.2).sin()).collect();
            let v = fourier_derivative(&x, period);
            for k in 0..n {
                assert_relative_eq!(v[k], 0.3 * w * (w * t[k] + 0.2).cos(), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_static_points_have_zero_velocity() {
        let coords = vec![vec![Point3::new(1.0, 2.0, 0.0); 4]; 5];
        let v = fourier_velocities(&coords, 1.0);
        assert_eq!(v.len(), 5);
        assert!(v.iter().flatten().all(|v| v.norm() < 1e-12));
    }

    #[test]
    fn test_rotating_point_velocity() {
        let n = 5;
        let period = 1.0;
        let w = 2.0 * PI / period;
        let coords: Vec<Vec<Point3<f64>>> = (0..n)
            .map(|k| {
                let a = w * k as f64 * period / n as f64;
                vec![Point3::new(a.cos(), a.sin(), 0.0)]
            })
            .collect();
        let v = fourier_velocities(&coords, period);
        for k in 0..n {
            let a = w * k as f64 * period / n as f64;
            assert_relative_eq!(v[k][0], Vector3::new(-w * a.sin(), w * a.cos(), 0.0), epsilon = 1e-12);
        }
    }
}
