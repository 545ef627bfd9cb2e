//! Jacobi-preconditioned conjugate gradients.
//!
//! Hitting the iteration cap is not an error here: the last iterate is
//! returned with `converged = false` and the caller decides what to do.

use std::time::Instant;

use sprs::CsMat;

use super::sparse::{diagonal, dot, norm, residual, spmv};
use crate::config::DeformConfig;

/// Statistics of one linear solve
#[derive(Debug, Clone, Default)]
pub struct SolverStats {
    pub iterations: usize,
    /// ||b - A·x|| at exit
    pub residual_norm: f64,
    /// ||b - A·x|| / ||b||, or the plain norm when b = 0
    pub relative_residual: f64,
    pub converged: bool,
    /// Wall time in seconds
    pub solve_time: f64,
}

/// Stopping rule and preconditioning of a CG solve
#[derive(Debug, Clone, Copy)]
pub struct CgSettings {
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub max_iterations: usize,
    pub jacobi: bool,
}

impl Default for CgSettings {
    fn default() -> Self {
        Self { rel_tol: 1e-8, abs_tol: 1e-12, max_iterations: 1000, jacobi: true }
    }
}

impl CgSettings {
    /// `tolerance` relative to ||b||, or `tol_per_point` per mesh point.
    pub fn from_deform(config: &DeformConfig, n_points: usize) -> Self {
        Self {
            rel_tol: config.tolerance,
            abs_tol: config.tol_per_point * n_points as f64,
            max_iterations: config.max_iterations,
            jacobi: true,
        }
    }

    fn satisfied(&self, r_norm: f64, b_norm: f64) -> bool {
        r_norm <= self.rel_tol * b_norm || r_norm <= self.abs_tol
    }
}

/// Solve the SPD system A·x = b, starting from `guess` when its length fits.
pub fn conjugate_gradient(
    a: &CsMat<f64>,
    b: &[f64],
    guess: Option<&[f64]>,
    settings: &CgSettings,
) -> (Vec<f64>, SolverStats) {
    let start = Instant::now();
    let n = b.len();
    let b_norm = norm(b);

    let inv_diag: Vec<f64> = if settings.jacobi {
        diagonal(a)
            .into_iter()
            .map(|d| if d.abs() > 1e-14 { 1.0 / d } else { 1.0 })
            .collect()
    } else {
        vec![1.0; n]
    };
    let precondition = |r: &[f64]| -> Vec<f64> { r.iter().zip(&inv_diag).map(|(ri, di)| ri * di).collect() };

    let mut x = match guess {
        Some(g) if g.len() == n => g.to_vec(),
        _ => vec![0.0; n],
    };
    let mut r = residual(a, &x, b);
    let mut r_norm = norm(&r);
    let mut iterations = 0;
    let mut converged = settings.satisfied(r_norm, b_norm);

    if !converged {
        let mut z = precondition(r.as_slice());
        let mut p = z.clone();
        let mut rz = dot(&r, &z);

        while iterations < settings.max_iterations {
            let ap = spmv(a, &p);
            let curvature = dot(&p, &ap);
            if curvature.abs() < 1e-30 {
                log::debug!("CG breakdown after {} iterations (pᵀAp = {:.3e})", iterations, curvature);
                break;
            }
            let alpha = rz / curvature;
            x.iter_mut().zip(&p).for_each(|(xi, pi)| *xi += alpha * pi);
            r.iter_mut().zip(&ap).for_each(|(ri, api)| *ri -= alpha * api);
            iterations += 1;

            r_norm = norm(&r);
            log::trace!("CG iter {:4}: |r| = {:.6e}", iterations, r_norm);
            if settings.satisfied(r_norm, b_norm) {
                converged = true;
                break;
            }

            z = precondition(r.as_slice());
            let rz_next = dot(&r, &z);
            let beta = rz_next / rz;
            rz = rz_next;
            p.iter_mut().zip(&z).for_each(|(pi, zi)| *pi = zi + beta * *pi);
        }
    }

    let stats = SolverStats {
        iterations,
        residual_norm: r_norm,
        relative_residual: if b_norm > 0.0 { r_norm / b_norm } else { r_norm },
        converged,
        solve_time: start.elapsed().as_secs_f64(),
    };
    (x, stats)
}
