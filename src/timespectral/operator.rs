//! Time-spectral coupling between periodic time instances
//!
//! The spectral differentiation matrix D maps the values of a periodic
//! quantity at n equally spaced instances to its time derivative:
//!
//!   D[k][j] = (π/T)·(−1)^(k−j)·cot(π(k−j)/n)   n even
//!   D[k][j] = (π/T)·(−1)^(k−j)·csc(π(k−j)/n)   n odd
//!
//! with a zero diagonal. The source of instance i is Σ_j D[i][j]·U_j for the
//! direct problem and Σ_j D[j][i]·Ψ_j for the adjoint.

use nalgebra::DMatrix;
use rayon::prelude::*;
use std::f64::consts::PI;
use std::io::Write;

use crate::config::MotionConfig;
use crate::error::{MotionError, Result};

/// Below this many values per instance the sources are accumulated serially
const PARALLEL_THRESHOLD: usize = 4096;

/// Build the (n×n) spectral differentiation matrix for period `period`.
pub fn spectral_operator(n: usize, period: f64) -> DMatrix<f64> {
    let nf = n as f64;
    DMatrix::from_fn(n, n, |k, j| {
        if k == j {
            return 0.0;
        }
        let diff = k as i64 - j as i64;
        let sign = if diff % 2 == 0 { 1.0 } else { -1.0 };
        let angle = PI * diff as f64 / nf;
        let kernel = if n % 2 == 0 { 1.0 / angle.tan() } else { 1.0 / angle.sin() };
        (PI / period) * sign * kernel
    })
}

/// Oscillation period of the configured pitching motion.
pub fn period_from_config(config: &MotionConfig) -> Result<f64> {
    config
        .oscillation_period()
        .ok_or_else(|| MotionError::config("time-spectral runs need a non-zero pitching frequency"))
}

/// Solution snapshot of every instance, `values[instance][point·n_var + var]`
#[derive(Debug, Clone, Copy)]
pub struct InstanceSnapshot<'a> {
    pub values: &'a [Vec<f64>],
    /// Values at the start of the current pseudo-time step (implicit runs)
    pub previous: Option<&'a [Vec<f64>]>,
}

/// Spectral source-term builder
#[derive(Debug, Clone)]
pub struct TimeSpectralCoupler {
    d: DMatrix<f64>,
    adjoint: bool,
    implicit: bool,
}

impl TimeSpectralCoupler {
    pub fn new(n_instances: usize, period: f64) -> Self {
        Self {
            d: spectral_operator(n_instances, period),
            adjoint: false,
            implicit: false,
        }
    }

    pub fn from_config(config: &MotionConfig) -> Result<Self> {
        let period = period_from_config(config)?;
        Ok(Self::new(config.time.n_time_instances, period)
            .with_adjoint(config.grid_movement.adjoint)
            .with_implicit(config.time.implicit))
    }

    pub fn with_adjoint(mut self, adjoint: bool) -> Self {
        self.adjoint = adjoint;
        self
    }

    pub fn with_implicit(mut self, implicit: bool) -> Self {
        self.implicit = implicit;
        self
    }

    pub fn n_instances(&self) -> usize {
        self.d.nrows()
    }

    pub fn operator(&self) -> &DMatrix<f64> {
        &self.d
    }

    /// Weight of instance `j` in the source of instance `i`.
    fn weight(&self, i: usize, j: usize) -> f64 {
        if self.adjoint {
            self.d[(j, i)]
        } else {
            self.d[(i, j)]
        }
    }

    /// Sources of instance `i` for every stored value.
    ///
    /// # Panics
    /// Panics if the snapshot does not hold one value vector per instance or
    /// if the vectors differ in length.
    pub fn sources(&self, i: usize, snapshot: InstanceSnapshot<'_>) -> Vec<f64> {
        let n = self.n_instances();
        assert_eq!(snapshot.values.len(), n, "snapshot must hold every time instance");
        let len = snapshot.values[0].len();
        assert!(snapshot.values.iter().all(|v| v.len() == len), "instances differ in size");

        let weights: Vec<f64> = (0..n).map(|j| self.weight(i, j)).collect();
        let previous = if self.implicit { snapshot.previous } else { None };

        let accumulate = |idx: usize| -> f64 {
            let mut s = 0.0;
            for (j, w) in weights.iter().enumerate() {
                let u = snapshot.values[j][idx];
                s += w * u;
                if let Some(old) = previous {
                    s += w * (u - old[j][idx]);
                }
            }
            s
        };

        if len >= PARALLEL_THRESHOLD {
            (0..len).into_par_iter().map(accumulate).collect()
        } else {
            (0..len).map(accumulate).collect()
        }
    }

    /// Sources of every instance from one consistent snapshot.
    pub fn all_sources(&self, snapshot: InstanceSnapshot<'_>) -> Vec<Vec<f64>> {
        (0..self.n_instances()).map(|i| self.sources(i, snapshot)).collect()
    }
}

/// Integrated force coefficients of one time instance
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForceCoefficients {
    pub lift: f64,
    pub drag: f64,
    pub moment: [f64; 3],
}

/// Write per-instance force coefficients as CSV.
pub fn write_force_coefficients<W: Write>(mut w: W, coefficients: &[ForceCoefficients]) -> Result<()> {
    writeln!(w, "time_instance,lift,drag,cmx,cmy,cmz")?;
    for (i, c) in coefficients.iter().enumerate() {
        writeln!(
            w,
            "{},{:.15e},{:.15e},{:.15e},{:.15e},{:.15e}",
            i, c.lift, c.drag, c.moment[0], c.moment[1], c.moment[2]
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rows_sum_to_zero() {
        for n in 2..=9 {
            let d = spectral_operator(n, 1.7);
            for i in 0..n {
                assert!(d.row(i).sum().abs() < 1e-12, "n = {}, row {}", n, i);
                assert_eq!(d[(i, i)], 0.0);
            }
        }
    }

    #[test]
    fn test_operator_is_antisymmetric() {
        let d = spectral_operator(6, 2.0);
        assert_relative_eq!(d.clone(), -d.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_differentiates_fundamental_mode() {
        let period = 3.0;
        for n in [3usize, 4, 5, 8] {
            let d = spectral_operator(n, period);
            let w = 2.0 * PI / period;
            let t: Vec<f64> = (0..n).map(|k| k as f64 * period / n as f64).collect();
            let u = nalgebra::DVector::from_iterator(n, t.iter().map(|&t| (w * t).sin()));
            let du = &d * u;
            for k in 0..n {
                assert_relative_eq!(du[k], w * (w * t[k]).cos(), epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_constant_solution_has_no_source() {
        let coupler = TimeSpectralCoupler::new(4, 1.0);
        let values = vec![vec![1.5, -2.0, 0.3]; 4];
        let sources = coupler.all_sources(InstanceSnapshot { values: &values, previous: None });
        for s in sources.iter().flatten() {
            assert!(s.abs() < 1e-12);
        }
    }

    #[test]
    fn test_adjoint_uses_transpose() {
        let values: Vec<Vec<f64>> = (0..3).map(|j| vec![j as f64 * j as f64]).collect();
        let snap = InstanceSnapshot { values: &values, previous: None };
        let direct = TimeSpectralCoupler::new(3, 1.0);
        let adjoint = TimeSpectralCoupler::new(3, 1.0).with_adjoint(true);
        let s_dir = direct.sources(0, snap)[0];
        let s_adj = adjoint.sources(0, snap)[0];
        // D is antisymmetric, so the transpose flips the sign
        assert_relative_eq!(s_adj, -s_dir, epsilon = 1e-12);
    }

    #[test]
    fn test_implicit_adds_delta_term() {
        let values: Vec<Vec<f64>> = vec![vec![0.0], vec![1.0], vec![0.0]];
        let old: Vec<Vec<f64>> = vec![vec![0.0], vec![0.5], vec![0.0]];
        let snap = InstanceSnapshot { values: &values, previous: Some(&old) };
        let explicit = TimeSpectralCoupler::new(3, 1.0).sources(0, snap)[0];
        let implicit = TimeSpectralCoupler::new(3, 1.0).with_implicit(true).sources(0, snap)[0];
        assert_relative_eq!(implicit, 1.5 * explicit, epsilon = 1e-12);
    }

    #[test]
    fn test_force_csv() {
        let mut out = Vec::new();
        let coeffs = [ForceCoefficients { lift: 0.5, drag: 0.01, moment: [0.0, 0.0, -0.1] }; 2];
        write_force_coefficients(&mut out, &coeffs).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "time_instance,lift,drag,cmx,cmy,cmz");
        assert!(lines[2].starts_with("1,5.0"));
    }
}
