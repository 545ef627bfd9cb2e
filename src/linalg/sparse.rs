//! Sparse kernels and Dirichlet elimination for the spring system.

use rayon::prelude::*;
use sprs::{CsMat, TriMat};

/// Rows above which products are split across threads
const PARALLEL_ROWS: usize = 20_000;

/// y = A·x for a CSR matrix.
pub fn spmv(a: &CsMat<f64>, x: &[f64]) -> Vec<f64> {
    let row = |i: usize| {
        a.outer_view(i)
            .map_or(0.0, |r| r.iter().map(|(j, &v)| v * x[j]).sum())
    };
    if a.rows() > PARALLEL_ROWS {
        (0..a.rows()).into_par_iter().map(row).collect()
    } else {
        (0..a.rows()).map(row).collect()
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

/// r = b - A·x
pub fn residual(a: &CsMat<f64>, x: &[f64], b: &[f64]) -> Vec<f64> {
    spmv(a, x).iter().zip(b).map(|(ax, bi)| bi - ax).collect()
}

/// Main diagonal; missing entries read as zero.
pub fn diagonal(a: &CsMat<f64>) -> Vec<f64> {
    (0..a.rows()).map(|i| a.get(i, i).copied().unwrap_or(0.0)).collect()
}

/// Remove the prescribed unknowns from K·u = f.
///
/// Row i with a prescribed value v becomes `u_i = v`. Its column is moved to
/// the right-hand side of every free row, so the reduced matrix keeps the
/// symmetry of K.
pub fn eliminate_prescribed(k: &CsMat<f64>, f: &[f64], prescribed: &[Option<f64>]) -> (CsMat<f64>, Vec<f64>) {
    let n = f.len();
    let mut rhs = f.to_vec();
    let mut reduced = TriMat::with_capacity((n, n), k.nnz());

    for (i, row) in k.outer_iterator().enumerate() {
        if let Some(value) = prescribed[i] {
            reduced.add_triplet(i, i, 1.0);
            rhs[i] = value;
            continue;
        }
        for (j, &kij) in row.iter() {
            match prescribed[j] {
                Some(value) => rhs[i] -= kij * value,
                None => reduced.add_triplet(i, j, kij),
            }
        }
    }

    (reduced.to_csr(), rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_by_two() -> CsMat<f64> {
        // [2 1; 1 2]
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, 2.0);
        tri.add_triplet(0, 1, 1.0);
        tri.add_triplet(1, 0, 1.0);
        tri.add_triplet(1, 1, 2.0);
        tri.to_csr()
    }

    #[test]
    fn test_products() {
        let a = two_by_two();
        assert_eq!(spmv(&a, &[1.0, -1.0]), vec![1.0, -1.0]);
        assert_relative_eq!(norm(&[3.0, 4.0]), 5.0, epsilon = 1e-14);
        assert_eq!(diagonal(&a), vec![2.0, 2.0]);
        assert!(norm(&residual(&a, &[1.0, 1.0], &[3.0, 3.0])) < 1e-14);
    }

    #[test]
    fn test_elimination_moves_column_to_rhs() {
        let a = two_by_two();
        let (k, f) = eliminate_prescribed(&a, &[0.0, 0.0], &[Some(0.5), None]);
        // Row 1: 2 u1 = 0 - 1 * 0.5
        assert_relative_eq!(f[0], 0.5);
        assert_relative_eq!(f[1], -0.5);
        assert_eq!(k.get(0, 1), None);
        assert_eq!(k.get(1, 0), None);
        assert_relative_eq!(k.get(0, 0).copied().unwrap_or(0.0), 1.0);
        assert_relative_eq!(k.get(1, 1).copied().unwrap_or(0.0), 2.0);
    }
}
