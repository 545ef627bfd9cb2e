//! Bernstein basis polynomials and binomial coefficients.
//!
//! B_i^n(t) = C(n,i)·tⁱ·(1−t)^(n−i), with B_i^n ≡ 0 for i < 0 or i > n.

/// Largest n for which `factorial(n)` fits in a `u64`.
pub const MAX_FACTORIAL: u64 = 20;

/// n! for n ≤ 20.
///
/// # Panics
/// Panics if `n > 20`.
pub fn factorial(n: u64) -> u64 {
    assert!(n <= MAX_FACTORIAL, "factorial({}) overflows u64", n);
    (1..=n).product()
}

/// Binomial coefficient by factorial ratio, exact for n ≤ 20.
///
/// # Panics
/// Panics if `n > 20`.
pub fn binomial(n: u64, m: u64) -> u64 {
    if m > n {
        return 0;
    }
    factorial(n) / (factorial(m) * factorial(n - m))
}

/// Binomial coefficient by the multiplicative recurrence
/// C(n,k) = C(n,k−1)·(n−k+1)/k.
///
/// Works for any degree; exact in floating point while the result stays
/// below 2⁵³.
pub fn binomial_opt(n: u64, m: u64) -> f64 {
    if m > n {
        return 0.0;
    }
    let k = m.min(n - m);
    let mut c = 1.0;
    for j in 1..=k {
        c = c * (n - k + j) as f64 / j as f64;
    }
    c.round()
}

/// Binomial coefficient choosing the exact path when possible.
pub fn choose(n: u64, m: u64) -> f64 {
    if n <= MAX_FACTORIAL {
        binomial(n, m) as f64
    } else {
        binomial_opt(n, m)
    }
}

/// Bernstein polynomial B_i^n(t).
pub fn bernstein(n: i32, i: i32, t: f64) -> f64 {
    if i < 0 || i > n || n < 0 {
        return 0.0;
    }
    choose(n as u64, i as u64) * t.powi(i) * (1.0 - t).powi(n - i)
}

/// Derivative of B_i^n at t of order 0, 1 or 2.
///
/// d/dt B_i^n = n·(B_{i−1}^{n−1} − B_i^{n−1}); out-of-range terms vanish.
///
/// # Panics
/// Panics for `order > 2`.
pub fn bernstein_derivative(n: i32, i: i32, t: f64, order: u32) -> f64 {
    match order {
        0 => bernstein(n, i, t),
        1 => {
            if n == 0 {
                return 0.0;
            }
            n as f64 * (bernstein(n - 1, i - 1, t) - bernstein(n - 1, i, t))
        }
        2 => {
            if n < 2 {
                return 0.0;
            }
            (n * (n - 1)) as f64
                * (bernstein(n - 2, i - 2, t) - 2.0 * bernstein(n - 2, i - 1, t) + bernstein(n - 2, i, t))
        }
        _ => panic!("Bernstein derivative of order {} is not available", order),
    }
}

/// Basis values and first/second derivatives of all degree-n polynomials at t.
pub(crate) fn basis_with_derivatives(n: usize, t: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n_i = n as i32;
    let mut b = Vec::with_capacity(n + 1);
    let mut db = Vec::with_capacity(n + 1);
    let mut d2b = Vec::with_capacity(n + 1);
    for i in 0..=n_i {
        b.push(bernstein(n_i, i, t));
        db.push(bernstein_derivative(n_i, i, t, 1));
        d2b.push(bernstein_derivative(n_i, i, t, 2));
    }
    (b, db, d2b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_binomial_symmetry_and_edges() {
        for n in 0..=20 {
            assert_eq!(binomial(n, 0), 1);
            assert_eq!(binomial(n, n), 1);
            for m in 0..=n {
                assert_eq!(binomial(n, m), binomial(n, n - m));
                assert_relative_eq!(binomial_opt(n, m), binomial(n, m) as f64);
            }
        }
        assert_eq!(binomial(20, 10), 184_756);
    }

    #[test]
    fn test_binomial_opt_beyond_factorial_range() {
        // C(30, 15) would overflow the factorial path
        assert_relative_eq!(binomial_opt(30, 15), 155_117_520.0);
        assert_relative_eq!(binomial_opt(40, 1), 40.0);
        assert_relative_eq!(choose(25, 3), 2300.0);
    }

    #[test]
    fn test_partition_of_unity() {
        for n in 1..=10 {
            for &t in &[0.0, 0.25, 0.5, 0.75, 1.0] {
                let sum: f64 = (0..=n).map(|i| bernstein(n, i, t)).sum();
                assert_relative_eq!(sum, 1.0, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let h = 1e-6;
        for n in 1..=6 {
            for i in 0..=n {
                let t = 0.37;
                let fd1 = (bernstein(n, i, t + h) - bernstein(n, i, t - h)) / (2.0 * h);
                assert_relative_eq!(bernstein_derivative(n, i, t, 1), fd1, epsilon = 1e-7);
                let fd2 = (bernstein_derivative(n, i, t + h, 1) - bernstein_derivative(n, i, t - h, 1)) / (2.0 * h);
                assert_relative_eq!(bernstein_derivative(n, i, t, 2), fd2, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_derivatives_sum_to_zero() {
        for n in 1..=8 {
            let s1: f64 = (0..=n).map(|i| bernstein_derivative(n, i, 0.6, 1)).sum();
            assert!(s1.abs() < 1e-12);
        }
        assert_eq!(bernstein(3, -1, 0.5), 0.0);
        assert_eq!(bernstein(3, 4, 0.5), 0.0);
    }
}
