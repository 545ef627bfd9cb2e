//! Sparse linear algebra for the spring-analogy system.

pub mod sparse;
pub mod cg;

pub use sparse::{diagonal, dot, eliminate_prescribed, norm, residual, spmv};
pub use cg::{conjugate_gradient, CgSettings, SolverStats};
