pub mod bernstein;
pub mod chunk;
pub mod hierarchy;
pub mod io;

pub use bernstein::{bernstein, bernstein_derivative, binomial, binomial_opt, factorial};
pub use chunk::{trilinear, FfdBox, Inversion, SurfacePoint, CORNER_PARAMS};
pub use hierarchy::FfdArena;
pub use io::{read_ffd_info, write_ffd_info, write_paraview, write_tecplot};
