//! Time-spectral coupling of periodic time instances.

pub mod operator;
pub mod velocity;

pub use operator::{
    period_from_config, spectral_operator, write_force_coefficients, ForceCoefficients, InstanceSnapshot,
    TimeSpectralCoupler,
};
pub use velocity::{fourier_velocities, time_spectral_velocities};
