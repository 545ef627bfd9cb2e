//! Angle conversions for motion parameters
//!
//! Angles in configuration files and design variables are given in degrees;
//! the kinematics work in radians.

use std::f64::consts::PI;

// ============================================================================
// Angle Conversions
// ============================================================================

/// Degrees to radians conversion factor
pub const DEG_TO_RAD: f64 = PI / 180.0;

/// Radians to degrees conversion factor
pub const RAD_TO_DEG: f64 = 180.0 / PI;

/// Convert degrees to radians
///
/// # Examples
/// ```
/// use grid_motion::utils::units::deg_to_rad;
/// let pitch_amplitude = deg_to_rad(2.51); // AGARD CT1 pitching amplitude
/// ```
#[inline]
pub fn deg_to_rad(degrees: f64) -> f64 {
    degrees * DEG_TO_RAD
}

/// Convert radians to degrees
#[inline]
pub fn rad_to_deg(radians: f64) -> f64 {
    radians * RAD_TO_DEG
}

// ============================================================================
// Tests
// ============================================================================
