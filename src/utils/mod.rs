//! Utility modules
//!
//! Helper functions shared by the kinematics and configuration code.

pub mod units;

pub use units::{deg_to_rad, rad_to_deg};
