//! Sliding-interface point location and interpolation between zones.

pub mod locator;

pub use locator::{barycentric, locate_donors, update_donors, DonorRecord, BARYCENTRIC_EPS};
