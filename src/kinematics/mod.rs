//! Closed-form body motion: rigid rotation, pitching, plunging and the
//! typical-section aeroelastic response.

pub mod rigid;
pub mod aeroelastic;

pub use rigid::{motion_time_window, RigidMotion};
pub use aeroelastic::{apply_increment, AeroelasticIncrement, AeroelasticState, TypicalSection};
