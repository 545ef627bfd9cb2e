//! Grid motion coordination per zone and physical iteration.

pub mod zone;
pub mod coordinator;

pub use zone::Zone;
pub use coordinator::{set_grid_movement, set_time_spectral_velocities, update_zones, MotionStep};
