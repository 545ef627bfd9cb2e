//! Boundary surface movement: analytic shapes, FFD-driven design variables,
//! flutter and externally prescribed motion.

pub mod shapes;
pub mod movement;
pub mod external;

pub use movement::{DesignVariable, DesignVariableKind, SurfaceMovement};
pub use external::{motion_file_name, read_motion, set_external_deformation};
