pub mod config;
pub mod error;
pub mod utils;
pub mod mesh;
pub mod ffd;
pub mod linalg;
pub mod deform;
pub mod kinematics;
pub mod surface;
pub mod motion;
pub mod timespectral;
pub mod sliding;

pub use config::{DeformConfig, DeformMethod, GridMovementKind, MotionConfig, TimeScheme};
pub use error::{MotionError, Result};
pub use mesh::{BoundaryMarker, Element, ElementKind, MarkerKind, Mesh, MeshGenerator, MeshHierarchy, MeshQuality, assess_mesh_quality};
pub use ffd::{FfdArena, FfdBox, Inversion, read_ffd_info, write_ffd_info};
pub use linalg::{conjugate_gradient, CgSettings, SolverStats};
pub use deform::{DeformReport, VolumetricDeformer};
pub use kinematics::{RigidMotion, TypicalSection};
pub use surface::{DesignVariable, DesignVariableKind, SurfaceMovement};
pub use motion::{set_grid_movement, update_zones, MotionStep, Zone};
pub use timespectral::{spectral_operator, ForceCoefficients, TimeSpectralCoupler};
pub use sliding::{locate_donors, DonorRecord};
pub use utils::units;
