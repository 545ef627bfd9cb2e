//! Volume mesh deformation driven by boundary displacements.

pub mod stiffness;
pub mod algebraic;
pub mod volumetric;

pub use stiffness::{angle_gradient, triangle_torsional_matrix, BlockMatrix};
pub use volumetric::{DeformPhase, DeformReport, VolumetricDeformer};
