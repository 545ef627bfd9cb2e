pub mod topology;
pub mod geometry;
pub mod quality;
pub mod multigrid;
pub mod generator;

pub use topology::{BoundaryMarker, BoundaryVertex, Connectivity, Element, ElementKind, MarkerKind};
pub use geometry::{ControlVolumes, Geometry, Mesh};
pub use quality::{assess_mesh_quality, build_node_neighbors, signed_volume, smooth_laplacian, MeshQuality};
pub use multigrid::{CoarseLevel, MeshHierarchy};
pub use generator::MeshGenerator;
