//! Per-zone motion context

use std::path::{Path, PathBuf};

use crate::config::{GridMovementKind, MotionConfig};
use crate::deform::VolumetricDeformer;
use crate::error::Result;
use crate::ffd::FfdArena;
use crate::kinematics::{RigidMotion, TypicalSection};
use crate::mesh::{Mesh, MeshHierarchy};
use crate::surface::SurfaceMovement;

/// One physical zone (or one time instance of a time-spectral run) with
/// everything needed to move its grid.
#[derive(Debug, Clone)]
pub struct Zone {
    pub index: usize,
    pub mesh: Mesh,
    pub hierarchy: MeshHierarchy,
    pub config: MotionConfig,
    pub surface: SurfaceMovement,
    pub deformer: VolumetricDeformer,
    pub rigid: RigidMotion,
    /// Structural model, present for aeroelastic zones only
    pub section: Option<TypicalSection>,
    /// Directory holding external motion files
    pub motion_dir: PathBuf,
    /// Time-spectral instance already moved to its phase of the period
    pub instance_placed: bool,
}

impl Zone {
    /// Build the zone context and its multigrid hierarchy.
    pub fn new(index: usize, mesh: Mesh, config: MotionConfig) -> Result<Self> {
        config.validate()?;
        let hierarchy = MeshHierarchy::build(&mesh, config.grid_movement.mg_levels);
        let section = match config.grid_movement.kind {
            GridMovementKind::Aeroelastic => Some(TypicalSection::new(&config.aeroelastic)?),
            _ => None,
        };
        log::info!("Zone {}: {} points, {} elements", index, mesh.num_nodes(), mesh.num_elements());
        log::info!("Zone {} configuration:\n{}", index, config.summary());

        Ok(Self {
            index,
            hierarchy,
            surface: SurfaceMovement::new(FfdArena::new(), &config.ffd),
            deformer: VolumetricDeformer::new(&config.deform),
            rigid: RigidMotion::from_config(&config),
            section,
            motion_dir: PathBuf::from("."),
            instance_placed: false,
            mesh,
            config,
        })
    }

    /// Attach FFD boxes and cache the parametric coordinates of the surface
    /// points they enclose. Boxes read back with their surface points keep
    /// the stored coordinates.
    pub fn with_ffd(mut self, arena: FfdArena) -> Result<Self> {
        self.surface = SurfaceMovement::new(arena, &self.config.ffd);
        self.surface.set_parametric_coord(&self.mesh)?;
        Ok(self)
    }

    pub fn with_motion_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.motion_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn kind(&self) -> GridMovementKind {
        self.config.grid_movement.kind
    }

    /// Apply the configured design variables to the surface and propagate
    /// them into the volume.
    pub fn apply_design_variables(&mut self) -> Result<crate::deform::DeformReport> {
        let dvs = self.config.ffd.design_variables.clone();
        self.surface.set_surface_deformation(&mut self.mesh, &dvs, true)?;
        let report = self.deformer.deform(&mut self.mesh, Some(&mut self.hierarchy))?;
        self.mesh.clear_boundary_displacements();
        Ok(report)
    }
}
