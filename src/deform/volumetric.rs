//! Volumetric mesh deformation by the spring analogy.
//!
//! One deformation call walks INIT → ASSEMBLE → SOLVE → APPLY → SMOOTH → DONE
//! once per load increment. The prescribed boundary displacements are read
//! from the `var_coord` of the marker vertices.

use nalgebra::Vector3;

use super::algebraic;
use super::stiffness::{set_spring_method_contributions_edges, set_torsional_contributions, BlockMatrix};
use crate::config::{BoxBounds, DeformConfig, DeformMethod};
use crate::error::{MotionError, Result};
use crate::linalg::{conjugate_gradient, eliminate_prescribed, CgSettings, SolverStats};
use crate::mesh::{assess_mesh_quality, build_node_neighbors, smooth_laplacian, Mesh, MeshHierarchy, MeshQuality};

/// Phase of the current deformation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeformPhase {
    Init,
    Assemble,
    Solve,
    Apply,
    Smooth,
    Done,
}

/// Summary of one deformation call
#[derive(Debug, Clone)]
pub struct DeformReport {
    pub method: DeformMethod,
    /// Shortest edge seen during assembly (spring methods only)
    pub min_edge_length: f64,
    pub increments: usize,
    /// Statistics of every linear solve, one per increment
    pub solves: Vec<SolverStats>,
    /// Largest point displacement applied
    pub max_displacement: f64,
    pub quality: MeshQuality,
}

impl DeformReport {
    pub fn converged(&self) -> bool {
        self.solves.iter().all(|s| s.converged)
    }

    pub fn total_iterations(&self) -> usize {
        self.solves.iter().map(|s| s.iterations).sum()
    }
}

/// Spring-analogy deformation engine
#[derive(Debug, Clone)]
pub struct VolumetricDeformer {
    config: DeformConfig,
    matrix: BlockMatrix,
    rhs: Vec<f64>,
    solution: Vec<f64>,
    fixed: Vec<Option<f64>>,
    phase: DeformPhase,
    consecutive_caps: usize,
}

impl VolumetricDeformer {
    pub fn new(config: &DeformConfig) -> Self {
        Self {
            config: config.clone(),
            matrix: BlockMatrix::new(),
            rhs: Vec::new(),
            solution: Vec::new(),
            fixed: Vec::new(),
            phase: DeformPhase::Init,
            consecutive_caps: 0,
        }
    }

    pub fn config(&self) -> &DeformConfig {
        &self.config
    }

    pub fn phase(&self) -> DeformPhase {
        self.phase
    }

    /// Consecutive solves that ended at the iteration cap
    pub fn consecutive_caps(&self) -> usize {
        self.consecutive_caps
    }

    /// Allocate the point-to-point stiffness structure.
    pub fn initialize_stiff_matrix_structure(&mut self, mesh: &Mesh) -> Result<()> {
        self.matrix.initialize_structure(mesh)?;
        let n = mesh.num_nodes() * mesh.dim;
        self.rhs = vec![0.0; n];
        self.solution = vec![0.0; n];
        self.fixed = vec![None; n];
        Ok(())
    }

    pub fn deallocate_stiff_matrix_structure(&mut self) {
        self.matrix.deallocate();
        self.rhs.clear();
        self.solution.clear();
        self.fixed.clear();
    }

    /// Linear edge springs; returns the shortest edge length.
    pub fn set_spring_method_contributions_edges(&mut self, mesh: &Mesh) -> f64 {
        set_spring_method_contributions_edges(mesh, &mut self.matrix, self.config.c_lin)
    }

    /// Corner-angle springs weighted by `c_tor`.
    pub fn torsional_spring_method(&mut self, mesh: &Mesh) {
        set_torsional_contributions(mesh, &mut self.matrix, self.config.c_tor);
    }

    /// Prescribe `scale · var_coord` on every boundary vertex.
    ///
    /// Points not connected to any element are pinned so the system stays
    /// non-singular.
    pub fn set_boundary_displacements(&mut self, mesh: &Mesh, scale: f64) {
        let dim = mesh.dim;
        self.fixed.iter_mut().for_each(|f| *f = None);
        self.rhs.iter_mut().for_each(|r| *r = 0.0);
        for (p, disp) in mesh.prescribed_displacements().into_iter().enumerate() {
            if let Some(d) = disp {
                for a in 0..dim {
                    self.fixed[p * dim + a] = Some(scale * d[a]);
                }
            } else if !self.matrix.is_connected(p) {
                for a in 0..dim {
                    self.fixed[p * dim + a] = Some(0.0);
                }
            }
        }
    }

    /// Pin every point outside the hold-fixed region.
    pub fn set_domain_displacements(&mut self, mesh: &Mesh) {
        let Some(region) = self.config.hold_fixed_box else {
            return;
        };
        let dim = mesh.dim;
        let mut held = 0;
        for (p, x) in mesh.geometry.nodes.iter().enumerate() {
            if !region.contains(x) && self.fixed[p * dim].is_none() {
                for a in 0..dim {
                    self.fixed[p * dim + a] = Some(0.0);
                }
                held += 1;
            }
        }
        log::debug!("Hold-fixed region pins {} points", held);
    }

    /// Solve K·u = f with the prescribed rows eliminated, starting from the
    /// current `solution`.
    ///
    /// Hitting the iteration cap keeps the best iterate; the cap counter
    /// feeds the escalation policy of `spring_method`.
    pub fn solve(&mut self, n_points: usize) -> SolverStats {
        let k = self.matrix.to_csr();
        let (k_bc, f_bc) = eliminate_prescribed(&k, &self.rhs, &self.fixed);
        let settings = CgSettings::from_deform(&self.config, n_points);
        let (x, stats) = conjugate_gradient(&k_bc, &f_bc, Some(&self.solution), &settings);
        self.solution = x;

        if stats.converged {
            self.consecutive_caps = 0;
            log::debug!(
                "Spring solve converged in {} iterations (|r| = {:.3e})",
                stats.iterations,
                stats.residual_norm
            );
        } else {
            self.consecutive_caps += 1;
            log::warn!(
                "Spring solve stopped at the iteration cap ({}) with |r|/|b| = {:.3e}; using best solution",
                stats.iterations,
                stats.relative_residual
            );
        }
        stats
    }

    /// Move the fine-grid points by the solved displacement.
    ///
    /// Returns the largest displacement magnitude.
    pub fn update_grid(&self, mesh: &mut Mesh) -> f64 {
        let dim = mesh.dim;
        let mut max_disp: f64 = 0.0;
        for (p, x) in mesh.geometry.nodes.iter_mut().enumerate() {
            let mut d = Vector3::zeros();
            for a in 0..dim {
                d[a] = self.solution[p * dim + a];
            }
            *x += d;
            max_disp = max_disp.max(d.norm());
        }
        max_disp
    }

    /// Recompute control volumes and restrict them, with the coordinates,
    /// to every coarse level.
    pub fn update_multigrid(&self, mesh: &mut Mesh, hierarchy: Option<&mut MeshHierarchy>) {
        mesh.compute_control_volumes();
        if let Some(h) = hierarchy {
            h.restrict_geometry(mesh);
        }
    }

    fn smooth(&mut self, mesh: &mut Mesh) {
        if self.config.smoothing_iterations == 0 {
            return;
        }
        self.phase = DeformPhase::Smooth;
        let neighbors = build_node_neighbors(mesh);
        let mut fixed = mesh.boundary_mask();
        if let Some(region) = self.config.hold_fixed_box {
            pin_outside(&region, mesh, &mut fixed);
        }
        smooth_laplacian(
            &mut mesh.geometry,
            &neighbors,
            &fixed,
            self.config.smoothing_iterations,
            self.config.smoothing_alpha,
        );
    }

    /// Propagate boundary displacements with the configured method.
    pub fn deform(&mut self, mesh: &mut Mesh, hierarchy: Option<&mut MeshHierarchy>) -> Result<DeformReport> {
        match self.config.method {
            DeformMethod::Spring | DeformMethod::TorsionalSpring => self.spring_method(mesh, hierarchy),
            DeformMethod::Algebraic => self.algebraic_method(mesh, hierarchy),
        }
    }

    /// ASSEMBLE → SOLVE → APPLY per increment, then SMOOTH and the validity
    /// check.
    ///
    /// On an inverted element or on repeated iteration caps the original
    /// coordinates are restored and the error returned.
    pub fn spring_method(&mut self, mesh: &mut Mesh, hierarchy: Option<&mut MeshHierarchy>) -> Result<DeformReport> {
        let saved = mesh.geometry.nodes.clone();
        let increments = self.config.increments.max(1);
        let torsional = self.config.method == DeformMethod::TorsionalSpring;
        let n_points = mesh.num_nodes();

        let mut solves = Vec::with_capacity(increments);
        let mut previous: Vec<f64> = Vec::new();
        let mut min_edge_length = f64::INFINITY;
        let mut max_displacement: f64 = 0.0;

        for step in 0..increments {
            self.phase = DeformPhase::Init;
            self.initialize_stiff_matrix_structure(mesh)?;
            // Equal increments: the last one is a good first guess
            if previous.len() == self.solution.len() {
                self.solution.copy_from_slice(&previous);
            }

            self.phase = DeformPhase::Assemble;
            min_edge_length = min_edge_length.min(self.set_spring_method_contributions_edges(mesh));
            if torsional {
                self.torsional_spring_method(mesh);
            }
            self.set_boundary_displacements(mesh, 1.0 / increments as f64);
            self.set_domain_displacements(mesh);

            self.phase = DeformPhase::Solve;
            let stats = self.solve(n_points);
            let capped = !stats.converged;
            let residual = stats.residual_norm;
            solves.push(stats);

            let limit = self.config.escalate_after_caps;
            if capped && limit > 0 && self.consecutive_caps >= limit {
                self.deallocate_stiff_matrix_structure();
                mesh.geometry.nodes = saved;
                return Err(MotionError::NonConvergence { consecutive: self.consecutive_caps, residual });
            }

            self.phase = DeformPhase::Apply;
            max_displacement = max_displacement.max(self.update_grid(mesh));
            previous = std::mem::take(&mut self.solution);
            self.deallocate_stiff_matrix_structure();
            log::trace!("Deformation increment {}/{} applied", step + 1, increments);
        }

        self.smooth(mesh);
        let quality = self.check_validity(mesh, saved)?;
        self.update_multigrid(mesh, hierarchy);
        self.phase = DeformPhase::Done;

        let report = DeformReport {
            method: self.config.method,
            min_edge_length,
            increments,
            solves,
            max_displacement,
            quality,
        };
        log::info!(
            "Spring deformation: {} increments, {} CG iterations, max |du| = {:.3e}, min volume = {:.3e}",
            report.increments,
            report.total_iterations(),
            report.max_displacement,
            report.quality.min_volume
        );
        Ok(report)
    }

    /// Inverse-distance interpolation of the boundary displacements.
    pub fn algebraic_method(&mut self, mesh: &mut Mesh, hierarchy: Option<&mut MeshHierarchy>) -> Result<DeformReport> {
        let saved = mesh.geometry.nodes.clone();

        self.phase = DeformPhase::Solve;
        let prescribed = mesh.prescribed_displacements();
        let mut displacement = algebraic::inverse_distance_displacements(
            &mesh.geometry.nodes,
            &prescribed,
            self.config.algebraic_power,
        );
        if let Some(region) = self.config.hold_fixed_box {
            for (p, x) in mesh.geometry.nodes.iter().enumerate() {
                if prescribed[p].is_none() && !region.contains(x) {
                    displacement[p] = Vector3::zeros();
                }
            }
        }

        self.phase = DeformPhase::Apply;
        let mut max_displacement: f64 = 0.0;
        for (x, d) in mesh.geometry.nodes.iter_mut().zip(&displacement) {
            let mut d = *d;
            if mesh.dim == 2 {
                d.z = 0.0;
            }
            *x += d;
            max_displacement = max_displacement.max(d.norm());
        }

        self.smooth(mesh);
        let quality = self.check_validity(mesh, saved)?;
        self.update_multigrid(mesh, hierarchy);
        self.phase = DeformPhase::Done;

        log::info!(
            "Algebraic deformation: max |du| = {:.3e}, min volume = {:.3e}",
            max_displacement,
            quality.min_volume
        );
        Ok(DeformReport {
            method: DeformMethod::Algebraic,
            min_edge_length: f64::NAN,
            increments: 1,
            solves: Vec::new(),
            max_displacement,
            quality,
        })
    }

    fn check_validity(&mut self, mesh: &mut Mesh, saved: Vec<nalgebra::Point3<f64>>) -> Result<MeshQuality> {
        let quality = assess_mesh_quality(mesh);
        if !quality.is_valid() {
            log::error!("Deformation produced invalid elements: {}", quality.report());
            mesh.geometry.nodes = saved;
            self.phase = DeformPhase::Done;
            return Err(MotionError::InvalidElement {
                element: quality.min_element,
                volume: quality.min_volume,
            });
        }
        Ok(quality)
    }
}

fn pin_outside(region: &BoxBounds, mesh: &Mesh, fixed: &mut [bool]) {
    for (p, x) in mesh.geometry.nodes.iter().enumerate() {
        if !region.contains(x) {
            fixed[p] = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshGenerator;
    use approx::assert_relative_eq;

    fn push_right(mesh: &mut Mesh, dx: f64) {
        let right = mesh.marker_index("right").unwrap();
        mesh.markers[right].moving = true;
        for v in &mut mesh.markers[right].vertices {
            v.var_coord = Vector3::new(dx, 0.0, 0.0);
        }
    }

    #[test]
    fn test_interior_displacement_between_boundaries() {
        let mut mesh = MeshGenerator::rectangle_quads(4, 4, 1.0, 1.0);
        let before = mesh.geometry.nodes.clone();
        push_right(&mut mesh, 0.1);
        let mut deformer = VolumetricDeformer::new(&DeformConfig::default());
        let report = deformer.deform(&mut mesh, None).unwrap();
        assert!(report.converged());
        assert_eq!(deformer.phase(), DeformPhase::Done);

        let boundary = mesh.boundary_mask();
        for (p, (x, x0)) in mesh.geometry.nodes.iter().zip(&before).enumerate() {
            if x0.x == 0.0 {
                assert_relative_eq!(x.x, 0.0, epsilon = 1e-14);
            }
            if !boundary[p] {
                let dx = x.x - x0.x;
                assert!(dx > 0.0 && dx < 0.1, "interior dx = {}", dx);
            }
        }
    }

    #[test]
    fn test_torsional_springs_keep_mesh_valid() {
        let mut mesh = MeshGenerator::rectangle_triangles(6, 6, 1.0, 1.0);
        push_right(&mut mesh, -0.3);
        let config = DeformConfig {
            method: DeformMethod::TorsionalSpring,
            increments: 3,
            ..DeformConfig::default()
        };
        let mut deformer = VolumetricDeformer::new(&config);
        let report = deformer.deform(&mut mesh, None).unwrap();
        assert_eq!(report.solves.len(), 3);
        assert!(report.quality.is_valid());
        assert!(report.min_edge_length > 0.0);
    }

    #[test]
    fn test_inverted_mesh_is_rejected_and_restored() {
        let mut mesh = MeshGenerator::rectangle_quads(2, 2, 1.0, 1.0);
        let before = mesh.geometry.nodes.clone();
        // Push the right edge through the left one
        push_right(&mut mesh, -1.5);
        let mut deformer = VolumetricDeformer::new(&DeformConfig::default());
        let err = deformer.deform(&mut mesh, None).unwrap_err();
        assert!(matches!(err, MotionError::InvalidElement { .. }));
        assert_eq!(mesh.geometry.nodes, before);
    }

    #[test]
    fn test_repeated_caps_escalate() {
        let mut mesh = MeshGenerator::rectangle_quads(8, 8, 1.0, 1.0);
        push_right(&mut mesh, 0.01);
        let config = DeformConfig {
            max_iterations: 1,
            tolerance: 1e-14,
            tol_per_point: 0.0,
            escalate_after_caps: 2,
            ..DeformConfig::default()
        };
        let mut deformer = VolumetricDeformer::new(&config);
        assert!(deformer.deform(&mut mesh, None).is_ok());
        assert_eq!(deformer.consecutive_caps(), 1);
        let err = deformer.deform(&mut mesh, None).unwrap_err();
        assert!(matches!(err, MotionError::NonConvergence { consecutive: 2, .. }));
    }

    #[test]
    fn test_hold_fixed_box_pins_outside_points() {
        let mut mesh = MeshGenerator::rectangle_quads(4, 4, 1.0, 1.0);
        let before = mesh.geometry.nodes.clone();
        push_right(&mut mesh, 0.05);
        let config = DeformConfig {
            hold_fixed_box: Some(BoxBounds { min: [0.6, -1.0, -1.0], max: [2.0, 2.0, 1.0] }),
            ..DeformConfig::default()
        };
        let mut deformer = VolumetricDeformer::new(&config);
        deformer.deform(&mut mesh, None).unwrap();
        for (x, x0) in mesh.geometry.nodes.iter().zip(&before) {
            if x0.x < 0.6 {
                assert_eq!(x, x0);
            }
        }
    }

    #[test]
    fn test_algebraic_method_moves_interior() {
        let mut mesh = MeshGenerator::rectangle_quads(4, 4, 1.0, 1.0);
        let before = mesh.geometry.nodes.clone();
        push_right(&mut mesh, 0.1);
        let config = DeformConfig { method: DeformMethod::Algebraic, ..DeformConfig::default() };
        let mut deformer = VolumetricDeformer::new(&config);
        let report = deformer.deform(&mut mesh, None).unwrap();
        assert!(report.solves.is_empty());
        let boundary = mesh.boundary_mask();
        for (p, (x, x0)) in mesh.geometry.nodes.iter().zip(&before).enumerate() {
            if !boundary[p] {
                let dx = x.x - x0.x;
                assert!(dx > 0.0 && dx < 0.1);
            }
        }
    }
}
