//! Grid motion coordinator
//!
//! Per zone and physical iteration the update runs in a fixed order:
//! surface update → volume deformation → multigrid restriction → grid
//! velocities. Rigid and aeroelastic motion move the whole grid and skip the
//! volume deformation.

use nalgebra::{Point3, Vector3};

use crate::config::{GridMovementKind, TimeScheme};
use crate::deform::DeformReport;
use crate::error::{MotionError, Result};
use crate::kinematics::{apply_increment, motion_time_window, RigidMotion};
use crate::surface::set_external_deformation;
use crate::timespectral::{period_from_config, time_spectral_velocities, ForceCoefficients};

use super::zone::Zone;

/// Outcome of one grid movement
#[derive(Debug, Clone)]
pub struct MotionStep {
    pub zone: usize,
    pub kind: GridMovementKind,
    pub t_old: f64,
    pub t_new: f64,
    /// Present when the volume was deformed
    pub deformation: Option<DeformReport>,
}

/// Move the grid of one zone for physical iteration `iter`.
///
/// `loads` are the integrated force coefficients of the current flow
/// solution; only aeroelastic zones read them. For time-spectral runs the
/// zone index selects the time instance, the grid is moved there on the
/// first call only, and grid velocities are left to
/// [`set_time_spectral_velocities`].
pub fn set_grid_movement(zone: &mut Zone, iter: usize, loads: &ForceCoefficients) -> Result<MotionStep> {
    let time_spectral = zone.config.is_time_spectral();
    let adjoint = zone.config.grid_movement.adjoint;
    let dt = zone.config.motion_time_step();
    let step_iter = if time_spectral { zone.index } else { iter };
    let (t_old, t_new) = motion_time_window(time_spectral, step_iter, dt);
    let kind = zone.kind();

    // Instances are placed once; later iterations reuse the same grids
    if time_spectral && zone.instance_placed {
        log::debug!("Zone {}: time instance already placed at t = {:.4e}", zone.index, t_new);
        return Ok(MotionStep { zone: zone.index, kind, t_old, t_new, deformation: None });
    }

    let coarse_before = zone.hierarchy.coordinates();
    if !time_spectral && !adjoint {
        zone.mesh.push_time_level();
    }

    log::info!("Dynamic mesh update for zone {} ({:?}), t = {:.4e}", zone.index, kind, t_new);

    let deformation = match kind {
        GridMovementKind::RigidMotion => {
            zone.rigid.apply(&mut zone.mesh, t_old, t_new);
            None
        }
        GridMovementKind::External | GridMovementKind::ExternalRotation => {
            if kind == GridMovementKind::ExternalRotation {
                rotation_only(&zone.rigid).apply(&mut zone.mesh, t_old, t_new);
            }
            let prefix = zone.config.external.motion_file_prefix.clone();
            set_external_deformation(&mut zone.mesh, &zone.motion_dir, &prefix, iter)?;
            Some(deform_volume(zone)?)
        }
        GridMovementKind::Flutter => {
            if zone.mesh.dim == 2 {
                zone.surface.set_boundary_flutter_2d(&mut zone.mesh, &zone.rigid, t_old, t_new);
            } else {
                let axis_origin = Point3::from(zone.config.flutter.axis_origin);
                let axis_end = Point3::from(zone.config.flutter.axis_end);
                zone.surface
                    .set_boundary_flutter_3d(&mut zone.mesh, &zone.rigid, axis_origin, axis_end, t_new)?;
            }
            Some(deform_volume(zone)?)
        }
        GridMovementKind::Aeroelastic => {
            let section = zone
                .section
                .as_mut()
                .ok_or_else(|| MotionError::config("aeroelastic zone without a structural model"))?;
            let increment = section.step(loads.lift, loads.moment[2], dt);
            let elastic_axis = Point3::from(zone.config.motion.origin);
            apply_increment(&mut zone.mesh, &elastic_axis, &increment);
            None
        }
        GridMovementKind::None => {
            log::debug!("No mesh motion for zone {}", zone.index);
            None
        }
    };

    zone.deformer.update_multigrid(&mut zone.mesh, Some(&mut zone.hierarchy));

    if time_spectral {
        zone.instance_placed = true;
    } else if adjoint {
        zone.hierarchy.restrict_grid_velocity(&zone.mesh);
    } else {
        let order = if zone.config.time.scheme == TimeScheme::DualTime2nd { 2 } else { 1 };
        zone.mesh.set_grid_velocity(dt, order);
        zone.hierarchy.difference_grid_velocity(&coarse_before, dt);
    }

    Ok(MotionStep { zone: zone.index, kind, t_old, t_new, deformation })
}

/// Move every zone in turn, then fill in the time-spectral grid velocities
/// once all instances are in place.
///
/// `loads[i]` belongs to zone i; missing entries count as zero loads.
pub fn update_zones(zones: &mut [Zone], iter: usize, loads: &[ForceCoefficients]) -> Result<Vec<MotionStep>> {
    let mut steps = Vec::with_capacity(zones.len());
    for (i, zone) in zones.iter_mut().enumerate() {
        let load = loads.get(i).copied().unwrap_or_default();
        steps.push(set_grid_movement(zone, iter, &load)?);
    }
    if zones.first().is_some_and(|z| z.config.is_time_spectral()) {
        set_time_spectral_velocities(zones)?;
    }
    Ok(steps)
}

/// Fourier-fitted grid velocities across the time instances held by `zones`.
pub fn set_time_spectral_velocities(zones: &mut [Zone]) -> Result<()> {
    let Some(first) = zones.first() else {
        return Ok(());
    };
    let period = period_from_config(&first.config)?;
    if zones.len() != first.config.time.n_time_instances {
        return Err(MotionError::config(format!(
            "time-spectral run expects {} instances, found {} zones",
            first.config.time.n_time_instances,
            zones.len()
        )));
    }
    time_spectral_velocities(zones.iter_mut().map(|z| (&mut z.mesh, &mut z.hierarchy)), period);
    Ok(())
}

fn deform_volume(zone: &mut Zone) -> Result<DeformReport> {
    let report = zone.deformer.deform(&mut zone.mesh, None)?;
    zone.mesh.clear_boundary_displacements();
    Ok(report)
}

fn rotation_only(motion: &RigidMotion) -> RigidMotion {
    RigidMotion {
        pitching_amplitude: Vector3::zeros(),
        plunging_amplitude: Vector3::zeros(),
        ..motion.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotionConfig;
    use crate::mesh::MeshGenerator;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;
    use std::io::Write;

    fn pitching_config(kind: GridMovementKind) -> MotionConfig {
        let mut config = MotionConfig::default();
        config.grid_movement.kind = kind;
        config.grid_movement.mg_levels = 1;
        config.time.scheme = TimeScheme::DualTime1st;
        config.time.delta_t = 0.05;
        config.motion.pitching_omega = [0.0, 0.0, 2.0 * PI];
        config.motion.pitching_amplitude = [0.0, 0.0, 5.0];
        config
    }

    #[test]
    fn test_none_leaves_grid_at_rest() {
        let mut config = MotionConfig::default();
        config.time.scheme = TimeScheme::DualTime1st;
        let mesh = MeshGenerator::rectangle_quads(3, 3, 1.0, 1.0);
        let before = mesh.geometry.nodes.clone();
        let mut zone = Zone::new(0, mesh, config).unwrap();
        let step = set_grid_movement(&mut zone, 1, &ForceCoefficients::default()).unwrap();
        assert!(step.deformation.is_none());
        assert_eq!(zone.mesh.geometry.nodes, before);
        assert!(zone.mesh.grid_velocity.iter().all(|v| v.norm() == 0.0));
    }

    #[test]
    fn test_rigid_pitch_velocity_matches_kinematics() {
        let config = pitching_config(GridMovementKind::RigidMotion);
        let mesh = MeshGenerator::annulus_quads(16, 4, 0.5, 2.0, 1.0);
        let mut zone = Zone::new(0, mesh, config).unwrap();

        for iter in 1..=3 {
            let step = set_grid_movement(&mut zone, iter, &ForceCoefficients::default()).unwrap();
            assert_relative_eq!(step.t_new, iter as f64 * 0.05, epsilon = 1e-14);
        }
        // First-order velocity equals the chord of the motion over the step
        let x_n = zone.mesh.geometry.coord_n[0];
        let x = zone.mesh.geometry.nodes[0];
        assert_relative_eq!(zone.mesh.grid_velocity[0], (x - x_n) / 0.05, epsilon = 1e-12);
        assert!(zone.mesh.grid_velocity[0].norm() > 0.0);
        assert!(zone.hierarchy.levels[0].grid_velocity.iter().any(|v| v.norm() > 0.0));
    }

    #[test]
    fn test_flutter_2d_deforms_volume() {
        let config = pitching_config(GridMovementKind::Flutter);
        let mut mesh = MeshGenerator::annulus_quads(24, 6, 0.5, 3.0, 1.2);
        let body = mesh.marker_index("body").unwrap();
        mesh.markers[body].moving = true;
        let mut zone = Zone::new(0, mesh, config).unwrap();

        let step = set_grid_movement(&mut zone, 1, &ForceCoefficients::default()).unwrap();
        let report = step.deformation.unwrap();
        assert!(report.quality.is_valid());
        assert!(report.max_displacement > 0.0);
        // Far field stays put, displacements are consumed
        let far = zone.mesh.marker_index("farfield").unwrap();
        for v in &zone.mesh.markers[far].vertices {
            let moved = zone.mesh.geometry.nodes[v.point] - zone.mesh.geometry.coord_n[v.point];
            assert!(moved.norm() < 1e-12);
        }
        assert!(zone.mesh.markers[body].vertices.iter().all(|v| v.var_coord.norm() == 0.0));
    }

    #[test]
    fn test_external_motion_file() {
        let mut config = MotionConfig::default();
        config.grid_movement.kind = GridMovementKind::External;
        config.time.scheme = TimeScheme::DualTime1st;
        let mut mesh = MeshGenerator::rectangle_quads(2, 2, 1.0, 1.0);
        let right = mesh.marker_index("right").unwrap();
        mesh.markers[right].moving = true;

        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("mesh_motion_00004.dat")).unwrap();
        // Right edge nodes 2, 5, 8 shifted by 0.05
        for (p, y) in [(2, 0.0), (5, 0.5), (8, 1.0)] {
            writeln!(f, "{} 1.05 {}", p, y).unwrap();
        }
        drop(f);

        let mut zone = Zone::new(0, mesh, config).unwrap().with_motion_dir(dir.path());
        set_grid_movement(&mut zone, 4, &ForceCoefficients::default()).unwrap();
        assert_relative_eq!(zone.mesh.geometry.nodes[5].x, 1.05, epsilon = 1e-8);
        let centre = zone.mesh.geometry.nodes[4].x;
        assert!(centre > 0.5 && centre < 0.55, "centre x = {}", centre);
    }

    #[test]
    fn test_aeroelastic_lift_moves_grid_up() {
        let mut config = MotionConfig::default();
        config.grid_movement.kind = GridMovementKind::Aeroelastic;
        config.time.scheme = TimeScheme::DualTime2nd;
        config.time.delta_t = 1e-3;
        config.aeroelastic.static_unbalance = 0.0;
        let mesh = MeshGenerator::rectangle_quads(2, 2, 1.0, 1.0);
        let mut zone = Zone::new(0, mesh, config).unwrap();

        let loads = ForceCoefficients { lift: 0.8, ..ForceCoefficients::default() };
        set_grid_movement(&mut zone, 1, &loads).unwrap();
        assert!(zone.mesh.geometry.nodes[0].y > 0.0);
        assert!(zone.mesh.grid_velocity[0].y > 0.0);
    }

    #[test]
    fn test_aeroelastic_without_section_is_config_error() {
        let mut config = MotionConfig::default();
        config.time.scheme = TimeScheme::DualTime1st;
        let mut zone = Zone::new(0, MeshGenerator::rectangle_quads(1, 1, 1.0, 1.0), config).unwrap();
        zone.config.grid_movement.kind = GridMovementKind::Aeroelastic;
        let err = set_grid_movement(&mut zone, 1, &ForceCoefficients::default()).unwrap_err();
        assert!(matches!(err, MotionError::Config(_)));
    }

    #[test]
    fn test_time_spectral_instances() {
        let mut config = pitching_config(GridMovementKind::RigidMotion);
        config.time.scheme = TimeScheme::TimeSpectral;
        config.time.n_time_instances = 3;
        let mesh = MeshGenerator::annulus_quads(12, 3, 0.5, 2.0, 1.0);
        let mut zones: Vec<Zone> = (0..3).map(|i| Zone::new(i, mesh.clone(), config.clone()).unwrap()).collect();

        let steps = update_zones(&mut zones, 7, &[]).unwrap();
        // Instance i sits at t = i·T/n regardless of the physical iteration
        for (i, s) in steps.iter().enumerate() {
            assert_relative_eq!(s.t_old, 0.0);
            assert_relative_eq!(s.t_new, i as f64 / 3.0, epsilon = 1e-12);
        }
        // Instance 0 is at the reference position but moving
        assert_eq!(zones[0].mesh.geometry.nodes, mesh.geometry.nodes);
        assert!(zones[0].mesh.grid_velocity[0].norm() > 0.0);
    }

    #[test]
    fn test_time_spectral_instances_stay_put_on_later_iterations() {
        let mut config = pitching_config(GridMovementKind::RigidMotion);
        config.time.scheme = TimeScheme::TimeSpectral;
        config.time.n_time_instances = 3;
        config.motion.pitching_amplitude = [0.0, 0.0, 10.0];
        let mesh = MeshGenerator::annulus_quads(12, 3, 0.5, 2.0, 1.0);
        let mut zones: Vec<Zone> = (0..3).map(|i| Zone::new(i, mesh.clone(), config.clone()).unwrap()).collect();

        update_zones(&mut zones, 1, &[]).unwrap();
        let placed: Vec<_> = zones.iter().map(|z| z.mesh.geometry.nodes.clone()).collect();
        let velocities: Vec<_> = zones.iter().map(|z| z.mesh.grid_velocity.clone()).collect();
        assert!((placed[1][0] - mesh.geometry.nodes[0]).norm() > 1e-3);

        for iter in 2..=4 {
            let steps = update_zones(&mut zones, iter, &[]).unwrap();
            assert!(steps.iter().all(|s| s.deformation.is_none()));
        }
        for (i, zone) in zones.iter().enumerate() {
            assert_eq!(zone.mesh.geometry.nodes, placed[i]);
            for (v, v0) in zone.mesh.grid_velocity.iter().zip(&velocities[i]) {
                assert_relative_eq!(*v, *v0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_time_spectral_zone_count_mismatch() {
        let mut config = pitching_config(GridMovementKind::RigidMotion);
        config.time.scheme = TimeScheme::TimeSpectral;
        config.time.n_time_instances = 4;
        let mesh = MeshGenerator::rectangle_quads(1, 1, 1.0, 1.0);
        let mut zones = vec![Zone::new(0, mesh, config).unwrap()];
        assert!(set_time_spectral_velocities(&mut zones).is_err());
    }
}
