//! Surface movement: design variables and flutter motion applied to boundary
//! markers.
//!
//! Every recipe writes the displacement of the affected boundary vertices
//! into their `var_coord`; the volume deformer then propagates it into the
//! interior. FFD recipes move control points and re-evaluate the cached
//! surface points of the touched boxes.

use nalgebra::{Point3, Rotation3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use super::shapes;
use crate::config::FfdConfig;
use crate::error::{MotionError, Result};
use crate::ffd::{FfdArena, FfdBox};
use crate::kinematics::RigidMotion;
use crate::mesh::Mesh;
use crate::utils::units::deg_to_rad;

/// Kind of design variable
///
/// Parameter layouts (`params`), with `value` the design amplitude:
/// - `HicksHenne`: [side (0 lower, 1 upper), x location]
/// - `Naca4Digits`: [max camber, camber position, thickness] (chord fractions)
/// - `Parabolic`: [camber, thickness]
/// - `Obstacle`: [height, length]
/// - `Stretch`: [x origin]; x grows by `value·(x − x0)`
/// - `Rotation`: [axis origin xyz, axis end xyz]; angle `value` in degrees
/// - `Displacement`: [direction xyz]
/// - `FfdControlPoint`: [i, j, k, direction xyz]; a negative index selects the whole row
/// - `FfdCamber`, `FfdThickness`, `FfdVolume`: [i, j]
/// - `FfdDihedralAngle`: [y root]; angle in degrees
/// - `FfdTwistAngle`: [j, axis origin xyz, axis end xyz]; angle in degrees
/// - `FfdRotation`: [axis origin xyz, axis end xyz]; angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignVariableKind {
    HicksHenne,
    Naca4Digits,
    Parabolic,
    Obstacle,
    Stretch,
    Rotation,
    Displacement,
    FfdControlPoint,
    FfdCamber,
    FfdThickness,
    FfdVolume,
    FfdDihedralAngle,
    FfdTwistAngle,
    FfdRotation,
}

impl DesignVariableKind {
    pub fn is_ffd(&self) -> bool {
        matches!(
            self,
            Self::FfdControlPoint
                | Self::FfdCamber
                | Self::FfdThickness
                | Self::FfdVolume
                | Self::FfdDihedralAngle
                | Self::FfdTwistAngle
                | Self::FfdRotation
        )
    }

    fn min_params(&self) -> usize {
        match self {
            Self::HicksHenne => 2,
            Self::Naca4Digits => 3,
            Self::Parabolic => 2,
            Self::Obstacle => 2,
            Self::Stretch => 1,
            Self::Rotation => 6,
            Self::Displacement => 3,
            Self::FfdControlPoint => 6,
            Self::FfdCamber | Self::FfdThickness | Self::FfdVolume => 2,
            Self::FfdDihedralAngle => 1,
            Self::FfdTwistAngle => 7,
            Self::FfdRotation => 6,
        }
    }
}

/// One design variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignVariable {
    pub kind: DesignVariableKind,
    /// Boundary markers moved by analytic recipes
    #[serde(default)]
    pub markers: Vec<String>,
    /// Box moved by FFD recipes
    #[serde(default)]
    pub ffd_box: Option<String>,
    #[serde(default)]
    pub params: Vec<f64>,
    #[serde(default)]
    pub value: f64,
}

impl DesignVariable {
    pub fn new(kind: DesignVariableKind, params: &[f64], value: f64) -> Self {
        Self {
            kind,
            markers: Vec::new(),
            ffd_box: None,
            params: params.to_vec(),
            value,
        }
    }

    pub fn on_marker(mut self, tag: &str) -> Self {
        self.markers.push(tag.to_string());
        self
    }

    pub fn on_box(mut self, tag: &str) -> Self {
        self.ffd_box = Some(tag.to_string());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.params.len() < self.kind.min_params() {
            return Err(MotionError::config(format!(
                "{:?} needs {} parameters, found {}",
                self.kind,
                self.kind.min_params(),
                self.params.len()
            )));
        }
        if self.kind.is_ffd() && self.ffd_box.is_none() {
            return Err(MotionError::config(format!("{:?} needs an FFD box", self.kind)));
        }
        if !self.kind.is_ffd() && self.markers.is_empty() {
            return Err(MotionError::config(format!("{:?} needs at least one marker", self.kind)));
        }
        Ok(())
    }
}

/// Axis from the first six parameters (origin, end).
fn axis_from(params: &[f64]) -> Result<(Point3<f64>, Unit<Vector3<f64>>)> {
    let origin = Point3::new(params[0], params[1], params[2]);
    let end = Point3::new(params[3], params[4], params[5]);
    let axis = Unit::try_new(end - origin, 1e-14)
        .ok_or_else(|| MotionError::config("rotation axis has zero length"))?;
    Ok((origin, axis))
}

/// Control-point index parameter; negative selects the whole row.
fn index_range(raw: f64, degree: usize) -> Result<std::ops::RangeInclusive<usize>> {
    if raw < 0.0 {
        return Ok(0..=degree);
    }
    let i = raw as usize;
    if i > degree {
        return Err(MotionError::config(format!("control point index {} exceeds degree {}", i, degree)));
    }
    Ok(i..=i)
}

/// Owner of the FFD boxes and applier of design variables and flutter motion
#[derive(Debug, Clone)]
pub struct SurfaceMovement {
    arena: FfdArena,
    tolerance: f64,
    max_iterations: usize,
}

impl SurfaceMovement {
    pub fn new(arena: FfdArena, config: &FfdConfig) -> Self {
        Self {
            arena,
            tolerance: config.inversion_tolerance,
            max_iterations: config.inversion_max_iterations,
        }
    }

    pub fn arena(&self) -> &FfdArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut FfdArena {
        &mut self.arena
    }

    pub fn has_boxes(&self) -> bool {
        !self.arena.is_empty()
    }

    /// Resolve the box hierarchy, cache surface-point and child control-point
    /// parametric coordinates.
    ///
    /// Boxes that already carry surface points (read back with
    /// `read_ffd_info`) keep them; only empty boxes are inverted. Returns the
    /// total number of surface points held by the arena.
    pub fn set_parametric_coord(&mut self, mesh: &Mesh) -> Result<usize> {
        self.arena.resolve_hierarchy()?;
        let mut total = 0;
        for idx in self.arena.order() {
            let b = self.arena.get_mut(idx);
            if b.n_surface_points() > 0 {
                log::debug!("FFD box '{}': reusing {} stored surface points", b.tag(), b.n_surface_points());
                total += b.n_surface_points();
            } else {
                total += b.set_parametric_coord(mesh, self.tolerance, self.max_iterations);
            }
        }
        self.arena.set_parametric_coord_cp(self.tolerance, self.max_iterations);
        log::info!("FFD: {} boxes, {} surface points", self.arena.len(), total);
        Ok(total)
    }

    /// Re-invert cached surface points after the boxes moved.
    pub fn update_parametric_coord(&mut self, mesh: &Mesh) -> usize {
        let (tol, it) = (self.tolerance, self.max_iterations);
        self.arena.iter_mut().map(|b| b.update_parametric_coord(mesh, tol, it)).sum()
    }

    /// Apply a set of design variables.
    ///
    /// With `reset`, boundary displacements and box perturbations are cleared
    /// first so each call starts from the undeformed geometry; otherwise the
    /// new perturbation is chained onto the previous ones.
    pub fn set_surface_deformation(&mut self, mesh: &mut Mesh, dvs: &[DesignVariable], reset: bool) -> Result<()> {
        if reset {
            mesh.clear_boundary_displacements();
            self.arena.reset_all();
        }
        let mut touched = Vec::new();
        for dv in dvs {
            dv.validate()?;
            if dv.kind.is_ffd() {
                let tag = dv.ffd_box.as_deref().unwrap_or_default();
                let idx = self.arena.index_of(tag)?;
                apply_ffd_variable(self.arena.get_mut(idx), dv)?;
                if !touched.contains(&idx) {
                    touched.push(idx);
                }
            } else {
                apply_analytic_variable(mesh, dv)?;
            }
            log::debug!("Applied design variable {:?} (value {:.4e})", dv.kind, dv.value);
        }

        for &idx in &touched {
            self.arena.update_children(idx);
        }
        if !touched.is_empty() {
            self.set_cartesian_coord(mesh);
        }
        Ok(())
    }

    /// Evaluate every surface point of every box and store the difference to
    /// the current point position as its boundary displacement.
    ///
    /// Boxes are visited parents first, so a point shared with a child box
    /// ends up with the child's value.
    pub fn set_cartesian_coord(&self, mesh: &mut Mesh) {
        let mut max_disp: f64 = 0.0;
        for idx in self.arena.order() {
            let b = self.arena.get(idx);
            for sp in b.surface_points() {
                let target = b.eval_cartesian(sp.parametric);
                let mut d = target - mesh.geometry.nodes[sp.point];
                if mesh.dim == 2 {
                    d.z = 0.0;
                }
                max_disp = max_disp.max(d.norm());
                mesh.markers[sp.marker].vertices[sp.vertex].var_coord = d;
            }
        }
        log::debug!("FFD surface update: max |dx| = {:.4e}", max_disp);
    }

    /// 2-D flutter: pitch the moving markers rigidly from `t_old` to `t_new`.
    pub fn set_boundary_flutter_2d(&self, mesh: &mut Mesh, motion: &RigidMotion, t_old: f64, t_new: f64) {
        let moving: Vec<usize> = (0..mesh.markers.len()).filter(|&m| mesh.markers[m].moving).collect();
        let pitch_only = RigidMotion {
            rotation_rate: Vector3::zeros(),
            plunging_amplitude: Vector3::zeros(),
            ..motion.clone()
        };
        pitch_only.apply_to_markers(mesh, &moving, t_old, t_new);
        log::info!(
            "Flutter 2-D: {} moving markers pitched to {:.4e} rad",
            moving.len(),
            pitch_only.pitching_angles(t_new).z
        );
    }

    /// 3-D flutter: twist every box about the flutter axis by the pitching
    /// angle at `t_new`, then re-evaluate the surface points.
    pub fn set_boundary_flutter_3d(
        &mut self,
        mesh: &mut Mesh,
        motion: &RigidMotion,
        axis_origin: Point3<f64>,
        axis_end: Point3<f64>,
        t_new: f64,
    ) -> Result<()> {
        if self.arena.is_empty() {
            return Err(MotionError::config("3-D flutter needs at least one FFD box"));
        }
        let axis = Unit::try_new(axis_end - axis_origin, 1e-14)
            .ok_or_else(|| MotionError::config("flutter axis has zero length"))?;
        let angle = motion.pitching_angles(t_new).dot(&axis);
        let rotation = Rotation3::from_axis_angle(&axis, angle);
        for b in self.arena.iter_mut() {
            b.reset();
            rotate_control_points(b, &axis_origin, &rotation, |_, _, _| true);
        }
        self.set_cartesian_coord(mesh);
        log::info!("Flutter 3-D: boxes twisted by {:.4e} rad", angle);
        Ok(())
    }
}

fn rotate_control_points<F>(b: &mut FfdBox, origin: &Point3<f64>, rotation: &Rotation3<f64>, select: F)
where
    F: Fn(usize, usize, usize) -> bool,
{
    let indices: Vec<_> = b.cp_indices().filter(|&(i, j, k)| select(i, j, k)).collect();
    for (i, j, k) in indices {
        let p = b.control_point(i, j, k);
        b.place_control_point(i, j, k, origin + rotation * (p - origin));
    }
}

fn apply_ffd_variable(b: &mut FfdBox, dv: &DesignVariable) -> Result<()> {
    let p = &dv.params;
    let [l, m, n] = b.degree();
    match dv.kind {
        DesignVariableKind::FfdControlPoint => {
            let movement = dv.value * Vector3::new(p[3], p[4], p[5]);
            for i in index_range(p[0], l)? {
                for j in index_range(p[1], m)? {
                    for k in index_range(p[2], n)? {
                        b.move_control_point(i, j, k, movement);
                    }
                }
            }
        }
        DesignVariableKind::FfdCamber | DesignVariableKind::FfdThickness | DesignVariableKind::FfdVolume => {
            for i in index_range(p[0], l)? {
                for j in index_range(p[1], m)? {
                    let (lower, upper) = match dv.kind {
                        DesignVariableKind::FfdCamber => (dv.value, dv.value),
                        DesignVariableKind::FfdThickness => (-dv.value, dv.value),
                        _ => (0.0, dv.value),
                    };
                    b.move_control_point(i, j, 0, Vector3::new(0.0, 0.0, lower));
                    b.move_control_point(i, j, n, Vector3::new(0.0, 0.0, upper));
                }
            }
        }
        DesignVariableKind::FfdDihedralAngle => {
            let slope = deg_to_rad(dv.value).tan();
            let indices: Vec<_> = b.cp_indices().collect();
            for (i, j, k) in indices {
                let y = b.base_control_point(i, j, k).y;
                b.move_control_point(i, j, k, Vector3::new(0.0, 0.0, slope * (y - p[0])));
            }
        }
        DesignVariableKind::FfdTwistAngle => {
            let section = index_range(p[0], m)?;
            let (origin, axis) = axis_from(&p[1..7])?;
            let rotation = Rotation3::from_axis_angle(&axis, deg_to_rad(dv.value));
            rotate_control_points(b, &origin, &rotation, |_, j, _| section.contains(&j));
        }
        DesignVariableKind::FfdRotation => {
            let (origin, axis) = axis_from(p)?;
            let rotation = Rotation3::from_axis_angle(&axis, deg_to_rad(dv.value));
            rotate_control_points(b, &origin, &rotation, |_, _, _| true);
        }
        other => {
            return Err(MotionError::Unsupported(format!("{:?} is not an FFD design variable", other)));
        }
    }
    Ok(())
}

/// Leading-edge position and chord of a set of boundary points.
fn chord_frame(mesh: &Mesh, points: &[usize]) -> (Point3<f64>, f64) {
    let mut le = Point3::new(f64::INFINITY, 0.0, 0.0);
    let mut x_max = f64::NEG_INFINITY;
    for &p in points {
        let x = mesh.geometry.nodes[p];
        if x.x < le.x {
            le = x;
        }
        x_max = x_max.max(x.x);
    }
    (le, (x_max - le.x).max(f64::MIN_POSITIVE))
}

fn apply_analytic_variable(mesh: &mut Mesh, dv: &DesignVariable) -> Result<()> {
    let p = &dv.params;
    for tag in &dv.markers {
        let m = mesh.marker_index(tag).ok_or_else(|| MotionError::UnknownMarker(tag.clone()))?;
        let points: Vec<usize> = mesh.markers[m].vertices.iter().map(|v| v.point).collect();
        let (le, chord) = chord_frame(mesh, &points);

        let rotation = match dv.kind {
            DesignVariableKind::Rotation => {
                let (origin, axis) = axis_from(p)?;
                Some((origin, Rotation3::from_axis_angle(&axis, deg_to_rad(dv.value))))
            }
            _ => None,
        };

        for (iv, &point) in points.iter().enumerate() {
            let x = mesh.geometry.nodes[point];
            let xc = (x.x - le.x) / chord;
            let upper = x.y >= le.y;
            // Current ordinate in chord units, relative to the leading edge
            let yc = (x.y - le.y) / chord;

            let d = match dv.kind {
                DesignVariableKind::HicksHenne => {
                    let on_side = (p[0] >= 0.5) == upper;
                    let dy = if on_side { dv.value * shapes::hicks_henne(xc, p[1]) } else { 0.0 };
                    let sign = if upper { 1.0 } else { -1.0 };
                    Vector3::new(0.0, sign * dy * chord, 0.0)
                }
                DesignVariableKind::Naca4Digits => {
                    let y = shapes::naca4_surface(xc, p[0], p[1], p[2], upper);
                    Vector3::new(0.0, (y - yc) * chord, 0.0)
                }
                DesignVariableKind::Parabolic => {
                    let y = shapes::parabolic_surface(xc, p[0], p[1], upper);
                    Vector3::new(0.0, (y - yc) * chord, 0.0)
                }
                DesignVariableKind::Obstacle => {
                    Vector3::new(0.0, shapes::obstacle(x.x - le.x, p[0], p[1]), 0.0)
                }
                DesignVariableKind::Stretch => Vector3::new(dv.value * (x.x - p[0]), 0.0, 0.0),
                DesignVariableKind::Rotation => match &rotation {
                    Some((origin, r)) => origin + r * (x - origin) - x,
                    None => Vector3::zeros(),
                },
                DesignVariableKind::Displacement => dv.value * Vector3::new(p[0], p[1], p[2]),
                other => {
                    return Err(MotionError::Unsupported(format!("{:?} is not an analytic design variable", other)));
                }
            };
            let vertex = &mut mesh.markers[m].vertices[iv];
            vertex.var_coord += d;
            if mesh.dim == 2 {
                vertex.var_coord.z = 0.0;
            }
        }
        mesh.markers[m].moving = true;
    }
    Ok(())
}
