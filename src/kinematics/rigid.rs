//! Rigid and periodic body motion
//!
//! Every point follows the same closed-form transform of its reference
//! position:
//!
//!   x(t) = o + p(t) + R_rot(t)·R_pitch(t)·(x_ref − o)
//!
//! with
//! - rotation angle θ(t) = ω_rot·t per axis,
//! - pitching angle α(t) = A·sin(ω t + φ) − A·sin(φ) per axis,
//! - plunging offset p(t) = A_p·sin(ω_p t) per axis.
//!
//! Motion is applied incrementally from `t_old` to `t_new`: the current
//! position is first mapped back to the reference frame with the transform at
//! `t_old`, then forward with the transform at `t_new`. Pure composition keeps
//! repeated steps free of drift.

use nalgebra::{Point3, Rotation3, Vector3};

use crate::config::MotionConfig;
use crate::mesh::Mesh;

/// Closed-form rigid/periodic motion parameters (non-dimensional rates)
#[derive(Debug, Clone)]
pub struct RigidMotion {
    pub origin: Point3<f64>,
    /// Constant angular rate per axis (rad per time unit)
    pub rotation_rate: Vector3<f64>,
    pub pitching_omega: Vector3<f64>,
    /// Pitching amplitude per axis (rad)
    pub pitching_amplitude: Vector3<f64>,
    /// Pitching phase per axis (rad)
    pub pitching_phase: Vector3<f64>,
    pub plunging_omega: Vector3<f64>,
    pub plunging_amplitude: Vector3<f64>,
}

impl Default for RigidMotion {
    fn default() -> Self {
        Self {
            origin: Point3::origin(),
            rotation_rate: Vector3::zeros(),
            pitching_omega: Vector3::zeros(),
            pitching_amplitude: Vector3::zeros(),
            pitching_phase: Vector3::zeros(),
            plunging_omega: Vector3::zeros(),
            plunging_amplitude: Vector3::zeros(),
        }
    }
}

impl RigidMotion {
    /// Build from configuration: rates divided by `omega_ref`, angles in radians.
    pub fn from_config(config: &MotionConfig) -> Self {
        let m = &config.motion;
        let r = config.time.omega_ref;
        let scaled = |w: [f64; 3]| Vector3::new(w[0] / r, w[1] / r, w[2] / r);
        Self {
            origin: Point3::from(m.origin),
            rotation_rate: scaled(m.rotation_rate),
            pitching_omega: Vector3::from(config.pitching_omega()),
            pitching_amplitude: Vector3::from(config.pitching_amplitude_rad()),
            pitching_phase: Vector3::from(config.pitching_phase_rad()),
            plunging_omega: scaled(m.plunging_omega),
            plunging_amplitude: Vector3::from(m.plunging_amplitude),
        }
    }

    pub fn is_stationary(&self) -> bool {
        self.rotation_rate.norm() == 0.0
            && self.pitching_amplitude.component_mul(&self.pitching_omega).norm() == 0.0
            && self.plunging_amplitude.component_mul(&self.plunging_omega).norm() == 0.0
    }

    pub fn rotation_angles(&self, t: f64) -> Vector3<f64> {
        self.rotation_rate * t
    }

    pub fn pitching_angles(&self, t: f64) -> Vector3<f64> {
        Vector3::from_fn(|d, _| {
            let a = self.pitching_amplitude[d];
            let phi = self.pitching_phase[d];
            a * (self.pitching_omega[d] * t + phi).sin() - a * phi.sin()
        })
    }

    pub fn plunging_offset(&self, t: f64) -> Vector3<f64> {
        Vector3::from_fn(|d, _| self.plunging_amplitude[d] * (self.plunging_omega[d] * t).sin())
    }

    /// Combined rotation R_rot(t)·R_pitch(t).
    pub fn rotation(&self, t: f64) -> Rotation3<f64> {
        let rot = self.rotation_angles(t);
        let pitch = self.pitching_angles(t);
        Rotation3::from_euler_angles(rot.x, rot.y, rot.z) * Rotation3::from_euler_angles(pitch.x, pitch.y, pitch.z)
    }

    /// Position at time `t` of the point whose reference position is `x_ref`.
    pub fn position(&self, x_ref: &Point3<f64>, t: f64) -> Point3<f64> {
        self.origin + self.plunging_offset(t) + self.rotation(t) * (x_ref - self.origin)
    }

    /// Move a point known at `t_old` to its position at `t_new`.
    pub fn displace(&self, x: &Point3<f64>, t_old: f64, t_new: f64) -> Point3<f64> {
        let x_ref = self.origin + self.rotation(t_old).inverse() * (x - self.origin - self.plunging_offset(t_old));
        self.position(&x_ref, t_new)
    }

    /// Rigid velocity of a point at `x` and time `t`.
    ///
    /// Angular velocities are combined additively, exact whenever a single
    /// axis moves.
    pub fn velocity(&self, x: &Point3<f64>, t: f64) -> Vector3<f64> {
        let pitch_rate = Vector3::from_fn(|d, _| {
            let w = self.pitching_omega[d];
            self.pitching_amplitude[d] * w * (w * t + self.pitching_phase[d]).cos()
        });
        let plunge_rate = Vector3::from_fn(|d, _| {
            let w = self.plunging_omega[d];
            self.plunging_amplitude[d] * w * (w * t).cos()
        });
        let omega = self.rotation_rate + pitch_rate;
        let r = x - (self.origin + self.plunging_offset(t));
        plunge_rate + omega.cross(&r)
    }

    /// Move every mesh point from `t_old` to `t_new`.
    ///
    /// Planar meshes keep z = 0.
    pub fn apply(&self, mesh: &mut Mesh, t_old: f64, t_new: f64) {
        let planar = mesh.dim == 2;
        for x in &mut mesh.geometry.nodes {
            let mut new = self.displace(x, t_old, t_new);
            if planar {
                new.z = x.z;
            }
            *x = new;
        }
        log::debug!(
            "Rigid motion t = {:.4e} -> {:.4e}: rotation {:?}, pitch {:?}",
            t_old,
            t_new,
            self.rotation_angles(t_new).as_slice(),
            self.pitching_angles(t_new).as_slice()
        );
    }

    /// Move only the vertices of the given markers and record their
    /// displacement as `var_coord` for a subsequent volume deformation.
    pub fn apply_to_markers(&self, mesh: &mut Mesh, markers: &[usize], t_old: f64, t_new: f64) {
        let planar = mesh.dim == 2;
        for &m in markers {
            for v in mesh.markers[m].vertices.iter_mut() {
                let x = mesh.geometry.nodes[v.point];
                let mut d = self.displace(&x, t_old, t_new) - x;
                if planar {
                    d.z = 0.0;
                }
                v.var_coord = d;
            }
        }
    }
}

/// Start and end time of the motion increment for physical iteration `iter`.
///
/// Time-spectral instances always start from the reference geometry.
pub fn motion_time_window(time_spectral: bool, iter: usize, dt: f64) -> (f64, f64) {
    let t_new = iter as f64 * dt;
    if time_spectral {
        (0.0, t_new)
    } else {
        ((t_new - dt).max(0.0), t_new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn pitching_about_z(amplitude: f64, omega: f64) -> RigidMotion {
        RigidMotion {
            pitching_omega: Vector3::new(0.0, 0.0, omega),
            pitching_amplitude: Vector3::new(0.0, 0.0, amplitude),
            ..RigidMotion::default()
        }
    }

    #[test]
    fn test_quarter_period_pitch() {
        let a = 0.2;
        let omega = 2.0;
        let motion = pitching_about_z(a, omega);
        let period = 2.0 * PI / omega;
        let x = Point3::new(1.5, 0.0, 0.0);
        let moved = motion.displace(&x, 0.0, period / 4.0);
        assert_relative_eq!(moved.x, 1.5 * a.cos(), epsilon = 1e-12);
        assert_relative_eq!(moved.y, 1.5 * a.sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_incremental_steps_match_single_step() {
        let motion = RigidMotion {
            origin: Point3::new(0.25, 0.0, 0.0),
            rotation_rate: Vector3::new(0.0, 0.0, 0.3),
            pitching_omega: Vector3::new(0.0, 0.0, 1.7),
            pitching_amplitude: Vector3::new(0.0, 0.0, 0.1),
            pitching_phase: Vector3::new(0.0, 0.0, 0.4),
            plunging_omega: Vector3::new(0.0, 2.0, 0.0),
            plunging_amplitude: Vector3::new(0.0, 0.05, 0.0),
        };
        let x0 = Point3::new(1.0, 0.2, 0.0);
        let dt = 0.05;
        let mut x = x0;
        for step in 1..=20 {
            x = motion.displace(&x, (step - 1) as f64 * dt, step as f64 * dt);
        }
        let direct = motion.displace(&x0, 0.0, 20.0 * dt);
        assert_relative_eq!(x, direct, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_to_origin_preserved_without_plunge() {
        let motion = RigidMotion {
            origin: Point3::new(0.5, 0.5, 0.0),
            rotation_rate: Vector3::new(0.0, 0.0, 1.0),
            ..RigidMotion::default()
        };
        let x = Point3::new(2.0, -1.0, 0.0);
        let moved = motion.displace(&x, 0.3, 1.1);
        assert_relative_eq!((moved - motion.origin).norm(), (x - motion.origin).norm(), epsilon = 1e-12);
    }

    #[test]
    fn test_velocity_matches_finite_difference() {
        let motion = pitching_about_z(0.1, 3.0);
        let x_ref = Point3::new(1.0, 0.3, 0.0);
        let t = 0.37;
        let h = 1e-6;
        let fd = (motion.position(&x_ref, t + h) - motion.position(&x_ref, t - h)) / (2.0 * h);
        let v = motion.velocity(&motion.position(&x_ref, t), t);
        assert_relative_eq!(v, fd, epsilon = 1e-6);
    }

    #[test]
    fn test_time_window() {
        assert_eq!(motion_time_window(true, 3, 0.5), (0.0, 1.5));
        assert_eq!(motion_time_window(false, 3, 0.5), (1.0, 1.5));
        assert_eq!(motion_time_window(false, 0, 0.5), (0.0, 0.0));
    }
}
