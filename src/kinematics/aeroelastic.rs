//! Two-degree-of-freedom typical-section structural model
//!
//! Plunge h (positive down) and pitch α (positive nose up) about the
//! elastic axis, in the usual non-dimensional form with τ = ω_α·t:
//!
//!   [1   x_α ] [h''/b]   [(ω_h/ω_α)²   0  ] [h/b]   V*²  [ −C_l ]
//!   [x_α r_α²] [α''  ] + [    0      r_α²] [α  ] = ──── [ 2C_m ]
//!                                                   π
//!
//! where V* is the flutter speed index. Each call advances the state one
//! explicit (symplectic Euler) step with the loads of the current flow
//! solution; the fluid and structure are not iterated to convergence.

use nalgebra::{Matrix2, Point3, Rotation3, Vector2};
use std::f64::consts::PI;

use crate::config::AeroelasticConfig;
use crate::error::{MotionError, Result};
use crate::mesh::Mesh;
use crate::utils::units::rad_to_deg;

/// Structural state of the typical section
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AeroelasticState {
    /// Plunge displacement h (length units, positive down)
    pub plunge: f64,
    /// Pitch angle α (rad, positive nose up)
    pub pitch: f64,
    /// dh/dt
    pub plunge_rate: f64,
    /// dα/dt
    pub pitch_rate: f64,
}

/// Change of the structural state over one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AeroelasticIncrement {
    pub plunge: f64,
    pub pitch: f64,
}

/// Typical-section model with its current state
#[derive(Debug, Clone)]
pub struct TypicalSection {
    params: AeroelasticConfig,
    mass: Matrix2<f64>,
    mass_inv: Matrix2<f64>,
    stiffness: Matrix2<f64>,
    pub state: AeroelasticState,
}

impl TypicalSection {
    pub fn new(params: &AeroelasticConfig) -> Result<Self> {
        let x_a = params.static_unbalance;
        let r2 = params.radius_gyration_sq;
        let mass = Matrix2::new(1.0, x_a, x_a, r2);
        let mass_inv = mass
            .try_inverse()
            .ok_or_else(|| MotionError::config("aeroelastic mass matrix is singular (r_alpha^2 = x_alpha^2)"))?;
        if params.pitch_frequency <= 0.0 || params.semi_chord <= 0.0 {
            return Err(MotionError::config("aeroelastic pitch frequency and semi-chord must be positive"));
        }
        let w = params.frequency_ratio;
        let stiffness = Matrix2::new(w * w, 0.0, 0.0, r2);
        Ok(Self {
            params: params.clone(),
            mass,
            mass_inv,
            stiffness,
            state: AeroelasticState::default(),
        })
    }

    pub fn params(&self) -> &AeroelasticConfig {
        &self.params
    }

    pub fn mass_matrix(&self) -> &Matrix2<f64> {
        &self.mass
    }

    /// Non-dimensional generalized force for the given lift and moment
    /// coefficients.
    pub fn generalized_force(&self, cl: f64, cm: f64) -> Vector2<f64> {
        let v = self.params.flutter_speed_index;
        (v * v / PI) * Vector2::new(-cl, 2.0 * cm)
    }

    /// Advance one physical step `dt` under loads (Cl, Cm).
    ///
    /// Returns the plunge and pitch increments.
    pub fn step(&mut self, cl: f64, cm: f64, dt: f64) -> AeroelasticIncrement {
        let b = self.params.semi_chord;
        let w_a = self.params.pitch_frequency;
        let dtau = w_a * dt;

        // Non-dimensional coordinates q = (h/b, α) and rates dq/dτ
        let q = Vector2::new(self.state.plunge / b, self.state.pitch);
        let q_dot = Vector2::new(self.state.plunge_rate / (b * w_a), self.state.pitch_rate / w_a);

        let q_ddot = self.mass_inv * (self.generalized_force(cl, cm) - self.stiffness * q);
        let q_dot_new = q_dot + dtau * q_ddot;
        let q_new = q + dtau * q_dot_new;

        let previous = self.state;
        self.state = AeroelasticState {
            plunge: q_new[0] * b,
            pitch: q_new[1],
            plunge_rate: q_dot_new[0] * b * w_a,
            pitch_rate: q_dot_new[1] * w_a,
        };
        log::debug!(
            "Typical section: h = {:.6e}, alpha = {:.4} deg (Cl = {:.4}, Cm = {:.4})",
            self.state.plunge,
            rad_to_deg(self.state.pitch),
            cl,
            cm
        );
        AeroelasticIncrement {
            plunge: self.state.plunge - previous.plunge,
            pitch: self.state.pitch - previous.pitch,
        }
    }

    /// Total structural energy in non-dimensional units.
    pub fn energy(&self) -> f64 {
        let b = self.params.semi_chord;
        let w_a = self.params.pitch_frequency;
        let q = Vector2::new(self.state.plunge / b, self.state.pitch);
        let q_dot = Vector2::new(self.state.plunge_rate / (b * w_a), self.state.pitch_rate / w_a);
        0.5 * q_dot.dot(&(self.mass * q_dot)) + 0.5 * q.dot(&(self.stiffness * q))
    }
}

/// Apply a structural increment as a rigid plunge plus a pitch about the
/// elastic axis.
///
/// The airfoil chord lies along +x with the leading edge upstream, so a
/// positive plunge moves points along −y and nose-up pitch is a clockwise
/// rotation about +z.
pub fn apply_increment(mesh: &mut Mesh, elastic_axis: &Point3<f64>, increment: &AeroelasticIncrement) {
    let rotation = Rotation3::from_axis_angle(&nalgebra::Vector3::z_axis(), -increment.pitch);
    let shift = nalgebra::Vector3::new(0.0, -increment.plunge, 0.0);
    for x in &mut mesh.geometry.nodes {
        *x = elastic_axis + rotation * (*x - elastic_axis) + shift;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshGenerator;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_load_at_rest_stays_at_rest() {
        let mut section = TypicalSection::new(&AeroelasticConfig::default()).unwrap();
        let inc = section.step(0.0, 0.0, 1e-3);
        assert_eq!(inc.plunge, 0.0);
        assert_eq!(inc.pitch, 0.0);
        assert_eq!(section.state, AeroelasticState::default());
    }

    #[test]
    fn test_positive_lift_moves_section_up() {
        let params = AeroelasticConfig { static_unbalance: 0.0, ..AeroelasticConfig::default() };
        let mut section = TypicalSection::new(&params).unwrap();
        let inc = section.step(0.5, 0.0, 1e-3);
        // h is positive down
        assert!(inc.plunge < 0.0);
        assert_relative_eq!(inc.pitch, 0.0);
    }

    #[test]
    fn test_free_oscillation_energy_stays_bounded() {
        let mut section = TypicalSection::new(&AeroelasticConfig::default()).unwrap();
        section.state.pitch = 0.05;
        let e0 = section.energy();
        for _ in 0..5000 {
            section.step(0.0, 0.0, 2e-5);
        }
        let e = section.energy();
        assert!((e - e0).abs() / e0 < 0.05, "energy drift {} -> {}", e0, e);
    }

    #[test]
    fn test_singular_mass_matrix_rejected() {
        let params = AeroelasticConfig {
            static_unbalance: 2.0,
            radius_gyration_sq: 4.0,
            ..AeroelasticConfig::default()
        };
        assert!(matches!(TypicalSection::new(&params), Err(MotionError::Config(_))));
    }

    #[test]
    fn test_nose_up_pitch_raises_leading_edge() {
        let mut mesh = MeshGenerator::rectangle_quads(2, 1, 1.0, 0.1);
        let axis = Point3::new(0.5, 0.05, 0.0);
        let le_before = mesh.geometry.nodes[0];
        apply_increment(&mut mesh, &axis, &AeroelasticIncrement { plunge: 0.0, pitch: 0.1 });
        assert!(mesh.geometry.nodes[0].y > le_before.y);
        assert_relative_eq!(
            (mesh.geometry.nodes[0] - axis).norm(),
            (le_before - axis).norm(),
            epsilon = 1e-12
        );
    }
}
