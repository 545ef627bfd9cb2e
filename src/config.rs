//! Configuration management for dynamic mesh simulations
//!
//! Reads TOML configuration files and provides structured data for the
//! motion kind, kinematic parameters, deformation solver settings and
//! FFD design variables.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use crate::error::{MotionError, Result};
use crate::surface::DesignVariable;
use crate::utils::units::deg_to_rad;

/// Main motion configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MotionConfig {
    #[serde(default)]
    pub grid_movement: GridMovementConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub motion: MotionParams,
    #[serde(default)]
    pub deform: DeformConfig,
    #[serde(default)]
    pub ffd: FfdConfig,
    #[serde(default)]
    pub aeroelastic: AeroelasticConfig,
    #[serde(default)]
    pub flutter: FlutterConfig,
    #[serde(default)]
    pub external: ExternalConfig,
}

/// Kind of grid movement applied to a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GridMovementKind {
    #[default]
    None,
    RigidMotion,
    External,
    ExternalRotation,
    Flutter,
    Aeroelastic,
}

/// Time integration scheme of the outer driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScheme {
    #[default]
    Steady,
    #[serde(rename = "dual_time_1st")]
    DualTime1st,
    #[serde(rename = "dual_time_2nd")]
    DualTime2nd,
    TimeSpectral,
}

/// Volume deformation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeformMethod {
    #[default]
    Spring,
    TorsionalSpring,
    Algebraic,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GridMovementConfig {
    #[serde(default)]
    pub kind: GridMovementKind,
    /// Number of coarse multigrid levels below the finest mesh
    #[serde(default)]
    pub mg_levels: usize,
    /// Adjoint runs restrict fine-level grid velocities instead of differencing
    #[serde(default)]
    pub adjoint: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeConfig {
    #[serde(default)]
    pub scheme: TimeScheme,
    /// Physical time step (s)
    #[serde(default = "default_delta_t")]
    pub delta_t: f64,
    /// Number of time instances for time-spectral runs
    #[serde(default = "default_time_instances")]
    pub n_time_instances: usize,
    /// Reference angular frequency used to non-dimensionalise omegas
    #[serde(default = "default_one")]
    pub omega_ref: f64,
    /// Implicit time integration adds the intra-step delta to spectral sources
    #[serde(default)]
    pub implicit: bool,
}

fn default_delta_t() -> f64 { 1e-3 }
fn default_time_instances() -> usize { 3 }
fn default_one() -> f64 { 1.0 }

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            scheme: TimeScheme::Steady,
            delta_t: default_delta_t(),
            n_time_instances: default_time_instances(),
            omega_ref: 1.0,
            implicit: false,
        }
    }
}

/// Rigid and periodic motion parameters (per axis x, y, z)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MotionParams {
    /// Origin of rotation / pitching
    #[serde(default)]
    pub origin: [f64; 3],
    /// Constant angular rate (rad/s)
    #[serde(default)]
    pub rotation_rate: [f64; 3],
    /// Pitching angular frequency (rad/s)
    #[serde(default)]
    pub pitching_omega: [f64; 3],
    /// Pitching amplitude (degrees)
    #[serde(default)]
    pub pitching_amplitude: [f64; 3],
    /// Pitching phase (degrees)
    #[serde(default)]
    pub pitching_phase: [f64; 3],
    /// Plunging angular frequency (rad/s)
    #[serde(default)]
    pub plunging_omega: [f64; 3],
    /// Plunging amplitude (length units)
    #[serde(default)]
    pub plunging_amplitude: [f64; 3],
}

/// Axis-aligned region; points outside it are held fixed during deformation
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BoxBounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoxBounds {
    pub fn contains(&self, p: &nalgebra::Point3<f64>) -> bool {
        (0..3).all(|d| p[d] >= self.min[d] && p[d] <= self.max[d])
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeformConfig {
    #[serde(default)]
    pub method: DeformMethod,
    /// Relative residual tolerance of the spring solve
    #[serde(default = "default_deform_tol")]
    pub tolerance: f64,
    /// Absolute tolerance per mesh point (scaled by the point count)
    #[serde(default = "default_tol_per_point")]
    pub tol_per_point: f64,
    /// Iteration cap of the spring solve
    #[serde(default = "default_deform_iter")]
    pub max_iterations: usize,
    /// Weight of the linear spring stiffness
    #[serde(default = "default_one")]
    pub c_lin: f64,
    /// Weight of the torsional spring stiffness
    #[serde(default = "default_one")]
    pub c_tor: f64,
    /// Number of equal increments the boundary displacement is split into
    #[serde(default = "default_increments")]
    pub increments: usize,
    /// Laplacian smoothing passes after the solve (0 = off)
    #[serde(default)]
    pub smoothing_iterations: usize,
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    /// Consecutive capped solves before the deformer gives up (0 = never)
    #[serde(default = "default_escalate")]
    pub escalate_after_caps: usize,
    /// Only points inside this region move
    #[serde(default)]
    pub hold_fixed_box: Option<BoxBounds>,
    /// Inverse-distance power of the algebraic method
    #[serde(default = "default_algebraic_power")]
    pub algebraic_power: f64,
}

fn default_deform_tol() -> f64 { 1e-10 }
fn default_tol_per_point() -> f64 { 1e-14 }
fn default_deform_iter() -> usize { 1000 }
fn default_increments() -> usize { 1 }
fn default_smoothing_alpha() -> f64 { 0.5 }
fn default_escalate() -> usize { 10 }
fn default_algebraic_power() -> f64 { 3.0 }

impl Default for DeformConfig {
    fn default() -> Self {
        Self {
            method: DeformMethod::Spring,
            tolerance: default_deform_tol(),
            tol_per_point: default_tol_per_point(),
            max_iterations: default_deform_iter(),
            c_lin: 1.0,
            c_tor: 1.0,
            increments: 1,
            smoothing_iterations: 0,
            smoothing_alpha: default_smoothing_alpha(),
            escalate_after_caps: default_escalate(),
            hold_fixed_box: None,
            algebraic_power: default_algebraic_power(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FfdConfig {
    #[serde(default = "default_inv_tol")]
    pub inversion_tolerance: f64,
    #[serde(default = "default_inv_iter")]
    pub inversion_max_iterations: usize,
    #[serde(default)]
    pub design_variables: Vec<DesignVariable>,
}

fn default_inv_tol() -> f64 { 1e-12 }
fn default_inv_iter() -> usize { 500 }

impl Default for FfdConfig {
    fn default() -> Self {
        Self {
            inversion_tolerance: default_inv_tol(),
            inversion_max_iterations: default_inv_iter(),
            design_variables: Vec::new(),
        }
    }
}

/// Typical-section structural model (non-dimensional, Isogai-style defaults)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AeroelasticConfig {
    /// Airfoil mass ratio μ
    #[serde(default = "default_mass_ratio")]
    pub mass_ratio: f64,
    /// Plunge to pitch natural frequency ratio ω_h/ω_α
    #[serde(default = "default_one")]
    pub frequency_ratio: f64,
    /// Static unbalance x_α (semi-chords)
    #[serde(default = "default_static_unbalance")]
    pub static_unbalance: f64,
    /// Squared radius of gyration r_α²
    #[serde(default = "default_radius_gyration_sq")]
    pub radius_gyration_sq: f64,
    /// Flutter speed index V / (b ω_α √μ)
    #[serde(default = "default_flutter_speed_index")]
    pub flutter_speed_index: f64,
    /// Natural pitch frequency ω_α (rad/s)
    #[serde(default = "default_pitch_frequency")]
    pub pitch_frequency: f64,
    /// Semi-chord b (length units)
    #[serde(default = "default_semi_chord")]
    pub semi_chord: f64,
}

fn default_mass_ratio() -> f64 { 60.0 }
fn default_static_unbalance() -> f64 { 1.8 }
fn default_radius_gyration_sq() -> f64 { 3.48 }
fn default_flutter_speed_index() -> f64 { 0.6 }
fn default_pitch_frequency() -> f64 { 100.0 }
fn default_semi_chord() -> f64 { 0.5 }

impl Default for AeroelasticConfig {
    fn default() -> Self {
        Self {
            mass_ratio: default_mass_ratio(),
            frequency_ratio: 1.0,
            static_unbalance: default_static_unbalance(),
            radius_gyration_sq: default_radius_gyration_sq(),
            flutter_speed_index: default_flutter_speed_index(),
            pitch_frequency: default_pitch_frequency(),
            semi_chord: default_semi_chord(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FlutterConfig {
    /// Start of the twist axis used by 3-D flutter
    #[serde(default)]
    pub axis_origin: [f64; 3],
    /// End of the twist axis used by 3-D flutter
    #[serde(default = "default_axis_end")]
    pub axis_end: [f64; 3],
}

fn default_axis_end() -> [f64; 3] { [0.0, 1.0, 0.0] }

impl Default for FlutterConfig {
    fn default() -> Self {
        Self { axis_origin: [0.0; 3], axis_end: default_axis_end() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExternalConfig {
    /// Motion files are `<prefix>_<iter:05>.dat`
    #[serde(default = "default_motion_prefix")]
    pub motion_file_prefix: String,
}

fn default_motion_prefix() -> String { "mesh_motion".to_string() }

impl Default for ExternalConfig {
    fn default() -> Self {
        Self { motion_file_prefix: default_motion_prefix() }
    }
}

impl MotionConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: MotionConfig = toml::from_str(contents)
            .map_err(|e| MotionError::parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.time.delta_t <= 0.0 {
            return Err(MotionError::config("time.delta_t must be positive"));
        }
        if self.time.omega_ref <= 0.0 {
            return Err(MotionError::config("time.omega_ref must be positive"));
        }
        if self.time.scheme == TimeScheme::TimeSpectral && self.time.n_time_instances < 2 {
            return Err(MotionError::config("time-spectral runs need at least 2 time instances"));
        }
        if self.deform.increments == 0 {
            return Err(MotionError::config("deform.increments must be at least 1"));
        }
        if self.deform.max_iterations == 0 {
            return Err(MotionError::config("deform.max_iterations must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.deform.smoothing_alpha) {
            return Err(MotionError::config("deform.smoothing_alpha must lie in [0, 1]"));
        }
        if self.deform.c_lin < 0.0 || self.deform.c_tor < 0.0 {
            return Err(MotionError::config("spring weights must be non-negative"));
        }
        Ok(())
    }

    /// Non-dimensional pitching angular velocity vector
    pub fn pitching_omega(&self) -> [f64; 3] {
        let w = self.motion.pitching_omega;
        let r = self.time.omega_ref;
        [w[0] / r, w[1] / r, w[2] / r]
    }

    /// Oscillation period 2π/|ω| of the pitching motion, if any
    pub fn oscillation_period(&self) -> Option<f64> {
        let w = self.pitching_omega();
        let mag = (w[0] * w[0] + w[1] * w[1] + w[2] * w[2]).sqrt();
        if mag > 0.0 {
            Some(2.0 * PI / mag)
        } else {
            None
        }
    }

    /// Time step between two consecutive motion updates
    ///
    /// For time-spectral runs the instances are spread evenly over one period.
    pub fn motion_time_step(&self) -> f64 {
        match self.time.scheme {
            TimeScheme::TimeSpectral => match self.oscillation_period() {
                Some(period) => period / self.time.n_time_instances as f64,
                None => self.time.delta_t,
            },
            _ => self.time.delta_t,
        }
    }

    /// Pitching amplitudes in radians
    pub fn pitching_amplitude_rad(&self) -> [f64; 3] {
        self.motion.pitching_amplitude.map(deg_to_rad)
    }

    /// Pitching phases in radians
    pub fn pitching_phase_rad(&self) -> [f64; 3] {
        self.motion.pitching_phase.map(deg_to_rad)
    }

    pub fn is_time_spectral(&self) -> bool {
        self.time.scheme == TimeScheme::TimeSpectral
    }

    /// Human-readable configuration summary
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("Grid movement: {:?}", self.grid_movement.kind));
        s.push_str(&format!(", MG levels: {}", self.grid_movement.mg_levels));
        if self.grid_movement.adjoint {
            s.push_str(" (adjoint)");
        }
        s.push_str(&format!("\nTime: {:?}, dt = {:.3e}", self.time.scheme, self.time.delta_t));
        if self.is_time_spectral() {
            s.push_str(&format!(", {} instances", self.time.n_time_instances));
        }
        s.push_str(&format!(
            "\nDeformation: {:?} (tol = {:.1e}, max_iter = {}, increments = {})",
            self.deform.method, self.deform.tolerance, self.deform.max_iterations, self.deform.increments
        ));
        if !self.ffd.design_variables.is_empty() {
            s.push_str(&format!("\nDesign variables: {}", self.ffd.design_variables.len()));
        }
        s
    }
}
