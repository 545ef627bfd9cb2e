//! Free-form deformation box: a tensor-product Bezier volume.
//!
//! X(u,v,w) = Σ_ijk P_ijk · B_i^l(u)·B_j^m(v)·B_k^n(w)
//!
//! Control points live in one flat buffer of (l+1)(m+1)(n+1)·3 scalars. The
//! undeformed geometry (`base`) is never touched by design perturbations;
//! those go into a displacement field of the same shape. `reset` clears the
//! displacement, `commit` folds it into the base geometry.
//!
//! Corner numbering (parametric position of each corner):
//!
//! ```text
//! 0:(0,0,0) 1:(1,0,0) 2:(1,1,0) 3:(0,1,0)
//! 4:(0,0,1) 5:(1,0,1) 6:(1,1,1) 7:(0,1,1)
//! ```
//!
//! Degrees above ~9 per axis lose accuracy in the point inversion because the
//! Bernstein basis becomes badly conditioned near the box centre.

use nalgebra::{Matrix3, Point3, Vector3};

use super::bernstein::{basis_with_derivatives, bernstein};
use crate::error::{MotionError, Result};
use crate::mesh::Mesh;

/// Parametric position of each corner.
pub const CORNER_PARAMS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Parametric coordinates may leave [0,1] by at most this much during Newton
/// updates.
const PARAMETRIC_MARGIN: f64 = 0.5;

/// Slack used to accept a parametric coordinate as lying inside the box.
pub const INSIDE_TOLERANCE: f64 = 1e-6;

/// A mesh point lying inside a box, with its cached parametric coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacePoint {
    pub marker: usize,
    pub vertex: usize,
    pub point: usize,
    pub cartesian: Point3<f64>,
    pub parametric: [f64; 3],
}

/// Result of a point inversion.
#[derive(Debug, Clone, Copy)]
pub struct Inversion {
    pub uvw: [f64; 3],
    pub iterations: usize,
    pub gradient_norm: f64,
    pub converged: bool,
}

/// Free-form deformation box.
#[derive(Debug, Clone)]
pub struct FfdBox {
    tag: String,
    level: usize,
    degree: [usize; 3],
    base: Vec<f64>,
    delta: Vec<f64>,
    corners: [Point3<f64>; 8],
    parents: Vec<String>,
    children: Vec<String>,
    surface_points: Vec<SurfacePoint>,
    /// Parametric coordinates of the control points inside the support box
    support_params: Vec<[f64; 3]>,
    /// Parametric coordinates of the control points inside the parent box
    parent_params: Vec<[f64; 3]>,
}

impl FfdBox {
    /// Create a box of the given degree with all points at the origin.
    pub fn new(tag: &str, degree: [usize; 3]) -> Result<Self> {
        if degree.iter().any(|&d| d == 0) {
            return Err(MotionError::config(format!(
                "FFD box '{}': degree must be at least 1 per axis, got {:?}",
                tag, degree
            )));
        }
        let n_cp = (degree[0] + 1) * (degree[1] + 1) * (degree[2] + 1);
        Ok(Self {
            tag: tag.to_string(),
            level: 0,
            degree,
            base: vec![0.0; n_cp * 3],
            delta: vec![0.0; n_cp * 3],
            corners: [Point3::origin(); 8],
            parents: Vec::new(),
            children: Vec::new(),
            surface_points: Vec::new(),
            support_params: Vec::new(),
            parent_params: Vec::new(),
        })
    }

    /// Axis-aligned box between `min` and `max` with parallelepiped control points.
    pub fn axis_aligned(tag: &str, degree: [usize; 3], min: Point3<f64>, max: Point3<f64>) -> Result<Self> {
        let mut b = Self::new(tag, degree)?;
        for (c, p) in CORNER_PARAMS.iter().enumerate() {
            let pt = Point3::new(
                if p[0] == 0 { min.x } else { max.x },
                if p[1] == 0 { min.y } else { max.y },
                if p[2] == 0 { min.z } else { max.z },
            );
            b.set_corner_point(c, pt);
        }
        b.set_control_points_parallelepiped();
        Ok(b)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn set_level(&mut self, level: usize) {
        self.level = level;
    }

    pub fn degree(&self) -> [usize; 3] {
        self.degree
    }

    pub fn n_control_points(&self) -> usize {
        self.base.len() / 3
    }

    /// Offset of control point (i,j,k) in the flat buffers.
    ///
    /// # Panics
    /// Panics if any index exceeds the degree along its axis.
    pub fn cp_offset(&self, i: usize, j: usize, k: usize) -> usize {
        let [l, m, n] = self.degree;
        assert!(
            i <= l && j <= m && k <= n,
            "control point ({}, {}, {}) out of range for degree {:?}",
            i,
            j,
            k,
            self.degree
        );
        3 * (i + (l + 1) * (j + (m + 1) * k))
    }

    /// Iterate over all control-point indices, i fastest.
    pub fn cp_indices(&self) -> impl Iterator<Item = (usize, usize, usize)> {
        let [l, m, n] = self.degree;
        (0..=n).flat_map(move |k| (0..=m).flat_map(move |j| (0..=l).map(move |i| (i, j, k))))
    }

    /// Current (deformed) control point.
    pub fn control_point(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        let o = self.cp_offset(i, j, k);
        Point3::new(
            self.base[o] + self.delta[o],
            self.base[o + 1] + self.delta[o + 1],
            self.base[o + 2] + self.delta[o + 2],
        )
    }

    /// Undeformed control point.
    pub fn base_control_point(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        let o = self.cp_offset(i, j, k);
        Point3::new(self.base[o], self.base[o + 1], self.base[o + 2])
    }

    /// Displacement currently applied to control point (i,j,k).
    pub fn control_point_displacement(&self, i: usize, j: usize, k: usize) -> Vector3<f64> {
        let o = self.cp_offset(i, j, k);
        Vector3::new(self.delta[o], self.delta[o + 1], self.delta[o + 2])
    }

    /// Store an undeformed control point and clear its displacement.
    pub fn set_control_point(&mut self, i: usize, j: usize, k: usize, p: Point3<f64>) {
        let o = self.cp_offset(i, j, k);
        self.base[o..o + 3].copy_from_slice(p.coords.as_slice());
        self.delta[o..o + 3].fill(0.0);
    }

    /// Add a movement to the displacement of control point (i,j,k).
    pub fn move_control_point(&mut self, i: usize, j: usize, k: usize, movement: Vector3<f64>) {
        let o = self.cp_offset(i, j, k);
        for d in 0..3 {
            self.delta[o + d] += movement[d];
        }
    }

    /// Place control point (i,j,k) at `p` by adjusting its displacement.
    pub fn place_control_point(&mut self, i: usize, j: usize, k: usize, p: Point3<f64>) {
        let o = self.cp_offset(i, j, k);
        for d in 0..3 {
            self.delta[o + d] = p[d] - self.base[o + d];
        }
    }

    /// Drop every design perturbation.
    pub fn reset(&mut self) {
        self.delta.fill(0.0);
    }

    /// Make the current control points the new undeformed geometry.
    pub fn commit(&mut self) {
        for (b, d) in self.base.iter_mut().zip(self.delta.iter_mut()) {
            *b += *d;
            *d = 0.0;
        }
    }

    pub fn is_deformed(&self) -> bool {
        self.delta.iter().any(|&d| d != 0.0)
    }

    /// # Panics
    /// Panics if `idx >= 8`.
    pub fn set_corner_point(&mut self, idx: usize, p: Point3<f64>) {
        assert!(idx < 8, "corner index {} out of range", idx);
        self.corners[idx] = p;
    }

    pub fn corner_point(&self, idx: usize) -> Point3<f64> {
        self.corners[idx]
    }

    pub fn corners(&self) -> &[Point3<f64>; 8] {
        &self.corners
    }

    /// Corners of the unit cube.
    pub fn set_unit_corner_points(&mut self) {
        for (c, p) in CORNER_PARAMS.iter().enumerate() {
            self.corners[c] = Point3::new(p[0] as f64, p[1] as f64, p[2] as f64);
        }
    }

    /// Spread the control points as the trilinear image of a uniform
    /// (i/l, j/m, k/n) lattice spanned by the corners.
    pub fn set_control_points_parallelepiped(&mut self) {
        let [l, m, n] = self.degree;
        let indices: Vec<_> = self.cp_indices().collect();
        for (i, j, k) in indices {
            let uvw = [i as f64 / l as f64, j as f64 / m as f64, k as f64 / n as f64];
            let p = trilinear(&self.corners, uvw);
            self.set_control_point(i, j, k, p);
        }
    }

    /// Evaluate the Bezier volume at a parametric coordinate.
    pub fn eval_cartesian(&self, uvw: [f64; 3]) -> Point3<f64> {
        let [l, m, n] = self.degree;
        let bu: Vec<f64> = (0..=l).map(|i| bernstein(l as i32, i as i32, uvw[0])).collect();
        let bv: Vec<f64> = (0..=m).map(|j| bernstein(m as i32, j as i32, uvw[1])).collect();
        let bw: Vec<f64> = (0..=n).map(|k| bernstein(n as i32, k as i32, uvw[2])).collect();

        let mut x = Vector3::zeros();
        for (i, j, k) in self.cp_indices() {
            let w = bu[i] * bv[j] * bw[k];
            x += w * self.control_point(i, j, k).coords;
        }
        Point3::from(x)
    }

    /// Closed-form inverse assuming an axis-aligned box between corners 0 and 6.
    pub fn parametric_analytical(&self, xyz: &Point3<f64>) -> [f64; 3] {
        let lo = self.corners[0];
        let hi = self.corners[6];
        let mut uvw = [0.0; 3];
        for d in 0..3 {
            let span = hi[d] - lo[d];
            uvw[d] = if span.abs() > f64::EPSILON { (xyz[d] - lo[d]) / span } else { 0.0 };
        }
        uvw
    }

    /// X, its Jacobian J[d][a] = ∂X_d/∂u_a and second derivatives
    /// H[d][(a,b)] = ∂²X_d/∂u_a∂u_b at one parametric coordinate.
    fn derivatives(&self, uvw: [f64; 3]) -> (Vector3<f64>, Matrix3<f64>, [Matrix3<f64>; 3]) {
        let [l, m, n] = self.degree;
        let (bu, du, d2u) = basis_with_derivatives(l, uvw[0]);
        let (bv, dv, d2v) = basis_with_derivatives(m, uvw[1]);
        let (bw, dw, d2w) = basis_with_derivatives(n, uvw[2]);

        let mut x = Vector3::zeros();
        let mut jac = Matrix3::zeros();
        let mut hess = [Matrix3::zeros(); 3];

        for (i, j, k) in self.cp_indices() {
            let p = self.control_point(i, j, k).coords;
            let b = [bu[i], bv[j], bw[k]];
            let db = [du[i], dv[j], dw[k]];
            let d2b = [d2u[i], d2v[j], d2w[k]];

            x += b[0] * b[1] * b[2] * p;

            let grad = [db[0] * b[1] * b[2], b[0] * db[1] * b[2], b[0] * b[1] * db[2]];
            for a in 0..3 {
                for d in 0..3 {
                    jac[(d, a)] += grad[a] * p[d];
                }
            }

            for a in 0..3 {
                for c in a..3 {
                    let w = if a == c {
                        let mut f = [b[0], b[1], b[2]];
                        f[a] = d2b[a];
                        f[0] * f[1] * f[2]
                    } else {
                        let mut f = [b[0], b[1], b[2]];
                        f[a] = db[a];
                        f[c] = db[c];
                        f[0] * f[1] * f[2]
                    };
                    for d in 0..3 {
                        hess[d][(a, c)] += w * p[d];
                        if a != c {
                            hess[d][(c, a)] += w * p[d];
                        }
                    }
                }
            }
        }
        (x, jac, hess)
    }

    /// Analytic gradient of F(u,v,w) = ‖X(u,v,w) − xyz‖².
    pub fn gradient_analytical(&self, uvw: [f64; 3], xyz: &Point3<f64>) -> Vector3<f64> {
        let (x, jac, _) = self.derivatives(uvw);
        2.0 * jac.transpose() * (x - xyz.coords)
    }

    /// Central-difference gradient of F, for checking the analytic one.
    pub fn gradient_numerical(&self, uvw: [f64; 3], xyz: &Point3<f64>) -> Vector3<f64> {
        let h = 1e-6;
        let f = |p: [f64; 3]| (self.eval_cartesian(p) - xyz).norm_squared();
        let mut g = Vector3::zeros();
        for a in 0..3 {
            let mut up = uvw;
            let mut dn = uvw;
            up[a] += h;
            dn[a] -= h;
            g[a] = (f(up) - f(dn)) / (2.0 * h);
        }
        g
    }

    /// Analytic Hessian of F.
    pub fn hessian_analytical(&self, uvw: [f64; 3], xyz: &Point3<f64>) -> Matrix3<f64> {
        let (x, jac, hess) = self.derivatives(uvw);
        let r = x - xyz.coords;
        let mut h = 2.0 * jac.transpose() * jac;
        for d in 0..3 {
            h += 2.0 * r[d] * hess[d];
        }
        h
    }

    /// Newton-Raphson point inversion minimising ‖X(u,v,w) − xyz‖².
    ///
    /// Stops when ‖∇F‖ < `tol` or after `max_iterations`; non-convergence is
    /// reported in the result and the last iterate is returned.
    pub fn parametric_iterative(
        &self,
        xyz: &Point3<f64>,
        guess: [f64; 3],
        tol: f64,
        max_iterations: usize,
    ) -> Inversion {
        let mut uvw = guess;
        let mut gradient_norm = f64::INFINITY;

        for iter in 0..=max_iterations {
            let (x, jac, hess) = self.derivatives(uvw);
            let r = x - xyz.coords;
            let grad = 2.0 * jac.transpose() * r;
            gradient_norm = grad.norm();
            if gradient_norm < tol {
                return Inversion { uvw, iterations: iter, gradient_norm, converged: true };
            }
            if iter == max_iterations {
                break;
            }

            let mut h = 2.0 * jac.transpose() * jac;
            for d in 0..3 {
                h += 2.0 * r[d] * hess[d];
            }

            // Gauss-Newton step when the full Hessian is singular
            let step = h
                .lu()
                .solve(&(-grad))
                .or_else(|| (2.0 * jac.transpose() * jac).lu().solve(&(-grad)));
            let Some(step) = step else {
                break;
            };

            for a in 0..3 {
                uvw[a] = (uvw[a] + step[a]).clamp(-PARAMETRIC_MARGIN, 1.0 + PARAMETRIC_MARGIN);
            }
        }

        Inversion { uvw, iterations: max_iterations, gradient_norm, converged: false }
    }

    /// Degree-(1,1,1) box whose control points are this box's corners.
    pub fn support_box(&self) -> FfdBox {
        let mut support = FfdBox {
            tag: format!("{}_support", self.tag),
            level: self.level,
            degree: [1, 1, 1],
            base: vec![0.0; 24],
            delta: vec![0.0; 24],
            corners: self.corners,
            parents: Vec::new(),
            children: Vec::new(),
            surface_points: Vec::new(),
            support_params: Vec::new(),
            parent_params: Vec::new(),
        };
        for (c, p) in CORNER_PARAMS.iter().enumerate() {
            support.set_control_point(p[0], p[1], p[2], self.corners[c]);
        }
        support
    }

    /// Cache the parametric coordinates of the control points inside the
    /// support box spanned by the current corners.
    pub fn set_support_cp(&mut self, tol: f64, max_iterations: usize) {
        let support = self.support_box();
        let indices: Vec<_> = self.cp_indices().collect();
        self.support_params = indices
            .into_iter()
            .map(|(i, j, k)| {
                let p = self.base_control_point(i, j, k);
                let guess = support.parametric_analytical(&p);
                let inv = support.parametric_iterative(&p, guess, tol, max_iterations);
                if !inv.converged {
                    log::warn!(
                        "FFD box '{}': support inversion of control point ({}, {}, {}) did not converge (|grad| = {:.3e})",
                        self.tag, i, j, k, inv.gradient_norm
                    );
                }
                inv.uvw
            })
            .collect();
    }

    /// Recompute the undeformed control points after the corners moved.
    ///
    /// Uses the parametric coordinates cached by `set_support_cp`; the design
    /// displacement field is kept.
    pub fn set_support_cp_change(&mut self) {
        if self.support_params.len() != self.n_control_points() {
            let [l, m, n] = self.degree;
            self.support_params = self
                .cp_indices()
                .map(|(i, j, k)| [i as f64 / l as f64, j as f64 / m as f64, k as f64 / n as f64])
                .collect();
        }
        let support = self.support_box();
        let indices: Vec<_> = self.cp_indices().collect();
        for (idx, (i, j, k)) in indices.into_iter().enumerate() {
            let p = support.eval_cartesian(self.support_params[idx]);
            let o = self.cp_offset(i, j, k);
            self.base[o..o + 3].copy_from_slice(p.coords.as_slice());
        }
    }

    /// Cache the parametric coordinates of this box's control points inside
    /// `parent`.
    pub fn set_parametric_coord_cp(&mut self, parent: &FfdBox, tol: f64, max_iterations: usize) {
        let indices: Vec<_> = self.cp_indices().collect();
        self.parent_params = indices
            .into_iter()
            .map(|(i, j, k)| {
                let p = self.control_point(i, j, k);
                let guess = parent.parametric_analytical(&p);
                let inv = parent.parametric_iterative(&p, guess, tol, max_iterations);
                if !inv.converged {
                    log::warn!(
                        "FFD box '{}': control point ({}, {}, {}) not inverted in parent '{}'",
                        self.tag, i, j, k, parent.tag
                    );
                }
                inv.uvw
            })
            .collect();
    }

    /// Move the control points (and corners) with the deformed `parent`.
    pub fn get_cartesian_coord_cp(&mut self, parent: &FfdBox) {
        if self.parent_params.len() != self.n_control_points() {
            log::warn!(
                "FFD box '{}': no parametric coordinates inside parent '{}', control points left in place",
                self.tag, parent.tag
            );
            return;
        }
        let [l, m, n] = self.degree;
        let indices: Vec<_> = self.cp_indices().collect();
        for (idx, (i, j, k)) in indices.into_iter().enumerate() {
            let p = parent.eval_cartesian(self.parent_params[idx]);
            self.place_control_point(i, j, k, p);
        }
        for (c, q) in CORNER_PARAMS.iter().enumerate() {
            self.corners[c] = self.control_point(q[0] * l, q[1] * m, q[2] * n);
        }
    }

    /// Axis-aligned bounds of the current control points.
    pub fn bounding_box(&self) -> (Point3<f64>, Point3<f64>) {
        let mut lo = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut hi = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (i, j, k) in self.cp_indices() {
            let p = self.control_point(i, j, k);
            for d in 0..3 {
                lo[d] = lo[d].min(p[d]);
                hi[d] = hi[d].max(p[d]);
            }
        }
        (lo, hi)
    }

    /// Whether a point lies within the control-point bounds.
    pub fn contains_point(&self, p: &Point3<f64>) -> bool {
        let (lo, hi) = self.bounding_box();
        (0..3).all(|d| p[d] >= lo[d] - INSIDE_TOLERANCE && p[d] <= hi[d] + INSIDE_TOLERANCE)
    }

    /// Mesh points inside the box bounds.
    pub fn deformation_zone(&self, mesh: &Mesh) -> Vec<usize> {
        mesh.geometry
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, p)| self.contains_point(p))
            .map(|(i, _)| i)
            .collect()
    }

    /// Collect the moving-marker vertices inside the box and cache their
    /// parametric coordinates by point inversion.
    ///
    /// Returns the number of points recorded. Points that do not invert to
    /// [0,1]³ are skipped with a warning.
    pub fn set_parametric_coord(&mut self, mesh: &Mesh, tol: f64, max_iterations: usize) -> usize {
        self.surface_points.clear();
        let mut rejected = 0;
        for (im, marker) in mesh.markers.iter().enumerate().filter(|(_, m)| m.moving) {
            for (iv, v) in marker.vertices.iter().enumerate() {
                let xyz = mesh.geometry.nodes[v.point];
                if !self.contains_point(&xyz) {
                    continue;
                }
                let guess = self.parametric_analytical(&xyz).map(|c| c.clamp(0.0, 1.0));
                let mut inv = self.parametric_iterative(&xyz, guess, tol, max_iterations);
                if !inv.converged {
                    inv = self.parametric_iterative(&xyz, [0.5; 3], tol, max_iterations);
                }
                let inside = inv
                    .uvw
                    .iter()
                    .all(|&c| (-INSIDE_TOLERANCE..=1.0 + INSIDE_TOLERANCE).contains(&c));
                if inv.converged && inside {
                    self.surface_points.push(SurfacePoint {
                        marker: im,
                        vertex: iv,
                        point: v.point,
                        cartesian: xyz,
                        parametric: inv.uvw,
                    });
                } else {
                    rejected += 1;
                }
            }
        }
        if rejected > 0 {
            log::warn!(
                "FFD box '{}': {} boundary points could not be inverted and stay outside the box",
                self.tag, rejected
            );
        }
        log::debug!("FFD box '{}': {} surface points", self.tag, self.surface_points.len());
        self.surface_points.len()
    }

    /// Re-invert cached surface points after the box itself moved, starting
    /// from the previous parametric coordinate.
    pub fn update_parametric_coord(&mut self, mesh: &Mesh, tol: f64, max_iterations: usize) -> usize {
        let mut failures = 0;
        let mut updated = Vec::with_capacity(self.surface_points.len());
        for sp in &self.surface_points {
            let xyz = mesh.geometry.nodes[sp.point];
            let inv = self.parametric_iterative(&xyz, sp.parametric, tol, max_iterations);
            if !inv.converged {
                failures += 1;
            }
            updated.push(SurfacePoint { cartesian: xyz, parametric: inv.uvw, ..sp.clone() });
        }
        self.surface_points = updated;
        if failures > 0 {
            log::warn!("FFD box '{}': {} parametric updates did not converge", self.tag, failures);
        }
        failures
    }

    pub fn add_surface_point(&mut self, sp: SurfacePoint) {
        self.surface_points.push(sp);
    }

    pub fn surface_points(&self) -> &[SurfacePoint] {
        &self.surface_points
    }

    pub fn n_surface_points(&self) -> usize {
        self.surface_points.len()
    }

    pub fn add_parent(&mut self, tag: &str) {
        self.parents.push(tag.to_string());
    }

    pub fn add_child(&mut self, tag: &str) {
        self.children.push(tag.to_string());
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }
}

/// Trilinear blend of eight corners.
pub fn trilinear(corners: &[Point3<f64>; 8], uvw: [f64; 3]) -> Point3<f64> {
    let mut x = Vector3::zeros();
    for (c, p) in CORNER_PARAMS.iter().enumerate() {
        let mut w = 1.0;
        for d in 0..3 {
            w *= if p[d] == 1 { uvw[d] } else { 1.0 - uvw[d] };
        }
        x += w * corners[c].coords;
    }
    Point3::from(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn skewed_corners() -> [Point3<f64>; 8] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.1, 0.0),
            Point3::new(2.2, 1.0, 0.1),
            Point3::new(0.1, 1.1, 0.0),
            Point3::new(0.0, 0.1, 1.0),
            Point3::new(2.1, 0.0, 1.1),
            Point3::new(2.0, 1.2, 1.0),
            Point3::new(0.2, 1.0, 0.9),
        ]
    }

    fn skewed_box(degree: [usize; 3]) -> FfdBox {
        let mut b = FfdBox::new("skew", degree).unwrap();
        for (c, p) in skewed_corners().iter().enumerate() {
            b.set_corner_point(c, *p);
        }
        b.set_control_points_parallelepiped();
        b
    }

    #[test]
    fn test_zero_degree_rejected() {
        assert!(FfdBox::new("bad", [1, 0, 1]).is_err());
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_control_point_panics() {
        let b = FfdBox::new("b", [2, 1, 1]).unwrap();
        let _ = b.control_point(3, 0, 0);
    }

    #[test]
    fn test_parallelepiped_reproduces_trilinear() {
        let corners = skewed_corners();
        for degree in [[1, 1, 1], [2, 3, 1], [4, 2, 3]] {
            let b = skewed_box(degree);
            for &uvw in &[[0.0, 0.0, 0.0], [0.3, 0.7, 0.1], [1.0, 0.5, 0.25], [1.0, 1.0, 1.0]] {
                let x = b.eval_cartesian(uvw);
                assert_relative_eq!(x, trilinear(&corners, uvw), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_corner_move_degree_one() {
        let mut b = FfdBox::axis_aligned("unit", [1, 1, 1], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        b.move_control_point(1, 1, 1, Vector3::new(0.0, 0.0, 0.5));
        let x = b.eval_cartesian([1.0, 1.0, 1.0]);
        assert_relative_eq!(x.z, 1.5, epsilon = 1e-14);
        // Trilinear blend at the centre: one corner of eight moved by 0.5
        let c = b.eval_cartesian([0.5, 0.5, 0.5]);
        assert_relative_eq!(c.z, 0.5 + 0.5 / 8.0, epsilon = 1e-14);
        b.reset();
        assert_relative_eq!(b.eval_cartesian([1.0, 1.0, 1.0]).z, 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_commit_keeps_shape() {
        let mut b = skewed_box([2, 2, 1]);
        b.move_control_point(1, 1, 0, Vector3::new(0.1, -0.2, 0.3));
        let before = b.eval_cartesian([0.4, 0.6, 0.2]);
        b.commit();
        assert!(!b.is_deformed());
        assert_relative_eq!(b.eval_cartesian([0.4, 0.6, 0.2]), before, epsilon = 1e-14);
    }

    #[test]
    fn test_analytic_gradient_and_hessian() {
        let mut b = skewed_box([2, 2, 2]);
        b.move_control_point(1, 1, 1, Vector3::new(0.2, 0.1, -0.1));
        let xyz = Point3::new(0.9, 0.4, 0.6);
        let uvw = [0.3, 0.55, 0.7];
        let ga = b.gradient_analytical(uvw, &xyz);
        let gn = b.gradient_numerical(uvw, &xyz);
        assert_relative_eq!(ga, gn, epsilon = 1e-6);

        let h = b.hessian_analytical(uvw, &xyz);
        let eps = 1e-6;
        for a in 0..3 {
            let mut up = uvw;
            let mut dn = uvw;
            up[a] += eps;
            dn[a] -= eps;
            let col = (b.gradient_analytical(up, &xyz) - b.gradient_analytical(dn, &xyz)) / (2.0 * eps);
            for r in 0..3 {
                assert_relative_eq!(h[(r, a)], col[r], epsilon = 1e-5);
            }
        }
        assert_relative_eq!(h, h.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_inversion_round_trip() {
        let mut b = skewed_box([3, 2, 2]);
        b.move_control_point(1, 1, 1, Vector3::new(0.05, 0.1, 0.0));
        b.move_control_point(2, 0, 1, Vector3::new(0.0, -0.05, 0.08));
        for &uvw in &[[0.2, 0.3, 0.4], [0.9, 0.1, 0.5], [0.5, 0.5, 0.5], [0.0, 1.0, 0.75]] {
            let xyz = b.eval_cartesian(uvw);
            let inv = b.parametric_iterative(&xyz, [0.5, 0.5, 0.5], 1e-12, 100);
            assert!(inv.converged, "no convergence for {:?}", uvw);
            for d in 0..3 {
                assert_relative_eq!(inv.uvw[d], uvw[d], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_exact_guess_converges_immediately() {
        let b = skewed_box([2, 2, 2]);
        let uvw = [0.25, 0.5, 0.75];
        let xyz = b.eval_cartesian(uvw);
        let inv = b.parametric_iterative(&xyz, uvw, 1e-10, 50);
        assert!(inv.converged);
        assert_eq!(inv.iterations, 0);
    }

    #[test]
    fn test_analytical_inverse_of_axis_aligned_box() {
        let b = FfdBox::axis_aligned("a", [2, 2, 2], Point3::new(-1.0, 0.0, 2.0), Point3::new(1.0, 4.0, 3.0)).unwrap();
        let uvw = b.parametric_analytical(&Point3::new(0.0, 1.0, 2.5));
        assert_relative_eq!(uvw[0], 0.5);
        assert_relative_eq!(uvw[1], 0.25);
        assert_relative_eq!(uvw[2], 0.5);
    }

    #[test]
    fn test_support_cp_change_tracks_corners() {
        let mut b = FfdBox::axis_aligned("s", [2, 2, 1], Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
        b.set_support_cp(1e-12, 50);
        // Shear the top face
        for c in 4..8 {
            let p = b.corner_point(c);
            b.set_corner_point(c, Point3::new(p.x + 0.5, p.y, p.z));
        }
        b.set_support_cp_change();
        let top_mid = b.control_point(1, 1, 1);
        assert_relative_eq!(top_mid, Point3::new(1.0, 0.5, 1.0), epsilon = 1e-10);
        let bottom_mid = b.control_point(1, 1, 0);
        assert_relative_eq!(bottom_mid, Point3::new(0.5, 0.5, 0.0), epsilon = 1e-10);
    }

    #[test]
    fn test_child_follows_parent() {
        let mut parent = FfdBox::axis_aligned("p", [1, 1, 1], Point3::origin(), Point3::new(4.0, 4.0, 4.0)).unwrap();
        let mut child =
            FfdBox::axis_aligned("c", [1, 1, 1], Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0)).unwrap();
        child.set_parametric_coord_cp(&parent, 1e-12, 50);
        // Rigid translation of the parent
        for (i, j, k) in parent.cp_indices().collect::<Vec<_>>() {
            parent.move_control_point(i, j, k, Vector3::new(0.0, 0.0, 1.0));
        }
        child.get_cartesian_coord_cp(&parent);
        assert_relative_eq!(child.corner_point(0), Point3::new(1.0, 1.0, 2.0), epsilon = 1e-10);
        assert_relative_eq!(child.control_point(1, 1, 1), Point3::new(2.0, 2.0, 3.0), epsilon = 1e-10);
    }
}
