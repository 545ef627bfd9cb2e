//! Point-to-point block stiffness matrix for the spring analogy.
//!
//! Every mesh point carries `dim` displacement unknowns; the matrix stores one
//! dim×dim block per coupled point pair in CSR layout over points. The
//! sparsity pattern is all point pairs sharing an element, so both the edge
//! springs and the torsional springs on element faces fit in it.

use nalgebra::{SMatrix, Vector3};
use sprs::{CsMat, TriMat};

use crate::error::{MotionError, Result};
use crate::mesh::Mesh;

/// Floor on sin²θ so collapsed corners give a large but finite stiffness
const MIN_SIN_SQ: f64 = 1e-12;

/// Block-sparse symmetric matrix over mesh points
#[derive(Debug, Clone, Default)]
pub struct BlockMatrix {
    dim: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl BlockMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_allocated(&self) -> bool {
        !self.row_ptr.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_points(&self) -> usize {
        self.row_ptr.len().saturating_sub(1)
    }

    /// Allocate the pattern from the element connectivity.
    ///
    /// Fails with `StructureAllocated` if a structure already exists.
    pub fn initialize_structure(&mut self, mesh: &Mesh) -> Result<()> {
        if self.is_allocated() {
            return Err(MotionError::StructureAllocated);
        }
        let n = mesh.num_nodes();
        let mut neighbors: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
        for elem in &mesh.connectivity.elements {
            for &a in &elem.nodes {
                for &b in &elem.nodes {
                    if a != b {
                        neighbors[a].push(b);
                    }
                }
            }
        }

        self.dim = mesh.dim;
        self.row_ptr = Vec::with_capacity(n + 1);
        self.row_ptr.push(0);
        self.col_idx.clear();
        for mut row in neighbors {
            row.sort_unstable();
            row.dedup();
            self.col_idx.extend_from_slice(&row);
            self.row_ptr.push(self.col_idx.len());
        }
        self.values = vec![0.0; self.col_idx.len() * self.dim * self.dim];
        log::debug!(
            "Stiffness structure: {} points, {} blocks of {}x{}",
            n,
            self.col_idx.len(),
            self.dim,
            self.dim
        );
        Ok(())
    }

    /// Release the structure so it can be rebuilt for a new connectivity.
    pub fn deallocate(&mut self) {
        self.row_ptr.clear();
        self.col_idx.clear();
        self.values.clear();
    }

    pub fn set_zero(&mut self) {
        self.values.fill(0.0);
    }

    fn block_offset(&self, i: usize, j: usize) -> usize {
        let row = &self.col_idx[self.row_ptr[i]..self.row_ptr[i + 1]];
        match row.binary_search(&j) {
            Ok(pos) => (self.row_ptr[i] + pos) * self.dim * self.dim,
            Err(_) => panic!("points {} and {} are not coupled in the stiffness pattern", i, j),
        }
    }

    /// Add `value` to entry (a,b) of block (i,j).
    pub fn add(&mut self, i: usize, j: usize, a: usize, b: usize, value: f64) {
        let o = self.block_offset(i, j);
        self.values[o + a * self.dim + b] += value;
    }

    /// Add `s·I` to block (i,j).
    pub fn add_scaled_identity(&mut self, i: usize, j: usize, s: f64) {
        let o = self.block_offset(i, j);
        for d in 0..self.dim {
            self.values[o + d * self.dim + d] += s;
        }
    }

    /// Entry (a,b) of block (i,j), zero outside the pattern.
    pub fn get(&self, i: usize, j: usize, a: usize, b: usize) -> f64 {
        let row = &self.col_idx[self.row_ptr[i]..self.row_ptr[i + 1]];
        match row.binary_search(&j) {
            Ok(pos) => self.values[(self.row_ptr[i] + pos) * self.dim * self.dim + a * self.dim + b],
            Err(_) => 0.0,
        }
    }

    /// Whether point `i` couples to any other point.
    pub fn is_connected(&self, i: usize) -> bool {
        self.row_ptr[i + 1] - self.row_ptr[i] > 1
    }

    /// Scalar CSR matrix of size (n·dim)².
    pub fn to_csr(&self) -> CsMat<f64> {
        let n = self.n_points() * self.dim;
        let d = self.dim;
        let mut tri = TriMat::with_capacity((n, n), self.values.len());
        for i in 0..self.n_points() {
            for pos in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.col_idx[pos];
                for a in 0..d {
                    for b in 0..d {
                        let v = self.values[pos * d * d + a * d + b];
                        if v != 0.0 {
                            tri.add_triplet(i * d + a, j * d + b, v);
                        }
                    }
                }
            }
        }
        tri.to_csr()
    }
}

/// Linear springs on every edge, stiffness `weight / L`.
///
/// Returns the shortest edge length.
pub fn set_spring_method_contributions_edges(mesh: &Mesh, matrix: &mut BlockMatrix, weight: f64) -> f64 {
    let mut min_length = f64::INFINITY;
    for &(i, j) in &mesh.connectivity.edges {
        let length = (mesh.geometry.nodes[j] - mesh.geometry.nodes[i]).norm();
        min_length = min_length.min(length);
        if length <= 0.0 {
            log::warn!("Zero-length edge between points {} and {}", i, j);
            continue;
        }
        let k = weight / length;
        matrix.add_scaled_identity(i, i, k);
        matrix.add_scaled_identity(j, j, k);
        matrix.add_scaled_identity(i, j, -k);
        matrix.add_scaled_identity(j, i, -k);
    }
    min_length
}

/// Gradient of the corner angle at `a` of triangle (a,b,c) with respect to
/// the positions of a, b and c.
pub fn angle_gradient(
    xa: &Vector3<f64>,
    xb: &Vector3<f64>,
    xc: &Vector3<f64>,
) -> (f64, [Vector3<f64>; 3]) {
    let e1 = xb - xa;
    let e2 = xc - xa;
    let l1 = e1.norm();
    let l2 = e2.norm();
    let u1 = e1 / l1;
    let u2 = e2 / l2;
    let cos = u1.dot(&u2).clamp(-1.0, 1.0);
    let theta = cos.acos();

    // Unit component of each edge perpendicular to the other
    let t1 = (u2 - cos * u1).try_normalize(1e-14).unwrap_or_else(Vector3::zeros);
    let t2 = (u1 - cos * u2).try_normalize(1e-14).unwrap_or_else(Vector3::zeros);

    let gb = -t1 / l1;
    let gc = -t2 / l2;
    let ga = -(gb + gc);
    (theta, [ga, gb, gc])
}

/// Torsional (corner-angle) stiffness of one triangle: Rᵀ·C·R with
/// C = diag(1/sin²θ) and R the 3×9 map from node displacements to angle
/// changes.
pub fn triangle_torsional_matrix(x: [Vector3<f64>; 3]) -> SMatrix<f64, 9, 9> {
    let mut r = SMatrix::<f64, 3, 9>::zeros();
    let mut c = SMatrix::<f64, 3, 3>::zeros();

    for corner in 0..3 {
        let a = corner;
        let b = (corner + 1) % 3;
        let cc = (corner + 2) % 3;
        let (theta, grads) = angle_gradient(&x[a], &x[b], &x[cc]);
        let sin_sq = theta.sin().powi(2).max(MIN_SIN_SQ);
        c[(corner, corner)] = 1.0 / sin_sq;
        for (node, g) in [a, b, cc].iter().zip(grads.iter()) {
            for d in 0..3 {
                r[(corner, 3 * node + d)] += g[d];
            }
        }
    }

    r.transpose() * c * r
}

/// Torsional springs on every triangular face of every element.
pub fn set_torsional_contributions(mesh: &Mesh, matrix: &mut BlockMatrix, weight: f64) {
    let dim = mesh.dim;
    for elem in &mesh.connectivity.elements {
        for tri in elem.kind.triangles() {
            let nodes = [elem.nodes[tri[0]], elem.nodes[tri[1]], elem.nodes[tri[2]]];
            let x = nodes.map(|n| mesh.geometry.nodes[n].coords);
            let k = triangle_torsional_matrix(x);
            for (p, &ni) in nodes.iter().enumerate() {
                for (q, &nj) in nodes.iter().enumerate() {
                    for a in 0..dim {
                        for b in 0..dim {
                            let v = k[(3 * p + a, 3 * q + b)];
                            if v != 0.0 {
                                matrix.add(ni, nj, a, b, weight * v);
                            }
                        }
                    }
                }
            }
        }
    }
}
