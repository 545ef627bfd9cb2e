//! Agglomerated multigrid hierarchy
//!
//! Level 0 is the finest (computational) mesh. Every coarse level groups the
//! points of the level above into control volumes; a coarse point stores the
//! indices of its children. Coarse levels carry no elements, only points,
//! edges between neighbouring agglomerates, control volumes and velocities.

use crate::mesh::Mesh;
use nalgebra::{Point3, Vector3};
use std::collections::HashSet;

/// One coarse grid level
#[derive(Debug, Clone)]
pub struct CoarseLevel {
    /// Agglomerate coordinates (control-volume weighted centroid)
    pub nodes: Vec<Point3<f64>>,
    /// Children on the next finer level
    pub children: Vec<Vec<usize>>,
    /// Agglomerate adjacency (i < j)
    pub edges: Vec<(usize, usize)>,
    pub volumes: Vec<f64>,
    pub grid_velocity: Vec<Vector3<f64>>,
}

impl CoarseLevel {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Coarse levels built below a fine mesh
#[derive(Debug, Clone, Default)]
pub struct MeshHierarchy {
    /// `levels[0]` is the first coarse level
    pub levels: Vec<CoarseLevel>,
}

impl MeshHierarchy {
    /// Build up to `n_coarse` levels by repeated agglomeration
    ///
    /// Stops early when a level no longer shrinks.
    pub fn build(mesh: &Mesh, n_coarse: usize) -> Self {
        let mut levels: Vec<CoarseLevel> = Vec::with_capacity(n_coarse);

        for _ in 0..n_coarse {
            let (n_fine, edges) = match levels.last() {
                Some(l) => (l.num_nodes(), l.edges.clone()),
                None => (mesh.num_nodes(), mesh.connectivity.edges.clone()),
            };
            let children = agglomerate(n_fine, &edges);
            if children.len() == n_fine || children.is_empty() {
                break;
            }
            let coarse_edges = coarse_edges(n_fine, &edges, &children);
            let n_coarse_pts = children.len();
            levels.push(CoarseLevel {
                nodes: vec![Point3::origin(); n_coarse_pts],
                children,
                edges: coarse_edges,
                volumes: vec![0.0; n_coarse_pts],
                grid_velocity: vec![Vector3::zeros(); n_coarse_pts],
            });
        }

        let mut hierarchy = Self { levels };
        hierarchy.restrict_geometry(mesh);
        log::debug!(
            "Multigrid hierarchy: {} fine points, coarse sizes {:?}",
            mesh.num_nodes(),
            hierarchy.levels.iter().map(|l| l.num_nodes()).collect::<Vec<_>>()
        );
        hierarchy
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Restrict control volumes and coordinates from the fine mesh down
    ///
    /// Coarse volume = Σ children volumes;
    /// coarse coordinate = Σ V_child·x_child / Σ V_child.
    pub fn restrict_geometry(&mut self, mesh: &Mesh) {
        let mut fine_nodes = mesh.geometry.nodes.clone();
        let mut fine_vol = mesh.volumes.current.clone();

        for level in &mut self.levels {
            for (c, children) in level.children.iter().enumerate() {
                let mut vol = 0.0;
                let mut weighted = Vector3::zeros();
                for &f in children {
                    vol += fine_vol[f];
                    weighted += fine_vol[f] * fine_nodes[f].coords;
                }
                level.volumes[c] = vol;
                level.nodes[c] = if vol > 0.0 {
                    Point3::from(weighted / vol)
                } else {
                    let sum: Vector3<f64> = children.iter().map(|&f| fine_nodes[f].coords).sum();
                    Point3::from(sum / children.len() as f64)
                };
            }
            fine_nodes = level.nodes.clone();
            fine_vol = level.volumes.clone();
        }
    }

    /// Restrict grid velocities: volume-weighted average of the children
    ///
    /// Used on every level for adjoint runs, where no forward coordinate
    /// history exists to difference.
    pub fn restrict_grid_velocity(&mut self, mesh: &Mesh) {
        let mut fine_vel = mesh.grid_velocity.clone();
        let mut fine_vol = mesh.volumes.current.clone();

        for level in &mut self.levels {
            for (c, children) in level.children.iter().enumerate() {
                let mut vol = 0.0;
                let mut weighted = Vector3::zeros();
                for &f in children {
                    vol += fine_vol[f];
                    weighted += fine_vol[f] * fine_vel[f];
                }
                level.grid_velocity[c] = if vol > 0.0 { weighted / vol } else { Vector3::zeros() };
            }
            fine_vel = level.grid_velocity.clone();
            fine_vol = level.volumes.clone();
        }
    }

    /// Coarse grid velocities as the change of agglomerate coordinates
    ///
    /// `previous` holds the coarse coordinates before the current motion step.
    pub fn difference_grid_velocity(&mut self, previous: &[Vec<Point3<f64>>], dt: f64) {
        for (level, old) in self.levels.iter_mut().zip(previous) {
            for (v, (x, x0)) in level.grid_velocity.iter_mut().zip(level.nodes.iter().zip(old)) {
                *v = (x - x0) / dt;
            }
        }
    }

    /// Snapshot of all coarse coordinates
    pub fn coordinates(&self) -> Vec<Vec<Point3<f64>>> {
        self.levels.iter().map(|l| l.nodes.clone()).collect()
    }
}

/// Greedy agglomeration: every unassigned seed grabs its unassigned
/// neighbours
///
/// Returns the children list of each coarse point; every fine point belongs
/// to exactly one agglomerate.
pub fn agglomerate(n_fine: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::new(); n_fine];
    for &(i, j) in edges {
        neighbors[i].push(j);
        neighbors[j].push(i);
    }

    let mut parent: Vec<Option<usize>> = vec![None; n_fine];
    let mut children: Vec<Vec<usize>> = Vec::new();

    for seed in 0..n_fine {
        if parent[seed].is_some() {
            continue;
        }
        let id = children.len();
        let mut group = vec![seed];
        parent[seed] = Some(id);
        for &nb in &neighbors[seed] {
            if parent[nb].is_none() {
                parent[nb] = Some(id);
                group.push(nb);
            }
        }
        children.push(group);
    }

    // Merge singletons into a neighbouring agglomerate
    let mut merged: Vec<Vec<usize>> = Vec::with_capacity(children.len());
    let mut remap = vec![usize::MAX; children.len()];
    for (id, group) in children.iter().enumerate() {
        if group.len() == 1 {
            let seed = group[0];
            let target = neighbors[seed]
                .iter()
                .filter_map(|&nb| parent[nb])
                .find(|&p| p != id && remap[p] != usize::MAX);
            if let Some(p) = target {
                merged[remap[p]].push(seed);
                remap[id] = remap[p];
                continue;
            }
        }
        remap[id] = merged.len();
        merged.push(group.clone());
    }
    merged
}

fn coarse_edges(n_fine: usize, fine_edges: &[(usize, usize)], children: &[Vec<usize>]) -> Vec<(usize, usize)> {
    let mut owner = vec![0usize; n_fine];
    for (c, group) in children.iter().enumerate() {
        for &f in group {
            owner[f] = c;
        }
    }
    let mut unique = HashSet::new();
    for &(i, j) in fine_edges {
        let (a, b) = (owner[i], owner[j]);
        if a != b {
            unique.insert(if a < b { (a, b) } else { (b, a) });
        }
    }
    let mut edges: Vec<(usize, usize)> = unique.into_iter().collect();
    edges.sort_unstable();
    edges
}
