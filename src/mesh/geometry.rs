use nalgebra::{Point3, Vector3};

use super::quality::signed_volume;
use super::topology::{BoundaryMarker, Connectivity, Element};

/// Geometric information for the mesh
///
/// Besides the current coordinates, the two previous time levels are kept
/// for finite-difference grid velocities.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    /// Node coordinates (z = 0 for 2-D meshes)
    pub nodes: Vec<Point3<f64>>,
    /// Coordinates at time level n
    pub coord_n: Vec<Point3<f64>>,
    /// Coordinates at time level n-1
    pub coord_n1: Vec<Point3<f64>>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, x: f64, y: f64, z: f64) -> usize {
        let idx = self.nodes.len();
        let p = Point3::new(x, y, z);
        self.nodes.push(p);
        self.coord_n.push(p);
        self.coord_n1.push(p);
        idx
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn get_node(&self, idx: usize) -> Option<&Point3<f64>> {
        self.nodes.get(idx)
    }
}

/// Dual control volumes with time history
#[derive(Debug, Clone, Default)]
pub struct ControlVolumes {
    pub current: Vec<f64>,
    pub n: Vec<f64>,
    pub n1: Vec<f64>,
}

/// Complete mesh with geometry, topology and boundary markers
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Spatial dimension (2 or 3)
    pub dim: usize,
    pub geometry: Geometry,
    pub connectivity: Connectivity,
    pub markers: Vec<BoundaryMarker>,
    /// Grid velocity per node
    pub grid_velocity: Vec<Vector3<f64>>,
    pub volumes: ControlVolumes,
}

impl Mesh {
    /// # Panics
    /// Panics if `dim` is not 2 or 3
    pub fn new(dim: usize) -> Self {
        assert!(dim == 2 || dim == 3, "mesh dimension must be 2 or 3, got {}", dim);
        Self {
            dim,
            geometry: Geometry::new(),
            connectivity: Connectivity::new(),
            markers: Vec::new(),
            grid_velocity: Vec::new(),
            volumes: ControlVolumes::default(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.geometry.num_nodes()
    }

    pub fn num_elements(&self) -> usize {
        self.connectivity.num_elements()
    }

    pub fn add_node(&mut self, x: f64, y: f64, z: f64) -> usize {
        self.grid_velocity.push(Vector3::zeros());
        self.geometry.add_node(x, y, z)
    }

    pub fn add_element(&mut self, element: Element) {
        self.connectivity.add_element(element);
    }

    pub fn add_marker(&mut self, marker: BoundaryMarker) -> usize {
        self.markers.push(marker);
        self.markers.len() - 1
    }

    pub fn marker_index(&self, tag: &str) -> Option<usize> {
        self.markers.iter().position(|m| m.tag == tag)
    }

    /// Finish construction: edges, control volumes and time history
    pub fn finalize(&mut self) {
        self.connectivity.build_edges();
        self.compute_control_volumes();
        self.reset_history();
    }

    /// Coordinates of the nodes of one element
    pub fn element_points(&self, elem: &Element) -> Vec<Point3<f64>> {
        elem.nodes.iter().map(|&n| self.geometry.nodes[n]).collect()
    }

    /// Signed area (2-D) or volume (3-D) of element `idx`
    pub fn element_volume(&self, idx: usize) -> f64 {
        let elem = &self.connectivity.elements[idx];
        signed_volume(elem.kind, &self.element_points(elem))
    }

    /// Median-dual control volumes: each element shares its volume equally
    /// among its nodes
    pub fn compute_control_volumes(&mut self) {
        let mut vol = vec![0.0; self.num_nodes()];
        for elem in &self.connectivity.elements {
            let v = signed_volume(elem.kind, &self.element_points(elem)).abs();
            let share = v / elem.nodes.len() as f64;
            for &n in &elem.nodes {
                vol[n] += share;
            }
        }
        self.volumes.current = vol;
    }

    /// Copy the current state into both history levels
    pub fn reset_history(&mut self) {
        self.geometry.coord_n = self.geometry.nodes.clone();
        self.geometry.coord_n1 = self.geometry.nodes.clone();
        self.volumes.n = self.volumes.current.clone();
        self.volumes.n1 = self.volumes.current.clone();
    }

    /// Shift time levels at the end of a physical time step: n → n-1, current → n
    pub fn push_time_level(&mut self) {
        std::mem::swap(&mut self.geometry.coord_n1, &mut self.geometry.coord_n);
        self.geometry.coord_n.clone_from(&self.geometry.nodes);
        std::mem::swap(&mut self.volumes.n1, &mut self.volumes.n);
        self.volumes.n.clone_from(&self.volumes.current);
    }

    /// Grid velocity by backward differences of the coordinate history
    ///
    /// # Arguments
    /// * `dt` - Physical time step
    /// * `order` - 1: (x − xⁿ)/Δt, 2: (3x − 4xⁿ + xⁿ⁻¹)/(2Δt)
    pub fn set_grid_velocity(&mut self, dt: f64, order: usize) {
        let g = &self.geometry;
        for i in 0..g.nodes.len() {
            let x = g.nodes[i].coords;
            let xn = g.coord_n[i].coords;
            let xn1 = g.coord_n1[i].coords;
            self.grid_velocity[i] = if order >= 2 {
                (3.0 * x - 4.0 * xn + xn1) / (2.0 * dt)
            } else {
                (x - xn) / dt
            };
        }
    }

    /// Mask of nodes lying on any boundary marker
    pub fn boundary_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.num_nodes()];
        for marker in &self.markers {
            for v in &marker.vertices {
                mask[v.point] = true;
            }
        }
        mask
    }

    /// Sorted, unique indices of all boundary nodes
    pub fn boundary_points(&self) -> Vec<usize> {
        let mut pts: Vec<usize> = self.markers.iter().flat_map(|m| m.vertices.iter().map(|v| v.point)).collect();
        pts.sort_unstable();
        pts.dedup();
        pts
    }

    /// Prescribed displacement of every boundary node (`None` in the interior)
    ///
    /// Fixed markers are visited first so a node shared with a moving marker
    /// takes the moving marker's displacement.
    pub fn prescribed_displacements(&self) -> Vec<Option<Vector3<f64>>> {
        let mut disp = vec![None; self.num_nodes()];
        for moving_pass in [false, true] {
            for marker in self.markers.iter().filter(|m| m.moving == moving_pass) {
                for v in &marker.vertices {
                    disp[v.point] = Some(v.var_coord);
                }
            }
        }
        disp
    }

    pub fn clear_boundary_displacements(&mut self) {
        for marker in &mut self.markers {
            marker.clear_displacements();
        }
    }

    /// Axis-aligned bounding box of the nodes
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &self.geometry.nodes {
            for d in 0..3 {
                min[d] = min[d].min(p[d]);
                max[d] = max[d].max(p[d]);
            }
        }
        (min, max)
    }
}
