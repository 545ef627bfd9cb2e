use nalgebra::Vector3;
use std::collections::HashSet;

/// Supported element shapes
///
/// Node numbering follows the usual counter-clockwise convention:
///   Triangle:      0, 1, 2
///   Quadrilateral: 0, 1, 2, 3
///   Tetrahedron:   0, 1, 2, 3 with (1-0)·((2-0)×(3-0)) > 0
///   Hexahedron:    bottom face 0-1-2-3, top face 4-5-6-7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

impl ElementKind {
    pub fn num_nodes(&self) -> usize {
        match self {
            ElementKind::Triangle => 3,
            ElementKind::Quadrilateral => 4,
            ElementKind::Tetrahedron => 4,
            ElementKind::Hexahedron => 8,
        }
    }

    /// Local edges as pairs of local node indices
    pub fn edges(&self) -> &'static [(usize, usize)] {
        match self {
            ElementKind::Triangle => &[(0, 1), (1, 2), (2, 0)],
            ElementKind::Quadrilateral => &[(0, 1), (1, 2), (2, 3), (3, 0)],
            ElementKind::Tetrahedron => &[(0, 1), (1, 2), (2, 0), (0, 3), (1, 3), (2, 3)],
            ElementKind::Hexahedron => &[
                (0, 1), (1, 2), (2, 3), (3, 0),
                (4, 5), (5, 6), (6, 7), (7, 4),
                (0, 4), (1, 5), (2, 6), (3, 7),
            ],
        }
    }

    /// Triangular faces (local indices) used by the torsional springs
    ///
    /// Quadrilaterals and hexahedral faces are split along one diagonal.
    pub fn triangles(&self) -> &'static [[usize; 3]] {
        match self {
            ElementKind::Triangle => &[[0, 1, 2]],
            ElementKind::Quadrilateral => &[[0, 1, 2], [0, 2, 3]],
            ElementKind::Tetrahedron => &[[0, 1, 2], [0, 1, 3], [1, 2, 3], [0, 2, 3]],
            ElementKind::Hexahedron => &[
                [0, 1, 2], [0, 2, 3],
                [4, 5, 6], [4, 6, 7],
                [0, 1, 5], [0, 5, 4],
                [1, 2, 6], [1, 6, 5],
                [2, 3, 7], [2, 7, 6],
                [3, 0, 4], [3, 4, 7],
            ],
        }
    }

    pub fn is_volume(&self) -> bool {
        matches!(self, ElementKind::Tetrahedron | ElementKind::Hexahedron)
    }
}

/// A mesh element: shape plus global node indices
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub nodes: Vec<usize>,
}

impl Element {
    /// # Panics
    /// Panics if the node count does not match the element kind
    pub fn new(kind: ElementKind, nodes: Vec<usize>) -> Self {
        assert_eq!(
            nodes.len(),
            kind.num_nodes(),
            "{:?} needs {} nodes",
            kind,
            kind.num_nodes()
        );
        Self { kind, nodes }
    }

    pub fn triangle(nodes: [usize; 3]) -> Self {
        Self::new(ElementKind::Triangle, nodes.to_vec())
    }

    pub fn quad(nodes: [usize; 4]) -> Self {
        Self::new(ElementKind::Quadrilateral, nodes.to_vec())
    }

    pub fn tet(nodes: [usize; 4]) -> Self {
        Self::new(ElementKind::Tetrahedron, nodes.to_vec())
    }

    pub fn hex(nodes: [usize; 8]) -> Self {
        Self::new(ElementKind::Hexahedron, nodes.to_vec())
    }
}

/// Connectivity information for the mesh
#[derive(Debug, Clone, Default)]
pub struct Connectivity {
    pub elements: Vec<Element>,
    /// Unique undirected edges (i < j), rebuilt by `build_edges`
    pub edges: Vec<(usize, usize)>,
}

impl Connectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_element(&mut self, element: Element) {
        self.elements.push(element);
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Collect unique edges from element connectivity
    ///
    /// Edges are sorted so the stiffness sparsity pattern is deterministic.
    pub fn build_edges(&mut self) {
        let mut unique = HashSet::new();
        for elem in &self.elements {
            for &(a, b) in elem.kind.edges() {
                let (i, j) = (elem.nodes[a], elem.nodes[b]);
                unique.insert(if i < j { (i, j) } else { (j, i) });
            }
        }
        let mut edges: Vec<(usize, usize)> = unique.into_iter().collect();
        edges.sort_unstable();
        self.edges = edges;
    }
}

/// Boundary condition category of a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Wall,
    FarField,
    /// Interface with another zone or a periodic copy; `receive` markers
    /// take values from the donor side
    SendReceive { receive: bool },
}

/// One vertex of a boundary marker
#[derive(Debug, Clone)]
pub struct BoundaryVertex {
    /// Global point index
    pub point: usize,
    /// Prescribed displacement for the next volume deformation
    pub var_coord: Vector3<f64>,
    /// Zone holding the matching vertex (send/receive markers only)
    pub matching_zone: Option<usize>,
}

impl BoundaryVertex {
    pub fn new(point: usize) -> Self {
        Self {
            point,
            var_coord: Vector3::zeros(),
            matching_zone: None,
        }
    }
}

/// Named group of boundary vertices
#[derive(Debug, Clone)]
pub struct BoundaryMarker {
    pub tag: String,
    pub kind: MarkerKind,
    /// Moving markers carry surface motion; the others stay fixed
    pub moving: bool,
    pub vertices: Vec<BoundaryVertex>,
}

impl BoundaryMarker {
    pub fn new(tag: &str, kind: MarkerKind, points: &[usize]) -> Self {
        Self {
            tag: tag.to_string(),
            kind,
            moving: false,
            vertices: points.iter().map(|&p| BoundaryVertex::new(p)).collect(),
        }
    }

    pub fn with_moving(mut self, moving: bool) -> Self {
        self.moving = moving;
        self
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Vertex index of a global point on this marker
    pub fn vertex_of_point(&self, point: usize) -> Option<usize> {
        self.vertices.iter().position(|v| v.point == point)
    }

    pub fn clear_displacements(&mut self) {
        for v in &mut self.vertices {
            v.var_coord = Vector3::zeros();
        }
    }
}
