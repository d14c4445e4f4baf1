//! Unstructured triangular mesh with node-centred control volumes.
//!
//! The mesh stores:
//! - Node coordinates and still-water depth (positive down)
//! - Element-node connectivity (counter-clockwise ordering)
//! - Edge connectivity with boundary tags
//! - Per-node neighbor rings and parent elements
//! - Median-dual control volumes: each element gives a third of its area
//!   to each of its nodes, and is cut by three dual faces running from
//!   the edge midpoints to the centroid.
//!
//! Local edge convention (counter-clockwise around element):
//! - Edge 0: from node 0 to node 1
//! - Edge 1: from node 1 to node 2
//! - Edge 2: from node 2 to node 0

use std::collections::BTreeMap;

use super::boundary_tags::BoundaryTag;
use crate::error::MeshError;
use crate::types::{ElementIndex, NodeIndex};

/// Smallest admissible element area (m²).
const AREA_EPS: f64 = 1e-12;

/// Information about an edge in the mesh.
#[derive(Clone, Debug)]
pub struct Edge {
    /// Node indices (a, b) with a < b
    pub nodes: (usize, usize),
    /// Element on one side (always present)
    pub left: usize,
    /// Element on the other side (None for boundary edges)
    pub right: Option<usize>,
    /// Edge midpoint
    pub midpoint: (f64, f64),
    /// Boundary tag (only for boundary edges)
    pub tag: Option<BoundaryTag>,
}

impl Edge {
    /// Check if this is a boundary edge.
    pub fn is_boundary(&self) -> bool {
        self.right.is_none()
    }

    /// Check if this is an interior edge.
    pub fn is_interior(&self) -> bool {
        self.right.is_some()
    }
}

/// Segment of a control-volume boundary inside one element.
///
/// Runs from the midpoint of edge `(from, to)` to the element centroid and
/// separates the control volumes of `from` and `to`. The `normal` is
/// scaled by the segment length and points from `from` towards `to`.
#[derive(Clone, Copy, Debug)]
pub struct DualFace {
    /// Element containing the face
    pub element: usize,
    /// Node on the tail side of the normal
    pub from: usize,
    /// Node on the head side of the normal
    pub to: usize,
    /// Face midpoint (reconstruction point)
    pub point: (f64, f64),
    /// Length-scaled normal (nx, ny)
    pub normal: (f64, f64),
}

impl DualFace {
    /// Length of the face segment.
    pub fn length(&self) -> f64 {
        self.normal.0.hypot(self.normal.1)
    }
}

/// 2D mesh of triangular elements.
#[derive(Clone, Debug)]
pub struct TriangularMesh {
    coordinates: Vec<(f64, f64)>,
    depth: Vec<f64>,
    elements: Vec<[usize; 3]>,
    element_area: Vec<f64>,
    centroids: Vec<(f64, f64)>,
    element_neighbors: Vec<[Option<usize>; 3]>,
    node_area: Vec<f64>,
    node_elements: Vec<Vec<usize>>,
    node_neighbors: Vec<Vec<usize>>,
    edges: Vec<Edge>,
    edge_lookup: BTreeMap<(usize, usize), usize>,
    dual_faces: Vec<DualFace>,
    open: Vec<bool>,
}

impl TriangularMesh {
    /// Build a mesh from node coordinates, node depths and element triples.
    ///
    /// Clockwise elements are reordered counter-clockwise. Every boundary
    /// edge starts out [`BoundaryTag::Solid`]; see [`Self::with_open_nodes`].
    ///
    /// # Errors
    ///
    /// Returns a [`MeshError`] for missing or repeated nodes, degenerate
    /// elements, non-manifold edges, dangling nodes or invalid depths.
    pub fn new(
        coordinates: Vec<(f64, f64)>,
        depth: Vec<f64>,
        elements: Vec<[usize; 3]>,
    ) -> Result<Self, MeshError> {
        let n_nodes = coordinates.len();
        if elements.is_empty() {
            return Err(MeshError::Empty);
        }
        if depth.len() != n_nodes {
            return Err(MeshError::NodeCountMismatch {
                coordinates: n_nodes,
                depths: depth.len(),
            });
        }
        if let Some((node, &d)) = depth
            .iter()
            .enumerate()
            .find(|(_, d)| !d.is_finite() || **d <= 0.0)
        {
            return Err(MeshError::InvalidDepth { node, depth: d });
        }

        let mut elements = elements;
        let mut element_area = Vec::with_capacity(elements.len());
        let mut centroids = Vec::with_capacity(elements.len());

        for (k, tri) in elements.iter_mut().enumerate() {
            for (i, &v) in tri.iter().enumerate() {
                if v >= n_nodes {
                    return Err(MeshError::MissingNode {
                        element: k,
                        node: v,
                        n_nodes,
                    });
                }
                if tri[..i].contains(&v) {
                    return Err(MeshError::RepeatedNode {
                        element: k,
                        node: v,
                    });
                }
            }

            let signed = signed_area(coordinates[tri[0]], coordinates[tri[1]], coordinates[tri[2]]);
            if signed.abs() < AREA_EPS {
                return Err(MeshError::DegenerateElement {
                    element: k,
                    area: signed.abs(),
                });
            }
            if signed < 0.0 {
                tri.swap(1, 2);
            }

            let (a, b, c) = (coordinates[tri[0]], coordinates[tri[1]], coordinates[tri[2]]);
            element_area.push(signed.abs());
            centroids.push(((a.0 + b.0 + c.0) / 3.0, (a.1 + b.1 + c.1) / 3.0));
        }

        // Edge connectivity
        let mut edge_elements: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for (k, tri) in elements.iter().enumerate() {
            for local in 0..3 {
                let (a, b) = (tri[local], tri[(local + 1) % 3]);
                edge_elements.entry((a.min(b), a.max(b))).or_default().push(k);
            }
        }

        let mut edges = Vec::with_capacity(edge_elements.len());
        let mut edge_lookup = BTreeMap::new();
        for (&(a, b), owners) in &edge_elements {
            if owners.len() > 2 {
                return Err(MeshError::NonManifoldEdge {
                    a,
                    b,
                    count: owners.len(),
                });
            }
            let (pa, pb) = (coordinates[a], coordinates[b]);
            let right = owners.get(1).copied();
            edge_lookup.insert((a, b), edges.len());
            edges.push(Edge {
                nodes: (a, b),
                left: owners[0],
                right,
                midpoint: (0.5 * (pa.0 + pb.0), 0.5 * (pa.1 + pb.1)),
                tag: right.is_none().then_some(BoundaryTag::Solid),
            });
        }

        let element_neighbors = elements
            .iter()
            .enumerate()
            .map(|(k, tri)| {
                let mut neighbors = [None; 3];
                for (local, slot) in neighbors.iter_mut().enumerate() {
                    let (a, b) = (tri[local], tri[(local + 1) % 3]);
                    let edge = &edges[edge_lookup[&(a.min(b), a.max(b))]];
                    *slot = match edge.right {
                        Some(r) if r == k => Some(edge.left),
                        Some(_) => edge.right,
                        None => None,
                    };
                }
                neighbors
            })
            .collect();

        let mut node_elements = vec![Vec::new(); n_nodes];
        let mut node_area = vec![0.0; n_nodes];
        for (k, tri) in elements.iter().enumerate() {
            for &v in tri {
                node_elements[v].push(k);
                node_area[v] += element_area[k] / 3.0;
            }
        }
        if let Some(node) = node_elements.iter().position(|parents| parents.is_empty()) {
            return Err(MeshError::DanglingNode { node });
        }

        let mut node_neighbors = vec![Vec::new(); n_nodes];
        for edge in &edges {
            node_neighbors[edge.nodes.0].push(edge.nodes.1);
            node_neighbors[edge.nodes.1].push(edge.nodes.0);
        }
        for (n, ring) in node_neighbors.iter_mut().enumerate() {
            let (x0, y0) = coordinates[n];
            ring.sort_by(|&p, &q| {
                let ap = (coordinates[p].1 - y0).atan2(coordinates[p].0 - x0);
                let aq = (coordinates[q].1 - y0).atan2(coordinates[q].0 - x0);
                ap.total_cmp(&aq)
            });
        }

        let mut dual_faces = Vec::with_capacity(3 * elements.len());
        for (k, tri) in elements.iter().enumerate() {
            let (xc, yc) = centroids[k];
            for local in 0..3 {
                let (from, to) = (tri[local], tri[(local + 1) % 3]);
                let (pa, pb) = (coordinates[from], coordinates[to]);
                let (xm, ym) = (0.5 * (pa.0 + pb.0), 0.5 * (pa.1 + pb.1));
                let (dx, dy) = (xc - xm, yc - ym);
                let mut normal = (dy, -dx);
                if normal.0 * (pb.0 - pa.0) + normal.1 * (pb.1 - pa.1) < 0.0 {
                    normal = (-normal.0, -normal.1);
                }
                dual_faces.push(DualFace {
                    element: k,
                    from,
                    to,
                    point: (0.5 * (xm + xc), 0.5 * (ym + yc)),
                    normal,
                });
            }
        }

        Ok(Self {
            coordinates,
            depth,
            elements,
            element_area,
            centroids,
            element_neighbors,
            node_area,
            node_elements,
            node_neighbors,
            edges,
            edge_lookup,
            dual_faces,
            open: vec![false; n_nodes],
        })
    }

    /// Mark nodes as open-boundary nodes.
    ///
    /// A boundary edge whose two nodes are both open is re-tagged
    /// [`BoundaryTag::Open`].
    pub fn with_open_nodes(mut self, nodes: &[usize]) -> Result<Self, MeshError> {
        let n_nodes = self.n_nodes();
        for &node in nodes {
            if node >= n_nodes {
                return Err(MeshError::MissingNode {
                    element: usize::MAX,
                    node,
                    n_nodes,
                });
            }
            self.open[node] = true;
        }
        for edge in self.edges.iter_mut().filter(|e| e.is_boundary()) {
            if self.open[edge.nodes.0] && self.open[edge.nodes.1] {
                edge.tag = Some(BoundaryTag::Open);
            }
        }
        Ok(self)
    }

    /// Create a uniform rectangular mesh of [0, lx] × [0, ly] with constant depth.
    ///
    /// Each of the `nx × ny` cells is split into two triangles along the
    /// diagonal from its lower-left to its upper-right corner.
    pub fn rectangle(
        nx: usize,
        ny: usize,
        lx: f64,
        ly: f64,
        depth: f64,
    ) -> Result<Self, MeshError> {
        Self::rectangle_with_depth(nx, ny, lx, ly, |_, _| depth)
    }

    /// Create a uniform rectangular mesh with depth given by `depth(x, y)`.
    pub fn rectangle_with_depth(
        nx: usize,
        ny: usize,
        lx: f64,
        ly: f64,
        depth: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, MeshError> {
        if nx == 0 || ny == 0 {
            return Err(MeshError::Empty);
        }
        let dx = lx / nx as f64;
        let dy = ly / ny as f64;

        let mut coordinates = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                coordinates.push((i as f64 * dx, j as f64 * dy));
            }
        }
        let depths = coordinates.iter().map(|&(x, y)| depth(x, y)).collect();

        let mut elements = Vec::with_capacity(2 * nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let v0 = j * (nx + 1) + i; // bottom-left
                let v1 = v0 + 1; // bottom-right
                let v2 = v1 + (nx + 1); // top-right
                let v3 = v0 + (nx + 1); // top-left
                elements.push([v0, v1, v2]);
                elements.push([v0, v2, v3]);
            }
        }

        Self::new(coordinates, depths, elements)
    }

    // =========================================================================
    // Sizes and geometry
    // =========================================================================

    /// Number of nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.coordinates.len()
    }

    /// Number of elements.
    #[inline]
    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Node coordinates.
    #[inline]
    pub fn coordinates(&self, node: NodeIndex) -> (f64, f64) {
        self.coordinates[node]
    }

    /// Still-water depth at a node (m, positive down).
    #[inline]
    pub fn depth(&self, node: NodeIndex) -> f64 {
        self.depth[node]
    }

    /// All node depths.
    pub fn depths(&self) -> &[f64] {
        &self.depth
    }

    /// Node indices of an element, counter-clockwise.
    #[inline]
    pub fn element(&self, element: ElementIndex) -> [usize; 3] {
        self.elements[element]
    }

    /// All element triples.
    pub fn elements(&self) -> &[[usize; 3]] {
        &self.elements
    }

    /// Element area (m²).
    #[inline]
    pub fn element_area(&self, element: ElementIndex) -> f64 {
        self.element_area[element]
    }

    /// Element centroid.
    #[inline]
    pub fn centroid(&self, element: ElementIndex) -> (f64, f64) {
        self.centroids[element]
    }

    /// Mean depth of an element's nodes.
    pub fn element_depth(&self, element: ElementIndex) -> f64 {
        self.elements[element].iter().map(|&v| self.depth[v]).sum::<f64>() / 3.0
    }

    /// Control-volume area around a node (m²).
    #[inline]
    pub fn node_area(&self, node: NodeIndex) -> f64 {
        self.node_area[node]
    }

    /// All control-volume areas.
    pub fn node_areas(&self) -> &[f64] {
        &self.node_area
    }

    /// Total mesh area.
    pub fn total_area(&self) -> f64 {
        self.element_area.iter().sum()
    }

    // =========================================================================
    // Topology
    // =========================================================================

    /// Neighboring nodes sharing an edge, sorted counter-clockwise.
    #[inline]
    pub fn neighbors(&self, node: NodeIndex) -> &[usize] {
        &self.node_neighbors[node]
    }

    /// Elements containing a node.
    #[inline]
    pub fn parents(&self, node: NodeIndex) -> &[usize] {
        &self.node_elements[node]
    }

    /// Neighbor across each local edge of an element.
    #[inline]
    pub fn element_neighbors(&self, element: ElementIndex) -> [Option<usize>; 3] {
        self.element_neighbors[element]
    }

    /// Number of elements sharing an edge with this element (0 to 3).
    pub fn element_neighbor_count(&self, element: ElementIndex) -> usize {
        self.element_neighbors[element].iter().flatten().count()
    }

    /// All edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edge joining two nodes, if any.
    pub fn edge_between(&self, a: usize, b: usize) -> Option<&Edge> {
        self.edge_lookup
            .get(&(a.min(b), a.max(b)))
            .map(|&i| &self.edges[i])
    }

    /// Control-volume faces, three per element.
    pub fn dual_faces(&self) -> &[DualFace] {
        &self.dual_faces
    }

    /// Check if a node lies on any boundary edge.
    pub fn is_boundary_node(&self, node: NodeIndex) -> bool {
        self.node_neighbors[node].iter().any(|&other| {
            self.edge_between(node.get(), other)
                .is_some_and(Edge::is_boundary)
        })
    }

    /// Per-node open-boundary flag.
    pub fn open_mask(&self) -> &[bool] {
        &self.open
    }
}

/// Twice-halved cross product: positive for counter-clockwise triangles.
#[inline]
fn signed_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    0.5 * ((b.0 - a.0) * (c.1 - a.1) - (c.0 - a.0) * (b.1 - a.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    fn two_triangles() -> TriangularMesh {
        // Unit square split along the diagonal 0-2
        let coords = vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];
        TriangularMesh::new(coords, vec![5.0; 4], vec![[0, 1, 2], [0, 2, 3]]).unwrap()
    }

    #[test]
    fn test_connectivity() {
        let mesh = two_triangles();
        assert_eq!(mesh.n_nodes(), 4);
        assert_eq!(mesh.n_elements(), 2);
        assert_eq!(mesh.edges().len(), 5);
        assert_eq!(mesh.edges().iter().filter(|e| e.is_interior()).count(), 1);
        assert_eq!(mesh.element_neighbor_count(ElementIndex::new(0)), 1);
        assert_eq!(mesh.neighbors(NodeIndex::new(0)).len(), 3);
        assert_eq!(mesh.neighbors(NodeIndex::new(1)).len(), 2);
        assert_eq!(mesh.parents(NodeIndex::new(2)).len(), 2);
    }

    #[test]
    fn test_control_volume_areas_partition_mesh() {
        let mesh = TriangularMesh::rectangle(4, 3, 400.0, 300.0, 10.0).unwrap();
        let total: f64 = mesh.node_areas().iter().sum();
        assert!((total - 120_000.0).abs() < 1e-6);
        assert!((mesh.total_area() - total).abs() < 1e-6);
    }

    #[test]
    fn test_clockwise_element_is_reoriented() {
        let coords = vec![(0.0, 0.0), (0.0, 1.0), (1.0, 0.0)];
        let mesh = TriangularMesh::new(coords, vec![1.0; 3], vec![[0, 1, 2]]).unwrap();
        let tri = mesh.element(ElementIndex::new(0));
        let c: Vec<_> = tri.iter().map(|&v| mesh.coordinates(NodeIndex::new(v))).collect();
        assert!(signed_area(c[0], c[1], c[2]) > 0.0);
    }

    #[test]
    fn test_dual_faces_close_interior_control_volume() {
        let mesh = TriangularMesh::rectangle(2, 2, 2.0, 2.0, 1.0).unwrap();
        // Node 4 is the single interior node
        let centre = 4;
        let (mut sx, mut sy) = (0.0, 0.0);
        for face in mesh.dual_faces() {
            if face.from == centre {
                sx += face.normal.0;
                sy += face.normal.1;
            } else if face.to == centre {
                sx -= face.normal.0;
                sy -= face.normal.1;
            }
        }
        assert!(sx.abs() < TOL && sy.abs() < TOL);
    }

    #[test]
    fn test_dual_face_normal_points_to_head_node() {
        let mesh = two_triangles();
        for face in mesh.dual_faces() {
            let a = mesh.coordinates(NodeIndex::new(face.from));
            let b = mesh.coordinates(NodeIndex::new(face.to));
            let dot = face.normal.0 * (b.0 - a.0) + face.normal.1 * (b.1 - a.1);
            assert!(dot > 0.0);
        }
    }

    #[test]
    fn test_open_nodes_tag_boundary_edges() {
        let mesh = TriangularMesh::rectangle(2, 1, 2.0, 1.0, 1.0)
            .unwrap()
            .with_open_nodes(&[2, 5])
            .unwrap();
        let edge = mesh.edge_between(2, 5).unwrap();
        assert_eq!(edge.tag, Some(BoundaryTag::Open));
        assert_eq!(mesh.edge_between(0, 1).unwrap().tag, Some(BoundaryTag::Solid));
        assert!(mesh.open_mask()[2] && !mesh.open_mask()[0]);
        assert!(mesh.is_boundary_node(NodeIndex::new(0)));
    }

    #[test]
    fn test_malformed_meshes_are_rejected() {
        let coords = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (5.0, 5.0)];
        let err = TriangularMesh::new(coords.clone(), vec![1.0; 4], vec![[0, 1, 2]]);
        assert_eq!(err.unwrap_err(), MeshError::DanglingNode { node: 3 });

        let err = TriangularMesh::new(coords.clone(), vec![1.0; 4], vec![[0, 1, 9]]);
        assert!(matches!(err, Err(MeshError::MissingNode { node: 9, .. })));

        let err = TriangularMesh::new(coords.clone(), vec![1.0; 4], vec![[0, 1, 1]]);
        assert!(matches!(err, Err(MeshError::RepeatedNode { .. })));

        let line = vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)];
        let err = TriangularMesh::new(line, vec![1.0; 3], vec![[0, 1, 2]]);
        assert!(matches!(err, Err(MeshError::DegenerateElement { .. })));

        let fan = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (0.0, -1.0), (1.0, 1.0)];
        let err = TriangularMesh::new(fan, vec![1.0; 5], vec![[0, 1, 2], [0, 3, 1], [0, 1, 4]]);
        assert!(matches!(err, Err(MeshError::NonManifoldEdge { a: 0, b: 1, count: 3 })));

        let err = TriangularMesh::new(coords, vec![1.0, 1.0, 0.0, 1.0], vec![[0, 1, 2]]);
        assert!(matches!(err, Err(MeshError::InvalidDepth { node: 2, .. })));
    }
}
