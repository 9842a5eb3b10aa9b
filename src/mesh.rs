//! Mesh data structures: geometry types, element ids and the mesh itself.
//!
//! A [`Mesh`] is immutable after construction. It owns the vertex coordinate table, the
//! volume and boundary element lists and the derived entity topology (global edges and
//! faces) that degree-of-freedom numbering relies on. Vertex coordinates are always
//! stored as 3D points; the mesh's `dimension` states how many coordinates are
//! meaningful.

use crate::element::{reference_element, ElementRef, ReferenceElement};
use crate::error::{Error, InvalidElementReason};
use crate::Real;
use nalgebra::Point3;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod procedural;

/// The geometry type of a reference cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeometryType {
    Segment,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
    Prism,
    Pyramid,
}

impl GeometryType {
    /// The topological dimension of the reference cell.
    pub fn dimension(&self) -> usize {
        match self {
            Self::Segment => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Hexahedron | Self::Prism | Self::Pyramid => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.reference_vertices().len()
    }

    /// The coordinates of the reference cell's vertices.
    ///
    /// The conventions are: unit interval, unit triangle/tetrahedron (right-angle corner
    /// at the origin), unit square/cube, triangle-cross-interval prism, and the pyramid
    /// with base `[0, 1]^2` and apex `(0, 0, 1)`. Quadrilateral vertices are listed in
    /// cyclic order.
    pub fn reference_vertices(&self) -> &'static [[f64; 3]] {
        match self {
            Self::Segment => &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Self::Triangle => &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            Self::Quadrilateral => &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            Self::Tetrahedron => &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            Self::Hexahedron => &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 1.0],
                [1.0, 1.0, 1.0],
                [0.0, 1.0, 1.0],
            ],
            Self::Prism => &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
                [1.0, 0.0, 1.0],
                [0.0, 1.0, 1.0],
            ],
            Self::Pyramid => &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
        }
    }

    /// The local edges of the reference cell, as pairs of local vertex indices.
    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            Self::Segment => &[[0, 1]],
            Self::Triangle => &[[0, 1], [1, 2], [2, 0]],
            Self::Quadrilateral => &[[0, 1], [1, 2], [2, 3], [3, 0]],
            Self::Tetrahedron => &[[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]],
            Self::Hexahedron => &[
                [0, 1],
                [1, 2],
                [2, 3],
                [3, 0],
                [4, 5],
                [5, 6],
                [6, 7],
                [7, 4],
                [0, 4],
                [1, 5],
                [2, 6],
                [3, 7],
            ],
            Self::Prism => &[
                [0, 1],
                [1, 2],
                [2, 0],
                [3, 4],
                [4, 5],
                [5, 3],
                [0, 3],
                [1, 4],
                [2, 5],
            ],
            Self::Pyramid => &[
                [0, 1],
                [1, 2],
                [2, 3],
                [3, 0],
                [0, 4],
                [1, 4],
                [2, 4],
                [3, 4],
            ],
        }
    }

    /// The local faces of the reference cell, as a geometry type plus local vertex
    /// indices (cyclic for quadrilateral faces).
    ///
    /// Two-dimensional cells report themselves as their single face, which is how
    /// cell-interior lattice nodes of boundary elements are matched against the faces
    /// of adjacent volume elements.
    pub fn faces(&self) -> &'static [(GeometryType, &'static [usize])] {
        match self {
            Self::Segment => &[],
            Self::Triangle => &[(GeometryType::Triangle, &[0, 1, 2])],
            Self::Quadrilateral => &[(GeometryType::Quadrilateral, &[0, 1, 2, 3])],
            Self::Tetrahedron => &[
                (GeometryType::Triangle, &[0, 1, 2]),
                (GeometryType::Triangle, &[0, 1, 3]),
                (GeometryType::Triangle, &[0, 2, 3]),
                (GeometryType::Triangle, &[1, 2, 3]),
            ],
            Self::Hexahedron => &[
                (GeometryType::Quadrilateral, &[0, 1, 2, 3]),
                (GeometryType::Quadrilateral, &[4, 5, 6, 7]),
                (GeometryType::Quadrilateral, &[0, 1, 5, 4]),
                (GeometryType::Quadrilateral, &[1, 2, 6, 5]),
                (GeometryType::Quadrilateral, &[2, 3, 7, 6]),
                (GeometryType::Quadrilateral, &[3, 0, 4, 7]),
            ],
            Self::Prism => &[
                (GeometryType::Triangle, &[0, 1, 2]),
                (GeometryType::Triangle, &[3, 4, 5]),
                (GeometryType::Quadrilateral, &[0, 1, 4, 3]),
                (GeometryType::Quadrilateral, &[1, 2, 5, 4]),
                (GeometryType::Quadrilateral, &[2, 0, 3, 5]),
            ],
            Self::Pyramid => &[
                (GeometryType::Quadrilateral, &[0, 1, 2, 3]),
                (GeometryType::Triangle, &[0, 1, 4]),
                (GeometryType::Triangle, &[1, 2, 4]),
                (GeometryType::Triangle, &[2, 3, 4]),
                (GeometryType::Triangle, &[3, 0, 4]),
            ],
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Segment => "segment",
            Self::Triangle => "triangle",
            Self::Quadrilateral => "quadrilateral",
            Self::Tetrahedron => "tetrahedron",
            Self::Hexahedron => "hexahedron",
            Self::Prism => "prism",
            Self::Pyramid => "pyramid",
        };
        write!(f, "{}", name)
    }
}

/// Whether an element id addresses the volume or boundary element list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Volume,
    Boundary,
}

/// An opaque element address: a region class plus an index into the corresponding list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId {
    region: Region,
    index: usize,
}

impl ElementId {
    pub fn volume(index: usize) -> Self {
        Self {
            region: Region::Volume,
            index,
        }
    }

    pub fn boundary(index: usize) -> Self {
        Self {
            region: Region::Boundary,
            index,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.region {
            Region::Volume => write!(f, "volume element {}", self.index),
            Region::Boundary => write!(f, "boundary element {}", self.index),
        }
    }
}

/// A single mesh element: geometry type, ordered global vertex indices and a marker.
///
/// For volume elements the marker is the material index; for boundary elements it is
/// the boundary tag used e.g. by Dirichlet selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub geometry: GeometryType,
    pub vertices: Vec<usize>,
    pub marker: usize,
}

impl Element {
    pub fn new(geometry: GeometryType, vertices: Vec<usize>) -> Self {
        assert_eq!(
            vertices.len(),
            geometry.num_vertices(),
            "vertex count does not match geometry type"
        );
        Self {
            geometry,
            vertices,
            marker: 0,
        }
    }

    pub fn with_marker(mut self, marker: usize) -> Self {
        self.marker = marker;
        self
    }
}

/// Key identifying a global face by its sorted vertex indices (triangles are padded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct FaceKey([usize; 4]);

impl FaceKey {
    pub fn from_vertices(vertices: &[usize]) -> Self {
        let mut key = [usize::MAX; 4];
        key[..vertices.len()].copy_from_slice(vertices);
        key[..vertices.len()].sort_unstable();
        Self(key)
    }
}

/// Global edge and face tables derived from the volume elements.
///
/// Construction iterates elements in order and inserts entities first-come, so the
/// entity numbering is deterministic for a given mesh.
#[derive(Debug, Clone, Default)]
pub(crate) struct MeshTopology {
    pub edges: Vec<[usize; 2]>,
    pub faces: Vec<FaceKey>,
    pub face_geometries: Vec<GeometryType>,
    edge_map: FxHashMap<[usize; 2], usize>,
    face_map: FxHashMap<FaceKey, usize>,
}

impl MeshTopology {
    fn from_elements(elements: &[Element]) -> Self {
        let mut topology = Self::default();
        for element in elements {
            for edge in element.geometry.edges() {
                let a = element.vertices[edge[0]];
                let b = element.vertices[edge[1]];
                let key = if a < b { [a, b] } else { [b, a] };
                let next_id = topology.edges.len();
                topology.edge_map.entry(key).or_insert_with(|| {
                    topology.edges.push(key);
                    next_id
                });
            }
            if element.geometry.dimension() == 3 {
                for (face_geometry, face_vertices) in element.geometry.faces() {
                    let vertices: Vec<usize> =
                        face_vertices.iter().map(|&v| element.vertices[v]).collect();
                    let key = FaceKey::from_vertices(&vertices);
                    let next_id = topology.faces.len();
                    topology.face_map.entry(key).or_insert_with(|| {
                        topology.faces.push(key);
                        topology.face_geometries.push(*face_geometry);
                        next_id
                    });
                }
            }
        }
        topology
    }

    pub fn edge_index(&self, a: usize, b: usize) -> Option<usize> {
        let key = if a < b { [a, b] } else { [b, a] };
        self.edge_map.get(&key).copied()
    }

    pub fn face_index(&self, vertices: &[usize]) -> Option<usize> {
        self.face_map.get(&FaceKey::from_vertices(vertices)).copied()
    }
}

/// Optional higher-order geometry: control points for the polynomial element maps.
///
/// Control points are listed in the lattice-node order of the corresponding geometry's
/// nodal basis of the curved order (vertices are part of the lattice, so they are
/// repeated here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvedGeometry<T: Real> {
    pub order: usize,
    pub element_points: Vec<Vec<Point3<T>>>,
    pub boundary_points: Vec<Vec<Point3<T>>>,
}

/// Serializable mesh payload; the derived topology and basis tables are rebuilt on
/// deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshData<T: Real> {
    dimension: usize,
    vertices: Vec<Point3<T>>,
    elements: Vec<Element>,
    boundary: Vec<Element>,
    curved: Option<CurvedGeometry<T>>,
}

/// An immutable-after-construction finite element mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MeshData<T>", into = "MeshData<T>")]
#[serde(bound(serialize = "T: Real + Serialize", deserialize = "T: Real + Deserialize<'de>"))]
pub struct Mesh<T: Real> {
    dimension: usize,
    vertices: Vec<Point3<T>>,
    elements: Vec<Element>,
    boundary: Vec<Element>,
    curved: Option<CurvedGeometry<T>>,
    topology: MeshTopology,
    geometry_bases: FxHashMap<GeometryType, ElementRef<T>>,
}

impl<T: Real> Mesh<T> {
    /// Constructs a mesh from vertices and element lists.
    ///
    /// The input is expected to come from a mesh-generation collaborator and to be
    /// structurally valid (no self-intersections etc.); only index bounds and
    /// dimension consistency are checked here, by panicking, since out-of-bounds
    /// connectivity is a programming error that safe indexing would anyway surface
    /// later.
    pub fn new(
        dimension: usize,
        vertices: Vec<Point3<T>>,
        elements: Vec<Element>,
        boundary: Vec<Element>,
    ) -> Result<Self, Error> {
        assert!(
            (1..=3).contains(&dimension),
            "mesh dimension must be 1, 2 or 3"
        );
        for element in &elements {
            assert_eq!(
                element.geometry.dimension(),
                dimension,
                "volume element dimension does not match mesh dimension"
            );
            assert!(
                element.vertices.iter().all(|&v| v < vertices.len()),
                "element references vertex out of bounds"
            );
        }
        for element in &boundary {
            assert_eq!(
                element.geometry.dimension() + 1,
                dimension,
                "boundary element dimension must be one below the mesh dimension"
            );
            assert!(
                element.vertices.iter().all(|&v| v < vertices.len()),
                "boundary element references vertex out of bounds"
            );
        }

        let topology = MeshTopology::from_elements(&elements);
        let mut mesh = Self {
            dimension,
            vertices,
            elements,
            boundary,
            curved: None,
            topology,
            geometry_bases: FxHashMap::default(),
        };
        mesh.rebuild_geometry_bases()?;
        Ok(mesh)
    }

    /// Attaches higher-order geometry control points, replacing the affine/multilinear
    /// vertex maps by polynomial maps of the given order.
    pub fn with_curved_geometry(
        mut self,
        order: usize,
        element_points: Vec<Vec<Point3<T>>>,
        boundary_points: Vec<Vec<Point3<T>>>,
    ) -> Result<Self, Error> {
        assert!(order >= 1, "geometry order must be at least 1");
        assert_eq!(element_points.len(), self.elements.len());
        assert_eq!(boundary_points.len(), self.boundary.len());
        self.curved = Some(CurvedGeometry {
            order,
            element_points,
            boundary_points,
        });
        self.rebuild_geometry_bases()?;

        // Validate control point counts against the geometry lattices
        let curved = self.curved.as_ref().unwrap();
        for (element, points) in self
            .elements
            .iter()
            .chain(self.boundary.iter())
            .zip(curved.element_points.iter().chain(&curved.boundary_points))
        {
            let expected = self.geometry_bases[&element.geometry].num_basis_functions();
            assert_eq!(
                points.len(),
                expected,
                "curved geometry control point count does not match the {} lattice",
                element.geometry
            );
        }
        Ok(self)
    }

    fn rebuild_geometry_bases(&mut self) -> Result<(), Error> {
        let order = self.geometry_order();
        let mut bases = FxHashMap::default();
        for element in self.elements.iter().chain(self.boundary.iter()) {
            if !bases.contains_key(&element.geometry) {
                bases.insert(element.geometry, reference_element(element.geometry, order)?);
            }
        }
        self.geometry_bases = bases;
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn vertices(&self) -> &[Point3<T>] {
        &self.vertices
    }

    pub fn num_elements(&self, region: Region) -> usize {
        match region {
            Region::Volume => self.elements.len(),
            Region::Boundary => self.boundary.len(),
        }
    }

    pub fn elements(&self, region: Region) -> &[Element] {
        match region {
            Region::Volume => &self.elements,
            Region::Boundary => &self.boundary,
        }
    }

    /// The element addressed by the given id.
    pub fn element(&self, id: ElementId) -> Result<&Element, Error> {
        self.elements(id.region())
            .get(id.index())
            .ok_or(Error::InvalidElement {
                element: id,
                reason: InvalidElementReason::OutOfRange,
            })
    }

    /// The polynomial order of the element geometry maps.
    pub fn geometry_order(&self) -> usize {
        self.curved.as_ref().map(|c| c.order).unwrap_or(1)
    }

    pub(crate) fn curved(&self) -> Option<&CurvedGeometry<T>> {
        self.curved.as_ref()
    }

    pub(crate) fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    /// The reference basis used for the geometry map of the given geometry type.
    pub(crate) fn geometry_basis(&self, geometry: GeometryType) -> &ElementRef<T> {
        self.geometry_bases
            .get(&geometry)
            .expect("geometry basis exists for every geometry type present in the mesh")
    }

    /// The boundary tags present in the mesh, sorted and deduplicated.
    pub fn boundary_tags(&self) -> Vec<usize> {
        let mut tags: Vec<_> = self.boundary.iter().map(|e| e.marker).collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }
}

impl<T: Real> TryFrom<MeshData<T>> for Mesh<T> {
    type Error = Error;

    fn try_from(data: MeshData<T>) -> Result<Self, Error> {
        let mut mesh = Mesh::new(data.dimension, data.vertices, data.elements, data.boundary)?;
        if let Some(curved) = data.curved {
            mesh = mesh.with_curved_geometry(
                curved.order,
                curved.element_points,
                curved.boundary_points,
            )?;
        }
        Ok(mesh)
    }
}

impl<T: Real> From<Mesh<T>> for MeshData<T> {
    fn from(mesh: Mesh<T>) -> Self {
        Self {
            dimension: mesh.dimension,
            vertices: mesh.vertices,
            elements: mesh.elements,
            boundary: mesh.boundary,
            curved: mesh.curved,
        }
    }
}
