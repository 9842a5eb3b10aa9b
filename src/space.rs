//! Function spaces: basis assignment and global degree-of-freedom numbering.
//!
//! A [`FeSpace`] assigns every mesh element a reference element of the space's family
//! and order, and owns the element-to-global-DOF tables built once at construction.
//! DOF indices are contiguous in `[0, ndof)`.
//!
//! For the H1 family, numbering is by entity: one DOF per mesh vertex, then `order - 1`
//! DOFs per global edge, then the face-interior DOFs per global face (3D), then the
//! cell-interior DOFs per element. Shared entities receive *canonical* intra-entity
//! orderings derived from global vertex indices (edges run from the lower to the higher
//! global vertex; face lattices are permuted to the sorted corner order), which is what
//! makes traces from adjoining elements hit the same global DOFs in the same order:
//! the conformity property that assembly depends on.
//!
//! The L2 family uses the same reference elements but numbers every DOF per element,
//! with no sharing; boundary elements carry no L2 DOFs.

use crate::element::{reference_element, ElementRef, NodeEntity, ReferenceElement};
use crate::error::{Error, InvalidElementReason};
use crate::flags::FlagValue;
use crate::mesh::{Element, ElementId, GeometryType, Mesh, Region};
use crate::transformation::{ElementTransformation, GeometryBuffer};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut, DVectorView, Point3, Vector3};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// The basis family of a function space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceFamily {
    /// Conforming nodal family: continuous across shared entities.
    H1,
    /// Discontinuous family: all DOFs are element-local.
    L2,
}

/// Recognized construction options for [`FeSpace`].
#[derive(Debug, Clone)]
pub struct FeSpaceOptions {
    /// Polynomial order, at least 1.
    pub order: usize,
    /// Boundary tags whose DOFs are marked as Dirichlet.
    pub dirichlet: Vec<usize>,
    /// Recognized for compatibility with complex-valued front ends; only `false` is
    /// supported by this real-scalar core.
    pub complex: bool,
}

impl Default for FeSpaceOptions {
    fn default() -> Self {
        Self {
            order: 1,
            dirichlet: Vec::new(),
            complex: false,
        }
    }
}

impl FeSpaceOptions {
    pub fn with_order(order: usize) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Parses a configuration set, failing fast on unrecognized keys or unusable
    /// values.
    pub fn parse<'a>(
        pairs: impl IntoIterator<Item = (&'a str, FlagValue)>,
    ) -> Result<Self, Error> {
        let mut options = Self::default();
        for (key, value) in pairs {
            match (key, &value) {
                ("order", FlagValue::Int(order)) => {
                    if *order < 1 {
                        return Err(Error::configuration(key, "order must be at least 1"));
                    }
                    options.order = *order as usize;
                }
                ("dirichlet", FlagValue::IntList(tags)) => {
                    options.dirichlet = tags.iter().map(|&t| t as usize).collect();
                }
                ("complex", FlagValue::Bool(complex)) => {
                    if *complex {
                        return Err(Error::configuration(
                            key,
                            "complex scalars are not supported",
                        ));
                    }
                    options.complex = false;
                }
                ("order", other) | ("dirichlet", other) | ("complex", other) => {
                    return Err(Error::configuration(
                        key,
                        format!("unexpected value type '{}'", other.type_name()),
                    ));
                }
                (unknown, _) => {
                    return Err(Error::configuration(unknown, "unrecognized option"));
                }
            }
        }
        Ok(options)
    }
}

/// Element-to-DOF lookup in compressed (offsets + indices) form.
#[derive(Debug, Clone, Default)]
struct DofTable {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl DofTable {
    fn with_element_count(num_elements: usize) -> Self {
        Self {
            offsets: Vec::with_capacity(num_elements + 1),
            indices: Vec::new(),
        }
    }

    fn push_element(&mut self, dofs: impl IntoIterator<Item = usize>) {
        if self.offsets.is_empty() {
            self.offsets.push(0);
        }
        self.indices.extend(dofs);
        self.offsets.push(self.indices.len());
    }

    fn element(&self, index: usize) -> &[usize] {
        &self.indices[self.offsets[index]..self.offsets[index + 1]]
    }

    fn num_elements(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }
}

/// A finite element space over a mesh.
#[derive(Debug)]
pub struct FeSpace<T: Real> {
    mesh: Arc<Mesh<T>>,
    family: SpaceFamily,
    order: usize,
    ndof: usize,
    bases: FxHashMap<GeometryType, ElementRef<T>>,
    volume_dofs: DofTable,
    boundary_dofs: DofTable,
    dirichlet: Vec<bool>,
}

impl<T: Real> FeSpace<T> {
    /// An H1 (conforming) space of the given order.
    pub fn h1(mesh: Arc<Mesh<T>>, options: &FeSpaceOptions) -> Result<Self, Error> {
        Self::new(mesh, SpaceFamily::H1, options)
    }

    /// An L2 (discontinuous) space of the given order.
    pub fn l2(mesh: Arc<Mesh<T>>, options: &FeSpaceOptions) -> Result<Self, Error> {
        Self::new(mesh, SpaceFamily::L2, options)
    }

    pub fn new(
        mesh: Arc<Mesh<T>>,
        family: SpaceFamily,
        options: &FeSpaceOptions,
    ) -> Result<Self, Error> {
        if options.complex {
            return Err(Error::configuration(
                "complex",
                "complex scalars are not supported",
            ));
        }
        let order = options.order;
        assert!(order >= 1, "space order must be at least 1");

        let mut bases: FxHashMap<GeometryType, ElementRef<T>> = FxHashMap::default();
        for element in mesh
            .elements(Region::Volume)
            .iter()
            .chain(mesh.elements(Region::Boundary))
        {
            if !bases.contains_key(&element.geometry) {
                bases.insert(element.geometry, reference_element(element.geometry, order)?);
            }
        }

        let mut space = Self {
            mesh,
            family,
            order,
            ndof: 0,
            bases,
            volume_dofs: DofTable::default(),
            boundary_dofs: DofTable::default(),
            dirichlet: Vec::new(),
        };
        match family {
            SpaceFamily::H1 => space.build_h1_dofs()?,
            SpaceFamily::L2 => space.build_l2_dofs(),
        }

        space.dirichlet = vec![false; space.ndof];
        if family == SpaceFamily::H1 {
            for (index, element) in space.mesh.elements(Region::Boundary).iter().enumerate() {
                if options.dirichlet.contains(&element.marker) {
                    for &dof in space.boundary_dofs.element(index) {
                        space.dirichlet[dof] = true;
                    }
                }
            }
        }

        Ok(space)
    }

    fn build_h1_dofs(&mut self) -> Result<(), Error> {
        let mesh = Arc::clone(&self.mesh);
        let p = self.order;
        let topology = mesh.topology();

        let num_vertices = mesh.vertices().len();
        let edge_base = num_vertices;
        let dofs_per_edge = p - 1;
        let face_base = edge_base + topology.edges.len() * dofs_per_edge;

        // Faces have geometry-dependent DOF counts, so they get a prefix-offset table
        let mut face_offsets = Vec::with_capacity(topology.faces.len() + 1);
        face_offsets.push(face_base);
        for geometry in &topology.face_geometries {
            let count = match geometry {
                GeometryType::Triangle => (p.saturating_sub(1)) * (p.saturating_sub(2)) / 2,
                GeometryType::Quadrilateral => p.saturating_sub(1) * p.saturating_sub(1),
                _ => unreachable!("faces are two-dimensional"),
            };
            face_offsets.push(face_offsets.last().unwrap() + count);
        }
        let interior_base = *face_offsets.last().unwrap();

        let mut volume_dofs =
            DofTable::with_element_count(mesh.num_elements(Region::Volume));
        let mut boundary_dofs =
            DofTable::with_element_count(mesh.num_elements(Region::Boundary));

        let mut next_interior = interior_base;
        for (index, element) in mesh.elements(Region::Volume).iter().enumerate() {
            let dofs = self.element_h1_dofs(
                element,
                ElementId::volume(index),
                &face_offsets,
                edge_base,
                Some(&mut next_interior),
            )?;
            volume_dofs.push_element(dofs);
        }
        for (index, element) in mesh.elements(Region::Boundary).iter().enumerate() {
            let dofs = self.element_h1_dofs(
                element,
                ElementId::boundary(index),
                &face_offsets,
                edge_base,
                None,
            )?;
            boundary_dofs.push_element(dofs);
        }

        self.ndof = next_interior;
        self.volume_dofs = volume_dofs;
        self.boundary_dofs = boundary_dofs;
        Ok(())
    }

    /// The global DOFs of one element, in basis-node order.
    fn element_h1_dofs(
        &self,
        element: &Element,
        id: ElementId,
        face_offsets: &[usize],
        edge_base: usize,
        mut interior_counter: Option<&mut usize>,
    ) -> Result<Vec<usize>, Error> {
        let mesh = &self.mesh;
        let p = self.order;
        let topology = mesh.topology();
        let geometry = element.geometry;
        let basis = &self.bases[&geometry];
        let volumetric = geometry.dimension() == mesh.dimension();

        let mut dofs = Vec::with_capacity(basis.num_basis_functions());
        for node in basis.nodes() {
            let dof = match node.entity {
                NodeEntity::Vertex(v) => element.vertices[v],
                NodeEntity::Edge { edge, index } => {
                    let [a, b] = geometry.edges()[edge];
                    let (ga, gb) = (element.vertices[a], element.vertices[b]);
                    let edge_id = topology.edge_index(ga, gb).ok_or(Error::InvalidElement {
                        element: id,
                        reason: InvalidElementReason::DetachedBoundary,
                    })?;
                    let canonical = if ga < gb { index } else { p - index };
                    edge_base + edge_id * (p - 1) + (canonical - 1)
                }
                NodeEntity::TriangleFace { face, barycentric } if !volumetric || mesh.dimension() == 3 => {
                    let corners = face_corner_globals(element, face);
                    let face_id =
                        topology
                            .face_index(&corners)
                            .ok_or(Error::InvalidElement {
                                element: id,
                                reason: InvalidElementReason::DetachedBoundary,
                            })?;
                    face_offsets[face_id] + triangle_face_rank(p, &corners[..3], barycentric)
                }
                NodeEntity::QuadrilateralFace { face, index } if !volumetric || mesh.dimension() == 3 => {
                    let corners = face_corner_globals(element, face);
                    let face_id =
                        topology
                            .face_index(&corners)
                            .ok_or(Error::InvalidElement {
                                element: id,
                                reason: InvalidElementReason::DetachedBoundary,
                            })?;
                    let (ci, cj) = quad_face_index(p, &corners, index);
                    face_offsets[face_id] + (ci - 1) * (p - 1) + (cj - 1)
                }
                // Remaining entities are cell-interior: true interiors in 3D, and the
                // element's own face lattice when the element spans the mesh dimension
                _ => {
                    let counter = interior_counter
                        .as_mut()
                        .expect("boundary elements have no interior DOFs");
                    let dof = **counter;
                    **counter += 1;
                    dof
                }
            };
            dofs.push(dof);
        }
        Ok(dofs)
    }

    fn build_l2_dofs(&mut self) {
        let mesh = Arc::clone(&self.mesh);
        let mut volume_dofs = DofTable::with_element_count(mesh.num_elements(Region::Volume));
        let mut next = 0;
        for element in mesh.elements(Region::Volume) {
            let count = self.bases[&element.geometry].num_basis_functions();
            volume_dofs.push_element(next..next + count);
            next += count;
        }
        let mut boundary_dofs = DofTable::with_element_count(mesh.num_elements(Region::Boundary));
        for _ in mesh.elements(Region::Boundary) {
            boundary_dofs.push_element(std::iter::empty());
        }
        self.ndof = next;
        self.volume_dofs = volume_dofs;
        self.boundary_dofs = boundary_dofs;
    }

    pub fn mesh(&self) -> &Arc<Mesh<T>> {
        &self.mesh
    }

    pub fn family(&self) -> SpaceFamily {
        self.family
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// The total number of degrees of freedom.
    pub fn ndof(&self) -> usize {
        self.ndof
    }

    pub fn num_elements(&self, region: Region) -> usize {
        match region {
            Region::Volume => self.volume_dofs.num_elements(),
            Region::Boundary => self.boundary_dofs.num_elements(),
        }
    }

    /// The global DOF indices of the given element, in basis-function order.
    pub fn element_dofs(&self, id: ElementId) -> &[usize] {
        match id.region() {
            Region::Volume => self.volume_dofs.element(id.index()),
            Region::Boundary => self.boundary_dofs.element(id.index()),
        }
    }

    /// The reference element used for elements of the given geometry type.
    pub fn basis(&self, geometry: GeometryType) -> &ElementRef<T> {
        &self.bases[&geometry]
    }

    /// The reference element of the given mesh element.
    pub fn element_basis(&self, id: ElementId) -> Result<&ElementRef<T>, Error> {
        let element = self.mesh.element(id)?;
        Ok(self.basis(element.geometry))
    }

    pub fn is_dirichlet(&self, dof: usize) -> bool {
        self.dirichlet[dof]
    }

    /// The DOFs constrained by the Dirichlet boundary selector, ascending.
    pub fn dirichlet_dofs(&self) -> Vec<usize> {
        (0..self.ndof).filter(|&dof| self.dirichlet[dof]).collect()
    }

    /// The unconstrained DOFs, ascending.
    pub fn free_dofs(&self) -> Vec<usize> {
        (0..self.ndof).filter(|&dof| !self.dirichlet[dof]).collect()
    }

    /// Evaluates the field described by a global DOF vector at a point of an element:
    /// the read-only reconstruction surface for visualization and output consumers.
    ///
    /// Returns the field value and its physical gradient.
    pub fn evaluate_field<'a>(
        &self,
        id: ElementId,
        xi: &Point3<T>,
        u: impl Into<DVectorView<'a, T>>,
    ) -> Result<(T, Vector3<T>), Error> {
        let u = u.into();
        assert_eq!(u.len(), self.ndof, "DOF vector length mismatch");

        let basis = self.element_basis(id)?.clone();
        let n = basis.num_basis_functions();
        let transformation = ElementTransformation::new(&self.mesh, id)?;
        let mut buffer = GeometryBuffer::default();
        let mapped = transformation.evaluate(xi, &mut buffer)?;

        let mut values = vec![T::zero(); n];
        let mut gradients = DMatrix::zeros(3, n);
        basis.populate_basis(&mut values, xi);
        basis.populate_basis_gradients(DMatrixViewMut::from(&mut gradients), xi);

        let dofs = self.element_dofs(id);
        let mut value = T::zero();
        let mut gradient = Vector3::zeros();
        for (i, &dof) in dofs.iter().enumerate() {
            let weight = u[dof];
            value += weight * values[i];
            let reference_gradient =
                Vector3::new(gradients[(0, i)], gradients[(1, i)], gradients[(2, i)]);
            gradient += mapped.physical_gradient(&reference_gradient) * weight;
        }
        Ok((value, gradient))
    }
}

/// The global vertex indices of a local face, in the face's local corner order.
fn face_corner_globals(element: &Element, face: usize) -> Vec<usize> {
    element.geometry.faces()[face]
        .1
        .iter()
        .map(|&v| element.vertices[v])
        .collect()
}

/// The rank of a triangle-face-interior node in the face's canonical enumeration.
///
/// The canonical ordering sorts the face corners by global vertex index and enumerates
/// the interior barycentric multi-indices `(a, b)` (weights of the two lowest corners)
/// in ascending lexicographic order. Both elements adjoining a face compute identical
/// ranks for physically identical nodes.
fn triangle_face_rank(order: usize, corners: &[usize], barycentric: [usize; 3]) -> usize {
    let mut pairs = [
        (corners[0], barycentric[0]),
        (corners[1], barycentric[1]),
        (corners[2], barycentric[2]),
    ];
    pairs.sort_unstable_by_key(|&(global, _)| global);
    let (a, b) = (pairs[0].1, pairs[1].1);

    let mut rank = 0;
    for earlier in 1..a {
        rank += order - 1 - earlier;
    }
    rank + (b - 1)
}

/// The canonical lattice index of a quadrilateral-face-interior node.
///
/// The canonical frame has its origin at the corner with the smallest global vertex
/// index and its first axis towards the smaller-indexed of that corner's two
/// neighbors. The index is recovered from the node's bilinear corner weights, which
/// are independent of the local corner order.
fn quad_face_index(order: usize, corners: &[usize], (i, j): (usize, usize)) -> (usize, usize) {
    let p = order;
    // Bilinear weights scaled by p^2, in local corner order
    let weights = [(p - i) * (p - j), i * (p - j), i * j, (p - i) * j];

    let origin = (0..4).min_by_key(|&c| corners[c]).unwrap();
    let next = (origin + 1) % 4;
    let prev = (origin + 3) % 4;
    let diagonal = (origin + 2) % 4;
    let (first, second) = if corners[next] < corners[prev] {
        (next, prev)
    } else {
        (prev, next)
    };

    let ci = (weights[first] + weights[diagonal]) / p;
    let cj = (weights[second] + weights[diagonal]) / p;
    (ci, cj)
}
