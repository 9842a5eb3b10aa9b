//! Reference finite elements: nodal basis families evaluated on the reference cells.
//!
//! Elements are immutable and shared across all mesh elements of the same geometry type
//! and order; evaluation is a pure function of reference coordinates. The same nodal
//! basis backs both the H1 (conforming) and L2 (discontinuous) families as well as the
//! polynomial geometry maps of curved elements: the families differ only in how the
//! function space numbers the lattice nodes (see [`crate::space`]).
//!
//! The basis of a [`NodalBasis`] is the Lagrange basis on the principal lattice of the
//! reference cell, represented as a coefficient matrix against a monomial basis of the
//! element's polynomial span. The coefficients are computed once per (geometry, order)
//! by inverting the Vandermonde matrix at the lattice nodes.

use crate::error::Error;
use crate::mesh::GeometryType;
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut, Point3, Scalar};
use numeric_literals::replace_float_literals;
use std::fmt::Debug;
use std::sync::Arc;

/// The sub-entity of the reference cell that a lattice node lies on.
///
/// Edge, face and interior data carry enough lattice information to derive the
/// canonical (orientation-independent) index of the node on the *global* mesh entity,
/// which is what makes shared degrees of freedom match up across adjoining elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEntity {
    /// The node coincides with a local vertex.
    Vertex(usize),
    /// An edge-interior node: `index` steps of `1/order` from the edge's first local
    /// vertex, `1 <= index <= order - 1`.
    Edge { edge: usize, index: usize },
    /// A triangle-face-interior node with integer barycentric coordinates relative to
    /// the face's local corner order (components sum to the order, all >= 1).
    TriangleFace { face: usize, barycentric: [usize; 3] },
    /// A quadrilateral-face-interior node at `(i/order, j/order)` along the
    /// `corner0 -> corner1` and `corner0 -> corner3` axes of the face.
    QuadrilateralFace { face: usize, index: (usize, usize) },
    /// A cell-interior node (running index in node order).
    Interior(usize),
}

/// A node of the reference lattice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeNode {
    pub point: [f64; 3],
    pub entity: NodeEntity,
}

impl LatticeNode {
    pub fn point_as<T: Real>(&self) -> Point3<T> {
        Point3::new(
            nalgebra::convert(self.point[0]),
            nalgebra::convert(self.point[1]),
            nalgebra::convert(self.point[2]),
        )
    }
}

/// A reference finite element: a stateless evaluator for a basis on a reference cell.
///
/// Reference coordinates and gradients are always exchanged as 3D quantities; for cells
/// of lower topological dimension the trailing components are zero.
pub trait ReferenceElement<T: Scalar>: Debug {
    fn geometry(&self) -> GeometryType;

    fn order(&self) -> usize;

    fn num_basis_functions(&self) -> usize;

    /// The lattice nodes, one per basis function, in basis-function order.
    fn nodes(&self) -> &[LatticeNode];

    /// Evaluates every basis function at the given reference coordinates.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold exactly one entry per basis function.
    fn populate_basis(&self, values: &mut [T], xi: &Point3<T>);

    /// Evaluates the reference gradient of every basis function at the given reference
    /// coordinates, one column per basis function.
    ///
    /// # Panics
    ///
    /// Panics if `gradients` is not a `3 x num_basis_functions` matrix view.
    fn populate_basis_gradients(&self, gradients: DMatrixViewMut<T>, xi: &Point3<T>);
}

/// A shared handle to a reference element.
pub type ElementRef<T> = Arc<dyn ReferenceElement<T> + Send + Sync>;

/// Constructs the nodal reference element for the given geometry type and order.
///
/// Fails for pyramids above order one: the conforming pyramid basis is rational, and
/// only the lowest-order member of the family is implemented.
pub fn reference_element<T: Real>(
    geometry: GeometryType,
    order: usize,
) -> Result<ElementRef<T>, Error> {
    assert!(order >= 1, "element order must be at least 1");
    if geometry == GeometryType::Pyramid {
        if order == 1 {
            Ok(Arc::new(PyramidLinear::new()))
        } else {
            Err(Error::unsupported(
                "reference_element",
                format!("pyramid elements of order {} (only order 1 is available)", order),
            ))
        }
    } else {
        Ok(Arc::new(NodalBasis::new(geometry, order)?))
    }
}

/// A Lagrange basis on the principal lattice of a reference cell.
#[derive(Debug, Clone)]
pub struct NodalBasis<T> {
    geometry: GeometryType,
    order: usize,
    nodes: Vec<LatticeNode>,
    exponents: Vec<[usize; 3]>,
    /// `coefficients[(k, j)]` is the coefficient of monomial `k` in basis function `j`,
    /// so that basis values are `C^T m(xi)`.
    coefficients: DMatrix<T>,
}

impl<T: Real> NodalBasis<T> {
    pub fn new(geometry: GeometryType, order: usize) -> Result<Self, Error> {
        assert!(order >= 1, "element order must be at least 1");
        if geometry == GeometryType::Pyramid {
            return Err(Error::unsupported(
                "NodalBasis::new",
                "the pyramid basis is rational; use reference_element instead",
            ));
        }

        let nodes = lattice_nodes(geometry, order);
        let exponents = monomial_exponents(geometry, order);
        assert_eq!(
            nodes.len(),
            exponents.len(),
            "lattice size must match the monomial span"
        );

        let n = nodes.len();
        let vandermonde = DMatrix::from_fn(n, n, |i, k| {
            let p = nodes[i].point_as::<T>();
            monomial_value(&exponents[k], &p)
        });
        let coefficients = vandermonde
            .try_inverse()
            .expect("the principal lattice Vandermonde matrix is invertible");

        Ok(Self {
            geometry,
            order,
            nodes,
            exponents,
            coefficients,
        })
    }
}

impl<T: Real> ReferenceElement<T> for NodalBasis<T> {
    fn geometry(&self) -> GeometryType {
        self.geometry
    }

    fn order(&self) -> usize {
        self.order
    }

    fn num_basis_functions(&self) -> usize {
        self.nodes.len()
    }

    fn nodes(&self) -> &[LatticeNode] {
        &self.nodes
    }

    fn populate_basis(&self, values: &mut [T], xi: &Point3<T>) {
        let n = self.nodes.len();
        assert_eq!(values.len(), n, "basis value buffer length mismatch");
        for j in 0..n {
            let mut sum = T::zero();
            for (k, exponent) in self.exponents.iter().enumerate() {
                sum += self.coefficients[(k, j)] * monomial_value(exponent, xi);
            }
            values[j] = sum;
        }
    }

    fn populate_basis_gradients(&self, mut gradients: DMatrixViewMut<T>, xi: &Point3<T>) {
        let n = self.nodes.len();
        assert_eq!(gradients.nrows(), 3, "gradient buffer must have 3 rows");
        assert_eq!(gradients.ncols(), n, "gradient buffer column count mismatch");
        for j in 0..n {
            let mut gradient = [T::zero(); 3];
            for (k, exponent) in self.exponents.iter().enumerate() {
                let c = self.coefficients[(k, j)];
                for (axis, g) in gradient.iter_mut().enumerate() {
                    *g += c * monomial_derivative(exponent, axis, xi);
                }
            }
            for axis in 0..3 {
                gradients[(axis, j)] = gradient[axis];
            }
        }
    }
}

/// The conforming linear pyramid element.
///
/// The shape functions are rational (they contain the factor `xy / (1 - z)`), which is
/// what makes their traces linear on the triangular faces and bilinear on the base, so
/// that they match adjoining tetrahedra, prisms and hexahedra.
#[derive(Debug, Clone)]
pub struct PyramidLinear {
    nodes: Vec<LatticeNode>,
}

impl PyramidLinear {
    pub fn new() -> Self {
        let nodes = GeometryType::Pyramid
            .reference_vertices()
            .iter()
            .enumerate()
            .map(|(v, &point)| LatticeNode {
                point,
                entity: NodeEntity::Vertex(v),
            })
            .collect();
        Self { nodes }
    }
}

impl Default for PyramidLinear {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> ReferenceElement<T> for PyramidLinear {
    fn geometry(&self) -> GeometryType {
        GeometryType::Pyramid
    }

    fn order(&self) -> usize {
        1
    }

    fn num_basis_functions(&self) -> usize {
        5
    }

    fn nodes(&self) -> &[LatticeNode] {
        &self.nodes
    }

    fn populate_basis(&self, values: &mut [T], xi: &Point3<T>) {
        assert_eq!(values.len(), 5, "basis value buffer length mismatch");
        let (x, y, z) = (xi.x, xi.y, xi.z);
        // Guard the removable singularity at the apex
        let d = pyramid_denominator(z);
        let a = d - x;
        let b = d - y;
        values[0] = a * b / d;
        values[1] = x * b / d;
        values[2] = x * y / d;
        values[3] = a * y / d;
        values[4] = z;
    }

    fn populate_basis_gradients(&self, mut gradients: DMatrixViewMut<T>, xi: &Point3<T>) {
        assert_eq!(gradients.nrows(), 3, "gradient buffer must have 3 rows");
        assert_eq!(gradients.ncols(), 5, "gradient buffer column count mismatch");
        let (x, y, z) = (xi.x, xi.y, xi.z);
        let d = pyramid_denominator(z);
        let a = d - x;
        let b = d - y;
        let d2 = d * d;

        gradients.fill(T::zero());
        // N0 = a b / d
        gradients[(0, 0)] = -b / d;
        gradients[(1, 0)] = -a / d;
        gradients[(2, 0)] = (a * b - (a + b) * d) / d2;
        // N1 = x b / d
        gradients[(0, 1)] = b / d;
        gradients[(1, 1)] = -x / d;
        gradients[(2, 1)] = -x * y / d2;
        // N2 = x y / d
        gradients[(0, 2)] = y / d;
        gradients[(1, 2)] = x / d;
        gradients[(2, 2)] = x * y / d2;
        // N3 = a y / d
        gradients[(0, 3)] = -y / d;
        gradients[(1, 3)] = a / d;
        gradients[(2, 3)] = -x * y / d2;
        // N4 = z
        gradients[(2, 4)] = T::one();
    }
}

#[replace_float_literals(nalgebra::convert::<f64, T>(literal))]
fn pyramid_denominator<T: Real>(z: T) -> T {
    let d = T::one() - z;
    if d.abs() < 1.0e-12 {
        1.0e-12
    } else {
        d
    }
}

fn monomial_value<T: Real>(exponent: &[usize; 3], p: &Point3<T>) -> T {
    p.x.powi(exponent[0] as i32) * p.y.powi(exponent[1] as i32) * p.z.powi(exponent[2] as i32)
}

fn monomial_derivative<T: Real>(exponent: &[usize; 3], axis: usize, p: &Point3<T>) -> T {
    let e = exponent[axis];
    if e == 0 {
        return T::zero();
    }
    let mut reduced = *exponent;
    reduced[axis] = e - 1;
    let factor: T = nalgebra::convert(e as f64);
    factor * monomial_value(&reduced, p)
}

/// The monomial exponent set spanning the element space of the given geometry.
fn monomial_exponents(geometry: GeometryType, order: usize) -> Vec<[usize; 3]> {
    let p = order;
    let mut exponents = Vec::new();
    match geometry {
        GeometryType::Segment => {
            for a in 0..=p {
                exponents.push([a, 0, 0]);
            }
        }
        GeometryType::Triangle => {
            for a in 0..=p {
                for b in 0..=(p - a) {
                    exponents.push([a, b, 0]);
                }
            }
        }
        GeometryType::Quadrilateral => {
            for a in 0..=p {
                for b in 0..=p {
                    exponents.push([a, b, 0]);
                }
            }
        }
        GeometryType::Tetrahedron => {
            for a in 0..=p {
                for b in 0..=(p - a) {
                    for c in 0..=(p - a - b) {
                        exponents.push([a, b, c]);
                    }
                }
            }
        }
        GeometryType::Hexahedron => {
            for a in 0..=p {
                for b in 0..=p {
                    for c in 0..=p {
                        exponents.push([a, b, c]);
                    }
                }
            }
        }
        GeometryType::Prism => {
            for a in 0..=p {
                for b in 0..=(p - a) {
                    for c in 0..=p {
                        exponents.push([a, b, c]);
                    }
                }
            }
        }
        GeometryType::Pyramid => unreachable!("the pyramid basis is not polynomial"),
    }
    exponents
}

/// The principal lattice of the given geometry and order, with entity classification.
pub(crate) fn lattice_nodes(geometry: GeometryType, order: usize) -> Vec<LatticeNode> {
    let p = order;
    let h = 1.0 / p as f64;
    let mut points = Vec::new();
    match geometry {
        GeometryType::Segment => {
            for i in 0..=p {
                points.push([i as f64 * h, 0.0, 0.0]);
            }
        }
        GeometryType::Triangle => {
            for i in 0..=p {
                for j in 0..=(p - i) {
                    points.push([i as f64 * h, j as f64 * h, 0.0]);
                }
            }
        }
        GeometryType::Quadrilateral => {
            for i in 0..=p {
                for j in 0..=p {
                    points.push([i as f64 * h, j as f64 * h, 0.0]);
                }
            }
        }
        GeometryType::Tetrahedron => {
            for i in 0..=p {
                for j in 0..=(p - i) {
                    for k in 0..=(p - i - j) {
                        points.push([i as f64 * h, j as f64 * h, k as f64 * h]);
                    }
                }
            }
        }
        GeometryType::Hexahedron => {
            for i in 0..=p {
                for j in 0..=p {
                    for k in 0..=p {
                        points.push([i as f64 * h, j as f64 * h, k as f64 * h]);
                    }
                }
            }
        }
        GeometryType::Prism => {
            for i in 0..=p {
                for j in 0..=(p - i) {
                    for k in 0..=p {
                        points.push([i as f64 * h, j as f64 * h, k as f64 * h]);
                    }
                }
            }
        }
        GeometryType::Pyramid => {
            assert_eq!(p, 1, "the pyramid lattice is only defined for order 1");
            points.extend(geometry.reference_vertices().iter().copied());
        }
    }

    let mut interior_count = 0;
    points
        .into_iter()
        .map(|point| {
            let entity = classify_point(geometry, p, &point, &mut interior_count);
            LatticeNode { point, entity }
        })
        .collect()
}

const CLASSIFY_TOL: f64 = 1.0e-10;

/// Finds the smallest sub-entity of the reference cell containing the given point.
fn classify_point(
    geometry: GeometryType,
    order: usize,
    point: &[f64; 3],
    interior_count: &mut usize,
) -> NodeEntity {
    let vertices = geometry.reference_vertices();

    for (v, vertex) in vertices.iter().enumerate() {
        if distance(point, vertex) < CLASSIFY_TOL {
            return NodeEntity::Vertex(v);
        }
    }

    for (e, edge) in geometry.edges().iter().enumerate() {
        let a = &vertices[edge[0]];
        let b = &vertices[edge[1]];
        if let Some(t) = edge_parameter(point, a, b) {
            let index = (t * order as f64).round() as usize;
            debug_assert!(index >= 1 && index <= order - 1);
            return NodeEntity::Edge { edge: e, index };
        }
    }

    for (f, (face_geometry, face_vertices)) in geometry.faces().iter().enumerate() {
        match face_geometry {
            GeometryType::Triangle => {
                let c0 = &vertices[face_vertices[0]];
                let c1 = &vertices[face_vertices[1]];
                let c2 = &vertices[face_vertices[2]];
                if let Some((alpha, beta)) = plane_coordinates(point, c0, c1, c2) {
                    if alpha > CLASSIFY_TOL
                        && beta > CLASSIFY_TOL
                        && alpha + beta < 1.0 - CLASSIFY_TOL
                    {
                        let a = (alpha * order as f64).round() as usize;
                        let b = (beta * order as f64).round() as usize;
                        return NodeEntity::TriangleFace {
                            face: f,
                            barycentric: [order - a - b, a, b],
                        };
                    }
                }
            }
            GeometryType::Quadrilateral => {
                // Quadrilateral faces of the reference cells are parallelograms, so the
                // bilinear patch coordinates reduce to plane coordinates
                let c0 = &vertices[face_vertices[0]];
                let c1 = &vertices[face_vertices[1]];
                let c3 = &vertices[face_vertices[3]];
                if let Some((s, t)) = plane_coordinates(point, c0, c1, c3) {
                    if s > CLASSIFY_TOL
                        && t > CLASSIFY_TOL
                        && s < 1.0 - CLASSIFY_TOL
                        && t < 1.0 - CLASSIFY_TOL
                    {
                        let i = (s * order as f64).round() as usize;
                        let j = (t * order as f64).round() as usize;
                        return NodeEntity::QuadrilateralFace {
                            face: f,
                            index: (i, j),
                        };
                    }
                }
            }
            _ => unreachable!("faces are two-dimensional"),
        }
    }

    let entity = NodeEntity::Interior(*interior_count);
    *interior_count += 1;
    entity
}

fn sub(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    dot(&sub(a, b), &sub(a, b)).sqrt()
}

/// The parameter `t` such that `p = a + t (b - a)`, if `p` lies strictly inside the
/// segment.
fn edge_parameter(p: &[f64; 3], a: &[f64; 3], b: &[f64; 3]) -> Option<f64> {
    let ab = sub(b, a);
    let ap = sub(p, a);
    let t = dot(&ap, &ab) / dot(&ab, &ab);
    if t <= CLASSIFY_TOL || t >= 1.0 - CLASSIFY_TOL {
        return None;
    }
    // Distance of p from the line must vanish
    let projection = [a[0] + t * ab[0], a[1] + t * ab[1], a[2] + t * ab[2]];
    (distance(p, &projection) < CLASSIFY_TOL).then_some(t)
}

/// Coordinates `(s, t)` such that `p = c0 + s e1 + t e2` with `e1 = c1 - c0` and
/// `e2 = c2 - c0`, if `p` lies in the plane spanned by the two edges.
fn plane_coordinates(
    p: &[f64; 3],
    c0: &[f64; 3],
    c1: &[f64; 3],
    c2: &[f64; 3],
) -> Option<(f64, f64)> {
    let e1 = sub(c1, c0);
    let e2 = sub(c2, c0);
    let rhs = sub(p, c0);

    let a11 = dot(&e1, &e1);
    let a12 = dot(&e1, &e2);
    let a22 = dot(&e2, &e2);
    let b1 = dot(&e1, &rhs);
    let b2 = dot(&e2, &rhs);

    let det = a11 * a22 - a12 * a12;
    let s = (a22 * b1 - a12 * b2) / det;
    let t = (a11 * b2 - a12 * b1) / det;

    let projection = [
        c0[0] + s * e1[0] + t * e2[0],
        c0[1] + s * e1[1] + t * e2[1],
        c0[2] + s * e1[2] + t * e2[2],
    ];
    (distance(p, &projection) < CLASSIFY_TOL).then_some((s, t))
}
