//! Element transformations: polynomial maps from reference cells to physical space.
//!
//! A transformation is derived on demand from a mesh element and owns no persistent
//! state beyond the gathered geometry control points; Jacobians and mapped points are
//! transient values scoped to one evaluation. Affine and multilinear maps arise from
//! the mesh vertices; curved maps of higher geometry order use the control points
//! attached via [`Mesh::with_curved_geometry`](crate::mesh::Mesh::with_curved_geometry).
//!
//! All matrices are exchanged as padded `Matrix3` values: the Jacobian occupies the
//! leading `physical_dim x reference_dim` block, its (pseudo-)inverse the leading
//! `reference_dim x physical_dim` block, and the remaining entries are zero.

use crate::element::{ElementRef, ReferenceElement};
use crate::error::{Error, InvalidElementReason};
use crate::mesh::{ElementId, GeometryType, Mesh, Region};
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut, Matrix3, Point3, Vector3};
use numeric_literals::replace_float_literals;

/// Evaluation scratch for the geometry basis, reusable across elements and points.
#[derive(Debug, Clone)]
pub struct GeometryBuffer<T> {
    values: Vec<T>,
    gradients: DMatrix<T>,
}

impl<T: Real> Default for GeometryBuffer<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            gradients: DMatrix::zeros(3, 0),
        }
    }
}

impl<T: Real> GeometryBuffer<T> {
    fn resize(&mut self, num_nodes: usize) {
        self.values.resize(num_nodes, T::zero());
        self.gradients.resize_mut(3, num_nodes, T::zero());
    }
}

/// The result of mapping one reference point through an element transformation.
#[derive(Debug, Clone, Copy)]
pub struct MappedPoint<T: Real> {
    /// The physical coordinates of the mapped point.
    pub point: Point3<T>,
    /// The Jacobian of the map (leading `physical_dim x reference_dim` block).
    pub jacobian: Matrix3<T>,
    /// The (pseudo-)inverse of the Jacobian (leading `reference_dim x physical_dim`
    /// block). For boundary elements this is the Moore-Penrose inverse
    /// `(J^T J)^{-1} J^T`.
    pub inv_jacobian: Matrix3<T>,
    /// The integration measure: `|det J|` for volume elements, the generalized measure
    /// `sqrt(det(J^T J))` for boundary elements embedded in a higher dimension.
    pub measure: T,
}

impl<T: Real> MappedPoint<T> {
    /// Transforms a reference gradient to a physical gradient.
    pub fn physical_gradient(&self, reference_gradient: &Vector3<T>) -> Vector3<T> {
        self.inv_jacobian.transpose() * reference_gradient
    }
}

/// The polynomial map of one mesh element from its reference cell to physical space.
pub struct ElementTransformation<'a, T: Real> {
    id: ElementId,
    geometry: GeometryType,
    basis: &'a ElementRef<T>,
    control_points: Vec<Point3<T>>,
    reference_dim: usize,
    physical_dim: usize,
}

impl<'a, T: Real> ElementTransformation<'a, T> {
    /// Creates the transformation for the given element.
    ///
    /// Fails with an invalid-element error if the id is out of range.
    pub fn new(mesh: &'a Mesh<T>, id: ElementId) -> Result<Self, Error> {
        let element = mesh.element(id)?;
        let basis = mesh.geometry_basis(element.geometry);

        let control_points = match mesh.curved() {
            Some(curved) => match id.region() {
                Region::Volume => curved.element_points[id.index()].clone(),
                Region::Boundary => curved.boundary_points[id.index()].clone(),
            },
            None => element
                .vertices
                .iter()
                .map(|&v| mesh.vertices()[v])
                .collect(),
        };

        Ok(Self {
            id,
            geometry: element.geometry,
            basis,
            control_points,
            reference_dim: element.geometry.dimension(),
            physical_dim: mesh.dimension(),
        })
    }

    pub fn element_id(&self) -> ElementId {
        self.id
    }

    pub fn geometry(&self) -> GeometryType {
        self.geometry
    }

    pub fn reference_dim(&self) -> usize {
        self.reference_dim
    }

    pub fn physical_dim(&self) -> usize {
        self.physical_dim
    }

    /// The additional quadrature order needed to account for the distortion of the
    /// element map: zero for affine (simplex, order-one) maps, the geometry order
    /// otherwise.
    pub fn distortion_order(&self) -> usize {
        let affine = matches!(
            self.geometry,
            GeometryType::Segment | GeometryType::Triangle | GeometryType::Tetrahedron
        );
        let geometry_order = self.basis.order();
        if affine && geometry_order == 1 {
            0
        } else {
            geometry_order
        }
    }

    /// Maps a single reference point, computing the physical point, the Jacobian, its
    /// measure and its (pseudo-)inverse.
    ///
    /// Fails with an invalid-element error if the map is degenerate at the point, i.e.
    /// the measure vanishes below tolerance. Degeneracy is reported, never clamped.
    pub fn evaluate(
        &self,
        xi: &Point3<T>,
        buffer: &mut GeometryBuffer<T>,
    ) -> Result<MappedPoint<T>, Error> {
        let n = self.basis.num_basis_functions();
        buffer.resize(n);
        self.basis.populate_basis(&mut buffer.values, xi);
        self.basis
            .populate_basis_gradients(DMatrixViewMut::from(&mut buffer.gradients), xi);

        let mut point = Point3::origin();
        let mut jacobian = Matrix3::zeros();
        for (i, c) in self.control_points.iter().enumerate() {
            let phi = buffer.values[i];
            for r in 0..3 {
                point[r] += c[r] * phi;
                for s in 0..self.reference_dim {
                    jacobian[(r, s)] += c[r] * buffer.gradients[(s, i)];
                }
            }
        }

        let (measure, inv_jacobian) = self.invert_jacobian(&jacobian)?;

        Ok(MappedPoint {
            point,
            jacobian,
            inv_jacobian,
            measure,
        })
    }

    /// Maps a batch of quadrature points, reusing the output buffer.
    pub fn map_points(
        &self,
        points: &[Point3<T>],
        buffer: &mut GeometryBuffer<T>,
        output: &mut Vec<MappedPoint<T>>,
    ) -> Result<(), Error> {
        output.clear();
        output.reserve(points.len());
        for xi in points {
            output.push(self.evaluate(xi, buffer)?);
        }
        Ok(())
    }

    #[replace_float_literals(nalgebra::convert::<f64, T>(literal))]
    fn invert_jacobian(&self, jacobian: &Matrix3<T>) -> Result<(T, Matrix3<T>), Error> {
        let rdim = self.reference_dim;
        let pdim = self.physical_dim;
        assert!(rdim == pdim || rdim + 1 == pdim);

        let degenerate = Err(Error::InvalidElement {
            element: self.id,
            reason: InvalidElementReason::DegenerateGeometry,
        });

        // Degeneracy threshold relative to the magnitude of the Jacobian entries
        let mut scale = T::zero();
        for entry in jacobian.iter() {
            scale = scale.max(entry.abs());
        }
        let tol = 1.0e2 * T::default_epsilon();

        if rdim == pdim {
            let det = block_determinant(jacobian, rdim);
            let measure = det.abs();
            if measure <= tol * scale.powi(rdim as i32) || scale == T::zero() {
                return degenerate;
            }
            let inv = block_inverse(jacobian, rdim, det);
            Ok((measure, inv))
        } else {
            // Boundary element: generalized measure and pseudo-inverse via J^T J
            let gram = jacobian.transpose() * jacobian;
            let det = block_determinant(&gram, rdim);
            if det <= (tol * scale.powi(rdim as i32)).powi(2) || scale == T::zero() {
                return degenerate;
            }
            let measure = det.sqrt();
            let gram_inv = block_inverse(&gram, rdim, det);
            let inv = gram_inv * jacobian.transpose();
            Ok((measure, inv))
        }
    }
}

/// The determinant of the leading `dim x dim` block.
fn block_determinant<T: Real>(m: &Matrix3<T>, dim: usize) -> T {
    match dim {
        1 => m[(0, 0)],
        2 => m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
        3 => m.determinant(),
        _ => unreachable!("block dimension is 1, 2 or 3"),
    }
}

/// The inverse of the leading `dim x dim` block, zero-padded to a full `Matrix3`.
fn block_inverse<T: Real>(m: &Matrix3<T>, dim: usize, det: T) -> Matrix3<T> {
    let mut inv = Matrix3::zeros();
    match dim {
        1 => {
            inv[(0, 0)] = T::one() / det;
        }
        2 => {
            inv[(0, 0)] = m[(1, 1)] / det;
            inv[(0, 1)] = -m[(0, 1)] / det;
            inv[(1, 0)] = -m[(1, 0)] / det;
            inv[(1, 1)] = m[(0, 0)] / det;
        }
        3 => {
            inv = m
                .try_inverse()
                .expect("nonzero determinant implies invertibility");
        }
        _ => unreachable!("block dimension is 1, 2 or 3"),
    }
    inv
}
