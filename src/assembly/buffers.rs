//! Reusable evaluation buffers for element-level assembly.
//!
//! All buffers are resized, never shrunk, so that repeated use across the elements of a
//! sweep settles into zero allocations. They are kept in thread-local workspaces by the
//! assemblers (see [`crate::assembly::local`]), one arena per worker thread.

use crate::coefficient::BasisSlot;
use crate::element::{ElementRef, ReferenceElement};
use crate::mesh::GeometryType;
use crate::quadrature::{reference_rule, QuadratureRule};
use crate::transformation::{ElementTransformation, GeometryBuffer, MappedPoint};
use crate::error::Error;
use crate::Real;
use itertools::izip;
use nalgebra::{DMatrix, DMatrixViewMut, Point3, Vector3};
use rustc_hash::FxHashMap;

/// Basis values and gradients of one element at one evaluation point.
#[derive(Debug, Clone)]
pub struct BasisFunctionBuffer<T> {
    values: Vec<T>,
    reference_gradients: DMatrix<T>,
    physical_gradients: DMatrix<T>,
}

impl<T: Real> Default for BasisFunctionBuffer<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            reference_gradients: DMatrix::zeros(3, 0),
            physical_gradients: DMatrix::zeros(3, 0),
        }
    }
}

impl<T: Real> BasisFunctionBuffer<T> {
    pub fn resize(&mut self, num_basis_functions: usize) {
        self.values.resize(num_basis_functions, T::zero());
        self.reference_gradients
            .resize_mut(3, num_basis_functions, T::zero());
        self.physical_gradients
            .resize_mut(3, num_basis_functions, T::zero());
    }

    /// Evaluates the basis at a reference point and transforms the gradients to
    /// physical space with the mapped point's inverse Jacobian.
    pub fn populate(
        &mut self,
        basis: &ElementRef<T>,
        xi: &Point3<T>,
        mapped: &MappedPoint<T>,
    ) {
        let n = basis.num_basis_functions();
        self.resize(n);
        basis.populate_basis(&mut self.values, xi);
        basis.populate_basis_gradients(
            DMatrixViewMut::from(&mut self.reference_gradients),
            xi,
        );
        for i in 0..n {
            let reference = Vector3::new(
                self.reference_gradients[(0, i)],
                self.reference_gradients[(1, i)],
                self.reference_gradients[(2, i)],
            );
            let physical = mapped.physical_gradient(&reference);
            for r in 0..3 {
                self.physical_gradients[(r, i)] = physical[r];
            }
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// The basis slot (value and physical gradient) of one basis function.
    pub fn slot(&self, i: usize) -> BasisSlot<T> {
        BasisSlot {
            value: self.values[i],
            gradient: Vector3::new(
                self.physical_gradients[(0, i)],
                self.physical_gradients[(1, i)],
                self.physical_gradients[(2, i)],
            ),
        }
    }
}

/// Quadrature data of the element currently being assembled.
#[derive(Debug, Clone)]
pub struct QuadratureBuffer<T: Real> {
    weights: Vec<T>,
    points: Vec<Point3<T>>,
    mapped: Vec<MappedPoint<T>>,
    geometry: GeometryBuffer<T>,
}

impl<T: Real> Default for QuadratureBuffer<T> {
    fn default() -> Self {
        Self {
            weights: Vec::new(),
            points: Vec::new(),
            mapped: Vec::new(),
            geometry: GeometryBuffer::default(),
        }
    }
}

impl<T: Real> QuadratureBuffer<T> {
    /// Loads a reference rule and maps its points through the element transformation.
    pub fn populate(
        &mut self,
        rule: &QuadratureRule<T>,
        transformation: &ElementTransformation<T>,
    ) -> Result<(), Error> {
        let (weights, points) = rule;
        self.weights.clear();
        self.weights.extend_from_slice(weights);
        self.points.clear();
        self.points.extend_from_slice(points);
        transformation.map_points(&self.points, &mut self.geometry, &mut self.mapped)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weight(&self, q: usize) -> T {
        self.weights[q]
    }

    pub fn point(&self, q: usize) -> &Point3<T> {
        &self.points[q]
    }

    pub fn mapped(&self, q: usize) -> &MappedPoint<T> {
        &self.mapped[q]
    }

    /// Calls a closure for each (weight, reference point, mapped point) triple.
    pub fn for_each_point<E>(
        &self,
        mut f: impl FnMut(T, &Point3<T>, &MappedPoint<T>) -> Result<(), E>,
    ) -> Result<(), E> {
        for (weight, point, mapped) in izip!(&self.weights, &self.points, &self.mapped) {
            f(*weight, point, mapped)?;
        }
        Ok(())
    }
}

/// A cache of reference quadrature rules keyed by geometry type and strength.
///
/// Rule construction involves Newton iterations for the Gauss points, so rules are
/// computed once per (geometry, strength) pair and reused for every element.
#[derive(Debug, Clone)]
pub struct QuadratureCache<T: Real> {
    rules: FxHashMap<(GeometryType, usize), QuadratureRule<T>>,
}

impl<T: Real> Default for QuadratureCache<T> {
    fn default() -> Self {
        Self {
            rules: FxHashMap::default(),
        }
    }
}

impl<T: Real> QuadratureCache<T> {
    pub fn rule(&mut self, geometry: GeometryType, strength: usize) -> &QuadratureRule<T> {
        self.rules
            .entry((geometry, strength))
            .or_insert_with(|| reference_rule(geometry, strength))
    }
}
