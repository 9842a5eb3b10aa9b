//! Element-level assembly: symbolic integrators reduced to dense element matrices.
//!
//! A symbolic integrator holds a coefficient-function integrand referencing trial/test
//! proxies, together with its region class, an optional geometry-type restriction and
//! an integration-order bump. [`SymbolicElementAssembler`] and
//! [`SymbolicVectorAssembler`] drive the quadrature loop: map the rule through the
//! element transformation, evaluate the basis at every point, and accumulate
//!
//! ```text
//! sum_q weight_q * measure_q * integrand(trial_j, test_i, q)
//! ```
//!
//! into the `(i, j)` entries of the caller-provided output. Assemblers are thread-safe
//! on disjoint elements: they only read the shared immutable spaces and trees, and all
//! mutable scratch lives in per-thread workspaces.

use crate::assembly::buffers::{BasisFunctionBuffer, QuadratureBuffer, QuadratureCache};
use crate::coefficient::{Coefficient, PointContext, ProxyKind};
use crate::element::ReferenceElement;
use crate::error::Error;
use crate::mesh::{ElementId, GeometryType, Region};
use crate::space::FeSpace;
use crate::transformation::ElementTransformation;
use crate::Real;
use davenport::{define_thread_local_workspace, with_thread_local_workspace};
use nalgebra::{DMatrixViewMut, DVectorViewMut};
use std::sync::Arc;

define_thread_local_workspace!(WORKSPACE);

#[derive(Debug)]
struct SymbolicWorkspace<T: Real> {
    cache: QuadratureCache<T>,
    quadrature: QuadratureBuffer<T>,
    trial_basis: BasisFunctionBuffer<T>,
    test_basis: BasisFunctionBuffer<T>,
}

impl<T: Real> Default for SymbolicWorkspace<T> {
    fn default() -> Self {
        Self {
            cache: QuadratureCache::default(),
            quadrature: QuadratureBuffer::default(),
            trial_basis: BasisFunctionBuffer::default(),
            test_basis: BasisFunctionBuffer::default(),
        }
    }
}

/// A bilinear-form integrator defined by a symbolic integrand.
#[derive(Debug, Clone)]
pub struct SymbolicBilinearIntegrator<T: Real> {
    integrand: Coefficient<T>,
    region: Region,
    geometries: Option<Vec<GeometryType>>,
    bonus_order: usize,
}

impl<T: Real> SymbolicBilinearIntegrator<T> {
    /// A volume integrator with the given integrand.
    pub fn new(integrand: Coefficient<T>) -> Self {
        Self {
            integrand,
            region: Region::Volume,
            geometries: None,
            bonus_order: 0,
        }
    }

    /// A boundary integrator with the given integrand.
    pub fn boundary(integrand: Coefficient<T>) -> Self {
        Self {
            region: Region::Boundary,
            ..Self::new(integrand)
        }
    }

    /// Restricts the integrator to a subset of geometry types. Elements of other
    /// geometry types are skipped, contributing nothing.
    pub fn restricted_to(mut self, geometries: Vec<GeometryType>) -> Self {
        self.geometries = Some(geometries);
        self
    }

    /// Raises the quadrature order beyond the default
    /// `trial order + test order + distortion order`.
    pub fn with_bonus_order(mut self, bonus_order: usize) -> Self {
        self.bonus_order = bonus_order;
        self
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn applies_to(&self, region: Region, geometry: GeometryType) -> bool {
        self.region == region
            && self
                .geometries
                .as_ref()
                .map(|list| list.contains(&geometry))
                .unwrap_or(true)
    }

    /// Checks that the integrand is a scalar expression referencing both the trial and
    /// the test function.
    pub fn validate(&self, mesh_dimension: usize) -> Result<(), Error> {
        let shape = self.integrand.shape(mesh_dimension)?;
        if !shape.is_scalar() {
            return Err(Error::unsupported(
                "bilinear integrator",
                format!("the integrand must be scalar, but has shape {}", shape),
            ));
        }
        if !self.integrand.references_proxy(ProxyKind::Trial)
            || !self.integrand.references_proxy(ProxyKind::Test)
        {
            return Err(Error::unsupported(
                "bilinear integrator",
                "the integrand must reference both the trial and the test function",
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn accumulate(
        &self,
        id: ElementId,
        marker: usize,
        mesh_dimension: usize,
        transformation: &ElementTransformation<T>,
        trial_space: &FeSpace<T>,
        test_space: &FeSpace<T>,
        symmetric: bool,
        ws: &mut SymbolicWorkspace<T>,
        output: &mut DMatrixViewMut<T>,
    ) -> Result<(), Error> {
        let geometry = transformation.geometry();
        let trial_element = trial_space.basis(geometry).clone();
        let test_element = test_space.basis(geometry).clone();
        let n_trial = trial_element.num_basis_functions();
        let n_test = test_element.num_basis_functions();

        let strength = trial_space.order()
            + test_space.order()
            + transformation.distortion_order()
            + self.bonus_order;

        let SymbolicWorkspace {
            cache,
            quadrature,
            trial_basis,
            test_basis,
        } = ws;
        {
            let rule = cache.rule(geometry, strength);
            quadrature.populate(rule, transformation)?;
        }

        for q in 0..quadrature.len() {
            let mapped = quadrature.mapped(q);
            let reference = *quadrature.point(q);
            trial_basis.populate(&trial_element, &reference, mapped);
            test_basis.populate(&test_element, &reference, mapped);
            let scale = quadrature.weight(q) * mapped.measure;

            for i in 0..n_test {
                let j_start = if symmetric { i } else { 0 };
                for j in j_start..n_trial {
                    let ctx = PointContext {
                        element: id,
                        material: marker,
                        mesh_dimension,
                        reference,
                        mapped,
                        trial: Some(trial_basis.slot(j)),
                        test: Some(test_basis.slot(i)),
                    };
                    let value = self.integrand.evaluate(&ctx)?.into_scalar()?;
                    output[(i, j)] += scale * value;
                }
            }
        }
        Ok(())
    }
}

/// A linear-form integrator defined by a symbolic integrand.
#[derive(Debug, Clone)]
pub struct SymbolicLinearIntegrator<T: Real> {
    integrand: Coefficient<T>,
    region: Region,
    geometries: Option<Vec<GeometryType>>,
    bonus_order: usize,
}

impl<T: Real> SymbolicLinearIntegrator<T> {
    pub fn new(integrand: Coefficient<T>) -> Self {
        Self {
            integrand,
            region: Region::Volume,
            geometries: None,
            bonus_order: 0,
        }
    }

    pub fn boundary(integrand: Coefficient<T>) -> Self {
        Self {
            region: Region::Boundary,
            ..Self::new(integrand)
        }
    }

    pub fn restricted_to(mut self, geometries: Vec<GeometryType>) -> Self {
        self.geometries = Some(geometries);
        self
    }

    pub fn with_bonus_order(mut self, bonus_order: usize) -> Self {
        self.bonus_order = bonus_order;
        self
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn applies_to(&self, region: Region, geometry: GeometryType) -> bool {
        self.region == region
            && self
                .geometries
                .as_ref()
                .map(|list| list.contains(&geometry))
                .unwrap_or(true)
    }

    /// Checks that the integrand is a scalar expression referencing the test function
    /// but not the trial function.
    pub fn validate(&self, mesh_dimension: usize) -> Result<(), Error> {
        let shape = self.integrand.shape(mesh_dimension)?;
        if !shape.is_scalar() {
            return Err(Error::unsupported(
                "linear integrator",
                format!("the integrand must be scalar, but has shape {}", shape),
            ));
        }
        if !self.integrand.references_proxy(ProxyKind::Test) {
            return Err(Error::unsupported(
                "linear integrator",
                "the integrand must reference the test function",
            ));
        }
        if self.integrand.references_proxy(ProxyKind::Trial) {
            return Err(Error::unsupported(
                "linear integrator",
                "the integrand of a linear form cannot reference a trial function",
            ));
        }
        Ok(())
    }

    fn accumulate(
        &self,
        id: ElementId,
        marker: usize,
        mesh_dimension: usize,
        transformation: &ElementTransformation<T>,
        space: &FeSpace<T>,
        ws: &mut SymbolicWorkspace<T>,
        output: &mut DVectorViewMut<T>,
    ) -> Result<(), Error> {
        let geometry = transformation.geometry();
        let test_element = space.basis(geometry).clone();
        let n = test_element.num_basis_functions();

        let strength = space.order() + transformation.distortion_order() + self.bonus_order;

        let SymbolicWorkspace {
            cache,
            quadrature,
            test_basis,
            ..
        } = ws;
        {
            let rule = cache.rule(geometry, strength);
            quadrature.populate(rule, transformation)?;
        }

        for q in 0..quadrature.len() {
            let mapped = quadrature.mapped(q);
            let reference = *quadrature.point(q);
            test_basis.populate(&test_element, &reference, mapped);
            let scale = quadrature.weight(q) * mapped.measure;

            for i in 0..n {
                let ctx = PointContext {
                    element: id,
                    material: marker,
                    mesh_dimension,
                    reference,
                    mapped,
                    trial: None,
                    test: Some(test_basis.slot(i)),
                };
                let value = self.integrand.evaluate(&ctx)?.into_scalar()?;
                output[i] += scale * value;
            }
        }
        Ok(())
    }
}

/// Assembles the matrix contribution of a single element.
pub trait ElementMatrixAssembler<T: Real>: Sync {
    fn trial_space(&self) -> &FeSpace<T>;

    fn test_space(&self) -> &FeSpace<T>;

    /// Computes the element matrix into `output`, which must be a
    /// `test DOFs x trial DOFs` view. The output is zeroed first; elements to which no
    /// integrator applies contribute nothing (this is not an error).
    fn assemble_element_matrix_into(
        &self,
        id: ElementId,
        output: DMatrixViewMut<T>,
    ) -> Result<(), Error>;
}

/// Assembles the vector contribution of a single element.
pub trait ElementVectorAssembler<T: Real>: Sync {
    fn space(&self) -> &FeSpace<T>;

    fn assemble_element_vector_into(
        &self,
        id: ElementId,
        output: DVectorViewMut<T>,
    ) -> Result<(), Error>;
}

/// The element assembler of a symbolic bilinear form.
pub struct SymbolicElementAssembler<'a, T: Real> {
    pub trial: &'a FeSpace<T>,
    pub test: &'a FeSpace<T>,
    pub integrators: &'a [SymbolicBilinearIntegrator<T>],
    /// Assemble only the upper triangle and mirror it, exploiting symmetry of the
    /// form. Only valid when trial and test space coincide.
    pub symmetric: bool,
}

impl<'a, T: Real> ElementMatrixAssembler<T> for SymbolicElementAssembler<'a, T> {
    fn trial_space(&self) -> &FeSpace<T> {
        self.trial
    }

    fn test_space(&self) -> &FeSpace<T> {
        self.test
    }

    fn assemble_element_matrix_into(
        &self,
        id: ElementId,
        mut output: DMatrixViewMut<T>,
    ) -> Result<(), Error> {
        output.fill(T::zero());
        if output.nrows() == 0 || output.ncols() == 0 {
            return Ok(());
        }

        let mesh = self.trial.mesh();
        let element = mesh.element(id)?;
        let applicable: Vec<_> = self
            .integrators
            .iter()
            .filter(|integrator| integrator.applies_to(id.region(), element.geometry))
            .collect();
        if applicable.is_empty() {
            return Ok(());
        }

        let transformation = ElementTransformation::new(mesh, id)?;
        let symmetric = self.symmetric;
        with_thread_local_workspace(&WORKSPACE, |ws: &mut SymbolicWorkspace<T>| {
            for integrator in &applicable {
                integrator.accumulate(
                    id,
                    element.marker,
                    mesh.dimension(),
                    &transformation,
                    self.trial,
                    self.test,
                    symmetric,
                    ws,
                    &mut output,
                )?;
            }
            if symmetric {
                mirror_upper_to_lower(&mut output);
            }
            Ok(())
        })
    }
}

/// The element assembler of a symbolic linear form.
pub struct SymbolicVectorAssembler<'a, T: Real> {
    pub space: &'a FeSpace<T>,
    pub integrators: &'a [SymbolicLinearIntegrator<T>],
}

impl<'a, T: Real> ElementVectorAssembler<T> for SymbolicVectorAssembler<'a, T> {
    fn space(&self) -> &FeSpace<T> {
        self.space
    }

    fn assemble_element_vector_into(
        &self,
        id: ElementId,
        mut output: DVectorViewMut<T>,
    ) -> Result<(), Error> {
        output.fill(T::zero());
        if output.is_empty() {
            return Ok(());
        }

        let mesh = self.space.mesh();
        let element = mesh.element(id)?;
        let applicable: Vec<_> = self
            .integrators
            .iter()
            .filter(|integrator| integrator.applies_to(id.region(), element.geometry))
            .collect();
        if applicable.is_empty() {
            return Ok(());
        }

        let transformation = ElementTransformation::new(mesh, id)?;
        with_thread_local_workspace(&WORKSPACE, |ws: &mut SymbolicWorkspace<T>| {
            for integrator in &applicable {
                integrator.accumulate(
                    id,
                    element.marker,
                    mesh.dimension(),
                    &transformation,
                    self.space,
                    ws,
                    &mut output,
                )?;
            }
            Ok(())
        })
    }
}

/// Copies the strict upper triangle onto the strict lower triangle.
fn mirror_upper_to_lower<T: Real>(matrix: &mut DMatrixViewMut<T>) {
    let n = matrix.nrows().min(matrix.ncols());
    for i in 0..n {
        for j in (i + 1)..n {
            matrix[(j, i)] = matrix[(i, j)];
        }
    }
}

/// Ensures that two spaces refer to the same mesh instance.
pub(crate) fn check_same_mesh<T: Real>(trial: &FeSpace<T>, test: &FeSpace<T>) {
    assert!(
        Arc::ptr_eq(trial.mesh(), test.mesh()),
        "trial and test space must be built over the same mesh"
    );
}
