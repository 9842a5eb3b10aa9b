//! Bilinear and linear forms: element sweeps accumulated into global operators.
//!
//! A form owns its integrators and (for bilinear forms, one or) two function spaces,
//! and caches the assembled operator/vector. The cache follows the state machine
//! `Unassembled -> (assemble) -> Assembled -> (invalidate) -> Unassembled`: since
//! meshes and spaces are immutable, observing a mutation means the caller replaced
//! them and calls [`BilinearForm::invalidate`] explicitly. Re-assembly discards the
//! previous operator before any element is processed and publishes the new one only on
//! success, so a failed sweep never leaves partial results observable.

use crate::assembly::global::{
    CsrAssembler, CsrParAssembler, ParVectorAssembler, SerialVectorAssembler,
};
use crate::assembly::local::{
    check_same_mesh, ElementMatrixAssembler, SymbolicBilinearIntegrator,
    SymbolicElementAssembler, SymbolicLinearIntegrator, SymbolicVectorAssembler,
};
use crate::error::Error;
use crate::flags::FlagValue;
use crate::mesh::{ElementId, Region};
use crate::space::FeSpace;
use crate::Real;
use galerkin_sparse::CsrMatrix;
use nalgebra::{DMatrix, DMatrixViewMut, DVector};
use std::sync::Arc;

/// Recognized construction options for forms.
#[derive(Debug, Clone, Default)]
pub struct FormOptions {
    /// Exploit symmetry: assemble only the upper triangle of each element matrix and
    /// mirror it. Requires trial and test space to be the same space.
    pub symmetric: bool,
    /// Additionally retain the individual element matrices/vectors.
    pub elementwise: bool,
    /// Distribute the element sweep across the rayon pool.
    pub parallel: bool,
}

impl FormOptions {
    /// Parses a configuration set, failing fast on unrecognized keys.
    pub fn parse<'a>(
        pairs: impl IntoIterator<Item = (&'a str, FlagValue)>,
    ) -> Result<Self, Error> {
        let mut options = Self::default();
        for (key, value) in pairs {
            match (key, &value) {
                ("symmetric", FlagValue::Bool(v)) => options.symmetric = *v,
                ("elementwise", FlagValue::Bool(v)) => options.elementwise = *v,
                ("symmetric", other) | ("elementwise", other) => {
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

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// A bilinear form `a(u, v)` discretized over a trial and a test space.
#[derive(Debug)]
pub struct BilinearForm<T: Real> {
    trial: Arc<FeSpace<T>>,
    test: Arc<FeSpace<T>>,
    integrators: Vec<SymbolicBilinearIntegrator<T>>,
    options: FormOptions,
    matrix: Option<CsrMatrix<T>>,
    element_matrices: Option<Vec<DMatrix<T>>>,
}

impl<T: Real> BilinearForm<T> {
    /// A form with identical trial and test space.
    pub fn new(space: Arc<FeSpace<T>>) -> Self {
        Self {
            trial: Arc::clone(&space),
            test: space,
            integrators: Vec::new(),
            options: FormOptions::default(),
            matrix: None,
            element_matrices: None,
        }
    }

    /// A form with distinct trial and test spaces over the same mesh.
    pub fn with_spaces(trial: Arc<FeSpace<T>>, test: Arc<FeSpace<T>>) -> Self {
        check_same_mesh(&trial, &test);
        Self {
            trial,
            test,
            integrators: Vec::new(),
            options: FormOptions::default(),
            matrix: None,
            element_matrices: None,
        }
    }

    pub fn with_options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds an integrator; the form becomes unassembled.
    pub fn add_integrator(&mut self, integrator: SymbolicBilinearIntegrator<T>) -> &mut Self {
        self.integrators.push(integrator);
        self.invalidate();
        self
    }

    pub fn trial_space(&self) -> &Arc<FeSpace<T>> {
        &self.trial
    }

    pub fn test_space(&self) -> &Arc<FeSpace<T>> {
        &self.test
    }

    pub fn assembled(&self) -> bool {
        self.matrix.is_some()
    }

    /// Drops the cached operator, returning the form to the unassembled state.
    pub fn invalidate(&mut self) {
        self.matrix = None;
        self.element_matrices = None;
    }

    /// The assembled operator, or `None` while the form is unassembled.
    pub fn matrix(&self) -> Option<&CsrMatrix<T>> {
        self.matrix.as_ref()
    }

    /// The retained matrix of one element (volume elements first, then boundary), if
    /// the form was assembled with the `elementwise` option.
    pub fn element_matrix(&self, id: ElementId) -> Option<&DMatrix<T>> {
        let matrices = self.element_matrices.as_ref()?;
        let num_volume = self.trial.mesh().num_elements(Region::Volume);
        let index = match id.region() {
            Region::Volume => id.index(),
            Region::Boundary => num_volume + id.index(),
        };
        matrices.get(index)
    }

    /// Assembles the global operator from all integrators.
    ///
    /// Any previously assembled operator is discarded first; on failure the form stays
    /// unassembled.
    pub fn assemble(&mut self) -> Result<(), Error>
    where
        T: Send + Sync,
    {
        self.invalidate();

        let symmetric = self.options.symmetric;
        if symmetric && !Arc::ptr_eq(&self.trial, &self.test) {
            return Err(Error::configuration(
                "symmetric",
                "symmetric assembly requires identical trial and test spaces",
            ));
        }
        let mesh_dimension = self.trial.mesh().dimension();
        for integrator in &self.integrators {
            integrator.validate(mesh_dimension)?;
        }

        let assembler = SymbolicElementAssembler {
            trial: &self.trial,
            test: &self.test,
            integrators: &self.integrators,
            symmetric,
        };

        let matrix = if self.options.parallel {
            CsrParAssembler::default().assemble(&assembler)?
        } else {
            CsrAssembler::default().assemble(&assembler)?
        };

        if self.options.elementwise {
            self.element_matrices = Some(collect_element_matrices(&assembler)?);
        }
        self.matrix = Some(matrix);
        Ok(())
    }
}

fn collect_element_matrices<T: Real>(
    assembler: &SymbolicElementAssembler<T>,
) -> Result<Vec<DMatrix<T>>, Error> {
    let mesh = assembler.trial.mesh();
    let num_volume = mesh.num_elements(Region::Volume);
    let total = num_volume + mesh.num_elements(Region::Boundary);

    let mut matrices = Vec::with_capacity(total);
    for n in 0..total {
        let id = if n < num_volume {
            ElementId::volume(n)
        } else {
            ElementId::boundary(n - num_volume)
        };
        let trial_dofs = assembler.trial.element_dofs(id);
        let test_dofs = assembler.test.element_dofs(id);
        let mut matrix = DMatrix::zeros(test_dofs.len(), trial_dofs.len());
        assembler
            .assemble_element_matrix_into(id, DMatrixViewMut::from(&mut matrix))
            .map_err(|source| Error::Assembly {
                element: id,
                source: Box::new(source),
            })?;
        matrices.push(matrix);
    }
    Ok(matrices)
}

/// A linear form `f(v)` discretized over a test space.
#[derive(Debug)]
pub struct LinearForm<T: Real> {
    space: Arc<FeSpace<T>>,
    integrators: Vec<SymbolicLinearIntegrator<T>>,
    options: FormOptions,
    vector: Option<DVector<T>>,
}

impl<T: Real> LinearForm<T> {
    pub fn new(space: Arc<FeSpace<T>>) -> Self {
        Self {
            space,
            integrators: Vec::new(),
            options: FormOptions::default(),
            vector: None,
        }
    }

    pub fn with_options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    pub fn add_integrator(&mut self, integrator: SymbolicLinearIntegrator<T>) -> &mut Self {
        self.integrators.push(integrator);
        self.invalidate();
        self
    }

    pub fn space(&self) -> &Arc<FeSpace<T>> {
        &self.space
    }

    pub fn assembled(&self) -> bool {
        self.vector.is_some()
    }

    pub fn invalidate(&mut self) {
        self.vector = None;
    }

    /// The assembled vector, or `None` while the form is unassembled.
    pub fn vector(&self) -> Option<&DVector<T>> {
        self.vector.as_ref()
    }

    pub fn assemble(&mut self) -> Result<(), Error>
    where
        T: Send + Sync,
    {
        self.invalidate();

        let mesh_dimension = self.space.mesh().dimension();
        for integrator in &self.integrators {
            integrator.validate(mesh_dimension)?;
        }

        let assembler = SymbolicVectorAssembler {
            space: &self.space,
            integrators: &self.integrators,
        };

        let vector = if self.options.parallel {
            ParVectorAssembler::default().assemble_vector(&assembler)?
        } else {
            SerialVectorAssembler::default().assemble_vector(&assembler)?
        };
        self.vector = Some(vector);
        Ok(())
    }
}
