//! Global assembly: scattering element contributions into CSR operators and vectors.
//!
//! The sparsity pattern is built once from the DOF maps of the space pairing and shared
//! via `Arc`; assembly then only writes values. Contributions of different elements at
//! shared DOFs are summed (standard finite element assembly).
//!
//! # Parallel strategy
//!
//! [`CsrParAssembler`] uses graph coloring of elements by shared test (row) DOFs: the
//! elements of one color write to disjoint rows. Colors are processed one after
//! another; within a color the element matrices are computed concurrently on the rayon
//! pool and then scattered in ascending element order. Accumulation order is therefore
//! deterministic, so repeated assembly from unchanged inputs is reproducible (tested as
//! tolerance-equality, guaranteed as bit-equality by this strategy).
//!
//! # Failure semantics
//!
//! Element-level failures do not abort in-flight work: every launched task runs to
//! completion, failures are collected, and the failure with the smallest element index
//! is surfaced wrapped in an assembly error. The partially accumulated operator is
//! discarded by the caller (see [`crate::forms`]), so partial assembly is never
//! observable.

use crate::assembly::color::sequential_greedy_coloring;
use crate::assembly::local::{ElementMatrixAssembler, ElementVectorAssembler};
use crate::error::Error;
use crate::mesh::{ElementId, Region};
use crate::Real;
use galerkin_sparse::{CsrMatrix, CsrRowMut, SparsityPattern};
use log::debug;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};
use rayon::prelude::*;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Enumerates all elements (volume first, then boundary) of the spaces' mesh.
fn element_ids(num_volume: usize, num_boundary: usize) -> impl Iterator<Item = ElementId> {
    (0..num_volume)
        .map(ElementId::volume)
        .chain((0..num_boundary).map(ElementId::boundary))
}

fn nth_element_id(num_volume: usize, n: usize) -> ElementId {
    if n < num_volume {
        ElementId::volume(n)
    } else {
        ElementId::boundary(n - num_volume)
    }
}

/// Builds the CSR sparsity pattern induced by the DOF maps of the assembler's spaces.
///
/// The pattern has one row per test DOF and one column per trial DOF, and contains
/// every coupling of DOFs sharing an element. Construction is deterministic.
pub fn assemble_pattern<T: Real>(assembler: &dyn ElementMatrixAssembler<T>) -> SparsityPattern {
    let trial = assembler.trial_space();
    let test = assembler.test_space();
    let mesh = trial.mesh();

    let mut entries = BTreeSet::new();
    for id in element_ids(
        mesh.num_elements(Region::Volume),
        mesh.num_elements(Region::Boundary),
    ) {
        for &i in test.element_dofs(id) {
            for &j in trial.element_dofs(id) {
                entries.insert((i, j));
            }
        }
    }

    let num_rows = test.ndof();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(entries.len());
    offsets.push(0);
    for (i, j) in entries {
        while i + 1 > offsets.len() {
            // New row reached; the loop form covers consecutive empty rows
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }
    while offsets.len() < num_rows + 1 {
        offsets.push(column_indices.len());
    }

    SparsityPattern::from_offsets_and_indices(num_rows, trial.ndof(), offsets, column_indices)
}

/// A serial assembler for CSR matrices.
#[derive(Debug)]
pub struct CsrAssembler<T: Real> {
    // Buffers that let repeated assembly reuse allocations
    workspace: RefCell<CsrAssemblerWorkspace<T>>,
}

impl<T: Real> Default for CsrAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(CsrAssemblerWorkspace::default()),
        }
    }
}

#[derive(Debug)]
struct CsrAssemblerWorkspace<T: Real> {
    permutation: Vec<usize>,
    element_matrix: DMatrix<T>,
}

impl<T: Real> Default for CsrAssemblerWorkspace<T> {
    fn default() -> Self {
        Self {
            permutation: Vec::new(),
            element_matrix: DMatrix::zeros(0, 0),
        }
    }
}

impl<T: Real> CsrAssembler<T> {
    pub fn assemble(
        &self,
        assembler: &dyn ElementMatrixAssembler<T>,
    ) -> Result<CsrMatrix<T>, Error> {
        let pattern = Arc::new(assemble_pattern(assembler));
        let mut matrix = CsrMatrix::zeros_from_pattern(pattern);
        self.assemble_into_csr(&mut matrix, assembler)?;
        Ok(matrix)
    }

    pub fn assemble_into_csr(
        &self,
        csr: &mut CsrMatrix<T>,
        assembler: &dyn ElementMatrixAssembler<T>,
    ) -> Result<(), Error> {
        let ws = &mut *self.workspace.borrow_mut();
        let trial = assembler.trial_space();
        let test = assembler.test_space();
        let mesh = trial.mesh();

        for id in element_ids(
            mesh.num_elements(Region::Volume),
            mesh.num_elements(Region::Boundary),
        ) {
            let trial_dofs = trial.element_dofs(id);
            let test_dofs = test.element_dofs(id);
            ws.element_matrix
                .resize_mut(test_dofs.len(), trial_dofs.len(), T::zero());

            assembler
                .assemble_element_matrix_into(id, DMatrixViewMut::from(&mut ws.element_matrix))
                .map_err(|source| Error::Assembly {
                    element: id,
                    source: Box::new(source),
                })?;

            scatter_element_matrix(
                csr,
                &ws.element_matrix,
                test_dofs,
                trial_dofs,
                &mut ws.permutation,
            );
        }

        debug!(
            "assembled {}x{} operator from {} elements",
            test.ndof(),
            trial.ndof(),
            mesh.num_elements(Region::Volume) + mesh.num_elements(Region::Boundary)
        );
        Ok(())
    }
}

/// A parallel assembler for CSR matrices relying on a graph coloring of elements.
#[derive(Debug, Default)]
pub struct CsrParAssembler;

impl CsrParAssembler {
    /// Computes the conflict-free element color groups for the assembler's spaces.
    pub fn color_elements<T: Real>(assembler: &dyn ElementMatrixAssembler<T>) -> Vec<Vec<usize>> {
        let test = assembler.test_space();
        let mesh = test.mesh();
        let num_volume = mesh.num_elements(Region::Volume);
        let total = num_volume + mesh.num_elements(Region::Boundary);

        sequential_greedy_coloring(total, |n, dofs| {
            dofs.extend_from_slice(test.element_dofs(nth_element_id(num_volume, n)));
        })
    }

    pub fn assemble<T: Real + Send + Sync>(
        &self,
        assembler: &dyn ElementMatrixAssembler<T>,
    ) -> Result<CsrMatrix<T>, Error> {
        let pattern = Arc::new(assemble_pattern(assembler));
        let mut matrix = CsrMatrix::zeros_from_pattern(pattern);
        self.assemble_into_csr(&mut matrix, assembler)?;
        Ok(matrix)
    }

    pub fn assemble_into_csr<T: Real + Send + Sync>(
        &self,
        csr: &mut CsrMatrix<T>,
        assembler: &dyn ElementMatrixAssembler<T>,
    ) -> Result<(), Error> {
        let trial = assembler.trial_space();
        let test = assembler.test_space();
        let mesh = trial.mesh();
        let num_volume = mesh.num_elements(Region::Volume);

        let colors = Self::color_elements(assembler);
        debug!("parallel assembly over {} element colors", colors.len());

        // The first failure by element order wins; later colors still run so that all
        // failures are collected before reporting
        let mut first_failure: Option<(usize, Error)> = None;
        let mut permutation = Vec::new();

        for color in &colors {
            let staged: Vec<(usize, Result<DMatrix<T>, Error>)> = color
                .par_iter()
                .map(|&n| {
                    let id = nth_element_id(num_volume, n);
                    let trial_dofs = trial.element_dofs(id);
                    let test_dofs = test.element_dofs(id);
                    let mut element_matrix =
                        DMatrix::zeros(test_dofs.len(), trial_dofs.len());
                    let result = assembler
                        .assemble_element_matrix_into(
                            id,
                            DMatrixViewMut::from(&mut element_matrix),
                        )
                        .map(|()| element_matrix);
                    (n, result)
                })
                .collect();

            for (n, result) in staged {
                match result {
                    Ok(element_matrix) => {
                        if first_failure.is_none() {
                            let id = nth_element_id(num_volume, n);
                            scatter_element_matrix(
                                csr,
                                &element_matrix,
                                test.element_dofs(id),
                                trial.element_dofs(id),
                                &mut permutation,
                            );
                        }
                    }
                    Err(source) => {
                        if first_failure.as_ref().map(|(m, _)| n < *m).unwrap_or(true) {
                            first_failure = Some((n, source));
                        }
                    }
                }
            }
        }

        match first_failure {
            Some((n, source)) => Err(Error::Assembly {
                element: nth_element_id(num_volume, n),
                source: Box::new(source),
            }),
            None => Ok(()),
        }
    }
}

/// A serial assembler for global vectors.
#[derive(Debug)]
pub struct SerialVectorAssembler<T: Real> {
    workspace: RefCell<DVector<T>>,
}

impl<T: Real> Default for SerialVectorAssembler<T> {
    fn default() -> Self {
        Self {
            workspace: RefCell::new(DVector::zeros(0)),
        }
    }
}

impl<T: Real> SerialVectorAssembler<T> {
    pub fn assemble_vector(
        &self,
        assembler: &dyn ElementVectorAssembler<T>,
    ) -> Result<DVector<T>, Error> {
        let space = assembler.space();
        let mesh = space.mesh();
        let mut vector = DVector::zeros(space.ndof());
        let local = &mut *self.workspace.borrow_mut();

        for id in element_ids(
            mesh.num_elements(Region::Volume),
            mesh.num_elements(Region::Boundary),
        ) {
            let dofs = space.element_dofs(id);
            local.resize_vertically_mut(dofs.len(), T::zero());
            assembler
                .assemble_element_vector_into(id, DVectorViewMut::from(&mut *local))
                .map_err(|source| Error::Assembly {
                    element: id,
                    source: Box::new(source),
                })?;
            for (i, &dof) in dofs.iter().enumerate() {
                vector[dof] += local[i];
            }
        }
        Ok(vector)
    }
}

/// A parallel assembler for global vectors.
///
/// Element vectors are computed concurrently and scattered serially in ascending
/// element order, so accumulation order is deterministic.
#[derive(Debug, Default)]
pub struct ParVectorAssembler;

impl ParVectorAssembler {
    pub fn assemble_vector<T: Real + Send + Sync>(
        &self,
        assembler: &dyn ElementVectorAssembler<T>,
    ) -> Result<DVector<T>, Error> {
        let space = assembler.space();
        let mesh = space.mesh();
        let num_volume = mesh.num_elements(Region::Volume);
        let total = num_volume + mesh.num_elements(Region::Boundary);

        let staged: Vec<Result<DVector<T>, Error>> = (0..total)
            .into_par_iter()
            .map(|n| {
                let id = nth_element_id(num_volume, n);
                let dofs = space.element_dofs(id);
                let mut local = DVector::zeros(dofs.len());
                assembler
                    .assemble_element_vector_into(id, DVectorViewMut::from(&mut local))
                    .map(|()| local)
            })
            .collect();

        let mut vector = DVector::zeros(space.ndof());
        let mut first_failure: Option<(usize, Error)> = None;
        for (n, result) in staged.into_iter().enumerate() {
            match result {
                Ok(local) => {
                    if first_failure.is_none() {
                        let dofs = space.element_dofs(nth_element_id(num_volume, n));
                        for (i, &dof) in dofs.iter().enumerate() {
                            vector[dof] += local[i];
                        }
                    }
                }
                Err(source) => {
                    if first_failure.is_none() {
                        first_failure = Some((n, source));
                    }
                }
            }
        }

        match first_failure {
            Some((n, source)) => Err(Error::Assembly {
                element: nth_element_id(num_volume, n),
                source: Box::new(source),
            }),
            None => Ok(vector),
        }
    }
}

/// Adds one element matrix into the CSR matrix at the given global rows/columns.
fn scatter_element_matrix<T: Real>(
    csr: &mut CsrMatrix<T>,
    element_matrix: &DMatrix<T>,
    test_dofs: &[usize],
    trial_dofs: &[usize],
    permutation: &mut Vec<usize>,
) {
    // Traverse columns in ascending global order so that each CSR row is merged in a
    // single forward sweep
    permutation.clear();
    permutation.extend(0..trial_dofs.len());
    permutation.sort_unstable_by_key(|&local| trial_dofs[local]);

    for (local_row, &global_row) in test_dofs.iter().enumerate() {
        let mut row = csr.row_mut(global_row);
        add_element_row_to_csr_row(&mut row, element_matrix, local_row, trial_dofs, permutation);
    }
}

/// Adds a row of a local element matrix to the given CSR row.
///
/// `sorted_permutation` holds the local column indices ordered by ascending global
/// column index, which allows a single linear merge against the CSR row's sorted
/// column indices.
fn add_element_row_to_csr_row<T: Real>(
    row: &mut CsrRowMut<T>,
    element_matrix: &DMatrix<T>,
    local_row: usize,
    trial_dofs: &[usize],
    sorted_permutation: &[usize],
) {
    let (column_indices, values) = row.columns_and_values_mut();
    let mut csr_iter = column_indices.iter().copied().enumerate();

    for &local_col in sorted_permutation {
        let global_col = trial_dofs[local_col];
        let (position, _) = csr_iter
            .find(|&(_, csr_col)| csr_col == global_col)
            .expect("the sparsity pattern contains every element coupling");
        values[position] += element_matrix[(local_row, local_col)];
    }
}

/// Applies homogeneous Dirichlet conditions to a square CSR operator: zeroes the
/// constrained rows and columns symmetrically and puts a representative scale on the
/// diagonal so the conditioning of the remaining system is preserved.
pub fn apply_dirichlet_csr<T: Real>(matrix: &mut CsrMatrix<T>, dofs: &[usize]) {
    assert_eq!(matrix.nrows(), matrix.ncols(), "operator must be square");

    // Take the first nonzero diagonal entry as a representative scale
    let scale = matrix
        .diag_iter()
        .find(|d| *d != T::zero())
        .map(|d| d.abs())
        .unwrap_or_else(T::one);

    // Zeroing columns naively would visit the whole matrix; exploiting symmetry of the
    // pattern, it suffices to revisit the rows whose columns were touched
    let mut is_dirichlet = vec![false; matrix.nrows()];
    for &dof in dofs {
        is_dirichlet[dof] = true;
    }
    let mut rows_to_visit = vec![false; matrix.nrows()];

    for &dof in dofs {
        let mut row = matrix.row_mut(dof);
        let (columns, values) = row.columns_and_values_mut();
        for (&column, value) in columns.iter().zip(values.iter_mut()) {
            if column == dof {
                *value = scale;
            } else {
                *value = T::zero();
                rows_to_visit[column] = true;
            }
        }
    }

    for row_index in 0..matrix.nrows() {
        if rows_to_visit[row_index] && !is_dirichlet[row_index] {
            let mut row = matrix.row_mut(row_index);
            let (columns, values) = row.columns_and_values_mut();
            for (&column, value) in columns.iter().zip(values.iter_mut()) {
                if is_dirichlet[column] {
                    *value = T::zero();
                }
            }
        }
    }
}

/// Zeroes the constrained entries of a right-hand-side vector.
pub fn apply_dirichlet_rhs<'a, T: Real>(rhs: impl Into<DVectorViewMut<'a, T>>, dofs: &[usize]) {
    let mut rhs = rhs.into();
    for &dof in dofs {
        rhs[dof] = T::zero();
    }
}
