use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use num::Zero;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Mul;
use std::sync::Arc;

/// The sparsity structure of a CSR matrix.
///
/// The pattern is immutable once constructed and is shared between matrices through `Arc`,
/// so that reassembling an operator with unchanged structure only replaces values.
///
/// Invariants: offsets are non-decreasing with `offsets[0] == 0` and
/// `offsets[nrows] == nnz`, and the column indices of every row are sorted and free of
/// duplicates. The constructor enforces these invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparsityPattern {
    row_offsets: Vec<usize>,
    column_indices: Vec<usize>,
    ncols: usize,
}

impl SparsityPattern {
    /// An empty pattern with the given dimensions.
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            row_offsets: vec![0; nrows + 1],
            column_indices: Vec::new(),
            ncols,
        }
    }

    /// Constructs a pattern from raw CSR offset and index data.
    ///
    /// # Panics
    ///
    /// Panics if the offsets are not monotone, do not match the index array length,
    /// or if any row contains unsorted, duplicate or out-of-bounds column indices.
    pub fn from_offsets_and_indices(
        nrows: usize,
        ncols: usize,
        row_offsets: Vec<usize>,
        column_indices: Vec<usize>,
    ) -> Self {
        assert_eq!(row_offsets.len(), nrows + 1, "offset array length mismatch");
        assert_eq!(row_offsets[0], 0, "first offset must be zero");
        assert_eq!(
            *row_offsets.last().unwrap(),
            column_indices.len(),
            "last offset must equal the number of indices"
        );
        for row in 0..nrows {
            let (begin, end) = (row_offsets[row], row_offsets[row + 1]);
            assert!(begin <= end, "offsets must be non-decreasing");
            let indices = &column_indices[begin..end];
            for window in indices.windows(2) {
                assert!(window[0] < window[1], "column indices must be sorted and unique");
            }
            if let Some(&last) = indices.last() {
                assert!(last < ncols, "column index out of bounds");
            }
        }
        Self {
            row_offsets,
            column_indices,
            ncols,
        }
    }

    pub fn nrows(&self) -> usize {
        self.row_offsets.len() - 1
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.column_indices.len()
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn column_indices(&self) -> &[usize] {
        &self.column_indices
    }

    /// The column indices of the given row.
    pub fn row(&self, row: usize) -> &[usize] {
        let begin = self.row_offsets[row];
        let end = self.row_offsets[row + 1];
        &self.column_indices[begin..end]
    }
}

/// A CSR matrix whose sparsity pattern is shared and immutable.
///
/// Values can only be replaced wholesale (`fill`, reassembly through row views); the
/// structure can not be patched after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix<T> {
    pattern: Arc<SparsityPattern>,
    values: Vec<T>,
}

/// A view of a single CSR row.
#[derive(Debug)]
pub struct CsrRow<'a, T> {
    column_indices: &'a [usize],
    values: &'a [T],
}

/// A mutable view of a single CSR row.
#[derive(Debug)]
pub struct CsrRowMut<'a, T> {
    column_indices: &'a [usize],
    values: &'a mut [T],
}

impl<T: Scalar + Zero> CsrMatrix<T> {
    /// A matrix with the given pattern and all values zero.
    pub fn zeros_from_pattern(pattern: Arc<SparsityPattern>) -> Self {
        let nnz = pattern.nnz();
        Self {
            pattern,
            values: vec![T::zero(); nnz],
        }
    }

    /// Sets every stored value to zero, retaining the pattern.
    pub fn fill_zero(&mut self) {
        self.values.fill(T::zero());
    }
}

impl<T: Scalar> CsrMatrix<T> {
    /// A matrix from a pattern and a value array of matching length.
    ///
    /// # Panics
    ///
    /// Panics if the number of values differs from the number of explicitly stored
    /// entries of the pattern.
    pub fn from_pattern_and_values(pattern: Arc<SparsityPattern>, values: Vec<T>) -> Self {
        assert_eq!(pattern.nnz(), values.len(), "value array length mismatch");
        Self { pattern, values }
    }

    pub fn nrows(&self) -> usize {
        self.pattern.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.pattern.ncols()
    }

    pub fn nnz(&self) -> usize {
        self.pattern.nnz()
    }

    pub fn pattern(&self) -> &Arc<SparsityPattern> {
        &self.pattern
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn row(&self, row: usize) -> CsrRow<T> {
        let begin = self.pattern.row_offsets()[row];
        let end = self.pattern.row_offsets()[row + 1];
        CsrRow {
            column_indices: &self.pattern.column_indices()[begin..end],
            values: &self.values[begin..end],
        }
    }

    pub fn row_mut(&mut self, row: usize) -> CsrRowMut<T> {
        let begin = self.pattern.row_offsets()[row];
        let end = self.pattern.row_offsets()[row + 1];
        CsrRowMut {
            column_indices: &self.pattern.column_indices()[begin..end],
            values: &mut self.values[begin..end],
        }
    }

    /// The explicitly stored entry at `(row, col)`, if present in the pattern.
    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        let row = self.row(row);
        let local = row.column_indices.binary_search(&col).ok()?;
        Some(&row.values[local])
    }

    /// Iterates over the diagonal entries stored in the pattern.
    ///
    /// Rows whose diagonal entry is not part of the pattern are skipped.
    pub fn diag_iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.nrows()).filter_map(move |i| self.get(i, i).cloned())
    }
}

impl<T: RealField + Copy> CsrMatrix<T> {
    /// Converts the matrix to dense storage.
    pub fn to_dense(&self) -> DMatrix<T> {
        let mut dense = DMatrix::zeros(self.nrows(), self.ncols());
        for i in 0..self.nrows() {
            let row = self.row(i);
            for (&j, &v) in row.column_indices.iter().zip(row.values) {
                dense[(i, j)] = v;
            }
        }
        dense
    }

    /// Computes `y = A x`.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions of `x` or `y` are incompatible with the matrix.
    pub fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) {
        assert_eq!(x.len(), self.ncols(), "x dimension mismatch");
        assert_eq!(y.len(), self.nrows(), "y dimension mismatch");
        for i in 0..self.nrows() {
            y[i] = self.row_dot(i, &x);
        }
    }

    /// Computes `y = A x` with rows distributed across the rayon thread pool.
    ///
    /// Rows are disjoint, so each row sum is accumulated by exactly one task and the
    /// result is identical to the serial product.
    pub fn par_apply(&self, y: &mut DVector<T>, x: DVectorView<T>)
    where
        T: Send + Sync,
    {
        assert_eq!(x.len(), self.ncols(), "x dimension mismatch");
        assert_eq!(y.len(), self.nrows(), "y dimension mismatch");
        let x = &x;
        y.as_mut_slice()
            .par_iter_mut()
            .with_min_len(128)
            .enumerate()
            .for_each(|(i, y_i)| {
                *y_i = self.row_dot(i, x);
            });
    }

    fn row_dot(&self, i: usize, x: &DVectorView<T>) -> T {
        let row = self.row(i);
        let mut sum = T::zero();
        for (&j, &v) in row.column_indices.iter().zip(row.values) {
            sum += v * x[j];
        }
        sum
    }

    /// Converts to a `nalgebra-sparse` CSR matrix.
    pub fn to_nalgebra_csr(&self) -> nalgebra_sparse::CsrMatrix<T> {
        nalgebra_sparse::CsrMatrix::try_from_csr_data(
            self.nrows(),
            self.ncols(),
            self.pattern.row_offsets().to_vec(),
            self.pattern.column_indices().to_vec(),
            self.values.clone(),
        )
        .expect("pattern invariants guarantee valid CSR data")
    }
}

impl<'a, T> CsrRow<'a, T> {
    pub fn column_indices(&self) -> &'a [usize] {
        self.column_indices
    }

    pub fn values(&self) -> &'a [T] {
        self.values
    }

    pub fn nnz(&self) -> usize {
        self.column_indices.len()
    }
}

impl<'a, T> CsrRowMut<'a, T> {
    pub fn columns_and_values_mut(&mut self) -> (&[usize], &mut [T]) {
        (self.column_indices, self.values)
    }

    pub fn nnz(&self) -> usize {
        self.column_indices.len()
    }
}

impl<T: RealField + Copy> CsrMatrix<T> {
    /// Scales every stored value in place.
    pub fn scale_mut(&mut self, factor: T) {
        for value in &mut self.values {
            *value *= factor;
        }
    }

    /// The sum of two matrices sharing the same sparsity pattern.
    ///
    /// # Panics
    ///
    /// Panics if the patterns differ. Summing operators with different patterns would
    /// require building a new pattern, which assembly deliberately avoids; assemble
    /// into a common pattern instead.
    pub fn add_same_pattern(&self, other: &CsrMatrix<T>) -> CsrMatrix<T> {
        assert!(
            Arc::ptr_eq(&self.pattern, &other.pattern) || self.pattern == other.pattern,
            "matrix addition requires identical sparsity patterns"
        );
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(&a, &b)| a + b)
            .collect();
        CsrMatrix::from_pattern_and_values(Arc::clone(&self.pattern), values)
    }
}

impl<'a, T: RealField + Copy> Mul<&'a DVector<T>> for &'a CsrMatrix<T> {
    type Output = DVector<T>;

    fn mul(self, x: &'a DVector<T>) -> DVector<T> {
        let mut y = DVector::zeros(self.nrows());
        self.apply(DVectorViewMut::from(&mut y), DVectorView::from(x));
        y
    }
}
