//! Sparse linear algebra for the `galerkin` finite element library.
//!
//! The crate provides compressed sparse row storage with a shared, immutable sparsity
//! pattern ([`SparsityPattern`], [`CsrMatrix`]), the [`LinearOperator`](cg::LinearOperator)
//! abstraction whose matrix-vector product is the only primitive required by iterative
//! solvers, and a preconditioned conjugate-gradient solver ([`cg::ConjugateGradient`]).
//!
//! The design separates the *pattern* of a matrix from its *values*: assembly fixes the
//! pattern once for a given pairing of function spaces, and subsequent reassembly only
//! replaces values. Patterns are shared through `Arc` so that matrices with identical
//! structure (e.g. reassembled operators) do not duplicate index data.

pub mod cg;

mod sparse;

pub use sparse::{CsrMatrix, CsrRow, CsrRowMut, SparsityPattern};
