//! Assembly of global sparse operators and vectors from per-element contributions.
//!
//! The module is split the same way the pipeline is: [`local`] reduces a symbolic
//! integrand to one element's dense matrix or vector by quadrature, [`global`] scatters
//! element contributions into CSR matrices and global vectors (serially or across the
//! rayon pool), [`color`] computes the conflict-free element groups that parallel
//! assembly iterates, and [`buffers`] holds the reusable per-thread scratch that keeps
//! per-element allocation out of the hot loop.

pub mod buffers;
pub mod color;
pub mod global;
pub mod local;
