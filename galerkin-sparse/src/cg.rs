//! A preconditioned conjugate-gradient solver.
//!
//! The solver only interacts with the system through the [`LinearOperator`] abstraction,
//! whose matrix-vector product is the single primitive required by the Krylov recurrence.
//! Both the operator and the (optional) preconditioner must be symmetric positive-definite;
//! this is a caller contract which is not verified beyond sign checks of the recurrence
//! scalars.
//!
//! The implementation is the classical three-term recurrence in double precision (or any
//! other real scalar). No reorthogonalization is performed, so for ill-conditioned
//! operators the Krylov basis may lose orthogonality and convergence can stagnate; this is
//! a documented limitation, not a defect.

use core::fmt;
use log::debug;
use nalgebra::{
    ClosedAdd, ClosedMul, DMatrix, DVector, DVectorView, DVectorViewMut, RealField, Scalar,
};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use num::{One, Zero};
use std::error::Error;
use std::ops::{Deref, DerefMut};

use crate::CsrMatrix;

/// An abstract linear operator `y = A x`.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T: RealField + Copy> LinearOperator<T> for CsrMatrix<T> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        CsrMatrix::apply(self, y, x);
        Ok(())
    }
}

impl<T: RealField + Copy> LinearOperator<T> for DMatrix<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T> LinearOperator<T> for nalgebra_sparse::CsrMatrix<T>
where
    T: Scalar + Zero + One + ClosedMul + ClosedAdd,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

/// The identity operator, used as the default (no-op) preconditioner.
pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// A Jacobi (diagonal) preconditioner.
///
/// Applies the inverse of the operator's diagonal. For SPD operators this is itself SPD
/// and often noticeably reduces the iteration count on badly scaled systems.
#[derive(Debug, Clone)]
pub struct JacobiPreconditioner<T: Scalar> {
    inv_diag: DVector<T>,
}

impl<T: RealField + Copy> JacobiPreconditioner<T> {
    /// Builds the preconditioner from the diagonal of a CSR matrix.
    ///
    /// Returns `None` if any diagonal entry is missing from the pattern or not strictly
    /// positive, in which case the preconditioner would not be positive-definite.
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Option<Self> {
        let n = matrix.nrows();
        let mut inv_diag = DVector::zeros(n);
        for i in 0..n {
            let d = *matrix.get(i, i)?;
            if d <= T::zero() {
                return None;
            }
            inv_diag[i] = T::one() / d;
        }
        Some(Self { inv_diag })
    }
}

impl<T: RealField + Copy> LinearOperator<T> for JacobiPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error + Send + Sync>> {
        assert_eq!(x.len(), self.inv_diag.len(), "dimension mismatch");
        y.copy_from(&x);
        y.component_mul_assign(&self.inv_diag);
        Ok(())
    }
}

/// Reusable buffers for the CG recurrence.
#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct CgWorkspace<T: Scalar> {
    r: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
}

#[allow(non_snake_case)]
struct Buffers<'a, T: Scalar> {
    r: &'a mut DVector<T>,
    z: &'a mut DVector<T>,
    p: &'a mut DVector<T>,
    Ap: &'a mut DVector<T>,
}

impl<T: Scalar + Zero> Default for CgWorkspace<T> {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }
}

impl<T: Scalar + Zero> CgWorkspace<T> {
    fn prepare_buffers(&mut self, dim: usize) -> Buffers<T> {
        self.r.resize_vertically_mut(dim, T::zero());
        self.z.resize_vertically_mut(dim, T::zero());
        self.p.resize_vertically_mut(dim, T::zero());
        self.Ap.resize_vertically_mut(dim, T::zero());
        Buffers {
            r: &mut self.r,
            z: &mut self.z,
            p: &mut self.p,
            Ap: &mut self.Ap,
        }
    }
}

#[derive(Debug)]
enum OwnedOrMutRef<'a, T> {
    Owned(T),
    MutRef(&'a mut T),
}

impl<'a, T> Deref for OwnedOrMutRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

impl<'a, T> DerefMut for OwnedOrMutRef<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

/// The preconditioned conjugate-gradient solver.
///
/// Configured through a staged builder:
///
/// ```ignore
/// let output = ConjugateGradient::new()
///     .with_operator(&matrix)
///     .with_preconditioner(&precond)
///     .with_rel_tolerance(1e-10)
///     .with_max_iter(200)
///     .solve_with_guess(&b, &mut x)?;
/// ```
///
/// The stopping criterion is the relative residual `||r|| <= tol * ||b||`, evaluated on
/// the recurrence's approximate residual. Exceeding the iteration cap is reported as a
/// [`SolveErrorKind::ConvergenceFailure`] carrying the final residual norm, never as a
/// successful solve.
#[derive(Debug)]
pub struct ConjugateGradient<'a, T, A, P>
where
    T: Scalar,
{
    workspace: OwnedOrMutRef<'a, CgWorkspace<T>>,
    operator: A,
    preconditioner: P,
    rel_tolerance: T,
    max_iter: Option<usize>,
}

impl<'a, T: RealField + Copy> ConjugateGradient<'a, T, (), IdentityOperator> {
    pub fn new() -> Self {
        Self {
            workspace: OwnedOrMutRef::Owned(CgWorkspace::default()),
            operator: (),
            preconditioner: IdentityOperator,
            rel_tolerance: T::default_epsilon().sqrt(),
            max_iter: None,
        }
    }

    /// Uses an externally owned workspace, so that repeated solves do not reallocate.
    pub fn with_workspace(workspace: &'a mut CgWorkspace<T>) -> Self {
        Self {
            workspace: OwnedOrMutRef::MutRef(workspace),
            operator: (),
            preconditioner: IdentityOperator,
            rel_tolerance: T::default_epsilon().sqrt(),
            max_iter: None,
        }
    }
}

impl<'a, T: RealField + Copy> Default for ConjugateGradient<'a, T, (), IdentityOperator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Scalar, P> ConjugateGradient<'a, T, (), P> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<'a, T, A, P> {
        ConjugateGradient {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            rel_tolerance: self.rel_tolerance,
            max_iter: self.max_iter,
        }
    }
}

impl<'a, T: Scalar, A, P> ConjugateGradient<'a, T, A, P> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<'a, T, A, P2> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            rel_tolerance: self.rel_tolerance,
            max_iter: self.max_iter,
        }
    }

    pub fn with_rel_tolerance(self, rel_tolerance: T) -> Self {
        Self { rel_tolerance, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

/// The reason a CG solve failed.
#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind<T> {
    OperatorError(Box<dyn Error + Send + Sync>),
    PreconditionerError(Box<dyn Error + Send + Sync>),
    /// The recurrence encountered `p^T A p <= 0`, contradicting positive-definiteness.
    IndefiniteOperator,
    /// The recurrence encountered `z^T r <= 0`, contradicting positive-definiteness
    /// of the preconditioner.
    IndefinitePreconditioner,
    /// The iteration cap was reached before the residual tolerance.
    ConvergenceFailure { max_iter: usize, residual: T },
}

impl<T: fmt::Display> fmt::Display for SolveErrorKind<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "error applying operator: {}", err)
            }
            Self::PreconditionerError(err) => {
                write!(f, "error applying preconditioner: {}", err)
            }
            Self::IndefiniteOperator => write!(f, "operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "preconditioner appears to be indefinite"),
            Self::ConvergenceFailure { max_iter, residual } => {
                write!(
                    f,
                    "no convergence within {} iterations (residual norm {})",
                    max_iter, residual
                )
            }
        }
    }
}

/// A failed CG solve, carrying the partial output for diagnostics.
#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError<T> {
    pub output: CgOutput,
    pub kind: SolveErrorKind<T>,
}

impl<T> SolveError<T> {
    fn new(output: CgOutput, kind: SolveErrorKind<T>) -> Self {
        Self { output, kind }
    }
}

impl<T: fmt::Display> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CG solve failed after {} iterations: {}",
            self.output.num_iterations, self.kind
        )
    }
}

impl<T: fmt::Debug + fmt::Display> std::error::Error for SolveError<T> {}

/// Summary of a CG solve.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct CgOutput {
    /// Number of iterations, i.e. the number of updates applied to the solution vector.
    pub num_iterations: usize,
}

/// y = Ax
fn apply_operator<'a, T, A>(
    y: impl Into<DVectorViewMut<'a, T>>,
    a: &'a A,
    x: impl Into<DVectorView<'a, T>>,
) -> Result<(), Box<dyn Error + Send + Sync>>
where
    T: Scalar,
    A: LinearOperator<T>,
{
    a.apply(y.into(), x.into())
}

impl<'a, T, A, P> ConjugateGradient<'a, T, A, P>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
{
    /// Solves `A x = b` starting from the zero vector, returning the solution.
    pub fn solve<'b>(&mut self, b: impl Into<DVectorView<'b, T>>) -> Result<DVector<T>, SolveError<T>> {
        let b = b.into();
        let mut x = DVector::zeros(b.len());
        self.solve_with_guess_(b, DVectorViewMut::from(&mut x))?;
        Ok(x)
    }

    /// Solves `A x = b` with `x` as the initial guess, overwriting `x` with the solution.
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<CgOutput, SolveError<T>> {
        self.solve_with_guess_(b.into(), x.into())
    }

    #[allow(non_snake_case)]
    fn solve_with_guess_(
        &mut self,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
    ) -> Result<CgOutput, SolveError<T>> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len());

        let mut output = CgOutput { num_iterations: 0 };

        let Buffers { r, z, p, Ap } = self.workspace.prepare_buffers(x.len());

        // r = b - Ax
        if let Err(err) = apply_operator(&mut *r, &self.operator, &x) {
            return Err(SolveError::new(output, OperatorError(err)));
        }
        r.zip_apply(&b, |Ax_i, b_i| *Ax_i = b_i - *Ax_i);

        // z = Pr
        if let Err(err) = apply_operator(&mut *z, &self.preconditioner, &*r) {
            return Err(SolveError::new(output, PreconditionerError(err)));
        }

        // p = z
        p.copy_from(z);

        let mut zTr = z.dot(r);
        let mut pAp;

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            return Ok(output);
        }

        loop {
            let r_norm = r.norm();
            if r_norm <= self.rel_tolerance * b_norm {
                break;
            }
            if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(SolveError::new(
                        output,
                        ConvergenceFailure {
                            max_iter,
                            residual: r_norm,
                        },
                    ));
                }
            }

            // Ap = A * p
            if let Err(err) = apply_operator(&mut *Ap, &self.operator, &*p) {
                return Err(SolveError::new(output, OperatorError(err)));
            }
            pAp = p.dot(Ap);

            if pAp <= T::zero() {
                return Err(SolveError::new(output, IndefiniteOperator));
            }
            if zTr <= T::zero() {
                return Err(SolveError::new(output, IndefinitePreconditioner));
            }

            let alpha = zTr / pAp;
            // x <- x + alpha * p
            x.zip_apply(&*p, |x_i, p_i| *x_i += alpha * p_i);
            // r <- r - alpha * Ap
            r.zip_apply(&*Ap, |r_i, Ap_i| *r_i -= alpha * Ap_i);

            // Iterations count updates to the x vector
            output.num_iterations += 1;

            // z <- P r
            if let Err(err) = apply_operator(&mut *z, &self.preconditioner, &*r) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            let zTr_next = z.dot(r);
            let beta = zTr_next / zTr;

            // p <- z + beta * p
            p.zip_apply(&*z, |p_i, z_i| *p_i = z_i + beta * *p_i);

            zTr = zTr_next;
        }

        debug!(
            "CG converged after {} iterations (rel tolerance {:?})",
            output.num_iterations, self.rel_tolerance
        );

        Ok(output)
    }
}
