//! The error taxonomy of the assembly core.
//!
//! Solver-side failures (non-convergence, indefiniteness) are reported by
//! [`galerkin_sparse::cg`] with its own error types; everything on the assembly side of
//! the pipeline is covered by [`Error`].

use crate::coefficient::Shape;
use crate::mesh::ElementId;
use std::fmt;

/// Why an element could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidElementReason {
    /// The element index is out of range for its region class.
    OutOfRange,
    /// The element map is degenerate: its Jacobian measure vanished (below tolerance)
    /// at an evaluation point.
    DegenerateGeometry,
    /// A boundary element references vertices that do not form an entity of any
    /// volume element.
    DetachedBoundary,
}

impl fmt::Display for InvalidElementReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "element index out of range"),
            Self::DegenerateGeometry => write!(f, "degenerate element geometry"),
            Self::DetachedBoundary => {
                write!(f, "boundary element is not attached to any volume element")
            }
        }
    }
}

/// Errors produced by the mesh, space, coefficient and assembly layers.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An element id is invalid or its geometry is degenerate.
    InvalidElement {
        element: ElementId,
        reason: InvalidElementReason,
    },
    /// Operand shapes of a coefficient operation are incompatible.
    ShapeMismatch {
        operation: &'static str,
        lhs: Shape,
        rhs: Shape,
    },
    /// A differential (or other) operator is not defined for the node it was applied to.
    UnsupportedOperation {
        operation: &'static str,
        reason: String,
    },
    /// An element-level failure during global assembly, wrapping the cause.
    ///
    /// When several elements fail during a (parallel) assembly sweep, the failure with
    /// the smallest element index is reported.
    Assembly {
        element: ElementId,
        source: Box<Error>,
    },
    /// A construction option was not recognized or carries an unusable value.
    Configuration { key: String, message: String },
}

impl Error {
    pub(crate) fn unsupported(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidElement { element, reason } => {
                write!(f, "invalid element {}: {}", element, reason)
            }
            Self::ShapeMismatch { operation, lhs, rhs } => {
                write!(
                    f,
                    "shape mismatch in '{}': operand shapes {} and {} are incompatible",
                    operation, lhs, rhs
                )
            }
            Self::UnsupportedOperation { operation, reason } => {
                write!(f, "operation '{}' is not supported: {}", operation, reason)
            }
            Self::Assembly { element, source } => {
                write!(f, "assembly failed at element {}: {}", element, source)
            }
            Self::Configuration { key, message } => {
                write!(f, "configuration option '{}': {}", key, message)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Assembly { source, .. } => Some(&**source),
            _ => None,
        }
    }
}
