//! Quadrature rules for finite element reference cells.
//!
//! All rules are produced for the *unit* reference cells used throughout `galerkin`:
//!
//! - segment: the interval `[0, 1]`
//! - triangle: vertices `(0, 0)`, `(1, 0)`, `(0, 1)`
//! - quadrilateral: the square `[0, 1]^2`
//! - tetrahedron: vertices `(0, 0, 0)`, `(1, 0, 0)`, `(0, 1, 0)`, `(0, 0, 1)`
//! - hexahedron: the cube `[0, 1]^3`
//! - prism: triangle cross `[0, 1]`, vertices
//!   `(0, 0, 0)`, `(1, 0, 0)`, `(0, 1, 0)`, `(0, 0, 1)`, `(1, 0, 1)`, `(0, 1, 1)`
//! - pyramid: base `[0, 1]^2 x {0}` with apex `(0, 0, 1)`
//!
//! Every constructor takes a *strength*: the rule integrates all polynomials whose total
//! degree does not exceed the strength exactly (up to floating-point rounding). Rules are
//! built from univariate Gauss-Legendre rules by tensor products ([`tensor`]) and by
//! collapsed-coordinate (Duffy-type) transformations ([`collapsed`]), so arbitrary strengths
//! are available for every cell.
//!
//! The crate is `f64`-only and free of dependencies so that it can be used independently
//! of `galerkin`.

pub mod collapsed;
pub mod tensor;
pub mod univariate;

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A D-dimensional rule, represented as weights and points.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// A three-dimensional quadrature rule.
pub type Rule3d = Rule<3>;

/// The number of Gauss points needed for a univariate rule of the given polynomial strength.
///
/// An `n`-point Gauss rule is exact for polynomials of degree `2n - 1`.
pub(crate) fn gauss_points_for_strength(strength: usize) -> usize {
    strength / 2 + 1
}

/// A rule of the given strength for the reference segment `[0, 1]`.
pub fn segment(strength: usize) -> Rule1d {
    univariate::gauss_unit(gauss_points_for_strength(strength))
}

/// A rule of the given strength for the reference triangle.
pub fn triangle(strength: usize) -> Rule2d {
    collapsed::triangle(strength)
}

/// A rule of the given strength for the reference quadrilateral.
pub fn quadrilateral(strength: usize) -> Rule2d {
    tensor::quadrilateral_gauss(gauss_points_for_strength(strength))
}

/// A rule of the given strength for the reference tetrahedron.
pub fn tetrahedron(strength: usize) -> Rule3d {
    collapsed::tetrahedron(strength)
}

/// A rule of the given strength for the reference hexahedron.
pub fn hexahedron(strength: usize) -> Rule3d {
    tensor::hexahedron_gauss(gauss_points_for_strength(strength))
}

/// A rule of the given strength for the reference prism.
pub fn prism(strength: usize) -> Rule3d {
    tensor::prism_gauss(strength)
}

/// A rule of the given strength for the reference pyramid.
pub fn pyramid(strength: usize) -> Rule3d {
    collapsed::pyramid(strength)
}
