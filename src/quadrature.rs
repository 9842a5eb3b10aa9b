//! Quadrature rule selection for the reference cells.
//!
//! The raw `f64` rules come from the `galerkin-quadrature` crate; this module converts
//! them to the working scalar type and dispatches on the geometry type.

use crate::mesh::GeometryType;
use crate::Real;
use nalgebra::Point3;

/// A quadrature rule: weights and reference points (padded to 3D).
pub type QuadratureRule<T> = (Vec<T>, Vec<Point3<T>>);

/// The rule of the given polynomial strength for a reference cell.
///
/// The rule integrates all polynomials of total degree up to `strength` exactly on the
/// reference cell of the geometry type.
pub fn reference_rule<T: Real>(geometry: GeometryType, strength: usize) -> QuadratureRule<T> {
    match geometry {
        GeometryType::Segment => convert_rule_1d(galerkin_quadrature::segment(strength)),
        GeometryType::Triangle => convert_rule_2d(galerkin_quadrature::triangle(strength)),
        GeometryType::Quadrilateral => {
            convert_rule_2d(galerkin_quadrature::quadrilateral(strength))
        }
        GeometryType::Tetrahedron => convert_rule_3d(galerkin_quadrature::tetrahedron(strength)),
        GeometryType::Hexahedron => convert_rule_3d(galerkin_quadrature::hexahedron(strength)),
        GeometryType::Prism => convert_rule_3d(galerkin_quadrature::prism(strength)),
        GeometryType::Pyramid => convert_rule_3d(galerkin_quadrature::pyramid(strength)),
    }
}

fn convert_rule_1d<T: Real>(rule: galerkin_quadrature::Rule<1>) -> QuadratureRule<T> {
    let (weights, points) = rule;
    let weights = weights.into_iter().map(nalgebra::convert).collect();
    let points = points
        .into_iter()
        .map(|[x]| Point3::new(nalgebra::convert(x), T::zero(), T::zero()))
        .collect();
    (weights, points)
}

fn convert_rule_2d<T: Real>(rule: galerkin_quadrature::Rule<2>) -> QuadratureRule<T> {
    let (weights, points) = rule;
    let weights = weights.into_iter().map(nalgebra::convert).collect();
    let points = points
        .into_iter()
        .map(|[x, y]| Point3::new(nalgebra::convert(x), nalgebra::convert(y), T::zero()))
        .collect();
    (weights, points)
}

fn convert_rule_3d<T: Real>(rule: galerkin_quadrature::Rule<3>) -> QuadratureRule<T> {
    let (weights, points) = rule;
    let weights = weights.into_iter().map(nalgebra::convert).collect();
    let points = points
        .into_iter()
        .map(|[x, y, z]| {
            Point3::new(
                nalgebra::convert(x),
                nalgebra::convert(y),
                nalgebra::convert(z),
            )
        })
        .collect();
    (weights, points)
}
