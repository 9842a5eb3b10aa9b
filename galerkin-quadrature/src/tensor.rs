//! Rules formed by tensor product formulations.
//!
//! Quadrilateral and hexahedron rules are tensor products of univariate rules, and the
//! prism rule is the product of a triangle rule with a univariate rule.

use crate::univariate::gauss_unit;
use crate::{collapsed, gauss_points_for_strength, Rule};

/// A Gauss rule for the reference quadrilateral with the given number of points per dimension.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    let n = num_points_per_dim;
    let (weights1d, points1d) = gauss_unit(n);
    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    for (&wx, &[x]) in weights1d.iter().zip(&points1d) {
        for (&wy, &[y]) in weights1d.iter().zip(&points1d) {
            weights.push(wx * wy);
            points.push([x, y]);
        }
    }

    (weights, points)
}

/// A Gauss rule for the reference hexahedron with the given number of points per dimension.
pub fn hexahedron_gauss(num_points_per_dim: usize) -> Rule<3> {
    let n = num_points_per_dim;
    let (weights1d, points1d) = gauss_unit(n);
    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);

    for (&wx, &[x]) in weights1d.iter().zip(&points1d) {
        for (&wy, &[y]) in weights1d.iter().zip(&points1d) {
            for (&wz, &[z]) in weights1d.iter().zip(&points1d) {
                weights.push(wx * wy * wz);
                points.push([x, y, z]);
            }
        }
    }

    (weights, points)
}

/// A rule of the given strength for the reference prism.
///
/// The rule is the product of a triangle rule in the `(x, y)` plane with a univariate
/// rule along `z`.
pub fn prism_gauss(strength: usize) -> Rule<3> {
    let (tri_weights, tri_points) = collapsed::triangle(strength);
    let (seg_weights, seg_points) = gauss_unit(gauss_points_for_strength(strength));

    let mut weights = Vec::with_capacity(tri_weights.len() * seg_weights.len());
    let mut points = Vec::with_capacity(weights.capacity());

    for (&wt, &[x, y]) in tri_weights.iter().zip(&tri_points) {
        for (&wz, &[z]) in seg_weights.iter().zip(&seg_points) {
            weights.push(wt * wz);
            points.push([x, y, z]);
        }
    }

    (weights, points)
}
