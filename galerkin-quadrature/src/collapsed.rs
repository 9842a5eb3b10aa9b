//! Rules for simplices and the pyramid from collapsed-coordinate (Duffy) transformations.
//!
//! The reference square/cube is mapped onto the target cell by collapsing one or more
//! coordinates. The Jacobian of the collapse is a polynomial which is absorbed into the
//! weights, so exactness is retained provided the univariate rules account for the extra
//! polynomial degree of the Jacobian factor.

use crate::univariate::gauss_unit;
use crate::{gauss_points_for_strength, Rule};

/// A rule of the given strength for the reference triangle.
///
/// Constructed from the map `(u, v) -> (u, v (1 - u))` of the unit square onto the
/// triangle, whose Jacobian is `1 - u`. A monomial `x^a y^b` of total degree `d = a + b`
/// pulls back to a polynomial of degree at most `d + 1` per direction, hence the
/// univariate rules are chosen with strength `d + 1`.
pub fn triangle(strength: usize) -> Rule<2> {
    let n = gauss_points_for_strength(strength + 1);
    let (weights1d, points1d) = gauss_unit(n);

    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);

    for (&wu, &[u]) in weights1d.iter().zip(&points1d) {
        for (&wv, &[v]) in weights1d.iter().zip(&points1d) {
            weights.push(wu * wv * (1.0 - u));
            points.push([u, v * (1.0 - u)]);
        }
    }

    (weights, points)
}

/// A rule of the given strength for the reference tetrahedron.
///
/// Constructed from the map `(u, v, w) -> (u, v (1 - u), w (1 - u)(1 - v))` of the unit
/// cube onto the tetrahedron, whose Jacobian is `(1 - u)^2 (1 - v)`. The pullback of a
/// total-degree-`d` monomial has degree at most `d + 2` per direction.
pub fn tetrahedron(strength: usize) -> Rule<3> {
    let n = gauss_points_for_strength(strength + 2);
    let (weights1d, points1d) = gauss_unit(n);

    let mut weights = Vec::with_capacity(n * n * n);
    let mut points = Vec::with_capacity(n * n * n);

    for (&wu, &[u]) in weights1d.iter().zip(&points1d) {
        for (&wv, &[v]) in weights1d.iter().zip(&points1d) {
            for (&ww, &[w]) in weights1d.iter().zip(&points1d) {
                let jacobian = (1.0 - u) * (1.0 - u) * (1.0 - v);
                weights.push(wu * wv * ww * jacobian);
                points.push([u, v * (1.0 - u), w * (1.0 - u) * (1.0 - v)]);
            }
        }
    }

    (weights, points)
}

/// A rule of the given strength for the reference pyramid.
///
/// Constructed from the map `(u, v, w) -> (u (1 - w), v (1 - w), w)` of the unit cube
/// onto the pyramid with base `[0, 1]^2` and apex `(0, 0, 1)`. The Jacobian is
/// `(1 - w)^2`, so the `w`-direction rule is chosen with strength `d + 2`.
pub fn pyramid(strength: usize) -> Rule<3> {
    let n_base = gauss_points_for_strength(strength);
    let n_apex = gauss_points_for_strength(strength + 2);
    let (base_weights, base_points) = gauss_unit(n_base);
    let (apex_weights, apex_points) = gauss_unit(n_apex);

    let mut weights = Vec::with_capacity(n_base * n_base * n_apex);
    let mut points = Vec::with_capacity(weights.capacity());

    for (&wu, &[u]) in base_weights.iter().zip(&base_points) {
        for (&wv, &[v]) in base_weights.iter().zip(&base_points) {
            for (&ww, &[w]) in apex_weights.iter().zip(&apex_points) {
                let jacobian = (1.0 - w) * (1.0 - w);
                weights.push(wu * wv * ww * jacobian);
                points.push([u * (1.0 - w), v * (1.0 - w), w]);
            }
        }
    }

    (weights, points)
}
