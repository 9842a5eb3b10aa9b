//! Quadrature rules for one-dimensional reference domains.

use crate::Rule;
use std::f64::consts::PI;

/// Evaluates the Legendre polynomial `P_n` and its derivative at `x`.
///
/// Uses the three-term recurrence
///   `m P_m(x) = (2m - 1) x P_{m-1}(x) - (m - 1) P_{m-2}(x)`
/// and the derivative identity
///   `P_n'(x) = n (x P_n(x) - P_{n-1}(x)) / (x^2 - 1)`,
/// which is undefined at `|x| == 1`, so this is only suitable for evaluation in the
/// open interval `(-1, 1)`.
fn legendre_value_and_derivative(n: usize, x: f64) -> (f64, f64) {
    let mut current = 1.0;
    let mut previous = 0.0;
    for m in 1..=n {
        let m = m as f64;
        let next = ((2.0 * m - 1.0) * x * current - (m - 1.0) * previous) / m;
        previous = current;
        current = next;
    }
    let derivative = (n as f64) * (x * current - previous) / (x * x - 1.0);
    (current, derivative)
}

/// The Gauss-Legendre rule with the given number of points on `[-1, 1]`.
///
/// Given `n` points, the rule integrates polynomials of degree up to `2n - 1` exactly.
/// Roots of `P_n` are located by Newton iteration from the standard Chebyshev-based
/// initial guesses; only the first half is computed, the rest follows by symmetry.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(num_points: usize) -> Rule<1> {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    let half = (n + 1) / 2;
    let mut weights = Vec::with_capacity(n);
    let mut points = Vec::with_capacity(n);

    for i in 0..half {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let (mut p, mut dp) = legendre_value_and_derivative(n, x);
        loop {
            let dx = -p / dp;
            x += dx;
            let (p_next, dp_next) = legendre_value_and_derivative(n, x);
            p = p_next;
            dp = dp_next;
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        // The weight associated with a root x_i of P_n is 2 / ((1 - x_i^2) P_n'(x_i)^2)
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
        points.push([x]);
    }

    // Mirror the first half onto the second
    for i in half..n {
        let mirror = n - i - 1;
        weights.push(weights[mirror]);
        points.push([-points[mirror][0]]);
    }

    debug_assert_eq!(points.len(), n);
    (weights, points)
}

/// The Gauss-Legendre rule with the given number of points on the unit interval `[0, 1]`.
pub fn gauss_unit(num_points: usize) -> Rule<1> {
    let (mut weights, mut points) = gauss(num_points);
    for w in &mut weights {
        *w *= 0.5;
    }
    for p in &mut points {
        p[0] = 0.5 * (p[0] + 1.0);
    }
    (weights, points)
}
