//! Method of manufactured solutions on a 2D Poisson problem.
//!
//! The problem is `-Delta u = f` on the unit square with homogeneous Dirichlet
//! conditions, manufactured from the exact solution
//! `u(x, y) = sin(pi x) sin(pi y)`. Solving on successively refined meshes must show
//! the expected order of convergence of the discretization error.

use galerkin::assembly::global::{apply_dirichlet_csr, apply_dirichlet_rhs};
use galerkin::coefficient::{grad, Coefficient};
use galerkin::forms::{BilinearForm, FormOptions, LinearForm};
use galerkin::assembly::local::{SymbolicBilinearIntegrator, SymbolicLinearIntegrator};
use galerkin::integrate::integrate;
use galerkin::mesh::procedural::unit_square_triangles;
use galerkin::mesh::{ElementId, Region};
use galerkin::space::{FeSpace, FeSpaceOptions};
use galerkin::sparse::cg::ConjugateGradient;
use nalgebra::{DVector, Point3};
use std::f64::consts::PI;
use std::sync::Arc;

fn u_exact(p: &Point3<f64>) -> f64 {
    (PI * p.x).sin() * (PI * p.y).sin()
}

fn f_source(p: &Point3<f64>) -> f64 {
    2.0 * PI * PI * (PI * p.x).sin() * (PI * p.y).sin()
}

/// Solves the Poisson problem on an `n x n` triangle mesh and returns the L2 error of
/// the discrete solution, estimated by quadrature over every element.
fn solve_and_measure_error(n: usize, order: usize) -> f64 {
    let mesh = Arc::new(unit_square_triangles::<f64>(n));
    let options = FeSpaceOptions {
        order,
        // All four sides of the unit square
        dirichlet: vec![0, 1, 2, 3],
        complex: false,
    };
    let space = Arc::new(FeSpace::h1(Arc::clone(&mesh), &options).unwrap());

    let mut a = BilinearForm::new(Arc::clone(&space))
        .with_options(FormOptions::default().with_parallel(true));
    let du = grad(&Coefficient::trial()).unwrap();
    let dv = grad(&Coefficient::test()).unwrap();
    a.add_integrator(SymbolicBilinearIntegrator::new(du.inner(dv)));
    a.assemble().unwrap();

    let mut b = LinearForm::new(Arc::clone(&space));
    let source = Coefficient::from_fn(f_source);
    b.add_integrator(SymbolicLinearIntegrator::new(source * Coefficient::test()).with_bonus_order(2));
    b.assemble().unwrap();

    let mut matrix = a.matrix().unwrap().clone();
    let mut rhs = b.vector().unwrap().clone();
    let dirichlet = space.dirichlet_dofs();
    apply_dirichlet_csr(&mut matrix, &dirichlet);
    apply_dirichlet_rhs(&mut rhs, &dirichlet);

    let u = ConjugateGradient::new()
        .with_operator(&matrix)
        .with_rel_tolerance(1e-12)
        .with_max_iter(10 * space.ndof())
        .solve(&rhs)
        .unwrap();

    l2_error(&space, &u)
}

/// The L2 error `||u_h - u||` estimated with a high-order quadrature rule per element.
fn l2_error(space: &FeSpace<f64>, u: &DVector<f64>) -> f64 {
    use galerkin::assembly::buffers::{QuadratureBuffer, QuadratureCache};
    use galerkin::transformation::ElementTransformation;

    let mesh = space.mesh();
    let mut cache = QuadratureCache::default();
    let mut quadrature = QuadratureBuffer::default();

    let mut error_squared = 0.0;
    for index in 0..mesh.num_elements(Region::Volume) {
        let id = ElementId::volume(index);
        let element = mesh.element(id).unwrap();
        let transformation = ElementTransformation::new(mesh, id).unwrap();
        let rule = cache.rule(element.geometry, 2 * space.order() + 2);
        quadrature.populate(rule, &transformation).unwrap();

        for q in 0..quadrature.len() {
            let (u_h, _) = space
                .evaluate_field(id, quadrature.point(q), u)
                .unwrap();
            let difference = u_h - u_exact(&quadrature.mapped(q).point);
            error_squared +=
                quadrature.weight(q) * quadrature.mapped(q).measure * difference * difference;
        }
    }
    error_squared.sqrt()
}

#[test]
fn linear_elements_converge_at_second_order() {
    let coarse = solve_and_measure_error(4, 1);
    let fine = solve_and_measure_error(8, 1);

    // The L2 error of P1 elements scales as O(h^2): halving h must reduce the error
    // by a factor close to 4
    let rate = (coarse / fine).log2();
    assert!(
        rate > 1.7,
        "observed convergence rate {} is below second order (coarse {}, fine {})",
        rate,
        coarse,
        fine
    );
}

#[test]
fn quadratic_elements_converge_at_third_order() {
    let coarse = solve_and_measure_error(4, 2);
    let fine = solve_and_measure_error(8, 2);

    // The L2 error of P2 elements scales as O(h^3)
    let rate = (coarse / fine).log2();
    assert!(
        rate > 2.6,
        "observed convergence rate {} is below third order (coarse {}, fine {})",
        rate,
        coarse,
        fine
    );
}

#[test]
fn discrete_solution_approximates_the_exact_solution() {
    let mesh = Arc::new(unit_square_triangles::<f64>(8));
    let exact = Coefficient::from_fn(u_exact);
    // Sanity check of the manufactured solution: its mean over the square is 4 / pi^2
    let mean = integrate(&exact, &mesh, Region::Volume, 8).unwrap();
    assert!((mean - 4.0 / (PI * PI)).abs() < 1e-4);

    let error = solve_and_measure_error(8, 2);
    assert!(error < 1e-3, "discretization error too large: {}", error);
}
