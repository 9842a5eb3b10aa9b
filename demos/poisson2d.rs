//! Solves a 2D Poisson problem on the unit square:
//!   -Delta u = 1, u = 0 on the left boundary,
//! assembled from symbolic forms and solved with Jacobi-preconditioned CG.

use eyre::eyre;
use galerkin::assembly::global::{apply_dirichlet_csr, apply_dirichlet_rhs};
use galerkin::assembly::local::{SymbolicBilinearIntegrator, SymbolicLinearIntegrator};
use galerkin::coefficient::{grad, Coefficient};
use galerkin::forms::{BilinearForm, FormOptions, LinearForm};
use galerkin::mesh::procedural::unit_square_quads;
use galerkin::mesh::ElementId;
use galerkin::space::{FeSpace, FeSpaceOptions};
use galerkin::sparse::cg::{ConjugateGradient, JacobiPreconditioner};
use nalgebra::Point3;
use std::sync::Arc;

fn main() -> eyre::Result<()> {
    let mesh = Arc::new(unit_square_quads::<f64>(16));
    let options = FeSpaceOptions {
        order: 2,
        dirichlet: vec![0], // the x = 0 side
        complex: false,
    };
    let space = Arc::new(FeSpace::h1(Arc::clone(&mesh), &options)?);
    println!("space with {} DOFs", space.ndof());

    let mut a = BilinearForm::new(Arc::clone(&space))
        .with_options(FormOptions::default().with_parallel(true));
    let du = grad(&Coefficient::trial())?;
    let dv = grad(&Coefficient::test())?;
    a.add_integrator(SymbolicBilinearIntegrator::new(du.inner(dv)));
    a.assemble()?;

    let mut b = LinearForm::new(Arc::clone(&space));
    b.add_integrator(SymbolicLinearIntegrator::new(Coefficient::test()));
    b.assemble()?;

    let mut matrix = a.matrix().ok_or_else(|| eyre!("form is unassembled"))?.clone();
    let mut rhs = b.vector().ok_or_else(|| eyre!("form is unassembled"))?.clone();
    let dirichlet = space.dirichlet_dofs();
    apply_dirichlet_csr(&mut matrix, &dirichlet);
    apply_dirichlet_rhs(&mut rhs, &dirichlet);

    let preconditioner = JacobiPreconditioner::from_csr(&matrix)
        .ok_or_else(|| eyre!("operator has a nonpositive diagonal"))?;
    let u = ConjugateGradient::new()
        .with_operator(&matrix)
        .with_preconditioner(&preconditioner)
        .with_rel_tolerance(1e-10)
        .with_max_iter(2000)
        .solve(&rhs)
        .map_err(|err| eyre!("{}", err))?;

    // Sample the solution along the horizontal center line
    for i in 0..=4 {
        let x = i as f64 / 4.0;
        let (element, xi) = locate(x);
        let (value, _) = space.evaluate_field(element, &xi, &u)?;
        println!("u({:.2}, 0.50) = {:.6}", x, value);
    }
    Ok(())
}

/// Locates the element of the 16 x 16 structured quad mesh containing `(x, 0.5)` and
/// the corresponding reference coordinates.
fn locate(x: f64) -> (ElementId, Point3<f64>) {
    let n = 16;
    let h = 1.0 / n as f64;
    let i = ((x / h) as usize).min(n - 1);
    let j = n / 2;
    let xi = (x - i as f64 * h) / h;
    (ElementId::volume(i * n + j), Point3::new(xi, 0.0, 0.0))
}
