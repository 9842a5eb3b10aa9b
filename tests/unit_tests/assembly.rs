use galerkin::assembly::color::sequential_greedy_coloring;
use galerkin::assembly::global::{apply_dirichlet_csr, apply_dirichlet_rhs};
use galerkin::coefficient::{grad, Coefficient};
use galerkin::forms::{BilinearForm, FormOptions};
use galerkin::assembly::local::SymbolicBilinearIntegrator;
use galerkin::mesh::procedural::{unit_square_quads, unit_square_triangles};
use galerkin::mesh::{ElementId, Region};
use galerkin::space::{FeSpace, FeSpaceOptions};
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;
use std::collections::BTreeSet;
use std::sync::Arc;

fn mass_integrator() -> SymbolicBilinearIntegrator<f64> {
    SymbolicBilinearIntegrator::new(Coefficient::trial() * Coefficient::test())
}

fn laplace_integrator() -> SymbolicBilinearIntegrator<f64> {
    let du = grad(&Coefficient::trial()).unwrap();
    let dv = grad(&Coefficient::test()).unwrap();
    SymbolicBilinearIntegrator::new(du.inner(dv))
}

fn h1_space(n: usize, order: usize) -> Arc<FeSpace<f64>> {
    let mesh = Arc::new(unit_square_triangles::<f64>(n));
    Arc::new(FeSpace::h1(mesh, &FeSpaceOptions::with_order(order)).unwrap())
}

#[test]
fn coloring_produces_conflict_free_groups_covering_all_elements() {
    let space = h1_space(3, 2);
    let num_elements = space.mesh().num_elements(Region::Volume);

    let colors = sequential_greedy_coloring(num_elements, |element, dofs| {
        dofs.extend_from_slice(space.element_dofs(ElementId::volume(element)));
    });

    let mut seen = vec![false; num_elements];
    for color in &colors {
        let mut used_dofs = BTreeSet::new();
        for &element in color {
            assert!(!seen[element], "element assigned to two colors");
            seen[element] = true;
            for &dof in space.element_dofs(ElementId::volume(element)) {
                assert!(
                    used_dofs.insert(dof),
                    "two elements of one color share DOF {}",
                    dof
                );
            }
        }
        // Members are kept in ascending element order
        assert!(color.windows(2).all(|w| w[0] < w[1]));
    }
    assert!(seen.iter().all(|&s| s), "coloring must cover every element");
}

#[test]
fn parallel_and_serial_assembly_agree() {
    let space = h1_space(3, 2);

    let mut serial = BilinearForm::new(Arc::clone(&space));
    serial.add_integrator(laplace_integrator());
    serial.assemble().unwrap();

    let mut parallel = BilinearForm::new(Arc::clone(&space))
        .with_options(FormOptions::default().with_parallel(true));
    parallel.add_integrator(laplace_integrator());
    parallel.assemble().unwrap();

    let x = DVector::from_fn(space.ndof(), |i, _| ((i * 13 % 7) as f64) - 3.0);
    let y_serial = serial.matrix().unwrap() * &x;
    let y_parallel = parallel.matrix().unwrap() * &x;
    assert_matrix_eq!(y_parallel, y_serial, comp = float);
}

#[test]
fn reassembly_from_unchanged_inputs_is_reproducible() {
    let space = h1_space(3, 2);
    let mut form = BilinearForm::new(Arc::clone(&space))
        .with_options(FormOptions::default().with_parallel(true));
    form.add_integrator(laplace_integrator());
    form.add_integrator(mass_integrator());

    form.assemble().unwrap();
    let x = DVector::from_fn(space.ndof(), |i, _| (i as f64 * 0.31).cos());
    let y_first = form.matrix().unwrap() * &x;

    form.assemble().unwrap();
    let y_second = form.matrix().unwrap() * &x;

    // Colors are processed sequentially and scattered in ascending element order, so
    // accumulation order is deterministic; the results agree to within rounding
    assert!((&y_first - &y_second).norm() <= 1e-14 * y_first.norm().max(1.0));
}

#[test]
fn dirichlet_application_zeroes_rows_and_columns_symmetrically() {
    let space = h1_space(2, 1);
    let mut form = BilinearForm::new(Arc::clone(&space));
    form.add_integrator(laplace_integrator());
    form.assemble().unwrap();

    let mut matrix = form.matrix().unwrap().clone();
    let constrained = vec![0usize, 3];
    apply_dirichlet_csr(&mut matrix, &constrained);

    let dense = matrix.to_dense();
    for &dof in &constrained {
        for j in 0..dense.ncols() {
            if j != dof {
                assert_eq!(dense[(dof, j)], 0.0);
                assert_eq!(dense[(j, dof)], 0.0);
            }
        }
        assert!(dense[(dof, dof)] > 0.0);
    }
    // The result stays symmetric
    assert_matrix_eq!(dense.transpose(), dense, comp = float);

    let mut rhs = DVector::from_element(space.ndof(), 1.0);
    apply_dirichlet_rhs(&mut rhs, &constrained);
    for &dof in &constrained {
        assert_eq!(rhs[dof], 0.0);
    }
}

#[test]
fn geometry_restricted_integrators_skip_other_elements() {
    use galerkin::mesh::GeometryType;

    // Restricting a mass integrator to triangles on a quadrilateral mesh means no
    // element contributes: the operator assembles to all zeros, not an error
    let mesh = Arc::new(unit_square_quads::<f64>(2));
    let space = Arc::new(FeSpace::h1(mesh, &FeSpaceOptions::with_order(1)).unwrap());
    let mut form = BilinearForm::new(Arc::clone(&space));
    form.add_integrator(
        mass_integrator().restricted_to(vec![GeometryType::Triangle]),
    );
    form.assemble().unwrap();

    assert!(form
        .matrix()
        .unwrap()
        .values()
        .iter()
        .all(|&value| value == 0.0));
}
