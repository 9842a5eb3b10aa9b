use galerkin::coefficient::{grad, Coefficient};
use galerkin::error::{Error, InvalidElementReason};
use galerkin::flags::FlagValue;
use galerkin::forms::{BilinearForm, FormOptions, LinearForm};
use galerkin::assembly::local::{SymbolicBilinearIntegrator, SymbolicLinearIntegrator};
use galerkin::mesh::procedural::{unit_interval, unit_square_quads, unit_square_triangles};
use galerkin::mesh::{Element, ElementId, GeometryType, Mesh};
use galerkin::space::{FeSpace, FeSpaceOptions};
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, Point3};
use std::sync::Arc;

fn mass_integrator() -> SymbolicBilinearIntegrator<f64> {
    SymbolicBilinearIntegrator::new(Coefficient::trial() * Coefficient::test())
}

fn h1_over(mesh: Mesh<f64>, order: usize) -> Arc<FeSpace<f64>> {
    Arc::new(FeSpace::h1(Arc::new(mesh), &FeSpaceOptions::with_order(order)).unwrap())
}

#[test]
fn mass_matrix_on_the_unit_segment_matches_the_closed_form() {
    let space = h1_over(unit_interval(1), 1);
    let mut form = BilinearForm::new(space);
    form.add_integrator(mass_integrator());
    form.assemble().unwrap();

    let expected = DMatrix::from_row_slice(
        2,
        2,
        &[1.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0, 1.0 / 3.0],
    );
    assert_matrix_eq!(
        form.matrix().unwrap().to_dense(),
        expected,
        comp = abs,
        tol = 1e-10
    );
}

#[test]
fn mass_matrix_on_the_reference_triangle_matches_the_closed_form() {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    let elements = vec![Element::new(GeometryType::Triangle, vec![0, 1, 2])];
    let mesh = Mesh::new(2, vertices, elements, Vec::new()).unwrap();
    let space = h1_over(mesh, 1);

    let mut form = BilinearForm::new(space);
    form.add_integrator(mass_integrator());
    form.assemble().unwrap();

    // M = area / 12 * [[2, 1, 1], [1, 2, 1], [1, 1, 2]] with area = 1/2
    let expected = DMatrix::from_row_slice(3, 3, &[2.0, 1.0, 1.0, 1.0, 2.0, 1.0, 1.0, 1.0, 2.0])
        / 24.0;
    assert_matrix_eq!(
        form.matrix().unwrap().to_dense(),
        expected,
        comp = abs,
        tol = 1e-10
    );
}

#[test]
fn stiffness_matrix_on_the_unit_segment_matches_the_closed_form() {
    let space = h1_over(unit_interval(1), 1);
    let mut form = BilinearForm::new(space);
    let du = grad(&Coefficient::trial()).unwrap();
    let dv = grad(&Coefficient::test()).unwrap();
    form.add_integrator(SymbolicBilinearIntegrator::new(du.inner(dv)));
    form.assemble().unwrap();

    let expected = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
    assert_matrix_eq!(
        form.matrix().unwrap().to_dense(),
        expected,
        comp = abs,
        tol = 1e-12
    );
}

#[test]
fn forms_follow_the_assembled_state_machine() {
    let space = h1_over(unit_square_triangles(2), 1);
    let mut form = BilinearForm::new(space);
    form.add_integrator(mass_integrator());

    assert!(!form.assembled());
    assert!(form.matrix().is_none());

    form.assemble().unwrap();
    assert!(form.assembled());
    assert!(form.matrix().is_some());

    // Adding an integrator invalidates the cached operator
    form.add_integrator(mass_integrator());
    assert!(!form.assembled());
    assert!(form.matrix().is_none());

    form.assemble().unwrap();
    form.invalidate();
    assert!(!form.assembled());
}

#[test]
fn linear_form_of_the_test_function_integrates_to_the_measure() {
    let space = h1_over(unit_square_triangles(3), 2);
    let mut form = LinearForm::new(space);
    form.add_integrator(SymbolicLinearIntegrator::new(Coefficient::test()));
    form.assemble().unwrap();

    // Summing f(v) over the basis integrates the constant one: the unit square area
    let total: f64 = form.vector().unwrap().iter().sum();
    assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-12);
}

#[test]
fn boundary_linear_form_integrates_to_the_perimeter() {
    let space = h1_over(unit_square_quads(3), 2);
    let mut form = LinearForm::new(space);
    form.add_integrator(SymbolicLinearIntegrator::boundary(Coefficient::test()));
    form.assemble().unwrap();

    let total: f64 = form.vector().unwrap().iter().sum();
    assert_scalar_eq!(total, 4.0, comp = abs, tol = 1e-12);
}

#[test]
fn boundary_bilinear_integrator_only_touches_boundary_dofs() {
    let space = h1_over(unit_square_quads(2), 1);
    let mut form = BilinearForm::new(Arc::clone(&space));
    form.add_integrator(SymbolicBilinearIntegrator::boundary(
        Coefficient::trial() * Coefficient::test(),
    ));
    form.assemble().unwrap();

    let dense = form.matrix().unwrap().to_dense();
    // The center vertex of the 2 x 2 quad mesh lies on no boundary segment, so its
    // row must vanish
    let interior_dof = (0..space.ndof())
        .find(|&dof| {
            let vertex = space.mesh().vertices()[dof];
            vertex.x > 0.0 && vertex.x < 1.0 && vertex.y > 0.0 && vertex.y < 1.0
        })
        .unwrap();
    for j in 0..space.ndof() {
        assert_eq!(dense[(interior_dof, j)], 0.0);
    }

    // The diagonal of a boundary vertex carries boundary mass
    let boundary_dof = (0..space.ndof())
        .find(|&dof| space.mesh().vertices()[dof].x == 0.0)
        .unwrap();
    assert!(dense[(boundary_dof, boundary_dof)] > 0.0);
}

#[test]
fn symmetric_assembly_agrees_with_full_assembly() {
    let space = h1_over(unit_square_triangles(2), 2);

    let mut full = BilinearForm::new(Arc::clone(&space));
    full.add_integrator(mass_integrator());
    full.assemble().unwrap();

    let options = FormOptions::parse([("symmetric", FlagValue::Bool(true))]).unwrap();
    let mut symmetric = BilinearForm::new(Arc::clone(&space)).with_options(options);
    symmetric.add_integrator(mass_integrator());
    symmetric.assemble().unwrap();

    assert_matrix_eq!(
        symmetric.matrix().unwrap().to_dense(),
        full.matrix().unwrap().to_dense(),
        comp = abs,
        tol = 1e-13
    );
}

#[test]
fn symmetric_assembly_requires_identical_spaces() {
    let mesh = Arc::new(unit_square_triangles::<f64>(2));
    let trial = Arc::new(FeSpace::h1(Arc::clone(&mesh), &FeSpaceOptions::with_order(1)).unwrap());
    let test = Arc::new(FeSpace::h1(mesh, &FeSpaceOptions::with_order(1)).unwrap());

    let mut form = BilinearForm::with_spaces(trial, test).with_options(FormOptions {
        symmetric: true,
        ..FormOptions::default()
    });
    form.add_integrator(mass_integrator());
    match form.assemble() {
        Err(Error::Configuration { key, .. }) => assert_eq!(key, "symmetric"),
        other => panic!("expected a configuration error, got {:?}", other),
    }
}

#[test]
fn elementwise_assembly_retains_element_matrices() {
    let space = h1_over(unit_square_triangles(2), 1);
    let options = FormOptions::parse([("elementwise", FlagValue::Bool(true))]).unwrap();
    let mut form = BilinearForm::new(Arc::clone(&space)).with_options(options);
    form.add_integrator(mass_integrator());
    form.assemble().unwrap();

    let element_matrix = form.element_matrix(ElementId::volume(0)).unwrap();
    assert_eq!(element_matrix.nrows(), 3);
    assert_eq!(element_matrix.ncols(), 3);
    // Row sums of a triangle mass matrix integrate the basis: area / 3 per row
    let area = 1.0 / 8.0;
    for i in 0..3 {
        let row_sum: f64 = element_matrix.row(i).iter().sum();
        assert_scalar_eq!(row_sum, area / 3.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn form_options_reject_unrecognized_keys() {
    let result = FormOptions::parse([("nonassemble", FlagValue::Bool(true))]);
    match result {
        Err(Error::Configuration { key, .. }) => assert_eq!(key, "nonassemble"),
        other => panic!("expected a configuration error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn linear_integrands_with_trial_functions_are_rejected() {
    let space = h1_over(unit_square_triangles(1), 1);
    let mut form = LinearForm::new(space);
    form.add_integrator(SymbolicLinearIntegrator::new(
        Coefficient::trial() * Coefficient::test(),
    ));
    assert!(matches!(
        form.assemble(),
        Err(Error::UnsupportedOperation { .. })
    ));
}

#[test]
fn assembly_surfaces_the_first_failing_element() {
    // Elements 1 and 2 are degenerate (coincident vertex coordinates); the failure
    // with the smallest element index must be reported after the sweep drains
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(1.0, 1.0, 0.0), // coincides with vertex 3
    ];
    let elements = vec![
        Element::new(GeometryType::Triangle, vec![0, 1, 2]),
        Element::new(GeometryType::Triangle, vec![1, 3, 4]),
        Element::new(GeometryType::Triangle, vec![2, 3, 4]),
    ];
    let mesh = Mesh::new(2, vertices, elements, Vec::new()).unwrap();
    let space = h1_over(mesh, 1);

    for parallel in [false, true] {
        let mut form = BilinearForm::new(Arc::clone(&space))
            .with_options(FormOptions::default().with_parallel(parallel));
        form.add_integrator(mass_integrator());

        match form.assemble() {
            Err(Error::Assembly { element, source }) => {
                assert_eq!(element, ElementId::volume(1));
                assert!(matches!(
                    *source,
                    Error::InvalidElement {
                        reason: InvalidElementReason::DegenerateGeometry,
                        ..
                    }
                ));
            }
            other => panic!("expected an assembly error, got {:?}", other),
        }
        // No partially assembled operator is observable
        assert!(!form.assembled());
        assert!(form.matrix().is_none());
    }
}
