use galerkin::coefficient::{grad, Coefficient, ProxyKind, Shape, Value};
use galerkin::error::Error;
use galerkin::integrate::integrate;
use galerkin::mesh::procedural::{unit_square_quads, unit_square_triangles};
use galerkin::mesh::Region;
use matrixcompare::assert_scalar_eq;

#[test]
fn integrate_constant_over_unit_square_yields_the_area() {
    let mesh = unit_square_triangles::<f64>(3);
    let one = Coefficient::constant(1.0);
    let area = integrate(&one, &mesh, Region::Volume, 0).unwrap();
    assert_scalar_eq!(area, 1.0, comp = abs, tol = 1e-13);
}

#[test]
fn integrate_boundary_yields_the_perimeter() {
    let mesh = unit_square_quads::<f64>(4);
    let one = Coefficient::constant(1.0);
    let perimeter = integrate(&one, &mesh, Region::Boundary, 0).unwrap();
    assert_scalar_eq!(perimeter, 4.0, comp = abs, tol = 1e-13);
}

#[test]
fn integrate_coordinate_polynomials_exactly() {
    let mesh = unit_square_quads::<f64>(2);
    // int over [0,1]^2 of x^2 y = 1/3 * 1/2
    let x = Coefficient::coordinate(0);
    let y = Coefficient::coordinate(1);
    let integrand = x.clone() * x * y;
    let value = integrate(&integrand, &mesh, Region::Volume, 3).unwrap();
    assert_scalar_eq!(value, 1.0 / 6.0, comp = abs, tol = 1e-13);
}

#[test]
fn integrate_transcendental_functions() {
    let mesh = unit_square_quads::<f64>(4);
    // int over [0,1]^2 of sin(pi x) = 2 / pi
    let pi = Coefficient::constant(std::f64::consts::PI);
    let integrand = (pi * Coefficient::coordinate(0)).sin();
    let value = integrate(&integrand, &mesh, Region::Volume, 8).unwrap();
    assert_scalar_eq!(value, 2.0 / std::f64::consts::PI, comp = abs, tol = 1e-10);
}

#[test]
fn material_constants_are_looked_up_per_element_marker() {
    // All procedural elements carry marker 0
    let mesh = unit_square_triangles::<f64>(2);
    let coefficient = Coefficient::material_constants(vec![3.0]);
    let value = integrate(&coefficient, &mesh, Region::Volume, 0).unwrap();
    assert_scalar_eq!(value, 3.0, comp = abs, tol = 1e-13);

    // A missing material index is a configuration error
    let empty = Coefficient::material_constants(Vec::new());
    assert!(matches!(
        integrate(&empty, &mesh, Region::Volume, 0),
        Err(Error::Configuration { .. })
    ));
}

#[test]
fn custom_coefficients_receive_the_point_context() {
    let mesh = unit_square_quads::<f64>(2);
    let f = Coefficient::from_fn(|p| p.x + 2.0 * p.y);
    // int over [0,1]^2 of x + 2y = 0.5 + 1.0
    let value = integrate(&f, &mesh, Region::Volume, 1).unwrap();
    assert_scalar_eq!(value, 1.5, comp = abs, tol = 1e-13);
}

#[test]
fn shape_checks_reject_incompatible_operands() {
    let scalar = Coefficient::constant(1.0);
    let vector = Coefficient::vector(&[1.0, 2.0]);

    // Adding a scalar and a vector is a shape mismatch
    let sum = scalar + vector.clone();
    match sum.shape(2) {
        Err(Error::ShapeMismatch { lhs, rhs, .. }) => {
            assert_eq!(lhs, Shape::SCALAR);
            assert_eq!(rhs, Shape::vector(2));
        }
        other => panic!("expected shape mismatch, got {:?}", other),
    }

    // Multiplying two vectors is a shape mismatch (inner is the contraction)
    let product = vector.clone() * vector.clone();
    assert!(matches!(product.shape(2), Err(Error::ShapeMismatch { .. })));

    // The inner product of equal shapes is scalar
    let inner = vector.clone().inner(vector);
    assert_eq!(inner.shape(2).unwrap(), Shape::SCALAR);
}

#[test]
fn gradient_of_scalar_constant_is_zero() {
    let mesh = unit_square_quads::<f64>(1);
    let zero = grad(&Coefficient::constant(5.0)).unwrap();
    assert_eq!(zero.shape(2).unwrap(), Shape::vector(2));

    // Contracting with itself integrates to zero
    let integrand = zero.clone().inner(zero);
    let value = integrate(&integrand, &mesh, Region::Volume, 0).unwrap();
    assert_scalar_eq!(value, 0.0, comp = abs, tol = 1e-15);
}

#[test]
fn gradient_of_discontinuous_material_lookup_fails() {
    let coefficient = Coefficient::<f64>::material_constants(vec![1.0, 2.0]);
    assert!(matches!(
        grad(&coefficient),
        Err(Error::UnsupportedOperation { .. })
    ));
}

#[test]
fn gradient_of_arbitrary_expressions_fails() {
    let x = Coefficient::<f64>::coordinate(0);
    let expression = x.clone() * x;
    assert!(matches!(
        grad(&expression),
        Err(Error::UnsupportedOperation { .. })
    ));
}

#[test]
fn second_derivatives_of_proxies_fail() {
    let du = grad(&Coefficient::<f64>::trial()).unwrap();
    assert!(matches!(grad(&du), Err(Error::UnsupportedOperation { .. })));
}

#[test]
fn proxies_outside_assembly_fail_to_evaluate() {
    let mesh = unit_square_quads::<f64>(1);
    let u = Coefficient::<f64>::trial();
    assert!(matches!(
        integrate(&u, &mesh, Region::Volume, 1),
        Err(Error::UnsupportedOperation { .. })
    ));
}

#[test]
fn proxy_references_are_detected() {
    let u = Coefficient::<f64>::trial();
    let v = Coefficient::<f64>::test();
    let integrand = u * v.clone();
    assert!(integrand.references_proxy(ProxyKind::Trial));
    assert!(integrand.references_proxy(ProxyKind::Test));
    assert!(v.references_proxy(ProxyKind::Test));
    assert!(!v.references_proxy(ProxyKind::Trial));
}

#[test]
fn custom_value_shapes_are_declared() {
    let v = Coefficient::<f64>::custom(Shape::vector(2), |_| Value::Vector {
        data: nalgebra::Vector3::new(1.0, 2.0, 0.0),
        dim: 2,
    });
    assert_eq!(v.shape(2).unwrap(), Shape::vector(2));
}
