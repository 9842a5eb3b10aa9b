use galerkin::error::{Error, InvalidElementReason};
use galerkin::mesh::procedural::{unit_cube_tets, unit_square_quads, unit_square_triangles};
use galerkin::mesh::{Element, ElementId, GeometryType, Mesh, Region};
use galerkin::transformation::{ElementTransformation, GeometryBuffer};
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point3, Vector3};

fn single_element_mesh(
    dimension: usize,
    geometry: GeometryType,
    vertices: Vec<Point3<f64>>,
) -> Mesh<f64> {
    let n = vertices.len();
    let element = Element::new(geometry, (0..n).collect());
    Mesh::new(dimension, vertices, vec![element], Vec::new()).unwrap()
}

#[test]
fn affine_triangle_jacobian_determinant_equals_twice_the_area() {
    // Area of the triangle (1,1), (4,2), (2,5) by the cross product formula
    let a: Point3<f64> = Point3::new(1.0, 1.0, 0.0);
    let b: Point3<f64> = Point3::new(4.0, 2.0, 0.0);
    let c: Point3<f64> = Point3::new(2.0, 5.0, 0.0);
    let area = 0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs();

    let mesh = single_element_mesh(2, GeometryType::Triangle, vec![a, b, c]);
    let transformation = ElementTransformation::new(&mesh, ElementId::volume(0)).unwrap();
    let mut buffer = GeometryBuffer::default();

    // The reference triangle has area 1/2, so the measure is 2 * area, and for an
    // affine map it is the same at every reference point
    for &(x, y) in &[(0.2, 0.3), (0.5, 0.1), (0.0, 0.0)] {
        let mapped = transformation
            .evaluate(&Point3::new(x, y, 0.0), &mut buffer)
            .unwrap();
        assert_scalar_eq!(mapped.measure, 2.0 * area, comp = abs, tol = 1e-13);
    }
}

#[test]
fn affine_tetrahedron_jacobian_determinant_equals_six_times_the_volume() {
    let a: Point3<f64> = Point3::new(0.0, 0.0, 0.0);
    let b: Point3<f64> = Point3::new(2.0, 0.0, 0.0);
    let c: Point3<f64> = Point3::new(0.0, 3.0, 0.0);
    let d: Point3<f64> = Point3::new(0.0, 0.0, 4.0);
    // Volume by the scalar triple product formula
    let volume = ((b - a).cross(&(c - a)).dot(&(d - a)) / 6.0).abs();

    let mesh = single_element_mesh(3, GeometryType::Tetrahedron, vec![a, b, c, d]);
    let transformation = ElementTransformation::new(&mesh, ElementId::volume(0)).unwrap();
    let mut buffer = GeometryBuffer::default();

    let mapped = transformation
        .evaluate(&Point3::new(0.25, 0.25, 0.25), &mut buffer)
        .unwrap();
    assert_scalar_eq!(mapped.measure, 6.0 * volume, comp = abs, tol = 1e-13);
}

#[test]
fn mapped_points_and_inverse_jacobian_are_consistent() {
    let mesh = unit_square_triangles::<f64>(3);
    let mut buffer = GeometryBuffer::default();
    for index in 0..mesh.num_elements(Region::Volume) {
        let transformation = ElementTransformation::new(&mesh, ElementId::volume(index)).unwrap();
        let mapped = transformation
            .evaluate(&Point3::new(0.25, 0.25, 0.0), &mut buffer)
            .unwrap();

        // J^{-1} J must reproduce the identity on the reference dimensions
        let product = mapped.inv_jacobian * mapped.jacobian;
        for r in 0..2 {
            for c in 0..2 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert_scalar_eq!(product[(r, c)], expected, comp = abs, tol = 1e-13);
            }
        }
    }
}

#[test]
fn boundary_transformation_uses_generalized_measure() {
    let mesh = unit_square_quads::<f64>(2);
    let mut buffer = GeometryBuffer::default();
    // Boundary segments of the 2 x 2 unit square mesh have length 1/2
    for index in 0..mesh.num_elements(Region::Boundary) {
        let transformation =
            ElementTransformation::new(&mesh, ElementId::boundary(index)).unwrap();
        let mapped = transformation
            .evaluate(&Point3::new(0.5, 0.0, 0.0), &mut buffer)
            .unwrap();
        assert_scalar_eq!(mapped.measure, 0.5, comp = abs, tol = 1e-14);
    }
}

#[test]
fn boundary_triangles_of_tet_mesh_have_correct_measure() {
    let mesh = unit_cube_tets::<f64>(1);
    let mut buffer = GeometryBuffer::default();
    // Each cube side splits into two right triangles of area 1/2, so the reference
    // measure is 2 * area = 1
    let total: f64 = (0..mesh.num_elements(Region::Boundary))
        .map(|index| {
            let transformation =
                ElementTransformation::new(&mesh, ElementId::boundary(index)).unwrap();
            let mapped = transformation
                .evaluate(&Point3::new(0.25, 0.25, 0.0), &mut buffer)
                .unwrap();
            // Reference triangle area is 1/2
            mapped.measure * 0.5
        })
        .sum();
    assert_scalar_eq!(total, 6.0, comp = abs, tol = 1e-12);
}

#[test]
fn physical_gradient_transformation_inverts_the_map() {
    let mesh = unit_square_quads::<f64>(2);
    let transformation = ElementTransformation::new(&mesh, ElementId::volume(0)).unwrap();
    let mut buffer = GeometryBuffer::default();
    let mapped = transformation
        .evaluate(&Point3::new(0.3, 0.7, 0.0), &mut buffer)
        .unwrap();

    // For the map x = xi / 2 the physical gradient of a function with reference
    // gradient g is 2 g
    let physical = mapped.physical_gradient(&Vector3::new(1.0, -2.0, 0.0));
    assert_scalar_eq!(physical.x, 2.0, comp = abs, tol = 1e-13);
    assert_scalar_eq!(physical.y, -4.0, comp = abs, tol = 1e-13);
}

#[test]
fn degenerate_geometry_is_reported_not_clamped() {
    // A triangle with two coincident vertices has a vanishing Jacobian
    let a = Point3::new(0.0, 0.0, 0.0);
    let b = Point3::new(1.0, 1.0, 0.0);
    let mesh = single_element_mesh(2, GeometryType::Triangle, vec![a, b, b]);
    let transformation = ElementTransformation::new(&mesh, ElementId::volume(0)).unwrap();
    let mut buffer = GeometryBuffer::default();

    let result = transformation.evaluate(&Point3::new(0.25, 0.25, 0.0), &mut buffer);
    assert!(matches!(
        result,
        Err(Error::InvalidElement {
            reason: InvalidElementReason::DegenerateGeometry,
            ..
        })
    ));
}

#[test]
fn out_of_range_element_id_is_invalid() {
    let mesh = unit_square_quads::<f64>(1);
    let result = ElementTransformation::new(&mesh, ElementId::volume(7));
    assert!(matches!(
        result,
        Err(Error::InvalidElement {
            reason: InvalidElementReason::OutOfRange,
            ..
        })
    ));
}

#[test]
fn curved_quadratic_segment_mesh_changes_the_measure() {
    // A single segment curved into a quadratic arc: the control points are the
    // order-2 lattice (two endpoints and a midpoint), with the midpoint lifted
    let vertices = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)];
    let element = Element::new(GeometryType::Segment, vec![0, 1]);
    let mesh = Mesh::<f64>::new(1, vertices, vec![element], Vec::new()).unwrap();

    // Control points follow the order-2 segment lattice: x = 0, 1/2, 1
    let control_points = vec![vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.5, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
    ]];
    // With control points on the straight line, the map is the identity
    let straight = mesh
        .clone()
        .with_curved_geometry(2, control_points, Vec::new())
        .unwrap();
    let transformation = ElementTransformation::new(&straight, ElementId::volume(0)).unwrap();
    let mut buffer = GeometryBuffer::default();
    let mapped = transformation
        .evaluate(&Point3::new(0.3, 0.0, 0.0), &mut buffer)
        .unwrap();
    assert_scalar_eq!(mapped.measure, 1.0, comp = abs, tol = 1e-13);

    // Stretching the midpoint along the segment makes the measure non-constant
    let control_points = vec![vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.6, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
    ]];
    let curved = mesh
        .with_curved_geometry(2, control_points, Vec::new())
        .unwrap();
    let transformation = ElementTransformation::new(&curved, ElementId::volume(0)).unwrap();
    let near_start = transformation
        .evaluate(&Point3::new(0.1, 0.0, 0.0), &mut buffer)
        .unwrap();
    let near_end = transformation
        .evaluate(&Point3::new(0.9, 0.0, 0.0), &mut buffer)
        .unwrap();
    assert!(near_start.measure > near_end.measure);
}
