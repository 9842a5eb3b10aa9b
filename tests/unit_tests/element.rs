use galerkin::element::{reference_element, NodeEntity, ReferenceElement};
use galerkin::mesh::GeometryType;
use matrixcompare::assert_scalar_eq;
use nalgebra::{DMatrix, DMatrixViewMut, Point3};

const ALL_GEOMETRIES: [GeometryType; 7] = [
    GeometryType::Segment,
    GeometryType::Triangle,
    GeometryType::Quadrilateral,
    GeometryType::Tetrahedron,
    GeometryType::Hexahedron,
    GeometryType::Prism,
    GeometryType::Pyramid,
];

fn orders_for(geometry: GeometryType) -> Vec<usize> {
    if geometry == GeometryType::Pyramid {
        vec![1]
    } else {
        vec![1, 2, 3, 4]
    }
}

#[test]
fn basis_sizes_match_lattice_sizes() {
    let expected_ndof = |geometry: GeometryType, p: usize| match geometry {
        GeometryType::Segment => p + 1,
        GeometryType::Triangle => (p + 1) * (p + 2) / 2,
        GeometryType::Quadrilateral => (p + 1) * (p + 1),
        GeometryType::Tetrahedron => (p + 1) * (p + 2) * (p + 3) / 6,
        GeometryType::Hexahedron => (p + 1).pow(3),
        GeometryType::Prism => (p + 1) * (p + 2) / 2 * (p + 1),
        GeometryType::Pyramid => 5,
    };

    for geometry in ALL_GEOMETRIES {
        for order in orders_for(geometry) {
            let element = reference_element::<f64>(geometry, order).unwrap();
            assert_eq!(
                element.num_basis_functions(),
                expected_ndof(geometry, order),
                "basis size mismatch for {} of order {}",
                geometry,
                order
            );
            assert_eq!(element.nodes().len(), element.num_basis_functions());
        }
    }
}

#[test]
fn basis_satisfies_lagrange_delta_property() {
    for geometry in ALL_GEOMETRIES {
        for order in orders_for(geometry) {
            let element = reference_element::<f64>(geometry, order).unwrap();
            let n = element.num_basis_functions();
            let mut values = vec![0.0; n];

            for (i, node) in element.nodes().iter().enumerate() {
                element.populate_basis(&mut values, &node.point_as());
                for (j, &value) in values.iter().enumerate() {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert_scalar_eq!(value, expected, comp = abs, tol = 1e-9);
                }
            }
        }
    }
}

#[test]
fn basis_forms_partition_of_unity() {
    for geometry in ALL_GEOMETRIES {
        for order in orders_for(geometry) {
            let element = reference_element::<f64>(geometry, order).unwrap();
            let n = element.num_basis_functions();
            let mut values = vec![0.0; n];
            let mut gradients = DMatrix::zeros(3, n);

            // A handful of points strictly inside the reference cell
            for &(x, y, z) in &[(0.11, 0.07, 0.05), (0.21, 0.33, 0.14), (0.4, 0.25, 0.3)] {
                let xi = Point3::new(x, y, z);
                element.populate_basis(&mut values, &xi);
                let sum: f64 = values.iter().sum();
                assert_scalar_eq!(sum, 1.0, comp = abs, tol = 1e-10);

                // Gradients of a partition of unity sum to zero
                element.populate_basis_gradients(DMatrixViewMut::from(&mut gradients), &xi);
                for axis in 0..3 {
                    let gradient_sum: f64 = (0..n).map(|j| gradients[(axis, j)]).sum();
                    assert_scalar_eq!(gradient_sum, 0.0, comp = abs, tol = 1e-9);
                }
            }
        }
    }
}

#[test]
fn gradients_match_finite_differences() {
    let h = 1e-6;
    for geometry in ALL_GEOMETRIES {
        for order in orders_for(geometry) {
            let element = reference_element::<f64>(geometry, order).unwrap();
            let n = element.num_basis_functions();
            let mut values_plus = vec![0.0; n];
            let mut values_minus = vec![0.0; n];
            let mut gradients = DMatrix::zeros(3, n);

            let xi = Point3::new(0.21, 0.13, 0.09);
            element.populate_basis_gradients(DMatrixViewMut::from(&mut gradients), &xi);

            for axis in 0..geometry.dimension() {
                let mut plus = xi;
                let mut minus = xi;
                plus[axis] += h;
                minus[axis] -= h;
                element.populate_basis(&mut values_plus, &plus);
                element.populate_basis(&mut values_minus, &minus);
                for j in 0..n {
                    let estimate = (values_plus[j] - values_minus[j]) / (2.0 * h);
                    assert_scalar_eq!(gradients[(axis, j)], estimate, comp = abs, tol = 1e-5);
                }
            }
        }
    }
}

#[test]
fn lattice_nodes_are_classified_by_entity() {
    // A cubic tetrahedron has 4 vertex nodes, 2 per edge, 1 per face and none interior
    let element = reference_element::<f64>(GeometryType::Tetrahedron, 3).unwrap();
    let mut vertices = 0;
    let mut edges = 0;
    let mut faces = 0;
    let mut interior = 0;
    for node in element.nodes() {
        match node.entity {
            NodeEntity::Vertex(_) => vertices += 1,
            NodeEntity::Edge { .. } => edges += 1,
            NodeEntity::TriangleFace { .. } | NodeEntity::QuadrilateralFace { .. } => faces += 1,
            NodeEntity::Interior(_) => interior += 1,
        }
    }
    assert_eq!(vertices, 4);
    assert_eq!(edges, 12);
    assert_eq!(faces, 4);
    assert_eq!(interior, 0);

    // The quartic hexahedron has interior nodes: (4+1)^3 = 125 total,
    // 8 vertices, 12 * 3 edge nodes, 6 * 9 face nodes, 27 interior
    let element = reference_element::<f64>(GeometryType::Hexahedron, 4).unwrap();
    let interior = element
        .nodes()
        .iter()
        .filter(|node| matches!(node.entity, NodeEntity::Interior(_)))
        .count();
    assert_eq!(interior, 27);
}

#[test]
fn pyramid_above_order_one_is_rejected() {
    assert!(reference_element::<f64>(GeometryType::Pyramid, 2).is_err());
}
