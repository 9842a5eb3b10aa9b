use galerkin::mesh::procedural::{
    unit_cube_hexes, unit_cube_tets, unit_interval, unit_square_quads, unit_square_triangles,
};
use galerkin::mesh::{Element, ElementId, GeometryType, Mesh, Region};
use nalgebra::Point3;

#[test]
fn geometry_type_topology_is_consistent() {
    for geometry in [
        GeometryType::Segment,
        GeometryType::Triangle,
        GeometryType::Quadrilateral,
        GeometryType::Tetrahedron,
        GeometryType::Hexahedron,
        GeometryType::Prism,
        GeometryType::Pyramid,
    ] {
        assert_eq!(geometry.num_vertices(), geometry.reference_vertices().len());
        for edge in geometry.edges() {
            assert!(edge[0] < geometry.num_vertices());
            assert!(edge[1] < geometry.num_vertices());
            assert_ne!(edge[0], edge[1]);
        }
        for (face_geometry, face_vertices) in geometry.faces() {
            assert_eq!(face_geometry.num_vertices(), face_vertices.len());
            assert!(face_vertices.iter().all(|&v| v < geometry.num_vertices()));
        }
    }
}

#[test]
fn structured_meshes_have_expected_counts() {
    let mesh: Mesh<f64> = unit_square_quads(3);
    assert_eq!(mesh.dimension(), 2);
    assert_eq!(mesh.vertices().len(), 16);
    assert_eq!(mesh.num_elements(Region::Volume), 9);
    assert_eq!(mesh.num_elements(Region::Boundary), 12);

    let mesh: Mesh<f64> = unit_square_triangles(2);
    assert_eq!(mesh.num_elements(Region::Volume), 8);
    assert_eq!(mesh.num_elements(Region::Boundary), 8);

    let mesh: Mesh<f64> = unit_cube_hexes(2);
    assert_eq!(mesh.vertices().len(), 27);
    assert_eq!(mesh.num_elements(Region::Volume), 8);
    assert_eq!(mesh.num_elements(Region::Boundary), 24);

    let mesh: Mesh<f64> = unit_cube_tets(1);
    assert_eq!(mesh.num_elements(Region::Volume), 6);
    // Each cube side consists of two boundary triangles
    assert_eq!(mesh.num_elements(Region::Boundary), 12);

    let mesh: Mesh<f64> = unit_interval(4);
    assert_eq!(mesh.dimension(), 1);
    assert_eq!(mesh.num_elements(Region::Volume), 4);
}

#[test]
fn boundary_markers_identify_unit_square_sides() {
    let mesh: Mesh<f64> = unit_square_quads(2);
    for element in mesh.elements(Region::Boundary) {
        let expected = match element.marker {
            0 => |p: &Point3<f64>| p.x == 0.0,
            1 => |p: &Point3<f64>| p.x == 1.0,
            2 => |p: &Point3<f64>| p.y == 0.0,
            3 => |p: &Point3<f64>| p.y == 1.0,
            marker => panic!("unexpected boundary marker {}", marker),
        };
        assert!(element
            .vertices
            .iter()
            .all(|&v| expected(&mesh.vertices()[v])));
    }
    let mut tags = mesh.boundary_tags();
    tags.sort_unstable();
    assert_eq!(tags, vec![0, 1, 2, 3]);
}

#[test]
fn element_lookup_rejects_out_of_range_ids() {
    let mesh: Mesh<f64> = unit_square_quads(1);
    assert!(mesh.element(ElementId::volume(0)).is_ok());
    assert!(mesh.element(ElementId::volume(1)).is_err());
    assert!(mesh.element(ElementId::boundary(4)).is_err());
}

#[test]
fn mesh_serde_round_trip_preserves_structure() {
    let mesh: Mesh<f64> = unit_square_triangles(2);
    let json = serde_json::to_string(&mesh).unwrap();
    let restored: Mesh<f64> = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.dimension(), mesh.dimension());
    assert_eq!(restored.vertices(), mesh.vertices());
    assert_eq!(restored.elements(Region::Volume), mesh.elements(Region::Volume));
    assert_eq!(
        restored.elements(Region::Boundary),
        mesh.elements(Region::Boundary)
    );
}

#[test]
#[should_panic]
fn mesh_rejects_out_of_bounds_connectivity() {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
    ];
    let elements = vec![Element::new(GeometryType::Triangle, vec![0, 1, 3])];
    let _ = Mesh::<f64>::new(2, vertices, elements, Vec::new());
}
