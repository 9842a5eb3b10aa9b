//! Procedurally generated structured meshes for tests, examples and benchmarks.
//!
//! Boundary elements are derived from the volume elements: an entity that belongs to
//! exactly one element is a boundary entity. Boundary markers identify the sides of
//! the unit square/cube: `0`/`1` for `x = 0`/`x = 1`, `2`/`3` for `y`, `4`/`5` for `z`.

use crate::mesh::{Element, GeometryType, Mesh};
use crate::Real;
use nalgebra::Point3;
use std::collections::BTreeMap;

/// A uniform mesh of the unit interval with `n` segments.
pub fn unit_interval<T: Real>(n: usize) -> Mesh<T> {
    assert!(n > 0, "the mesh must have at least one element");
    let h = 1.0 / n as f64;
    let vertices = (0..=n)
        .map(|i| Point3::new(nalgebra::convert(i as f64 * h), T::zero(), T::zero()))
        .collect();
    let elements = (0..n)
        .map(|i| Element::new(GeometryType::Segment, vec![i, i + 1]))
        .collect();
    Mesh::new(1, vertices, elements, Vec::new()).expect("structured meshes are valid")
}

/// A uniform `n x n` quadrilateral mesh of the unit square.
pub fn unit_square_quads<T: Real>(n: usize) -> Mesh<T> {
    assert!(n > 0, "the mesh must have at least one element");
    let vertices = grid_vertices_2d(n);
    let vertex = |i: usize, j: usize| i * (n + 1) + j;

    let mut elements = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            elements.push(Element::new(
                GeometryType::Quadrilateral,
                vec![
                    vertex(i, j),
                    vertex(i + 1, j),
                    vertex(i + 1, j + 1),
                    vertex(i, j + 1),
                ],
            ));
        }
    }
    build_mesh(2, vertices, elements)
}

/// A uniform triangle mesh of the unit square, two triangles per grid cell.
pub fn unit_square_triangles<T: Real>(n: usize) -> Mesh<T> {
    assert!(n > 0, "the mesh must have at least one element");
    let vertices = grid_vertices_2d(n);
    let vertex = |i: usize, j: usize| i * (n + 1) + j;

    let mut elements = Vec::with_capacity(2 * n * n);
    for i in 0..n {
        for j in 0..n {
            // Split along the cell diagonal from (i, j) to (i + 1, j + 1)
            elements.push(Element::new(
                GeometryType::Triangle,
                vec![vertex(i, j), vertex(i + 1, j), vertex(i + 1, j + 1)],
            ));
            elements.push(Element::new(
                GeometryType::Triangle,
                vec![vertex(i, j), vertex(i + 1, j + 1), vertex(i, j + 1)],
            ));
        }
    }
    build_mesh(2, vertices, elements)
}

/// A uniform `n x n x n` hexahedral mesh of the unit cube.
pub fn unit_cube_hexes<T: Real>(n: usize) -> Mesh<T> {
    assert!(n > 0, "the mesh must have at least one element");
    let vertices = grid_vertices_3d(n);
    let vertex = |i: usize, j: usize, k: usize| (i * (n + 1) + j) * (n + 1) + k;

    let mut elements = Vec::with_capacity(n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                elements.push(Element::new(
                    GeometryType::Hexahedron,
                    vec![
                        vertex(i, j, k),
                        vertex(i + 1, j, k),
                        vertex(i + 1, j + 1, k),
                        vertex(i, j + 1, k),
                        vertex(i, j, k + 1),
                        vertex(i + 1, j, k + 1),
                        vertex(i + 1, j + 1, k + 1),
                        vertex(i, j + 1, k + 1),
                    ],
                ));
            }
        }
    }
    build_mesh(3, vertices, elements)
}

/// A uniform tetrahedral mesh of the unit cube, six tetrahedra per grid cell.
///
/// Uses the Kuhn subdivision, which is conforming across neighboring cells.
pub fn unit_cube_tets<T: Real>(n: usize) -> Mesh<T> {
    assert!(n > 0, "the mesh must have at least one element");
    let vertices = grid_vertices_3d(n);
    let vertex = |i: usize, j: usize, k: usize| (i * (n + 1) + j) * (n + 1) + k;

    // The six axis permutations define six paths from the low corner to the high
    // corner of a cell; each path spans one tetrahedron
    const PERMUTATIONS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    let mut elements = Vec::with_capacity(6 * n * n * n);
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                for permutation in &PERMUTATIONS {
                    let mut corner = [i, j, k];
                    let mut tet = vec![vertex(corner[0], corner[1], corner[2])];
                    for &axis in permutation {
                        corner[axis] += 1;
                        tet.push(vertex(corner[0], corner[1], corner[2]));
                    }
                    elements.push(Element::new(GeometryType::Tetrahedron, tet));
                }
            }
        }
    }
    build_mesh(3, vertices, elements)
}

fn grid_vertices_2d<T: Real>(n: usize) -> Vec<Point3<T>> {
    let h = 1.0 / n as f64;
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    for i in 0..=n {
        for j in 0..=n {
            vertices.push(Point3::new(
                nalgebra::convert(i as f64 * h),
                nalgebra::convert(j as f64 * h),
                T::zero(),
            ));
        }
    }
    vertices
}

fn grid_vertices_3d<T: Real>(n: usize) -> Vec<Point3<T>> {
    let h = 1.0 / n as f64;
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1) * (n + 1));
    for i in 0..=n {
        for j in 0..=n {
            for k in 0..=n {
                vertices.push(Point3::new(
                    nalgebra::convert(i as f64 * h),
                    nalgebra::convert(j as f64 * h),
                    nalgebra::convert(k as f64 * h),
                ));
            }
        }
    }
    vertices
}

fn build_mesh<T: Real>(
    dimension: usize,
    vertices: Vec<Point3<T>>,
    elements: Vec<Element>,
) -> Mesh<T> {
    let boundary = derive_boundary(dimension, &vertices, &elements);
    Mesh::new(dimension, vertices, elements, boundary).expect("structured meshes are valid")
}

/// Extracts boundary elements: sub-entities of codimension one that belong to exactly
/// one volume element, tagged by the unit-box side they lie on.
fn derive_boundary<T: Real>(
    dimension: usize,
    vertices: &[Point3<T>],
    elements: &[Element],
) -> Vec<Element> {
    // Count occurrences keyed by sorted vertex set, keeping one representative in
    // element-local orientation. BTreeMap keeps the boundary ordering deterministic.
    let mut counts: BTreeMap<Vec<usize>, (GeometryType, Vec<usize>, usize)> = BTreeMap::new();

    for element in elements {
        let sub_entities: Vec<(GeometryType, Vec<usize>)> = if dimension == 2 {
            element
                .geometry
                .edges()
                .iter()
                .map(|&[a, b]| {
                    (
                        GeometryType::Segment,
                        vec![element.vertices[a], element.vertices[b]],
                    )
                })
                .collect()
        } else {
            element
                .geometry
                .faces()
                .iter()
                .map(|(geometry, local)| {
                    (
                        *geometry,
                        local.iter().map(|&v| element.vertices[v]).collect(),
                    )
                })
                .collect()
        };

        for (geometry, entity_vertices) in sub_entities {
            let mut key = entity_vertices.clone();
            key.sort_unstable();
            counts
                .entry(key)
                .and_modify(|(_, _, count)| *count += 1)
                .or_insert((geometry, entity_vertices, 1));
        }
    }

    counts
        .into_values()
        .filter(|(_, _, count)| *count == 1)
        .map(|(geometry, entity_vertices, _)| {
            let marker = side_marker(vertices, &entity_vertices);
            Element::new(geometry, entity_vertices).with_marker(marker)
        })
        .collect()
}

/// The unit-box side a boundary entity lies on, determined from its vertex coordinates.
fn side_marker<T: Real>(vertices: &[Point3<T>], entity: &[usize]) -> usize {
    let tol: T = nalgebra::convert(1.0e-12);
    for axis in 0..3 {
        for (side, value) in [(0usize, T::zero()), (1usize, T::one())] {
            if entity
                .iter()
                .all(|&v| (vertices[v][axis] - value).abs() <= tol)
            {
                return 2 * axis + side;
            }
        }
    }
    unreachable!("boundary entities of the unit box lie on one of its sides")
}
