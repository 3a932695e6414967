//! Basic procedural mesh generation routines.
//!
//! Boundary elements are oriented so that their normals point out of the domain, and are tagged with
//! attributes identifying the side of the box they lie on: `1`/`2` for the lower/upper `x`-side, `3`/`4`
//! for `y` and `5`/`6` for `z`.
use crate::element::Geometry;
use crate::mesh::{Mesh, MeshElement};
use nalgebra::{dvector, DVector};

/// A uniform mesh of `[a, b]` with the given number of segments.
///
/// # Panics
///
/// Panics if `cells` is zero.
pub fn create_uniform_line_mesh_1d(a: f64, b: f64, cells: usize) -> Mesh {
    assert!(cells > 0, "Must have at least one cell");
    let h = (b - a) / cells as f64;
    let vertices = (0..=cells).map(|i| dvector![a + i as f64 * h]).collect();
    let elements = (0..cells)
        .map(|i| MeshElement::new(Geometry::Segment, vec![i, i + 1]))
        .collect();
    Mesh {
        dim: 1,
        vertices,
        elements,
        boundary_elements: Vec::new(),
    }
}

struct Grid2d {
    cells: [usize; 2],
}

impl Grid2d {
    fn vertex(&self, i: usize, j: usize) -> usize {
        j * (self.cells[0] + 1) + i
    }

    fn vertices(&self, size: [f64; 2]) -> Vec<DVector<f64>> {
        let [nx, ny] = self.cells;
        let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                let x = size[0] * i as f64 / nx as f64;
                let y = size[1] * j as f64 / ny as f64;
                vertices.push(dvector![x, y]);
            }
        }
        vertices
    }

    /// Boundary segments, counter-clockwise around the rectangle.
    fn boundary(&self) -> Vec<MeshElement> {
        let [nx, ny] = self.cells;
        let v = |i, j| self.vertex(i, j);
        let segment = |a, b, attribute| MeshElement::new(Geometry::Segment, vec![a, b]).with_attribute(attribute);
        let mut boundary = Vec::new();
        for i in 0..nx {
            boundary.push(segment(v(i, 0), v(i + 1, 0), 3));
            boundary.push(segment(v(i + 1, ny), v(i, ny), 4));
        }
        for j in 0..ny {
            boundary.push(segment(v(nx, j), v(nx, j + 1), 2));
            boundary.push(segment(v(0, j + 1), v(0, j), 1));
        }
        boundary
    }
}

/// A uniform quadrilateral mesh of the rectangle `[0, size_x] x [0, size_y]`.
///
/// # Panics
///
/// Panics if any cell count is zero.
pub fn create_rectangular_uniform_quad_mesh_2d(size: [f64; 2], cells: [usize; 2]) -> Mesh {
    assert!(cells.iter().all(|&n| n > 0), "Must have at least one cell per dimension");
    let grid = Grid2d { cells };
    let v = |i, j| grid.vertex(i, j);
    let mut elements = Vec::with_capacity(cells[0] * cells[1]);
    for j in 0..cells[1] {
        for i in 0..cells[0] {
            let quad = vec![v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1)];
            elements.push(MeshElement::new(Geometry::Quadrilateral, quad));
        }
    }
    Mesh {
        dim: 2,
        vertices: grid.vertices(size),
        elements,
        boundary_elements: grid.boundary(),
    }
}

/// A uniform triangle mesh of the rectangle `[0, size_x] x [0, size_y]`, obtained by splitting every
/// cell along its diagonal.
///
/// # Panics
///
/// Panics if any cell count is zero.
pub fn create_rectangular_uniform_tri_mesh_2d(size: [f64; 2], cells: [usize; 2]) -> Mesh {
    assert!(cells.iter().all(|&n| n > 0), "Must have at least one cell per dimension");
    let grid = Grid2d { cells };
    let v = |i, j| grid.vertex(i, j);
    let mut elements = Vec::with_capacity(2 * cells[0] * cells[1]);
    for j in 0..cells[1] {
        for i in 0..cells[0] {
            let (a, b, c, d) = (v(i, j), v(i + 1, j), v(i + 1, j + 1), v(i, j + 1));
            elements.push(MeshElement::new(Geometry::Triangle, vec![a, b, c]));
            elements.push(MeshElement::new(Geometry::Triangle, vec![a, c, d]));
        }
    }
    Mesh {
        dim: 2,
        vertices: grid.vertices(size),
        elements,
        boundary_elements: grid.boundary(),
    }
}

pub fn create_unit_square_uniform_quad_mesh_2d(cells_per_dim: usize) -> Mesh {
    create_rectangular_uniform_quad_mesh_2d([1.0, 1.0], [cells_per_dim, cells_per_dim])
}

pub fn create_unit_square_uniform_tri_mesh_2d(cells_per_dim: usize) -> Mesh {
    create_rectangular_uniform_tri_mesh_2d([1.0, 1.0], [cells_per_dim, cells_per_dim])
}

struct Grid3d {
    cells: [usize; 3],
}

impl Grid3d {
    fn vertex(&self, i: usize, j: usize, k: usize) -> usize {
        let [nx, ny, _] = self.cells;
        (k * (ny + 1) + j) * (nx + 1) + i
    }

    fn vertices(&self, size: [f64; 3]) -> Vec<DVector<f64>> {
        let [nx, ny, nz] = self.cells;
        let mut vertices = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    let x = size[0] * i as f64 / nx as f64;
                    let y = size[1] * j as f64 / ny as f64;
                    let z = size[2] * k as f64 / nz as f64;
                    vertices.push(dvector![x, y, z]);
                }
            }
        }
        vertices
    }

    /// Outward-oriented boundary quadrilaterals as vertex cycles, together with their attributes.
    ///
    /// Every cycle starts at the corner with the smallest grid coordinates, so that the third vertex
    /// is the diagonally opposite corner.
    fn boundary_cycles(&self) -> Vec<([usize; 4], usize)> {
        let [nx, ny, nz] = self.cells;
        let v = |i, j, k| self.vertex(i, j, k);
        let mut cycles = Vec::new();
        for k in 0..nz {
            for j in 0..ny {
                cycles.push(([v(0, j, k), v(0, j, k + 1), v(0, j + 1, k + 1), v(0, j + 1, k)], 1));
                cycles.push(([v(nx, j, k), v(nx, j + 1, k), v(nx, j + 1, k + 1), v(nx, j, k + 1)], 2));
            }
        }
        for k in 0..nz {
            for i in 0..nx {
                cycles.push(([v(i, 0, k), v(i + 1, 0, k), v(i + 1, 0, k + 1), v(i, 0, k + 1)], 3));
                cycles.push(([v(i, ny, k), v(i, ny, k + 1), v(i + 1, ny, k + 1), v(i + 1, ny, k)], 4));
            }
        }
        for j in 0..ny {
            for i in 0..nx {
                cycles.push(([v(i, j, 0), v(i, j + 1, 0), v(i + 1, j + 1, 0), v(i + 1, j, 0)], 5));
                cycles.push(([v(i, j, nz), v(i + 1, j, nz), v(i + 1, j + 1, nz), v(i, j + 1, nz)], 6));
            }
        }
        cycles
    }
}

/// A uniform hexahedral mesh of the box `[0, size_x] x [0, size_y] x [0, size_z]`.
///
/// # Panics
///
/// Panics if any cell count is zero.
pub fn create_rectangular_uniform_hex_mesh_3d(size: [f64; 3], cells: [usize; 3]) -> Mesh {
    assert!(cells.iter().all(|&n| n > 0), "Must have at least one cell per dimension");
    let grid = Grid3d { cells };
    let v = |i, j, k| grid.vertex(i, j, k);
    let mut elements = Vec::new();
    for k in 0..cells[2] {
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                #[rustfmt::skip]
                let hex = vec![
                    v(i, j, k), v(i + 1, j, k), v(i + 1, j + 1, k), v(i, j + 1, k),
                    v(i, j, k + 1), v(i + 1, j, k + 1), v(i + 1, j + 1, k + 1), v(i, j + 1, k + 1),
                ];
                elements.push(MeshElement::new(Geometry::Hexahedron, hex));
            }
        }
    }
    let boundary_elements = grid
        .boundary_cycles()
        .into_iter()
        .map(|(cycle, attribute)| MeshElement::new(Geometry::Quadrilateral, cycle.to_vec()).with_attribute(attribute))
        .collect();
    Mesh {
        dim: 3,
        vertices: grid.vertices(size),
        elements,
        boundary_elements,
    }
}

/// A uniform tetrahedral mesh of the box `[0, size_x] x [0, size_y] x [0, size_z]`.
///
/// Every cell is split into six tetrahedra sharing the cell diagonal (Kuhn subdivision), which is
/// conforming across cells.
///
/// # Panics
///
/// Panics if any cell count is zero.
pub fn create_rectangular_uniform_tet_mesh_3d(size: [f64; 3], cells: [usize; 3]) -> Mesh {
    assert!(cells.iter().all(|&n| n > 0), "Must have at least one cell per dimension");
    let grid = Grid3d { cells };
    // Axis permutations, paired with whether they are odd
    let permutations = [
        ([0, 1, 2], false),
        ([1, 2, 0], false),
        ([2, 0, 1], false),
        ([0, 2, 1], true),
        ([1, 0, 2], true),
        ([2, 1, 0], true),
    ];

    let mut elements = Vec::new();
    for k in 0..cells[2] {
        for j in 0..cells[1] {
            for i in 0..cells[0] {
                for (permutation, odd) in &permutations {
                    let mut corner = [i, j, k];
                    let mut tet = vec![grid.vertex(i, j, k)];
                    for &axis in permutation {
                        corner[axis] += 1;
                        tet.push(grid.vertex(corner[0], corner[1], corner[2]));
                    }
                    if *odd {
                        tet.swap(1, 2);
                    }
                    elements.push(MeshElement::new(Geometry::Tetrahedron, tet));
                }
            }
        }
    }

    let boundary_elements = grid
        .boundary_cycles()
        .into_iter()
        .flat_map(|([a, b, c, d], attribute)| {
            [
                MeshElement::new(Geometry::Triangle, vec![a, b, c]).with_attribute(attribute),
                MeshElement::new(Geometry::Triangle, vec![a, c, d]).with_attribute(attribute),
            ]
        })
        .collect();

    Mesh {
        dim: 3,
        vertices: grid.vertices(size),
        elements,
        boundary_elements,
    }
}

pub fn create_unit_box_uniform_hex_mesh_3d(cells_per_dim: usize) -> Mesh {
    create_rectangular_uniform_hex_mesh_3d([1.0, 1.0, 1.0], [cells_per_dim; 3])
}

pub fn create_unit_box_uniform_tet_mesh_3d(cells_per_dim: usize) -> Mesh {
    create_rectangular_uniform_tet_mesh_3d([1.0, 1.0, 1.0], [cells_per_dim; 3])
}
