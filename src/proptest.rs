//! Strategies for property-based testing with `proptest`.
use crate::dual::Dual;
use crate::mesh::procedural::{create_unit_square_uniform_quad_mesh_2d, create_unit_square_uniform_tri_mesh_2d};
use crate::mesh::Mesh;
use crate::space::FieldSpace;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::DVector;

/// Vectors of the given length with entries in a moderate range.
pub fn vector(len: usize) -> impl Strategy<Value = DVector<f64>> {
    // Keep entries small, otherwise products of several entries quickly lose all relative precision
    vec(-10.0..10.0, len).prop_map(DVector::from_vec)
}

/// Dual numbers with the given number of partial derivatives.
pub fn dual(num_partials: usize) -> impl Strategy<Value = Dual> {
    (-10.0..10.0, vector(num_partials)).prop_map(|(value, partials)| Dual::from_parts(value, partials))
}

/// Dual numbers with strictly positive values, suitable for `ln`, `sqrt` and division.
pub fn positive_dual(num_partials: usize) -> impl Strategy<Value = Dual> {
    (0.1..10.0, vector(num_partials)).prop_map(|(value, partials)| Dual::from_parts(value, partials))
}

/// Nodal field spaces of order 1 or 2 with up to 3 components.
pub fn nodal_field_space() -> impl Strategy<Value = FieldSpace> {
    (1..=2usize, 1..=3usize).prop_map(|(order, components)| FieldSpace::nodal(order).with_components(components))
}

fn perturb_interior_vertices(mut mesh: Mesh, cells_per_dim: usize, offsets: Vec<[f64; 2]>) -> Mesh {
    let h = 1.0 / cells_per_dim as f64;
    let is_interior = |x: f64| x > 0.5 * h && x < 1.0 - 0.5 * h;
    for (vertex, offset) in mesh.vertices_mut().iter_mut().zip(offsets) {
        if is_interior(vertex[0]) && is_interior(vertex[1]) {
            vertex[0] += offset[0] * h;
            vertex[1] += offset[1] * h;
        }
    }
    mesh
}

/// Quadrilateral meshes of the unit square with randomly displaced interior vertices.
///
/// Vertices move by at most a fifth of the cell size in each direction, so all cells remain convex.
pub fn perturbed_unit_square_quad_mesh(cells_per_dim: usize) -> impl Strategy<Value = Mesh> {
    let num_vertices = (cells_per_dim + 1) * (cells_per_dim + 1);
    vec([-0.2..0.2, -0.2..0.2], num_vertices).prop_map(move |offsets| {
        perturb_interior_vertices(create_unit_square_uniform_quad_mesh_2d(cells_per_dim), cells_per_dim, offsets)
    })
}

/// Triangle meshes of the unit square with randomly displaced interior vertices.
pub fn perturbed_unit_square_tri_mesh(cells_per_dim: usize) -> impl Strategy<Value = Mesh> {
    let num_vertices = (cells_per_dim + 1) * (cells_per_dim + 1);
    vec([-0.2..0.2, -0.2..0.2], num_vertices).prop_map(move |offsets| {
        perturb_interior_vertices(create_unit_square_uniform_tri_mesh_2d(cells_per_dim), cells_per_dim, offsets)
    })
}
