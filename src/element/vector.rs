//! Lowest-order vector-valued bases on quadrilaterals and hexahedra.
//!
//! Tangential (Nédélec) basis functions are associated with the edges returned by [`Geometry::edges`].
//! The tangential moment of each function along its own edge, traversed from the first to the second
//! vertex, is one. Normal (Raviart-Thomas) basis functions are associated with the facets returned by
//! [`normal_facets`], and the flux of each function through its own facet, in the direction of the
//! right-hand normal of the facet cycle, is one.
use crate::element::{Geometry, ReferenceBasis};
use nalgebra::{DMatrix, Vector3};

/// Facets of quadrilaterals (edges) and hexahedra (faces) as vertex cycles.
///
/// The right-hand normal of every cycle points in the positive direction of a reference axis. For
/// quadrilateral edges, the right-hand normal of the tangent `t` is `(t_y, -t_x)`.
pub fn normal_facets(geometry: Geometry) -> &'static [&'static [usize]] {
    match geometry {
        Geometry::Quadrilateral => &[&[0, 3], &[1, 2], &[1, 0], &[2, 3]],
        Geometry::Hexahedron => &[
            &[0, 3, 7, 4],
            &[1, 2, 6, 5],
            &[0, 4, 5, 1],
            &[3, 7, 6, 2],
            &[0, 1, 2, 3],
            &[4, 5, 6, 7],
        ],
        _ => &[],
    }
}

fn is_vector_geometry(geometry: Geometry) -> bool {
    matches!(geometry, Geometry::Quadrilateral | Geometry::Hexahedron)
}

/// Returns the axis along which the given reference coordinates differ.
fn varying_axis(a: &[f64; 3], b: &[f64; 3], dim: usize) -> usize {
    (0..dim)
        .find(|&d| a[d] != b[d])
        .expect("Edge vertices must differ in exactly one coordinate")
}

/// Returns the axis along which all the given reference coordinates coincide, and the common coordinate.
fn constant_axis(vertices: &[[f64; 3]], facet: &[usize], dim: usize) -> (usize, f64) {
    let first = vertices[facet[0]];
    let axis = (0..dim)
        .find(|&d| facet.iter().all(|&v| vertices[v][d] == first[d]))
        .expect("Facet vertices must share one coordinate");
    (axis, first[axis])
}

/// Evaluates the lowest-order Nédélec basis and its reference curl at `xi`.
///
/// Values are returned as a `d x n` matrix. The curl is a `1 x n` matrix in two dimensions and a `3 x n`
/// matrix in three dimensions. Returns `None` for geometries other than quadrilaterals and hexahedra.
pub fn evaluate_nedelec_basis(geometry: Geometry, xi: &[f64]) -> Option<ReferenceBasis> {
    if !is_vector_geometry(geometry) {
        return None;
    }
    let dim = geometry.reference_dim();
    let vertices = geometry.reference_vertices();
    let edges = geometry.edges();
    let scale = 1.0 / (1 << dim) as f64;
    let curl_dim = if dim == 2 { 1 } else { 3 };

    let mut values = DMatrix::zeros(dim, edges.len());
    let mut curls = DMatrix::zeros(curl_dim, edges.len());
    for (a, &[start, end]) in edges.iter().enumerate() {
        let axis = varying_axis(&vertices[start], &vertices[end], dim);
        let position = vertices[start];
        // The function is f(xi) e_axis, with f a product of linear factors in the remaining coordinates
        let factor = |d: usize| 1.0 + position[d] * xi[d];
        let others: Vec<usize> = (0..dim).filter(|&d| d != axis).collect();
        values[(axis, a)] = scale * others.iter().map(|&d| factor(d)).product::<f64>();

        let mut grad_f = Vector3::zeros();
        for &d in &others {
            let rest: f64 = others
                .iter()
                .filter(|&&e| e != d)
                .map(|&e| factor(e))
                .product();
            grad_f[d] = scale * position[d] * rest;
        }

        if dim == 2 {
            // curl (f e_x) = -df/dy, curl (f e_y) = df/dx
            curls[(0, a)] = if axis == 0 { -grad_f[1] } else { grad_f[0] };
        } else {
            let mut e = Vector3::zeros();
            e[axis] = 1.0;
            let curl = grad_f.cross(&e);
            curls.set_column(a, &curl);
        }
    }

    Some(ReferenceBasis {
        values,
        derivatives: curls,
    })
}

/// Evaluates the lowest-order Raviart-Thomas basis and its reference divergence at `xi`.
///
/// Values are returned as a `d x n` matrix and the divergence as a `1 x n` matrix.
/// Returns `None` for geometries other than quadrilaterals and hexahedra.
pub fn evaluate_raviart_thomas_basis(geometry: Geometry, xi: &[f64]) -> Option<ReferenceBasis> {
    if !is_vector_geometry(geometry) {
        return None;
    }
    let dim = geometry.reference_dim();
    let vertices = geometry.reference_vertices();
    let facets = normal_facets(geometry);
    let scale = 1.0 / (1 << dim) as f64;

    let mut values = DMatrix::zeros(dim, facets.len());
    let mut divergences = DMatrix::zeros(1, facets.len());
    for (a, facet) in facets.iter().enumerate() {
        let (axis, side) = constant_axis(vertices, facet, dim);
        values[(axis, a)] = scale * (1.0 + side * xi[axis]);
        divergences[(0, a)] = scale * side;
    }

    Some(ReferenceBasis {
        values,
        derivatives: divergences,
    })
}
