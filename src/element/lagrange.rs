use crate::element::{Entity, Geometry};
use nalgebra::{DMatrix, RealField};
use numeric_literals::replace_float_literals;

/// A node of a Lagrange element, i.e. the support point of a nodal basis function.
#[derive(Debug, Clone, PartialEq)]
pub struct LagrangeNode {
    /// The sub-entity of the element that the node belongs to.
    pub entity: Entity,
    pub reference_coords: [f64; 3],
}

/// The nodes of the Lagrange element of the given order on the given geometry.
///
/// Nodes are ordered by entity: vertices, then edge midpoints (in the order of [`Geometry::edges`]),
/// then face centers (in the order of [`Geometry::faces`]) and finally the element center.
///
/// Returns `None` if the combination of geometry and order is not supported.
/// Orders 1 and 2 are supported on all supported geometries.
pub fn lagrange_nodes(geometry: Geometry, order: usize) -> Option<Vec<LagrangeNode>> {
    if !geometry.is_supported() || !(1..=2).contains(&order) {
        return None;
    }

    let vertices = geometry.reference_vertices();
    let centroid = |local_vertices: &[usize]| {
        let mut coords = [0.0; 3];
        for &v in local_vertices {
            for d in 0..3 {
                coords[d] += vertices[v][d];
            }
        }
        coords.map(|x| x / local_vertices.len() as f64)
    };

    let mut nodes: Vec<_> = vertices
        .iter()
        .enumerate()
        .map(|(i, coords)| LagrangeNode {
            entity: Entity::Vertex(i),
            reference_coords: *coords,
        })
        .collect();

    if order == 2 {
        for (i, edge) in geometry.edges().iter().enumerate() {
            nodes.push(LagrangeNode {
                entity: Entity::Edge(i),
                reference_coords: centroid(edge),
            });
        }
        for (i, face) in geometry.faces().iter().enumerate() {
            nodes.push(LagrangeNode {
                entity: Entity::Face(i),
                reference_coords: centroid(face),
            });
        }
        if geometry.is_tensor_product() {
            let all_vertices: Vec<_> = (0..vertices.len()).collect();
            nodes.push(LagrangeNode {
                entity: Entity::Interior,
                reference_coords: centroid(&all_vertices),
            });
        }
    }

    Some(nodes)
}

/// Evaluates the one-dimensional Lagrange polynomial associated with the node at `node` in {-1, 0, 1}
/// and its derivative.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn lagrange_1d<T: RealField>(order: usize, node: i8, t: T) -> (T, T) {
    match (order, node) {
        (1, -1) => ((1.0 - t) / 2.0, -0.5),
        (1, 1) => ((1.0 + t) / 2.0, 0.5),
        (2, -1) => (t.clone() * (t.clone() - 1.0) / 2.0, t - 0.5),
        (2, 0) => (1.0 - t.clone() * t.clone(), -2.0 * t),
        (2, 1) => (t.clone() * (t.clone() + 1.0) / 2.0, t + 0.5),
        _ => unreachable!("Lagrange polynomials are only available for orders 1 and 2"),
    }
}

/// Barycentric coordinates and their (constant) reference gradients on the unit simplex.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn barycentric<T: RealField>(dim: usize, xi: &[T]) -> (Vec<T>, DMatrix<T>) {
    let mut lambda = Vec::with_capacity(dim + 1);
    lambda.push(1.0 - xi[..dim].iter().fold(T::zero(), |sum, x| sum + x.clone()));
    lambda.extend(xi[..dim].iter().cloned());

    let mut gradients = DMatrix::zeros(dim, dim + 1);
    for d in 0..dim {
        gradients[(d, 0)] = -1.0;
        gradients[(d, d + 1)] = 1.0;
    }
    (lambda, gradients)
}

/// Evaluates the Lagrange basis of the given order and its reference gradients at the reference point `xi`.
///
/// The values are returned as a `1 x n` matrix and the gradients as a `d x n` matrix, where `n` is
/// the number of nodes (see [`lagrange_nodes`]) and `d` the reference dimension.
///
/// Returns `None` if the combination of geometry and order is not supported.
///
/// # Panics
///
/// Panics if `xi` has fewer entries than the reference dimension.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn evaluate_lagrange_basis<T: RealField>(
    geometry: Geometry,
    order: usize,
    xi: &[T],
) -> Option<(DMatrix<T>, DMatrix<T>)> {
    let nodes = lagrange_nodes(geometry, order)?;
    let dim = geometry.reference_dim();
    assert!(xi.len() >= dim, "Reference point has too few coordinates");

    let n = nodes.len();
    let mut values = DMatrix::zeros(1, n);
    let mut gradients = DMatrix::zeros(dim, n);

    if geometry.is_tensor_product() {
        for (a, node) in nodes.iter().enumerate() {
            let factors: Vec<(T, T)> = (0..dim)
                .map(|d| {
                    let node_index = node.reference_coords[d].round() as i8;
                    lagrange_1d(order, node_index, xi[d].clone())
                })
                .collect();
            values[(0, a)] = factors
                .iter()
                .fold(T::one(), |product, (phi, _)| product * phi.clone());
            for d in 0..dim {
                gradients[(d, a)] = factors
                    .iter()
                    .enumerate()
                    .fold(T::one(), |product, (e, (phi, dphi))| {
                        if e == d {
                            product * dphi.clone()
                        } else {
                            product * phi.clone()
                        }
                    });
            }
        }
    } else {
        let (lambda, grad_lambda) = barycentric(dim, xi);
        for (a, node) in nodes.iter().enumerate() {
            match (order, node.entity) {
                (1, Entity::Vertex(i)) => {
                    values[(0, a)] = lambda[i].clone();
                    gradients.set_column(a, &grad_lambda.column(i));
                }
                (_, Entity::Vertex(i)) => {
                    let l = lambda[i].clone();
                    values[(0, a)] = l.clone() * (2.0 * l.clone() - 1.0);
                    gradients.set_column(a, &(grad_lambda.column(i) * (4.0 * l - 1.0)));
                }
                (_, Entity::Edge(e)) => {
                    let [i, j] = geometry.edges()[e];
                    let (li, lj) = (lambda[i].clone(), lambda[j].clone());
                    values[(0, a)] = 4.0 * li.clone() * lj.clone();
                    let gradient = (grad_lambda.column(i) * lj + grad_lambda.column(j) * li) * 4.0;
                    gradients.set_column(a, &gradient);
                }
                _ => unreachable!("Simplex Lagrange elements only have vertex and edge nodes"),
            }
        }
    }

    Some((values, gradients))
}
