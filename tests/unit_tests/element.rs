use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use weakform::element::{
    evaluate_lagrange_basis, evaluate_nedelec_basis, evaluate_raviart_thomas_basis, evaluate_reference_basis,
    lagrange_nodes, Geometry,
};
use weakform::nalgebra::DMatrix;
use weakform::space::FieldSpace;
use weakform::ConfigurationError;

const GEOMETRIES: [Geometry; 5] = [
    Geometry::Segment,
    Geometry::Triangle,
    Geometry::Quadrilateral,
    Geometry::Tetrahedron,
    Geometry::Hexahedron,
];

/// An arbitrary point in the interior of the reference domain of every supported geometry.
fn interior_point(geometry: Geometry) -> Vec<f64> {
    let xi = if geometry.is_simplex() {
        [0.2, 0.15, 0.3]
    } else {
        [0.3, -0.4, 0.1]
    };
    xi[..geometry.reference_dim()].to_vec()
}

#[test]
fn lagrange_node_counts() {
    let count = |geometry, order| lagrange_nodes(geometry, order).unwrap().len();
    assert_eq!(count(Geometry::Segment, 1), 2);
    assert_eq!(count(Geometry::Segment, 2), 3);
    assert_eq!(count(Geometry::Triangle, 2), 6);
    assert_eq!(count(Geometry::Quadrilateral, 2), 9);
    assert_eq!(count(Geometry::Tetrahedron, 2), 10);
    assert_eq!(count(Geometry::Hexahedron, 1), 8);
    assert_eq!(count(Geometry::Hexahedron, 2), 27);
    assert!(lagrange_nodes(Geometry::Triangle, 3).is_none());
    assert!(lagrange_nodes(Geometry::Wedge, 1).is_none());
}

#[test]
fn lagrange_basis_is_nodal() {
    for geometry in GEOMETRIES {
        for order in 1..=2 {
            let nodes = lagrange_nodes(geometry, order).unwrap();
            for (b, node) in nodes.iter().enumerate() {
                let (values, _) = evaluate_lagrange_basis(geometry, order, &node.reference_coords).unwrap();
                for a in 0..nodes.len() {
                    let expected = if a == b { 1.0 } else { 0.0 };
                    assert_scalar_eq!(values[(0, a)], expected, comp = abs, tol = 1e-12);
                }
            }
        }
    }
}

#[test]
fn lagrange_basis_partition_of_unity() {
    for geometry in GEOMETRIES {
        for order in 1..=2 {
            let xi = interior_point(geometry);
            let (values, gradients) = evaluate_lagrange_basis(geometry, order, &xi).unwrap();
            assert_scalar_eq!(values.sum(), 1.0, comp = abs, tol = 1e-12);
            for d in 0..geometry.reference_dim() {
                assert_scalar_eq!(gradients.row(d).sum(), 0.0, comp = abs, tol = 1e-12);
            }
        }
    }
}

#[test]
fn lagrange_gradients_agree_with_finite_differences() {
    let h = 1e-6;
    for geometry in GEOMETRIES {
        for order in 1..=2 {
            let xi = interior_point(geometry);
            let (_, gradients) = evaluate_lagrange_basis(geometry, order, &xi).unwrap();
            for d in 0..geometry.reference_dim() {
                let mut plus = xi.clone();
                let mut minus = xi.clone();
                plus[d] += h;
                minus[d] -= h;
                let (v_plus, _) = evaluate_lagrange_basis(geometry, order, &plus).unwrap();
                let (v_minus, _) = evaluate_lagrange_basis(geometry, order, &minus).unwrap();
                let fd = (v_plus - v_minus) / (2.0 * h);
                assert_matrix_eq!(gradients.rows(d, 1).clone_owned(), fd, comp = abs, tol = 1e-8);
            }
        }
    }
}

/// Partial derivative of the reference basis values with respect to reference coordinate `d`.
fn value_derivative(evaluate: impl Fn(&[f64]) -> DMatrix<f64>, xi: &[f64], d: usize) -> DMatrix<f64> {
    let h = 1e-6;
    let mut plus = xi.to_vec();
    let mut minus = xi.to_vec();
    plus[d] += h;
    minus[d] -= h;
    (evaluate(&plus) - evaluate(&minus)) / (2.0 * h)
}

#[test]
fn nedelec_curl_agrees_with_finite_differences() {
    let quad_values = |xi: &[f64]| evaluate_nedelec_basis(Geometry::Quadrilateral, xi).unwrap().values;
    let xi = [0.3, -0.4];
    let basis = evaluate_nedelec_basis(Geometry::Quadrilateral, &xi).unwrap();
    assert_eq!(basis.values.shape(), (2, 4));
    let dx = value_derivative(quad_values, &xi, 0);
    let dy = value_derivative(quad_values, &xi, 1);
    let curl = dx.rows(1, 1) - dy.rows(0, 1);
    assert_matrix_eq!(basis.derivatives, curl, comp = abs, tol = 1e-8);

    let hex_values = |xi: &[f64]| evaluate_nedelec_basis(Geometry::Hexahedron, xi).unwrap().values;
    let xi = [0.3, -0.4, 0.1];
    let basis = evaluate_nedelec_basis(Geometry::Hexahedron, &xi).unwrap();
    assert_eq!(basis.values.shape(), (3, 12));
    let d: Vec<_> = (0..3).map(|k| value_derivative(hex_values, &xi, k)).collect();
    let component = |k: usize, i: usize| d[k].rows(i, 1).into_owned();
    let curl_x = component(1, 2) - component(2, 1);
    let curl_y = component(2, 0) - component(0, 2);
    let curl_z = component(0, 1) - component(1, 0);
    assert_matrix_eq!(basis.derivatives.rows(0, 1).clone_owned(), curl_x, comp = abs, tol = 1e-8);
    assert_matrix_eq!(basis.derivatives.rows(1, 1).clone_owned(), curl_y, comp = abs, tol = 1e-8);
    assert_matrix_eq!(basis.derivatives.rows(2, 1).clone_owned(), curl_z, comp = abs, tol = 1e-8);
}

#[test]
fn raviart_thomas_divergence_agrees_with_finite_differences() {
    for (geometry, xi) in [
        (Geometry::Quadrilateral, vec![0.3, -0.4]),
        (Geometry::Hexahedron, vec![0.3, -0.4, 0.1]),
    ] {
        let values = |xi: &[f64]| evaluate_raviart_thomas_basis(geometry, xi).unwrap().values;
        let basis = evaluate_raviart_thomas_basis(geometry, &xi).unwrap();
        let dim = geometry.reference_dim();
        let mut divergence = DMatrix::zeros(1, basis.values.ncols());
        for k in 0..dim {
            divergence += value_derivative(values, &xi, k).rows(k, 1);
        }
        assert_matrix_eq!(basis.derivatives, divergence, comp = abs, tol = 1e-8);
    }
}

#[test]
fn vector_bases_are_unsupported_on_simplices() {
    assert!(evaluate_nedelec_basis(Geometry::Triangle, &[0.2, 0.2]).is_none());
    assert!(evaluate_raviart_thomas_basis(Geometry::Tetrahedron, &[0.2, 0.2, 0.2]).is_none());

    let result = evaluate_reference_basis(&FieldSpace::tangential(), Geometry::Triangle, &[0.2, 0.2]);
    assert_eq!(
        result,
        Err(ConfigurationError::UnsupportedSpace {
            space: FieldSpace::tangential(),
            geometry: Geometry::Triangle
        })
    );

    let result = evaluate_reference_basis(&FieldSpace::nodal(1), Geometry::Wedge, &[0.2, 0.2, 0.2]);
    assert_eq!(result, Err(ConfigurationError::UnsupportedGeometry(Geometry::Wedge)));
}
