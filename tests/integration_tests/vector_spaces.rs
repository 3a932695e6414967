use super::{assert_vectors_close, check_gradient, space, wiggly_vector};
use matrixcompare::assert_scalar_eq;
use std::sync::Arc;
use weakform::assembly::{FieldValue, Functional, QFunction, QFunctionOutput, QuadraturePoint};
use weakform::dual::{squared_norm, Dual};
use weakform::element::Geometry;
use weakform::mesh::procedural::{create_unit_box_uniform_hex_mesh_3d, create_unit_square_uniform_quad_mesh_2d};
use weakform::mesh::{Domain, Mesh, MeshElement};
use weakform::nalgebra::{dvector, DVector};
use weakform::space::FieldSpace;

/// Two unit squares side by side, the second rotated by half a turn.
fn two_quads_with_rotated_element() -> Arc<Mesh> {
    let vertices = vec![
        dvector![0.0, 0.0],
        dvector![1.0, 0.0],
        dvector![2.0, 0.0],
        dvector![0.0, 1.0],
        dvector![1.0, 1.0],
        dvector![2.0, 1.0],
    ];
    let elements = vec![
        MeshElement::new(Geometry::Quadrilateral, vec![0, 1, 4, 3]),
        MeshElement::new(Geometry::Quadrilateral, vec![5, 4, 1, 2]),
    ];
    Arc::new(Mesh::try_new(2, vertices, elements, vec![]).unwrap())
}

fn value_component(k: usize) -> impl Fn(&QuadraturePoint, &[FieldValue]) -> eyre::Result<QFunctionOutput> {
    move |_: &QuadraturePoint, fields: &[FieldValue]| -> eyre::Result<QFunctionOutput> {
        Ok(QFunctionOutput::scalar_source(fields[0].value()[k].clone()))
    }
}

fn derivative(_: &QuadraturePoint, fields: &[FieldValue]) -> eyre::Result<QFunctionOutput> {
    Ok(QFunctionOutput::scalar_source(fields[0].derivative()[0].clone()))
}

/// Integrals of the bilinear hat functions of the two-element mesh.
fn hat_integrals() -> DVector<f64> {
    dvector![0.25, 0.5, 0.25, 0.25, 0.5, 0.25]
}

fn residual_of(
    mesh: &Arc<Mesh>,
    trial_field: FieldSpace,
    dofs: &DVector<f64>,
    qfunction: impl QFunction + 'static,
) -> DVector<f64> {
    let test = space(mesh, FieldSpace::nodal(1));
    let trial = space(mesh, trial_field);
    let mut functional = Functional::new(test, vec![trial]).unwrap();
    functional
        .add_area_integral(&[0], qfunction, &Domain::all_elements(mesh))
        .unwrap();
    functional.evaluate(&[dofs]).unwrap()
}

#[test]
fn tangential_field_is_consistent_across_rotated_elements() {
    let mesh = two_quads_with_rotated_element();
    let tangential = space(&mesh, FieldSpace::tangential());
    // The constant field (1, 0) has unit tangential moment on every horizontal edge, oriented from the lower
    // to the higher vertex index, and zero moment on vertical edges
    let dofs = DVector::from_iterator(
        tangential.num_true_dofs(),
        tangential
            .node_positions()
            .iter()
            .map(|x| if x[0].fract() != 0.0 { 1.0 } else { 0.0 }),
    );

    let u_x = residual_of(&mesh, FieldSpace::tangential(), &dofs, value_component(0));
    assert_vectors_close(&u_x, &hat_integrals(), 1e-14);
    let u_y = residual_of(&mesh, FieldSpace::tangential(), &dofs, value_component(1));
    assert_vectors_close(&u_y, &DVector::zeros(6), 1e-14);
    // The field is curl free
    let curl = residual_of(&mesh, FieldSpace::tangential(), &dofs, derivative);
    assert_vectors_close(&curl, &DVector::zeros(6), 1e-14);
}

#[test]
fn normal_field_is_consistent_across_rotated_elements() {
    let mesh = two_quads_with_rotated_element();
    let normal = space(&mesh, FieldSpace::normal());
    // The field (x, 0) has flux x through every vertical edge, with the normal pointing in the positive
    // x-direction when the edge is traversed from the lower to the higher vertex index
    let dofs = DVector::from_iterator(
        normal.num_true_dofs(),
        normal
            .node_positions()
            .iter()
            .map(|x| if x[0].fract() == 0.0 { x[0] } else { 0.0 }),
    );

    let divergence = residual_of(&mesh, FieldSpace::normal(), &dofs, derivative);
    assert_vectors_close(&divergence, &hat_integrals(), 1e-14);
    let u_x = residual_of(&mesh, FieldSpace::normal(), &dofs, value_component(0));
    // Integral of x over [0, 2] x [0, 1]
    assert_scalar_eq!(u_x.sum(), 2.0, comp = abs, tol = 1e-14);
    let u_y = residual_of(&mesh, FieldSpace::normal(), &dofs, value_component(1));
    assert_vectors_close(&u_y, &DVector::zeros(6), 1e-14);
}

/// `curl v . curl u + v . u |u|^2`, a nonlinear curl-curl problem.
fn nonlinear_curl_curl(_: &QuadraturePoint, fields: &[FieldValue]) -> eyre::Result<QFunctionOutput> {
    let u = fields[0].value();
    let norm_squared: Dual = squared_norm(u);
    let source = u.map(|ui| &ui * &norm_squared);
    Ok(QFunctionOutput::new(source, fields[0].derivative().clone()))
}

/// `div v div u + v . u (1 + div u^2)`.
fn nonlinear_div_div(_: &QuadraturePoint, fields: &[FieldValue]) -> eyre::Result<QFunctionOutput> {
    let u = fields[0].value();
    let div = &fields[0].derivative()[0];
    let factor = 1.0 + div * div;
    let source = u.map(|ui| &ui * &factor);
    Ok(QFunctionOutput::new(source, fields[0].derivative().clone()))
}

#[test]
fn vector_valued_gradients_match_finite_differences() {
    let meshes = [
        two_quads_with_rotated_element(),
        Arc::new(create_unit_square_uniform_quad_mesh_2d(2)),
        Arc::new(create_unit_box_uniform_hex_mesh_3d(2)),
    ];
    for mesh in meshes {
        let domain = Domain::all_elements(&mesh);
        let dim = mesh.dim();

        let tangential = space(&mesh, FieldSpace::tangential());
        let mut functional = Functional::new(tangential.clone(), vec![tangential.clone()]).unwrap();
        functional
            .add_domain_integral(dim, &[0], nonlinear_curl_curl, &domain)
            .unwrap();
        let n = tangential.num_true_dofs();
        check_gradient(&mut functional, &[&wiggly_vector(n, 0.7)], 0, &wiggly_vector(n, 1.3));

        let normal = space(&mesh, FieldSpace::normal());
        let mut functional = Functional::new(normal.clone(), vec![normal.clone()]).unwrap();
        functional
            .add_domain_integral(dim, &[0], nonlinear_div_div, &domain)
            .unwrap();
        let n = normal.num_true_dofs();
        check_gradient(&mut functional, &[&wiggly_vector(n, 0.9)], 0, &wiggly_vector(n, 2.2));
    }
}

#[test]
fn mixed_tangential_and_nodal_spaces() {
    // `v (u_x + curl u)` with a nodal test space and a tangential trial space
    let coupling = |_: &QuadraturePoint, fields: &[FieldValue]| -> eyre::Result<QFunctionOutput> {
        let u = &fields[0];
        Ok(QFunctionOutput::scalar_source(&u.value()[0] + &u.derivative()[0]))
    };
    let mesh = Arc::new(create_unit_square_uniform_quad_mesh_2d(3));
    let test = space(&mesh, FieldSpace::nodal(2));
    let trial = space(&mesh, FieldSpace::tangential());
    let mut functional = Functional::new(test.clone(), vec![trial.clone()]).unwrap();
    functional
        .add_area_integral(&[0], coupling, &Domain::all_elements(&mesh))
        .unwrap();
    let n = trial.num_true_dofs();
    check_gradient(&mut functional, &[&wiggly_vector(n, 0.2)], 0, &wiggly_vector(n, 1.4));

    let (_, mut gradient) = functional
        .evaluate_and_differentiate(&[&wiggly_vector(n, 0.2)], 0)
        .unwrap();
    let jacobian = gradient.assemble().unwrap();
    assert_eq!((jacobian.nrows(), jacobian.ncols()), (test.num_true_dofs(), n));
}
