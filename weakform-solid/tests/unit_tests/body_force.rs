use matrixcompare::assert_matrix_eq;
use weakform::assembly::{QFunction, QuadraturePoint};
use weakform::nalgebra::{dvector, DVector};
use weakform_solid::BodyForce;

#[test]
fn gravity_points_along_last_axis() {
    let gravity = BodyForce::gravity(2.0, 3, 9.81);
    assert_eq!(gravity.density(), 2.0);
    assert_eq!(gravity.acceleration(), &dvector![0.0, 0.0, -9.81]);
    assert_matrix_eq!(gravity.force_density(), dvector![0.0, 0.0, -19.62], comp = abs, tol = 1e-14);
}

#[test]
fn body_force_is_a_constant_source() {
    let force = BodyForce::new(0.5, dvector![4.0, -2.0]);
    let point = QuadraturePoint {
        coordinates: DVector::zeros(2),
        normal: None,
        element: 0,
        index: 0,
    };
    let output = force.evaluate(&point, &[]).unwrap();
    assert_eq!(output.flux().len(), 0);
    let source = output.source();
    assert_eq!(source.len(), 2);
    assert_eq!(source[0].value(), -2.0);
    assert_eq!(source[1].value(), 1.0);
    assert!(source.iter().all(|s| s.is_constant()));
}
