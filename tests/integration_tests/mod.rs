use std::sync::Arc;
use weakform::assembly::{FieldValue, Functional, QFunctionOutput, QuadraturePoint};
use weakform::dual::{scale, Dual};
use weakform::mesh::Mesh;
use weakform::nalgebra::{DMatrix, DVector};
use weakform::space::{FieldSpace, FiniteElementSpace};

mod elasticity;
mod vector_spaces;

pub fn space(mesh: &Arc<Mesh>, field: FieldSpace) -> Arc<FiniteElementSpace> {
    Arc::new(FiniteElementSpace::new(mesh.clone(), field).unwrap())
}

/// `v u` for a field `u` of any shape matching the test field.
pub fn mass(_: &QuadraturePoint, u: &[FieldValue]) -> eyre::Result<QFunctionOutput> {
    Ok(QFunctionOutput::from_source(u[0].value().clone()))
}

/// `grad v : grad u`.
pub fn diffusion(_: &QuadraturePoint, u: &[FieldValue]) -> eyre::Result<QFunctionOutput> {
    Ok(QFunctionOutput::from_flux(u[0].gradient().clone()))
}

/// `v` for a scalar test field, independent of any trial field.
pub fn unit_source(_: &QuadraturePoint, _: &[FieldValue]) -> eyre::Result<QFunctionOutput> {
    Ok(QFunctionOutput::scalar_source(Dual::constant(1.0)))
}

/// `grad v . (1 + u^2) grad u + v (sin(u) + u^3)`.
pub fn nonlinear_diffusion(_: &QuadraturePoint, u: &[FieldValue]) -> eyre::Result<QFunctionOutput> {
    let value = u[0].scalar();
    let coefficient = 1.0 + value * value;
    let flux = scale(u[0].gradient(), &coefficient);
    let source = value.sin() + &(value * value) * value;
    Ok(QFunctionOutput::new(DVector::from_element(1, source), flux))
}

pub fn is_interior(x: &DVector<f64>) -> bool {
    x.iter().all(|&xi| xi > 1e-12 && xi < 1.0 - 1e-12)
}

/// A deterministic, non-trivial vector.
pub fn wiggly_vector(len: usize, frequency: f64) -> DVector<f64> {
    DVector::from_fn(len, |i, _| (frequency * (i as f64 + 1.0)).sin())
}

pub fn assert_vectors_close(actual: &DVector<f64>, expected: &DVector<f64>, tol: f64) {
    let error = (actual - expected).norm();
    assert!(
        error <= tol * (1.0 + expected.norm()),
        "Vectors differ by {error:e}.\nActual: {actual}\nExpected: {expected}"
    );
}

/// Central finite difference of the residual in the direction of `direction`, applied to trial space `wrt`.
pub fn finite_difference(
    functional: &mut Functional,
    inputs: &[&DVector<f64>],
    wrt: usize,
    direction: &DVector<f64>,
) -> DVector<f64> {
    let h = 1e-6;
    let mut evaluate_shifted = |shift: f64| {
        let mut shifted: Vec<DVector<f64>> = inputs.iter().map(|&input| input.clone()).collect();
        shifted[wrt].axpy(shift, direction, 1.0);
        let shifted_refs: Vec<&DVector<f64>> = shifted.iter().collect();
        functional.evaluate(&shifted_refs).unwrap()
    };
    let plus = evaluate_shifted(h);
    let minus = evaluate_shifted(-h);
    (plus - minus) / (2.0 * h)
}

/// Checks the directional derivative of the residual against finite differences, and the assembled Jacobian
/// against the matrix-free directional derivative.
pub fn check_gradient(functional: &mut Functional, inputs: &[&DVector<f64>], wrt: usize, direction: &DVector<f64>) {
    let expected = finite_difference(functional, inputs, wrt, direction);
    let (_, mut gradient) = functional.evaluate_and_differentiate(inputs, wrt).unwrap();
    let applied = gradient.apply_to(direction).unwrap();
    assert_vectors_close(&applied, &expected, 1e-6);

    let assembled = gradient.assemble().unwrap();
    let product = DMatrix::from(&assembled) * direction;
    assert_vectors_close(&product, &applied, 1e-12);
}
