use eyre::Result;
use serde::{Deserialize, Serialize};
use weakform::assembly::{FieldValue, QFunction, QFunctionOutput, QuadraturePoint};
use weakform::dual::constant_vector;
use weakform::nalgebra::DVector;

/// A constant body force, such as gravity.
///
/// The force density is $\rho \vec g$, where $\rho$ is the mass density and $\vec g$ the acceleration.
/// Used as a q-function, it contributes the source $-\rho \vec g$, corresponding to the weak form term
/// $$
/// -\int_\Omega \rho \vec g \cdot \vec w \, \mathrm{d}\vec X
/// $$
/// of the residual, where $\vec w$ is a vector-valued test function. It does not depend on any field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyForce {
    density: f64,
    acceleration: DVector<f64>,
}

impl BodyForce {
    pub fn new(density: f64, acceleration: DVector<f64>) -> Self {
        Self { density, acceleration }
    }

    /// Gravity pointing in the negative direction of the last coordinate axis.
    pub fn gravity(density: f64, dim: usize, g: f64) -> Self {
        let mut acceleration = DVector::zeros(dim);
        if dim > 0 {
            acceleration[dim - 1] = -g;
        }
        Self::new(density, acceleration)
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn acceleration(&self) -> &DVector<f64> {
        &self.acceleration
    }

    pub fn force_density(&self) -> DVector<f64> {
        &self.acceleration * self.density
    }
}

impl QFunction for BodyForce {
    fn evaluate(&self, _point: &QuadraturePoint, _fields: &[FieldValue]) -> Result<QFunctionOutput> {
        Ok(QFunctionOutput::from_source(constant_vector(&-self.force_density())))
    }
}
