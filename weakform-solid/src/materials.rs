use crate::{StatefulStressModel, StressModel};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use weakform::assembly::{FieldValue, QFunction, QFunctionOutput, QuadraturePoint};
use weakform::dual::{
    add, determinant, double_dot, identity, inverse, scale, sub, sym, trace, Dual, DualMatrix,
};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LameParameters {
    pub mu: f64,
    pub lambda: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YoungPoisson {
    pub young: f64,
    pub poisson: f64,
}

/// Bulk and shear moduli of a three-dimensional isotropic material.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BulkShear {
    pub bulk: f64,
    pub shear: f64,
}

impl From<YoungPoisson> for LameParameters {
    fn from(params: YoungPoisson) -> Self {
        let YoungPoisson { young, poisson } = params;
        let mu = 0.5 * young / (1.0 + poisson);
        let lambda = 2.0 * mu * poisson / (1.0 - 2.0 * poisson);
        Self { mu, lambda }
    }
}

impl From<BulkShear> for LameParameters {
    fn from(params: BulkShear) -> Self {
        let BulkShear { bulk, shear } = params;
        Self {
            mu: shear,
            lambda: bulk - 2.0 * shear / 3.0,
        }
    }
}

impl From<LameParameters> for YoungPoisson {
    fn from(params: LameParameters) -> Self {
        let LameParameters { mu, lambda } = params;
        Self {
            young: mu * (3.0 * lambda + 2.0 * mu) / (lambda + mu),
            poisson: 0.5 * lambda / (lambda + mu),
        }
    }
}

impl From<LameParameters> for BulkShear {
    fn from(params: LameParameters) -> Self {
        let LameParameters { mu, lambda } = params;
        Self {
            bulk: lambda + 2.0 * mu / 3.0,
            shear: mu,
        }
    }
}

/// Evaluates a stress model as the flux of the first (and only) field, a displacement.
fn stress_flux(model: &impl StressModel, fields: &[FieldValue]) -> Result<QFunctionOutput> {
    let displacement = fields
        .first()
        .ok_or_else(|| eyre!("Stress q-function requires a displacement field"))?;
    let stress = model.compute_stress_tensor(displacement.gradient())?;
    Ok(QFunctionOutput::from_flux(stress))
}

/// Linear isotropic elasticity.
///
/// Given Lamé parameters $\mu$ and $\lambda$, the strain energy density is
/// $$
/// \psi(\vec H) = \mu \vec \epsilon : \vec \epsilon + \frac{\lambda}{2} \operatorname{tr}^2(\vec \epsilon),
/// $$
/// where $\vec \epsilon = \frac{1}{2}(\vec H + \vec H^T)$ is the infinitesimal strain tensor. The associated
/// stress tensor is
/// $$
/// \vec \sigma = 2 \mu \vec \epsilon + \lambda \operatorname{tr}(\vec \epsilon) \vec I.
/// $$
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearElasticity {
    pub parameters: LameParameters,
}

impl LinearElasticity {
    pub fn new(parameters: impl Into<LameParameters>) -> Self {
        Self {
            parameters: parameters.into(),
        }
    }
}

impl StressModel for LinearElasticity {
    fn compute_energy_density(&self, displacement_gradient: &DualMatrix) -> Result<Dual> {
        let LameParameters { mu, lambda } = self.parameters;
        let eps = sym(displacement_gradient);
        let tr = trace(&eps);
        Ok(double_dot(&eps, &eps) * mu + &tr * &tr * (0.5 * lambda))
    }

    fn compute_stress_tensor(&self, displacement_gradient: &DualMatrix) -> Result<DualMatrix> {
        let LameParameters { mu, lambda } = self.parameters;
        let eps = sym(displacement_gradient);
        let tr = trace(&eps);
        let dim = eps.nrows();
        Ok(add(
            &scale(&eps, &Dual::constant(2.0 * mu)),
            &scale(&identity(dim), &(tr * lambda)),
        ))
    }
}

impl QFunction for LinearElasticity {
    fn evaluate(&self, _point: &QuadraturePoint, fields: &[FieldValue]) -> Result<QFunctionOutput> {
        stress_flux(self, fields)
    }
}

/// Linear elasticity with bulk and shear moduli offset by the parameters `[delta_bulk, delta_shear]`.
///
/// The stress is that of [`LinearElasticity`] with moduli $K + \Delta K$ and $G + \Delta G$. Supplying the
/// offsets as functions of time gives a material with time-dependent coefficients.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterizedLinearElasticity {
    pub parameters: BulkShear,
}

impl ParameterizedLinearElasticity {
    pub fn new(parameters: impl Into<LameParameters>) -> Self {
        Self {
            parameters: BulkShear::from(parameters.into()),
        }
    }

    /// The linear elastic material obtained for the given parameter offsets.
    pub fn with_offsets(&self, delta_bulk: f64, delta_shear: f64) -> LinearElasticity {
        let BulkShear { bulk, shear } = self.parameters;
        LinearElasticity::new(BulkShear {
            bulk: bulk + delta_bulk,
            shear: shear + delta_shear,
        })
    }
}

impl StatefulStressModel for ParameterizedLinearElasticity {
    type State = ();

    fn num_parameters(&self) -> usize {
        2
    }

    fn compute_stress_tensor_with_state(
        &self,
        displacement_gradient: &DualMatrix,
        _state: &mut (),
        parameters: &[f64],
    ) -> Result<DualMatrix> {
        match *parameters {
            [delta_bulk, delta_shear] => self
                .with_offsets(delta_bulk, delta_shear)
                .compute_stress_tensor(displacement_gradient),
            _ => Err(eyre!(
                "Parameterized linear elasticity expects 2 parameters, got {}",
                parameters.len()
            )),
        }
    }
}

/// The compressible Neo-Hookean material model.
///
/// The strain energy density is given by
/// $$
/// \psi(\vec F) = \frac{\mu}{2}(I_C - d) - \mu \log J + \frac{\lambda}{2}(\log J)^2,
/// $$
/// where $\vec F = \vec I + \vec H$, $J = \det \vec F$ and $I_C = \operatorname{tr}(\vec F^T \vec F)$.
/// The first Piola-Kirchhoff stress is
/// $$
/// \vec P = \mu (\vec F - \vec F^{-T}) + \lambda \log J \, \vec F^{-T}.
/// $$
/// Evaluation fails for inverted deformations ($J \leq 0$).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeoHookean {
    pub parameters: LameParameters,
}

impl NeoHookean {
    pub fn new(parameters: impl Into<LameParameters>) -> Self {
        Self {
            parameters: parameters.into(),
        }
    }
}

#[allow(non_snake_case)]
fn deformation_gradient_and_log_det(displacement_gradient: &DualMatrix) -> Result<(DualMatrix, Dual)> {
    let F = add(&identity(displacement_gradient.nrows()), displacement_gradient);
    let J = determinant(&F);
    if J.value() <= 0.0 {
        return Err(eyre!("Deformation is inverted (det F = {})", J.value()));
    }
    let log_J = J.ln();
    Ok((F, log_J))
}

#[allow(non_snake_case)]
impl StressModel for NeoHookean {
    fn compute_energy_density(&self, displacement_gradient: &DualMatrix) -> Result<Dual> {
        let LameParameters { mu, lambda } = self.parameters;
        let (F, log_J) = deformation_gradient_and_log_det(displacement_gradient)?;
        let d = F.nrows() as f64;
        let I_C = double_dot(&F, &F);
        Ok((I_C - d) * (0.5 * mu) - &log_J * mu + &log_J * &log_J * (0.5 * lambda))
    }

    fn compute_stress_tensor(&self, displacement_gradient: &DualMatrix) -> Result<DualMatrix> {
        let LameParameters { mu, lambda } = self.parameters;
        let (F, log_J) = deformation_gradient_and_log_det(displacement_gradient)?;
        let F_inv_T = inverse(&F)
            .ok_or_else(|| eyre!("Deformation gradient is singular"))?
            .transpose();
        Ok(add(
            &scale(&sub(&F, &F_inv_T), &Dual::constant(mu)),
            &scale(&F_inv_T, &(log_J * lambda)),
        ))
    }
}

impl QFunction for NeoHookean {
    fn evaluate(&self, _point: &QuadraturePoint, fields: &[FieldValue]) -> Result<QFunctionOutput> {
        stress_flux(self, fields)
    }
}
