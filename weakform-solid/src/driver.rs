//! Single material point drivers.
use crate::{StatefulStressModel, StressModel};
use eyre::{eyre, Result};
use fenris_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use fenris_optimize::newton::{newton, NewtonSettings};
use log::debug;
use serde::{Deserialize, Serialize};
use std::error::Error;
use weakform::dual::{jacobian, values_of, Dual, DualMatrix};
use weakform::nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

/// The state of a material point at one step of a uniaxial stress test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniaxialStressPoint<S = ()> {
    pub time: f64,
    /// Prescribed displacement gradient component along the loading axis.
    pub axial_strain: f64,
    /// Displacement gradient components along the remaining axes, solved such that the lateral stresses vanish.
    pub lateral_strains: Vec<f64>,
    /// The axial stress.
    pub axial_stress: f64,
    pub displacement_gradient: DMatrix<f64>,
    pub stress: DMatrix<f64>,
    /// The material state after the step.
    pub state: S,
}

const TOLERANCE: f64 = 1e-10;
const MAX_ITERATIONS: usize = 25;

fn diagonal_gradient(axial_strain: f64, lateral_strains: &DVectorView<f64>, seed: bool) -> DualMatrix {
    let num_lateral = lateral_strains.len();
    let dim = num_lateral + 1;
    DMatrix::from_fn(dim, dim, |i, j| match (i, j) {
        (0, 0) => Dual::constant(axial_strain),
        (i, j) if i == j && seed => Dual::variable(lateral_strains[i - 1], i - 1, num_lateral),
        (i, j) if i == j => Dual::constant(lateral_strains[i - 1]),
        _ => Dual::constant(0.0),
    })
}

/// The lateral normal stresses as a function of the lateral strains, for a fixed axial strain.
///
/// The material is evaluated on a copy of the committed state, so Newton iterations never modify it.
struct LateralStressResidual<'a, M: StatefulStressModel> {
    model: &'a M,
    lateral_dim: usize,
    axial_strain: f64,
    state: &'a M::State,
    parameters: &'a [f64],
    /// The first material failure encountered, since `eval_into` cannot report errors.
    error: Option<eyre::Report>,
}

impl<'a, M: StatefulStressModel> LateralStressResidual<'a, M> {
    fn stress(&self, lateral_strains: &DVectorView<f64>, seed: bool) -> Result<DualMatrix> {
        let mut state = self.state.clone();
        let gradient = diagonal_gradient(self.axial_strain, lateral_strains, seed);
        self.model
            .compute_stress_tensor_with_state(&gradient, &mut state, self.parameters)
    }
}

impl<'a, M: StatefulStressModel> VectorFunction<f64> for LateralStressResidual<'a, M> {
    fn dimension(&self) -> usize {
        self.lateral_dim
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        match self.stress(x, false) {
            Ok(stress) => {
                for (i, f_i) in f.iter_mut().enumerate() {
                    *f_i = stress[(i + 1, i + 1)].value();
                }
            }
            Err(err) => {
                // A NaN residual stops the iterations, the stored error is reported afterwards
                f.fill(f64::NAN);
                self.error.get_or_insert(err);
            }
        }
    }
}

impl<'a, M: StatefulStressModel> DifferentiableVectorFunction<f64> for LateralStressResidual<'a, M> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        let stress = match self.stress(x, true) {
            Ok(stress) => stress,
            Err(err) => {
                self.error.get_or_insert(err);
                return Err("Material evaluation failed while computing the tangent".into());
            }
        };
        let n = x.len();
        let tangent = jacobian((1..=n).map(|i| &stress[(i, i)]), n);
        let solution = tangent.lu().solve(rhs).ok_or("Singular tangent")?;
        sol.copy_from(&solution);
        Ok(())
    }
}

/// Drives a material point through a sequence of `(time, axial strain, parameters)` steps.
fn drive<M, I>(model: &M, dim: usize, mut state: M::State, steps: I) -> Result<Vec<UniaxialStressPoint<M::State>>>
where
    M: StatefulStressModel,
    I: IntoIterator<Item = (f64, f64, Vec<f64>)>,
{
    if dim == 0 {
        return Err(eyre!("Uniaxial stress test requires a positive dimension"));
    }
    let mut lateral = DVector::<f64>::zeros(dim - 1);
    let mut residual = DVector::<f64>::zeros(dim - 1);
    let mut increment = DVector::<f64>::zeros(dim - 1);
    let mut history = Vec::new();

    for (step, (time, axial_strain, parameters)) in steps.into_iter().enumerate() {
        if parameters.len() != model.num_parameters() {
            return Err(eyre!(
                "Material expects {} parameters, got {}",
                model.num_parameters(),
                parameters.len()
            ));
        }
        let mut function = LateralStressResidual {
            model,
            lateral_dim: dim - 1,
            axial_strain,
            state: &state,
            parameters: &parameters,
            error: None,
        };
        // The absolute Newton tolerance is scaled by the axial stress at the initial guess
        let initial = function.stress(&DVectorView::from(&lateral), false)?;
        let settings = NewtonSettings {
            max_iterations: Some(MAX_ITERATIONS),
            tolerance: TOLERANCE * initial[(0, 0)].value().abs().max(1.0),
        };
        let result = newton(&mut function, &mut lateral, &mut residual, &mut increment, settings);
        if let Some(err) = function.error.take() {
            return Err(err.wrap_err(format!("Material evaluation failed at step {step} (time {time})")));
        }
        // NewtonError holds a non-Send source and cannot be converted with `?`
        let iterations = result.map_err(|err| {
            eyre!("Newton iterations did not converge at step {step} (time {time}, axial strain {axial_strain}): {err}")
        })?;

        // Only the converged evaluation updates the state
        let gradient = diagonal_gradient(axial_strain, &DVectorView::from(&lateral), false);
        let stress = model.compute_stress_tensor_with_state(&gradient, &mut state, &parameters)?;
        debug!(
            "Uniaxial stress step {step} (time {time}): axial strain {axial_strain}, axial stress {}, \
             {iterations} Newton iterations",
            stress[(0, 0)].value()
        );
        history.push(UniaxialStressPoint {
            time,
            axial_strain,
            lateral_strains: lateral.iter().copied().collect(),
            axial_stress: stress[(0, 0)].value(),
            displacement_gradient: values_of(&gradient),
            stress: values_of(&stress),
            state: state.clone(),
        });
    }

    Ok(history)
}

/// Drives a material point through `num_steps` equal time steps of a uniaxial stress test on `(0, t_max]`.
///
/// At time `t`, the axial displacement gradient component is `axial_strain(t)` and the material receives
/// the parameters `parameters[k](t)`. The lateral diagonal components of the displacement gradient are found
/// with Newton's method such that all lateral normal stresses vanish, using the exact Jacobian obtained from
/// dual numbers. Each step starts from the lateral strains of the previous step. The material state is only
/// updated once per step, by the evaluation at the converged strains.
///
/// Fails if the material cannot be evaluated or Newton's method does not converge.
pub fn uniaxial_stress_test<M: StatefulStressModel>(
    model: &M,
    dim: usize,
    t_max: f64,
    num_steps: usize,
    initial_state: M::State,
    axial_strain: impl Fn(f64) -> f64,
    parameters: &[&dyn Fn(f64) -> f64],
) -> Result<Vec<UniaxialStressPoint<M::State>>> {
    if t_max.is_nan() || t_max <= 0.0 || num_steps == 0 {
        return Err(eyre!(
            "Uniaxial stress test requires a positive end time and number of steps, got t_max = {t_max} \
             and {num_steps} steps"
        ));
    }
    let dt = t_max / num_steps as f64;
    let steps = (1..=num_steps).map(|i| {
        let t = i as f64 * dt;
        (t, axial_strain(t), parameters.iter().map(|p| p(t)).collect())
    });
    drive(model, dim, initial_state, steps)
}

/// Drives a stateless material point through a history of axial strains in a uniaxial stress state.
///
/// Steps are numbered from one and the step number is reported as the time of each point. See
/// [`uniaxial_stress_test`] for details.
pub fn uniaxial_strain_history(
    model: &impl StressModel,
    dim: usize,
    axial_strains: &[f64],
) -> Result<Vec<UniaxialStressPoint>> {
    let steps = axial_strains
        .iter()
        .enumerate()
        .map(|(i, &strain)| ((i + 1) as f64, strain, Vec::new()));
    drive(model, dim, (), steps)
}
