use crate::assembly::evaluator::{QuadratureEvaluator, RestrictedField};
use crate::assembly::qfunction::{FieldValue, QuadratureData, QuadraturePoint, SharedQuadratureData, StatefulQFunction};
use crate::error::ConfigurationError;
use crate::mesh::{Domain, ElementKind, Mesh};
use log::debug;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::fmt::Debug;

/// Type-erased evaluation of a q-function together with its state.
trait IntegralKernel: Send + Sync {
    fn mult(
        &mut self,
        inputs: &[&DVector<f64>],
        output: &mut DVector<f64>,
        differentiate: Option<usize>,
        update_state: bool,
    ) -> eyre::Result<()>;

    fn evaluator(&self) -> &QuadratureEvaluator;
}

struct QFunctionKernel<Q, S> {
    evaluator: QuadratureEvaluator,
    qfunction: Q,
    state: SharedQuadratureData<S>,
}

impl<Q, S> IntegralKernel for QFunctionKernel<Q, S>
where
    Q: StatefulQFunction<S>,
    S: Clone + Send,
{
    fn mult(
        &mut self,
        inputs: &[&DVector<f64>],
        output: &mut DVector<f64>,
        differentiate: Option<usize>,
        update_state: bool,
    ) -> eyre::Result<()> {
        let mut data = self.state.lock();
        let qfunction = &self.qfunction;
        if update_state {
            // Evaluate into a copy, so that a failing evaluation leaves the committed state untouched
            let mut updated = data.values().to_vec();
            self.evaluator.mult(
                inputs,
                output,
                differentiate,
                &mut updated,
                |point: &QuadraturePoint, fields: &[FieldValue], state: &mut S| qfunction.evaluate(point, fields, state),
            )?;
            for (state, value) in data.values_mut().iter_mut().zip(updated) {
                *state = value;
            }
            Ok(())
        } else {
            self.evaluator.mult(
                inputs,
                output,
                differentiate,
                data.values_mut(),
                |point: &QuadraturePoint, fields: &[FieldValue], state: &mut S| {
                    let mut scratch = state.clone();
                    qfunction.evaluate(point, fields, &mut scratch)
                },
            )
        }
    }

    fn evaluator(&self) -> &QuadratureEvaluator {
        &self.evaluator
    }
}

/// A single term of a weak form: a q-function integrated over a domain.
///
/// An integral depends on a subset of the trial spaces of its functional (its *active* trial spaces).
/// All methods take E-vectors indexed by the trial spaces of the functional. Entries for trial spaces the
/// integral does not depend on are ignored.
pub struct Integral {
    kind: ElementKind,
    dim: usize,
    active: Vec<usize>,
    differentiated: Option<usize>,
    kernel: Box<dyn IntegralKernel>,
}

impl Debug for Integral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Integral")
            .field("kind", &self.kind)
            .field("dim", &self.dim)
            .field("active", &self.active)
            .field("differentiated", &self.differentiated)
            .finish_non_exhaustive()
    }
}

/// Checks that all dependencies are valid and distinct trial space indices.
pub(crate) fn validate_dependencies(depends_on: &[usize], num_trial_spaces: usize) -> Result<(), ConfigurationError> {
    for (i, &index) in depends_on.iter().enumerate() {
        if index >= num_trial_spaces {
            return Err(ConfigurationError::InvalidDependency {
                index,
                num_trial_spaces,
            });
        }
        if depends_on[..i].contains(&index) {
            return Err(ConfigurationError::DuplicateDependency(index));
        }
    }
    Ok(())
}

impl Integral {
    /// Creates an integral over a non-empty domain.
    ///
    /// `trials` holds all trial spaces of the functional, `depends_on` the indices of those the q-function
    /// receives, in that order. The number of quadrature points per direction is one more than the largest
    /// order among the test space and all trial spaces.
    pub fn new<Q, S>(
        mesh: &Mesh,
        domain: &Domain,
        test: RestrictedField,
        trials: &[RestrictedField],
        depends_on: &[usize],
        qfunction: Q,
        state: SharedQuadratureData<S>,
    ) -> eyre::Result<Self>
    where
        Q: StatefulQFunction<S> + 'static,
        S: Clone + Send + 'static,
    {
        validate_dependencies(depends_on, trials.len())?;
        if domain.is_empty() {
            return Err(ConfigurationError::EmptyDomain.into());
        }
        let max_order = trials
            .iter()
            .chain([&test])
            .map(|space| space.field.order)
            .max()
            .unwrap_or(1);

        let active_trials = depends_on.iter().map(|&j| trials[j].clone()).collect();
        let evaluator = QuadratureEvaluator::new(mesh, domain, test, active_trials, max_order + 1)?;
        state.lock().ensure_len(evaluator.num_quadrature_points())?;
        debug!(
            "Created {:?} integral over {} elements with {} quadrature points, depending on {:?}",
            domain.kind(),
            domain.len(),
            evaluator.num_quadrature_points(),
            depends_on
        );

        Ok(Self {
            kind: domain.kind(),
            dim: domain.dim(),
            active: depends_on.to_vec(),
            differentiated: None,
            kernel: Box::new(QFunctionKernel {
                evaluator,
                qfunction,
                state,
            }),
        })
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The trial spaces the integral depends on.
    pub fn active_trial_spaces(&self) -> &[usize] {
        &self.active
    }

    pub fn depends_on(&self, trial: usize) -> bool {
        self.active.contains(&trial)
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.kernel.evaluator().num_quadrature_points()
    }

    fn active_position(&self, trial: usize) -> Option<usize> {
        self.active.iter().position(|&j| j == trial)
    }

    fn active_inputs<'a>(&self, inputs: &[&'a DVector<f64>]) -> Vec<&'a DVector<f64>> {
        self.active.iter().map(|&j| inputs[j]).collect()
    }

    /// Evaluates the integral and adds the result into the test E-vector `output`.
    ///
    /// If `wrt` names a trial space the integral depends on, the tangent with respect to that space is cached.
    /// If `update_state` is set, changes the q-function makes to its quadrature data are persisted.
    pub fn mult(
        &mut self,
        inputs: &[&DVector<f64>],
        output: &mut DVector<f64>,
        wrt: Option<usize>,
        update_state: bool,
    ) -> eyre::Result<()> {
        let differentiate = wrt.and_then(|trial| self.active_position(trial));
        let active_inputs = self.active_inputs(inputs);
        self.differentiated = None;
        self.kernel
            .mult(&active_inputs, output, differentiate, update_state)?;
        self.differentiated = wrt;
        Ok(())
    }

    fn check_differentiated(&self, which: usize) -> Result<(), ConfigurationError> {
        if self.differentiated == Some(which) {
            Ok(())
        } else {
            Err(ConfigurationError::NotDifferentiated {
                requested: which,
                cached: self.differentiated,
            })
        }
    }

    /// Applies the cached Jacobian with respect to trial space `which` to a perturbation E-vector of that space,
    /// adding the result into `output`.
    ///
    /// Integrals that do not depend on `which` contribute nothing. Otherwise, fails unless the last call to
    /// [`mult`](Self::mult) differentiated with respect to `which`.
    pub fn gradient_mult(&self, input: &DVector<f64>, output: &mut DVector<f64>, which: usize) -> eyre::Result<()> {
        let Some(position) = self.active_position(which) else {
            return Ok(());
        };
        self.check_differentiated(which)?;
        self.kernel
            .evaluator()
            .gradient_mult(input, output, position)
    }

    /// Adds the dense element Jacobians with respect to trial space `which` into `element_matrices`, one
    /// matrix per element of the integral's kind.
    ///
    /// If the cached tangents are not with respect to `which`, the integral is first re-evaluated at `inputs`
    /// with differentiation enabled. Quadrature data is not updated by this re-evaluation.
    pub fn compute_element_gradients(
        &mut self,
        inputs: &[&DVector<f64>],
        which: usize,
        element_matrices: &mut [DMatrix<f64>],
    ) -> eyre::Result<()> {
        let Some(position) = self.active_position(which) else {
            return Ok(());
        };
        if self.differentiated != Some(which) {
            let mut scratch = DVector::zeros(self.kernel.evaluator().test_evector_len());
            self.mult(inputs, &mut scratch, Some(which), false)?;
        }
        self.kernel
            .evaluator()
            .compute_element_gradients(position, element_matrices)
    }
}

/// Quadrature data for q-functions without state.
pub(crate) fn empty_state() -> SharedQuadratureData<()> {
    QuadratureData::shared(())
}
