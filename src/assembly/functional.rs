use crate::assembly::evaluator::RestrictedField;
use crate::assembly::integral::{empty_state, validate_dependencies, Integral};
use crate::assembly::lookup::GradientAssemblyLookup;
use crate::assembly::qfunction::{QFunction, SharedQuadratureData, StatefulQFunction, Stateless};
use crate::error::ConfigurationError;
use crate::mesh::{Domain, ElementKind};
use crate::restriction::ElementRestriction;
use crate::space::FiniteElementSpace;
use itertools::izip;
use log::{debug, trace};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

/// The restrictions of the test and all trial spaces to the elements of one kind.
#[derive(Debug, Clone)]
struct KindRestrictions {
    test: Arc<ElementRestriction>,
    trials: Vec<Arc<ElementRestriction>>,
}

impl KindRestrictions {
    fn new(test: &FiniteElementSpace, trials: &[Arc<FiniteElementSpace>], kind: ElementKind) -> eyre::Result<Self> {
        Ok(Self {
            test: Arc::new(ElementRestriction::new(test, kind)?),
            trials: trials
                .iter()
                .map(|trial| ElementRestriction::new(trial, kind).map(Arc::new))
                .collect::<eyre::Result<_>>()?,
        })
    }
}

/// Scratch vectors reused across evaluations. Arrays are indexed by element kind.
#[derive(Debug)]
struct Buffers {
    input_local: Vec<DVector<f64>>,
    input_element: [Vec<DVector<f64>>; 2],
    perturbation_local: DVector<f64>,
    perturbation_element: [DVector<f64>; 2],
    output_element: [DVector<f64>; 2],
    output_local: DVector<f64>,
    element_gradients: [Vec<DMatrix<f64>>; 2],
}

/// Records which trial E-vectors have already been gathered during a single evaluation.
#[derive(Debug)]
struct EvaluationContext {
    gathered: [Vec<bool>; 2],
}

impl EvaluationContext {
    fn new(num_trial_spaces: usize) -> Self {
        Self {
            gathered: [vec![false; num_trial_spaces], vec![false; num_trial_spaces]],
        }
    }

    /// Marks the trial space as gathered, returning `true` if it had not been gathered before.
    fn mark_gathered(&mut self, kind: ElementKind, trial: usize) -> bool {
        let flag = &mut self.gathered[kind.index()][trial];
        !std::mem::replace(flag, true)
    }
}

impl Buffers {
    fn new(num_trial_spaces: usize) -> Self {
        let empty = || DVector::zeros(0);
        Self {
            input_local: vec![empty(); num_trial_spaces],
            input_element: [vec![empty(); num_trial_spaces], vec![empty(); num_trial_spaces]],
            perturbation_local: empty(),
            perturbation_element: [empty(), empty()],
            output_element: [empty(), empty()],
            output_local: empty(),
            element_gradients: [Vec::new(), Vec::new()],
        }
    }
}

fn resize_zeroed(vector: &mut DVector<f64>, len: usize) {
    if vector.len() != len {
        vector.resize_vertically_mut(len, 0.0);
    }
    vector.fill(0.0);
}

/// A weak form: a sum of integrals sharing one test space and a list of trial spaces.
///
/// Evaluating the functional at trial vectors (given in true dofs) returns the residual with respect to the
/// true dofs of the test space. The pipeline is: prolongate the trial vectors to local vectors, gather each
/// trial space once per element kind, evaluate every integral into a test E-vector, scatter-add into the local
/// residual and finally apply the transposed prolongation of the test space.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use nalgebra::dvector;
/// use weakform::assembly::{FieldValue, Functional, QFunctionOutput, QuadraturePoint};
/// use weakform::mesh::procedural::create_uniform_line_mesh_1d;
/// use weakform::mesh::Domain;
/// use weakform::space::{FieldSpace, FiniteElementSpace};
///
/// # fn main() -> eyre::Result<()> {
/// let mesh = Arc::new(create_uniform_line_mesh_1d(0.0, 2.0, 2));
/// let space = Arc::new(FiniteElementSpace::new(mesh.clone(), FieldSpace::nodal(1))?);
/// let mut functional = Functional::new(space.clone(), vec![space])?;
/// functional.add_domain_integral(
///     1,
///     &[0],
///     |_: &QuadraturePoint, u: &[FieldValue]| -> eyre::Result<QFunctionOutput> {
///         Ok(QFunctionOutput::scalar_source(u[0].scalar().clone()))
///     },
///     &Domain::all_elements(&mesh),
/// )?;
/// let residual = functional.evaluate(&[&dvector![1.0, 2.0, 3.0]])?;
/// assert!((residual - dvector![2.0 / 3.0, 2.0, 4.0 / 3.0]).norm() < 1e-12);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Functional {
    test: Arc<FiniteElementSpace>,
    trials: Vec<Arc<FiniteElementSpace>>,
    restrictions: [Option<KindRestrictions>; 2],
    integrals: Vec<Integral>,
    update_quadrature_data: bool,
    buffers: Buffers,
    lookups: Vec<Option<GradientAssemblyLookup>>,
}

impl Functional {
    /// Creates a functional without integrals.
    ///
    /// All spaces must be defined on the same mesh (the same `Arc`).
    pub fn new(test: Arc<FiniteElementSpace>, trials: Vec<Arc<FiniteElementSpace>>) -> eyre::Result<Self> {
        if trials
            .iter()
            .any(|trial| !Arc::ptr_eq(trial.mesh(), test.mesh()))
        {
            return Err(ConfigurationError::MeshMismatch.into());
        }
        let domain_restrictions = KindRestrictions::new(&test, &trials, ElementKind::Domain)?;
        let num_trials = trials.len();
        Ok(Self {
            test,
            trials,
            restrictions: [Some(domain_restrictions), None],
            integrals: Vec::new(),
            update_quadrature_data: false,
            buffers: Buffers::new(num_trials),
            lookups: vec![None; num_trials],
        })
    }

    pub fn test_space(&self) -> &Arc<FiniteElementSpace> {
        &self.test
    }

    pub fn trial_spaces(&self) -> &[Arc<FiniteElementSpace>] {
        &self.trials
    }

    pub fn integrals(&self) -> &[Integral] {
        &self.integrals
    }

    /// Controls whether evaluations persist changes that q-functions make to their quadrature data.
    pub fn set_update_quadrature_data(&mut self, update: bool) {
        self.update_quadrature_data = update;
    }

    /// Adds an integral over domain elements of dimension `dim`.
    ///
    /// The q-function receives the fields of the trial spaces listed in `depends_on`, in that order.
    /// An empty domain is skipped.
    pub fn add_domain_integral(
        &mut self,
        dim: usize,
        depends_on: &[usize],
        qfunction: impl QFunction + 'static,
        domain: &Domain,
    ) -> eyre::Result<()> {
        self.add_integral(ElementKind::Domain, dim, depends_on, Stateless(qfunction), empty_state(), domain)
    }

    pub fn add_domain_integral_with_state<S: Clone + Send + 'static>(
        &mut self,
        dim: usize,
        depends_on: &[usize],
        qfunction: impl StatefulQFunction<S> + 'static,
        domain: &Domain,
        state: SharedQuadratureData<S>,
    ) -> eyre::Result<()> {
        self.add_integral(ElementKind::Domain, dim, depends_on, qfunction, state, domain)
    }

    pub fn add_area_integral(
        &mut self,
        depends_on: &[usize],
        qfunction: impl QFunction + 'static,
        domain: &Domain,
    ) -> eyre::Result<()> {
        self.add_domain_integral(2, depends_on, qfunction, domain)
    }

    pub fn add_volume_integral(
        &mut self,
        depends_on: &[usize],
        qfunction: impl QFunction + 'static,
        domain: &Domain,
    ) -> eyre::Result<()> {
        self.add_domain_integral(3, depends_on, qfunction, domain)
    }

    /// Adds an integral over boundary elements of dimension `dim`.
    ///
    /// Boundary integrals require all spaces to have a boundary trace. The q-function receives field values
    /// without derivatives, and the outward unit normal through [`QuadraturePoint::normal`].
    ///
    /// [`QuadraturePoint::normal`]: crate::assembly::QuadraturePoint::normal
    pub fn add_boundary_integral(
        &mut self,
        dim: usize,
        depends_on: &[usize],
        qfunction: impl QFunction + 'static,
        domain: &Domain,
    ) -> eyre::Result<()> {
        self.add_integral(ElementKind::Boundary, dim, depends_on, Stateless(qfunction), empty_state(), domain)
    }

    pub fn add_boundary_integral_with_state<S: Clone + Send + 'static>(
        &mut self,
        dim: usize,
        depends_on: &[usize],
        qfunction: impl StatefulQFunction<S> + 'static,
        domain: &Domain,
        state: SharedQuadratureData<S>,
    ) -> eyre::Result<()> {
        self.add_integral(ElementKind::Boundary, dim, depends_on, qfunction, state, domain)
    }

    /// Adds an integral over two-dimensional boundary elements of a three-dimensional mesh.
    pub fn add_surface_integral(
        &mut self,
        depends_on: &[usize],
        qfunction: impl QFunction + 'static,
        domain: &Domain,
    ) -> eyre::Result<()> {
        self.add_boundary_integral(2, depends_on, qfunction, domain)
    }

    fn add_integral<Q, S>(
        &mut self,
        kind: ElementKind,
        dim: usize,
        depends_on: &[usize],
        qfunction: Q,
        state: SharedQuadratureData<S>,
        domain: &Domain,
    ) -> eyre::Result<()>
    where
        Q: StatefulQFunction<S> + 'static,
        S: Clone + Send + 'static,
    {
        if domain.kind() != kind {
            return Err(ConfigurationError::DomainKindMismatch.into());
        }
        if domain.dim() != dim {
            return Err(ConfigurationError::DimensionMismatch {
                expected: dim,
                actual: domain.dim(),
            }
            .into());
        }
        validate_dependencies(depends_on, self.trials.len())?;
        let num_elements = self.test.mesh().elements_of_kind(kind).len();
        if let Some(&index) = domain.elements().iter().find(|&&e| e >= num_elements) {
            return Err(ConfigurationError::ElementOutOfBounds { index, num_elements }.into());
        }
        if domain.is_empty() {
            debug!("Skipping {kind:?} integral over empty domain");
            return Ok(());
        }

        let restrictions = self.restrictions_of_kind(kind)?;
        let test = RestrictedField {
            field: *self.test.field(),
            restriction: restrictions.test,
        };
        let trials: Vec<_> = izip!(&self.trials, restrictions.trials)
            .map(|(space, restriction)| RestrictedField {
                field: *space.field(),
                restriction,
            })
            .collect();
        let integral = Integral::new(self.test.mesh(), domain, test, &trials, depends_on, qfunction, state)?;
        self.integrals.push(integral);
        Ok(())
    }

    /// The restrictions of the given kind, built on first use.
    fn restrictions_of_kind(&mut self, kind: ElementKind) -> eyre::Result<KindRestrictions> {
        let k = kind.index();
        if let Some(restrictions) = &self.restrictions[k] {
            return Ok(restrictions.clone());
        }
        let restrictions = KindRestrictions::new(&self.test, &self.trials, kind)?;
        // Cached lookups do not account for elements of the new kind
        self.lookups.iter_mut().for_each(|lookup| *lookup = None);
        self.restrictions[k] = Some(restrictions.clone());
        Ok(restrictions)
    }

    fn check_inputs(&self, inputs: &[&DVector<f64>]) -> Result<(), ConfigurationError> {
        if inputs.len() != self.trials.len() {
            return Err(ConfigurationError::ArgumentCountMismatch {
                expected: self.trials.len(),
                actual: inputs.len(),
            });
        }
        for (argument, (trial, input)) in izip!(&self.trials, inputs).enumerate() {
            if input.len() != trial.num_true_dofs() {
                return Err(ConfigurationError::ArgumentSizeMismatch {
                    argument,
                    expected: trial.num_true_dofs(),
                    actual: input.len(),
                });
            }
        }
        Ok(())
    }

    /// Evaluates the residual at the given trial vectors, one per trial space.
    pub fn evaluate(&mut self, inputs: &[&DVector<f64>]) -> eyre::Result<DVector<f64>> {
        self.evaluate_with(inputs, None)
    }

    /// Evaluates the residual and prepares the derivative with respect to trial space `wrt`.
    ///
    /// The returned [`Gradient`] borrows the functional, so the derivative always refers to the most recent
    /// evaluation point.
    pub fn evaluate_and_differentiate(
        &mut self,
        inputs: &[&DVector<f64>],
        wrt: usize,
    ) -> eyre::Result<(DVector<f64>, Gradient<'_>)> {
        if wrt >= self.trials.len() {
            return Err(ConfigurationError::InvalidDependency {
                index: wrt,
                num_trial_spaces: self.trials.len(),
            }
            .into());
        }
        let residual = self.evaluate_with(inputs, Some(wrt))?;
        Ok((
            residual,
            Gradient {
                functional: self,
                which: wrt,
            },
        ))
    }

    fn evaluate_with(&mut self, inputs: &[&DVector<f64>], wrt: Option<usize>) -> eyre::Result<DVector<f64>> {
        self.check_inputs(inputs)?;
        trace!(
            "Evaluating functional with {} integrals (differentiating: {wrt:?})",
            self.integrals.len()
        );

        let Self {
            test,
            trials,
            restrictions,
            integrals,
            update_quadrature_data,
            buffers,
            ..
        } = self;
        let Buffers {
            input_local,
            input_element,
            output_element,
            output_local,
            ..
        } = buffers;

        for (trial, input, local) in izip!(trials.iter(), inputs, input_local.iter_mut()) {
            resize_zeroed(local, trial.num_local_dofs());
            trial.prolongation().prolongate(input, local);
        }

        let mut context = EvaluationContext::new(trials.len());
        resize_zeroed(output_local, test.num_local_dofs());
        for kind in ElementKind::ALL {
            let k = kind.index();
            let Some(kind_restrictions) = restrictions[k].as_ref() else {
                continue;
            };
            if !integrals.iter().any(|integral| integral.kind() == kind) {
                continue;
            }

            resize_zeroed(&mut output_element[k], kind_restrictions.test.evector_len());
            for integral in integrals
                .iter_mut()
                .filter(|integral| integral.kind() == kind)
            {
                for &j in integral.active_trial_spaces() {
                    if context.mark_gathered(kind, j) {
                        kind_restrictions.trials[j].gather(&input_local[j], &mut input_element[k][j]);
                    }
                }
                let element_inputs: Vec<&DVector<f64>> = input_element[k].iter().collect();
                integral.mult(&element_inputs, &mut output_element[k], wrt, *update_quadrature_data)?;
            }
            kind_restrictions
                .test
                .scatter_add(&output_element[k], output_local);
        }

        let mut residual = DVector::zeros(test.num_true_dofs());
        test.prolongation()
            .prolongate_transpose(output_local, &mut residual);
        Ok(residual)
    }
}

/// The derivative of a functional with respect to one trial space, at the most recent evaluation point.
#[derive(Debug)]
pub struct Gradient<'a> {
    functional: &'a mut Functional,
    which: usize,
}

impl<'a> Gradient<'a> {
    /// The trial space the gradient refers to.
    pub fn which(&self) -> usize {
        self.which
    }

    /// Computes the directional derivative of the residual in the direction of `perturbation`, given in true
    /// dofs of the differentiated trial space.
    ///
    /// The q-functions are not evaluated again.
    pub fn apply_to(&mut self, perturbation: &DVector<f64>) -> eyre::Result<DVector<f64>> {
        let which = self.which;
        let Functional {
            test,
            trials,
            restrictions,
            integrals,
            buffers,
            ..
        } = &mut *self.functional;
        let trial = &trials[which];
        if perturbation.len() != trial.num_true_dofs() {
            return Err(ConfigurationError::ArgumentSizeMismatch {
                argument: which,
                expected: trial.num_true_dofs(),
                actual: perturbation.len(),
            }
            .into());
        }
        trace!("Applying gradient with respect to trial space {which}");

        let Buffers {
            perturbation_local,
            perturbation_element,
            output_element,
            output_local,
            ..
        } = buffers;
        resize_zeroed(perturbation_local, trial.num_local_dofs());
        trial
            .prolongation()
            .prolongate(perturbation, perturbation_local);

        resize_zeroed(output_local, test.num_local_dofs());
        for kind in ElementKind::ALL {
            let k = kind.index();
            let Some(kind_restrictions) = restrictions[k].as_ref() else {
                continue;
            };
            let mut dependent = integrals
                .iter()
                .filter(|integral| integral.kind() == kind && integral.depends_on(which))
                .peekable();
            if dependent.peek().is_none() {
                continue;
            }

            kind_restrictions.trials[which].gather(perturbation_local, &mut perturbation_element[k]);
            resize_zeroed(&mut output_element[k], kind_restrictions.test.evector_len());
            for integral in dependent {
                integral.gradient_mult(&perturbation_element[k], &mut output_element[k], which)?;
            }
            kind_restrictions
                .test
                .scatter_add(&output_element[k], output_local);
        }

        let mut result = DVector::zeros(test.num_true_dofs());
        test.prolongation()
            .prolongate_transpose(output_local, &mut result);
        Ok(result)
    }

    /// Assembles the Jacobian `P_test^T J P_trial` as a sparse matrix, where `J` is the Jacobian with respect
    /// to local dofs and `P` are the prolongations of the test and trial spaces.
    ///
    /// The sparsity pattern is computed on first use and cached in the functional.
    pub fn assemble(&mut self) -> eyre::Result<CsrMatrix<f64>> {
        let which = self.which;
        let Functional {
            test,
            trials,
            restrictions,
            integrals,
            buffers,
            lookups,
            ..
        } = &mut *self.functional;

        let lookup = match &mut lookups[which] {
            Some(lookup) => lookup,
            empty => {
                let pairs = [0, 1].map(|k| {
                    restrictions[k]
                        .as_ref()
                        .map(|r| (r.test.as_ref(), r.trials[which].as_ref()))
                });
                empty.insert(GradientAssemblyLookup::new(pairs)?)
            }
        };

        let Buffers {
            input_element,
            element_gradients,
            ..
        } = buffers;
        let mut has_contributions = [false; 2];
        for kind in ElementKind::ALL {
            let k = kind.index();
            let Some(kind_restrictions) = restrictions[k].as_ref() else {
                continue;
            };
            if !integrals
                .iter()
                .any(|integral| integral.kind() == kind && integral.depends_on(which))
            {
                continue;
            }
            has_contributions[k] = true;

            let (test_restriction, trial_restriction) = (&kind_restrictions.test, &kind_restrictions.trials[which]);
            let matrices = &mut element_gradients[k];
            matrices.resize(test_restriction.num_elements(), DMatrix::zeros(0, 0));
            for (e, matrix) in matrices.iter_mut().enumerate() {
                let shape = (test_restriction.element_len(e), trial_restriction.element_len(e));
                if matrix.shape() == shape {
                    matrix.fill(0.0);
                } else {
                    *matrix = DMatrix::zeros(shape.0, shape.1);
                }
            }

            let element_inputs: Vec<&DVector<f64>> = input_element[k].iter().collect();
            for integral in integrals
                .iter_mut()
                .filter(|integral| integral.kind() == kind)
            {
                integral.compute_element_gradients(&element_inputs, which, matrices)?;
            }
        }

        let contributions = [0, 1].map(|k| {
            let matrices: &[DMatrix<f64>] = &element_gradients[k];
            if has_contributions[k] {
                matrices
            } else {
                &matrices[..0]
            }
        });
        let local = lookup.assemble(contributions)?;

        let trial = &trials[which];
        if test.prolongation().is_identity() && trial.prolongation().is_identity() {
            Ok(local)
        } else {
            let test_transpose = test.prolongation().to_csr().transpose();
            let trial_prolongation = trial.prolongation().to_csr();
            Ok(&(&test_transpose * &local) * &trial_prolongation)
        }
    }
}
