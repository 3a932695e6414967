//! Evaluation of q-functions at the quadrature points of a domain.
//!
//! For every element and quadrature point, the evaluator interpolates the trial fields from their element
//! dofs, calls the q-function and integrates its output against the test functions. With differentiation
//! enabled, one trial field is seeded with dual numbers and the resulting tangent of the q-function is
//! cached per quadrature point, so that the action of the element Jacobian and the dense element Jacobian
//! itself can later be computed without calling the q-function again.
use crate::assembly::qfunction::{FieldValue, QFunctionOutput, QuadraturePoint};
use crate::dual::{jacobian, Dual};
use crate::element::{evaluate_lagrange_basis, evaluate_reference_basis, Geometry, ReferenceBasis};
use crate::error::ConfigurationError;
use crate::mesh::{Domain, ElementKind, Mesh};
use crate::quadrature::{rule_for_geometry, QuadratureRule};
use crate::restriction::ElementRestriction;
use crate::space::{Family, FieldSpace};
use itertools::izip;
use log::debug;
use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use std::sync::Arc;

/// Geometric information at a single quadrature point of an element.
#[derive(Debug, Clone)]
struct PointGeometry {
    point: QuadraturePoint,
    /// The Jacobian of the geometry map, `d x d_ref`.
    jacobian: DMatrix<f64>,
    /// Determinant of the Jacobian for domain elements, the surface measure for boundary elements.
    determinant: f64,
    /// `J^{-T}` for domain elements, empty for boundary elements.
    inverse_transpose: DMatrix<f64>,
    /// Quadrature weight times the absolute value of `determinant`.
    scale: f64,
}

impl PointGeometry {
    fn compute(
        mesh: &Mesh,
        kind: ElementKind,
        element: usize,
        index: usize,
        xi: &[f64],
        weight: f64,
    ) -> eyre::Result<Self> {
        let mesh_element = &mesh.elements_of_kind(kind)[element];
        let geometry = mesh_element.geometry();
        let (values, gradients) = evaluate_lagrange_basis(geometry, 1, xi)
            .ok_or(ConfigurationError::UnsupportedGeometry(geometry))?;

        let dim = mesh.dim();
        let mut coordinates = DVector::zeros(dim);
        let mut jacobian = DMatrix::zeros(dim, geometry.reference_dim());
        for (a, &v) in mesh_element.vertices().iter().enumerate() {
            let x = &mesh.vertices()[v];
            coordinates.axpy(values[(0, a)], x, 1.0);
            jacobian.ger(1.0, x, &gradients.column(a), 1.0);
        }

        let degenerate = || ConfigurationError::InvalidMesh(format!("{kind:?} element {element} is degenerate"));
        let (determinant, inverse_transpose, normal) = match kind {
            ElementKind::Domain => {
                let determinant = jacobian.determinant();
                let inverse = jacobian.clone().try_inverse().ok_or_else(degenerate)?;
                (determinant, inverse.transpose(), None)
            }
            ElementKind::Boundary => {
                let measure = (jacobian.transpose() * &jacobian).determinant().sqrt();
                let normal = match dim {
                    2 => DVector::from_column_slice(&[jacobian[(1, 0)], -jacobian[(0, 0)]]),
                    3 => {
                        let t1 = Vector3::new(jacobian[(0, 0)], jacobian[(1, 0)], jacobian[(2, 0)]);
                        let t2 = Vector3::new(jacobian[(0, 1)], jacobian[(1, 1)], jacobian[(2, 1)]);
                        DVector::from_column_slice(t1.cross(&t2).as_slice())
                    }
                    _ => return Err(ConfigurationError::UnsupportedGeometry(geometry).into()),
                };
                let norm = normal.norm();
                if norm == 0.0 {
                    return Err(degenerate().into());
                }
                (measure, DMatrix::zeros(0, 0), Some(normal / norm))
            }
        };

        Ok(Self {
            point: QuadraturePoint {
                coordinates,
                normal,
                element,
                index,
            },
            jacobian,
            determinant,
            inverse_transpose,
            scale: weight * determinant.abs(),
        })
    }
}

/// Describes how a field is interpolated at the quadrature points of one geometry block.
#[derive(Debug, Clone)]
struct FieldDescriptor {
    field: FieldSpace,
    /// Rows of the value of one component.
    value_rows: usize,
    /// Rows of the derivative of one component (zero on boundary elements).
    derivative_rows: usize,
    /// Reference basis at every quadrature point of the rule.
    reference: Vec<ReferenceBasis>,
    /// Interpolation matrix at every quadrature point of the block, `rule.len()` consecutive entries per element.
    interpolation: Vec<DMatrix<f64>>,
}

impl FieldDescriptor {
    fn new(field: &FieldSpace, kind: ElementKind, geometry: Geometry, rule: &QuadratureRule) -> eyre::Result<Self> {
        let dim = geometry.reference_dim();
        let reference = rule
            .points()
            .map(|xi| evaluate_reference_basis(field, geometry, xi))
            .collect::<Result<Vec<_>, _>>()?;
        let derivative_rows = match kind {
            ElementKind::Domain => field.derivative_rows(dim),
            ElementKind::Boundary => 0,
        };
        Ok(Self {
            field: *field,
            value_rows: field.value_rows(dim),
            derivative_rows,
            reference,
            interpolation: Vec::new(),
        })
    }

    /// Computes the interpolation matrices for all points of a block once, so that repeated evaluations only
    /// need matrix-vector products.
    fn precompute_interpolation(&mut self, points: &[PointGeometry], num_points_per_element: usize) {
        self.interpolation = points
            .iter()
            .enumerate()
            .map(|(p, geometry)| self.compute_interpolation_matrix(p % num_points_per_element, geometry))
            .collect();
    }

    /// The precomputed interpolation matrix at the given point of the block.
    fn interpolation(&self, point: usize) -> &DMatrix<f64> {
        &self.interpolation[point]
    }

    fn components(&self) -> usize {
        self.field.components
    }

    /// The length of the interpolated (flattened) field, value followed by derivative.
    fn interpolated_len(&self) -> usize {
        self.components() * (self.value_rows + self.derivative_rows)
    }

    fn source_len(&self) -> usize {
        self.components() * self.value_rows
    }

    fn flux_shape(&self) -> (usize, usize) {
        (self.components(), self.derivative_rows)
    }

    /// The matrix mapping element dofs to the flattened field at the given quadrature point.
    ///
    /// Value row `i + c k` holds component `i` of value row `k`, derivative row `c m + i + c l` holds
    /// component `i` of derivative row `l`. Column `c b + i` corresponds to component `i` of basis function `b`.
    fn compute_interpolation_matrix(&self, q: usize, geometry: &PointGeometry) -> DMatrix<f64> {
        let (values, derivatives) = self.physical_basis(q, geometry);
        let c = self.components();
        let m = self.value_rows;
        let n = values.ncols();
        let mut matrix = DMatrix::zeros(self.interpolated_len(), c * n);
        for b in 0..n {
            for i in 0..c {
                for k in 0..m {
                    matrix[(i + c * k, c * b + i)] = values[(k, b)];
                }
                for l in 0..self.derivative_rows {
                    matrix[(c * m + i + c * l, c * b + i)] = derivatives[(l, b)];
                }
            }
        }
        matrix
    }

    /// Maps the reference basis to physical space.
    fn physical_basis(&self, q: usize, geometry: &PointGeometry) -> (DMatrix<f64>, DMatrix<f64>) {
        let reference = &self.reference[q];
        let j = &geometry.jacobian;
        let det = geometry.determinant;
        if self.derivative_rows == 0 {
            return (reference.values.clone(), DMatrix::zeros(0, reference.values.ncols()));
        }
        match self.field.family {
            Family::Nodal | Family::Discontinuous => (
                reference.values.clone(),
                &geometry.inverse_transpose * &reference.derivatives,
            ),
            Family::Tangential => {
                let values = &geometry.inverse_transpose * &reference.values;
                let curls = if j.nrows() == 2 {
                    &reference.derivatives / det
                } else {
                    j * &reference.derivatives / det
                };
                (values, curls)
            }
            Family::Normal => (j * &reference.values / det, &reference.derivatives / det),
        }
    }
}

/// Quadrature data for the elements of a domain sharing the same geometry.
#[derive(Debug, Clone)]
struct GeometryBlock {
    elements: Vec<usize>,
    rule: QuadratureRule,
    test: FieldDescriptor,
    trials: Vec<FieldDescriptor>,
    /// Point geometry, `rule.len()` consecutive entries per element.
    points: Vec<PointGeometry>,
    /// Index of the first quadrature point of the block among all points of the evaluator.
    offset: usize,
}

impl GeometryBlock {
    fn num_points_per_element(&self) -> usize {
        self.rule.len()
    }

    fn num_points(&self) -> usize {
        self.points.len()
    }
}

/// A restricted field space: the test or a trial space of an integral together with its element restriction.
#[derive(Debug, Clone)]
pub struct RestrictedField {
    pub field: FieldSpace,
    pub restriction: Arc<ElementRestriction>,
}

/// Evaluates a q-function over the elements of a domain.
#[derive(Debug)]
pub struct QuadratureEvaluator {
    kind: ElementKind,
    test: RestrictedField,
    trials: Vec<RestrictedField>,
    blocks: Vec<GeometryBlock>,
    /// Tangent of the q-function output with respect to the differentiated field, one per point.
    derivatives: Vec<DMatrix<f64>>,
    differentiated: Option<usize>,
}

/// Adds a scaled product `scale * matrix^T * vector` into `output`.
fn integrate_transpose(output: &mut DVector<f64>, scale: f64, matrix: &DMatrix<f64>, vector: &DVector<f64>) {
    output.gemv_tr(scale, matrix, vector, 1.0);
}

impl QuadratureEvaluator {
    /// Prepares quadrature for the given domain.
    ///
    /// Elements are grouped by geometry. Every block uses `points_per_dim` Gauss points per reference
    /// direction.
    pub fn new(
        mesh: &Mesh,
        domain: &Domain,
        test: RestrictedField,
        trials: Vec<RestrictedField>,
        points_per_dim: usize,
    ) -> eyre::Result<Self> {
        let kind = domain.kind();
        let mut groups: Vec<(Geometry, Vec<usize>)> = Vec::new();
        for &element in domain.elements() {
            let geometry = mesh.elements_of_kind(kind)[element].geometry();
            test.field.check_geometry(geometry)?;
            for trial in &trials {
                trial.field.check_geometry(geometry)?;
            }
            match groups.iter_mut().find(|(g, _)| *g == geometry) {
                Some((_, elements)) => elements.push(element),
                None => groups.push((geometry, vec![element])),
            }
        }

        let mut blocks = Vec::with_capacity(groups.len());
        let mut offset = 0;
        for (geometry, elements) in groups {
            let rule = rule_for_geometry(geometry, points_per_dim)?;
            let mut test_descriptor = FieldDescriptor::new(&test.field, kind, geometry, &rule)?;
            let mut trial_descriptors = trials
                .iter()
                .map(|trial| FieldDescriptor::new(&trial.field, kind, geometry, &rule))
                .collect::<eyre::Result<Vec<_>>>()?;
            let mut points = Vec::with_capacity(elements.len() * rule.len());
            for &element in &elements {
                for (q, (xi, &w)) in rule.points().zip(rule.weights()).enumerate() {
                    points.push(PointGeometry::compute(mesh, kind, element, q, xi, w)?);
                }
            }
            for descriptor in std::iter::once(&mut test_descriptor).chain(trial_descriptors.iter_mut()) {
                descriptor.precompute_interpolation(&points, rule.len());
            }
            debug!(
                "Quadrature block: {} {geometry:?} elements with {} points each",
                elements.len(),
                rule.len()
            );
            let block = GeometryBlock {
                elements,
                rule,
                test: test_descriptor,
                trials: trial_descriptors,
                points,
                offset,
            };
            offset += block.num_points();
            blocks.push(block);
        }

        Ok(Self {
            kind,
            test,
            trials,
            blocks,
            derivatives: vec![DMatrix::zeros(0, 0); offset],
            differentiated: None,
        })
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.derivatives.len()
    }

    /// The length of the test E-vector the evaluator writes into.
    pub fn test_evector_len(&self) -> usize {
        self.test.restriction.evector_len()
    }

    /// The trial field (by position among the evaluator's trial fields) whose tangents are cached.
    pub fn differentiated(&self) -> Option<usize> {
        self.differentiated
    }

    /// Evaluates the q-function at all quadrature points and adds the integrated result into `output`.
    ///
    /// `inputs` holds one E-vector per trial field and `output` is an E-vector of the test field. If
    /// `differentiate` names a trial field, the tangent with respect to that field is cached for later use by
    /// [`gradient_mult`](Self::gradient_mult) and [`compute_element_gradients`](Self::compute_element_gradients).
    ///
    /// `states` holds one state per quadrature point.
    pub fn mult<S, F>(
        &mut self,
        inputs: &[&DVector<f64>],
        output: &mut DVector<f64>,
        differentiate: Option<usize>,
        states: &mut [S],
        qfunction: F,
    ) -> eyre::Result<()>
    where
        S: Send,
        F: Fn(&QuadraturePoint, &[FieldValue], &mut S) -> eyre::Result<QFunctionOutput> + Sync,
    {
        assert_eq!(inputs.len(), self.trials.len(), "Need one input per trial field");
        assert_eq!(states.len(), self.num_quadrature_points(), "Need one state per quadrature point");
        // The cache is invalid until the evaluation completes
        self.differentiated = None;

        let test = &self.test;
        let trials = &self.trials;
        let derivatives = &mut self.derivatives;

        for block in &self.blocks {
            let nq = block.num_points_per_element();
            let range = block.offset..block.offset + block.num_points();
            let element_outputs = block
                .elements
                .par_iter()
                .enumerate()
                .zip(states[range.clone()].par_chunks_mut(nq.max(1)))
                .zip(derivatives[range].par_chunks_mut(nq.max(1)))
                .map(|(((local_index, &element), element_states), element_derivatives)| -> eyre::Result<DVector<f64>> {
                    let element_inputs: Vec<_> = izip!(trials.iter(), inputs)
                        .map(|(trial, input)| input.rows_range(trial.restriction.element_range(element)))
                        .collect();
                    let mut element_output = DVector::zeros(test.restriction.element_len(element));

                    for q in 0..nq {
                        let point = local_index * nq + q;
                        let geometry = &block.points[point];
                        let fields = izip!(&block.trials, &element_inputs)
                            .enumerate()
                            .map(|(j, (descriptor, input))| {
                                let interpolated = descriptor.interpolation(point) * input;
                                field_value(descriptor, &interpolated, differentiate == Some(j))
                            })
                            .collect::<Vec<_>>();

                        let qf_output = qfunction(&geometry.point, &fields, &mut element_states[q])?;
                        let mut flat = vec![Dual::constant(0.0); block.test.interpolated_len()];
                        qf_output.flatten_into(block.test.source_len(), block.test.flux_shape(), &mut flat)?;

                        let values = DVector::from_iterator(flat.len(), flat.iter().map(Dual::value));
                        let test_matrix = block.test.interpolation(point);
                        integrate_transpose(&mut element_output, geometry.scale, test_matrix, &values);

                        if let Some(j) = differentiate {
                            element_derivatives[q] = jacobian(&flat, block.trials[j].interpolated_len());
                        }
                    }
                    Ok(element_output)
                })
                .collect::<eyre::Result<Vec<_>>>()?;

            for (&element, element_output) in block.elements.iter().zip(element_outputs) {
                let mut rows = output.rows_range_mut(test.restriction.element_range(element));
                rows += element_output;
            }
        }

        self.differentiated = differentiate;
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

    /// Applies the cached element Jacobians with respect to trial field `which` to a perturbation E-vector,
    /// adding the result into `output`.
    pub fn gradient_mult(&self, input: &DVector<f64>, output: &mut DVector<f64>, which: usize) -> eyre::Result<()> {
        self.check_differentiated(which)?;
        let trial = &self.trials[which];
        for block in &self.blocks {
            let nq = block.num_points_per_element();
            let element_outputs: Vec<DVector<f64>> = block
                .elements
                .par_iter()
                .enumerate()
                .map(|(local_index, &element)| {
                    let perturbation = input.rows_range(trial.restriction.element_range(element));
                    let mut element_output = DVector::zeros(self.test.restriction.element_len(element));
                    for q in 0..nq {
                        let point = local_index * nq + q;
                        let geometry = &block.points[point];
                        let tangent = &self.derivatives[block.offset + point];
                        let interpolated = block.trials[which].interpolation(point) * &perturbation;
                        let variation = tangent * interpolated;
                        let test_matrix = block.test.interpolation(point);
                        integrate_transpose(&mut element_output, geometry.scale, test_matrix, &variation);
                    }
                    element_output
                })
                .collect();

            for (&element, element_output) in block.elements.iter().zip(element_outputs) {
                let mut rows = output.rows_range_mut(self.test.restriction.element_range(element));
                rows += element_output;
            }
        }
        Ok(())
    }

    /// Adds the dense element Jacobians with respect to trial field `which` into `element_matrices`, which
    /// holds one matrix per element of the evaluator's kind.
    pub fn compute_element_gradients(&self, which: usize, element_matrices: &mut [DMatrix<f64>]) -> eyre::Result<()> {
        self.check_differentiated(which)?;
        for block in &self.blocks {
            let nq = block.num_points_per_element();
            let contributions: Vec<DMatrix<f64>> = block
                .elements
                .par_iter()
                .enumerate()
                .map(|(local_index, _)| {
                    let mut element_matrix: Option<DMatrix<f64>> = None;
                    for q in 0..nq {
                        let point = local_index * nq + q;
                        let geometry = &block.points[point];
                        let tangent = &self.derivatives[block.offset + point];
                        let trial_matrix = block.trials[which].interpolation(point);
                        let test_matrix = block.test.interpolation(point);
                        let contribution = test_matrix.transpose() * (tangent * trial_matrix) * geometry.scale;
                        match element_matrix.as_mut() {
                            Some(matrix) => *matrix += contribution,
                            None => element_matrix = Some(contribution),
                        }
                    }
                    element_matrix.unwrap_or_else(|| DMatrix::zeros(0, 0))
                })
                .collect();

            for (&element, contribution) in block.elements.iter().zip(contributions) {
                if contribution.is_empty() {
                    continue;
                }
                let target = &mut element_matrices[element];
                assert_eq!(target.shape(), contribution.shape(), "Element matrix has wrong shape");
                *target += contribution;
            }
        }
        Ok(())
    }
}

/// Builds the field value from the flattened interpolated field, seeding it for differentiation if requested.
fn field_value(descriptor: &FieldDescriptor, interpolated: &DVector<f64>, seed: bool) -> FieldValue {
    let n = interpolated.len();
    let duals: Vec<Dual> = interpolated
        .iter()
        .enumerate()
        .map(|(k, &v)| {
            if seed {
                Dual::variable(v, k, n)
            } else {
                Dual::constant(v)
            }
        })
        .collect();
    let source_len = descriptor.source_len();
    let (c, r) = descriptor.flux_shape();
    let value = DVector::from_column_slice(&duals[..source_len]);
    let derivative = DMatrix::from_column_slice(c, r, &duals[source_len..]);
    FieldValue::new(value, derivative)
}
