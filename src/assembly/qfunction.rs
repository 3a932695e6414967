//! The interface between user-supplied pointwise integrands and the quadrature evaluator.
use crate::dual::Dual;
use crate::error::ConfigurationError;
use nalgebra::{DMatrix, DVector};
use parking_lot::Mutex;
use std::sync::Arc;

/// Information about the quadrature point at which a q-function is evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraturePoint {
    /// Physical coordinates of the point.
    pub coordinates: DVector<f64>,
    /// The outward unit normal, for points on boundary elements.
    pub normal: Option<DVector<f64>>,
    /// Index of the element in the mesh (among elements of the same kind).
    pub element: usize,
    /// Index of the point among the quadrature points of the element.
    pub index: usize,
}

/// The value and derivative of a field at a quadrature point.
///
/// For a field with `c` components:
///
/// - nodal and discontinuous fields have a value of length `c` and a `c x d` gradient, whose `i`-th row is
///   the gradient of the `i`-th component,
/// - tangential fields have a vector value of length `d` and their curl as derivative (`1 x 1` in two
///   dimensions, `1 x 3` in three dimensions),
/// - normal fields have a vector value of length `d` and their divergence (`1 x 1`) as derivative.
///
/// On boundary elements, the derivative has no columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    value: DVector<Dual>,
    derivative: DMatrix<Dual>,
}

impl FieldValue {
    pub fn new(value: DVector<Dual>, derivative: DMatrix<Dual>) -> Self {
        Self { value, derivative }
    }

    pub fn value(&self) -> &DVector<Dual> {
        &self.value
    }

    pub fn derivative(&self) -> &DMatrix<Dual> {
        &self.derivative
    }

    /// The gradient of a nodal or discontinuous field. Synonym for [`derivative`](Self::derivative).
    pub fn gradient(&self) -> &DMatrix<Dual> {
        &self.derivative
    }

    /// The value of a scalar field.
    ///
    /// # Panics
    ///
    /// Panics if the value is empty.
    pub fn scalar(&self) -> &Dual {
        &self.value[0]
    }

    pub fn into_parts(self) -> (DVector<Dual>, DMatrix<Dual>) {
        (self.value, self.derivative)
    }
}

/// The output of a q-function at a single quadrature point.
///
/// The source is integrated against the values of the test functions and must have the same shape as the
/// value of a test field (see [`FieldValue`]). The flux is integrated against the test function derivatives
/// and must have the shape of the test field derivative. Either part may be empty, in which case it does not
/// contribute.
#[derive(Debug, Clone, PartialEq)]
pub struct QFunctionOutput {
    source: DVector<Dual>,
    flux: DMatrix<Dual>,
}

impl QFunctionOutput {
    pub fn new(source: DVector<Dual>, flux: DMatrix<Dual>) -> Self {
        Self { source, flux }
    }

    pub fn from_source(source: DVector<Dual>) -> Self {
        Self::new(source, DMatrix::zeros(0, 0))
    }

    pub fn from_flux(flux: DMatrix<Dual>) -> Self {
        Self::new(DVector::zeros(0), flux)
    }

    pub fn scalar_source(source: Dual) -> Self {
        Self::from_source(DVector::from_element(1, source))
    }

    pub fn empty() -> Self {
        Self::new(DVector::zeros(0), DMatrix::zeros(0, 0))
    }

    pub fn source(&self) -> &DVector<Dual> {
        &self.source
    }

    pub fn flux(&self) -> &DMatrix<Dual> {
        &self.flux
    }

    /// Writes the output into `flat`, with the source followed by the flux in column-major order.
    ///
    /// Empty parts leave zeros. `flat` must be zero-initialized and sized for the expected shapes.
    pub(crate) fn flatten_into(
        &self,
        source_len: usize,
        flux_shape: (usize, usize),
        flat: &mut [Dual],
    ) -> Result<(), ConfigurationError> {
        if !self.source.is_empty() {
            if self.source.len() != source_len {
                return Err(ConfigurationError::OutputShapeMismatch {
                    part: "source",
                    expected: (source_len, 1),
                    actual: self.source.shape(),
                });
            }
            flat[..source_len].clone_from_slice(self.source.as_slice());
        }
        if !self.flux.is_empty() {
            if self.flux.shape() != flux_shape {
                return Err(ConfigurationError::OutputShapeMismatch {
                    part: "flux",
                    expected: flux_shape,
                    actual: self.flux.shape(),
                });
            }
            flat[source_len..].clone_from_slice(self.flux.as_slice());
        }
        Ok(())
    }
}

/// A pointwise integrand.
///
/// Fields are passed in the order of the integral's dependencies. Only the field that is being differentiated
/// carries partial derivatives, all others are constants. Implementations must compute their output purely
/// through operations on [`Dual`] numbers for the derivative to be exact.
///
/// Closures with the signature `Fn(&QuadraturePoint, &[FieldValue]) -> eyre::Result<QFunctionOutput>`
/// implement this trait.
pub trait QFunction: Send + Sync {
    fn evaluate(&self, point: &QuadraturePoint, fields: &[FieldValue]) -> eyre::Result<QFunctionOutput>;
}

impl<F> QFunction for F
where
    F: Fn(&QuadraturePoint, &[FieldValue]) -> eyre::Result<QFunctionOutput> + Send + Sync,
{
    fn evaluate(&self, point: &QuadraturePoint, fields: &[FieldValue]) -> eyre::Result<QFunctionOutput> {
        self(point, fields)
    }
}

/// A pointwise integrand with persistent state at every quadrature point.
///
/// Changes made to the state are only persisted if the functional is set to update its quadrature
/// data. Otherwise the q-function operates on a scratch copy.
pub trait StatefulQFunction<S>: Send + Sync {
    fn evaluate(&self, point: &QuadraturePoint, fields: &[FieldValue], state: &mut S) -> eyre::Result<QFunctionOutput>;
}

impl<S, F> StatefulQFunction<S> for F
where
    F: Fn(&QuadraturePoint, &[FieldValue], &mut S) -> eyre::Result<QFunctionOutput> + Send + Sync,
{
    fn evaluate(&self, point: &QuadraturePoint, fields: &[FieldValue], state: &mut S) -> eyre::Result<QFunctionOutput> {
        self(point, fields, state)
    }
}

/// Adapts a [`QFunction`] to a stateful q-function without state.
#[derive(Debug, Clone)]
pub struct Stateless<Q>(pub Q);

impl<Q: QFunction> StatefulQFunction<()> for Stateless<Q> {
    fn evaluate(&self, point: &QuadraturePoint, fields: &[FieldValue], _state: &mut ()) -> eyre::Result<QFunctionOutput> {
        self.0.evaluate(point, fields)
    }
}

/// Persistent per-quadrature-point state of an integral.
///
/// Values are ordered by geometry block, then by element and then by quadrature point. The storage is
/// filled with copies of the initial value when the data is first attached to an integral.
#[derive(Debug, Clone)]
pub struct QuadratureData<S> {
    initial: S,
    values: Vec<S>,
}

/// Quadrature data shared between the caller and an integral.
pub type SharedQuadratureData<S> = Arc<Mutex<QuadratureData<S>>>;

impl<S: Clone> QuadratureData<S> {
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            values: Vec::new(),
        }
    }

    pub fn shared(initial: S) -> SharedQuadratureData<S> {
        Arc::new(Mutex::new(Self::new(initial)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[S] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [S] {
        &mut self.values
    }

    pub fn get(&self, index: usize) -> Option<&S> {
        self.values.get(index)
    }

    /// Fills empty storage with `len` copies of the initial value, or checks that existing storage has
    /// length `len`.
    pub(crate) fn ensure_len(&mut self, len: usize) -> Result<(), ConfigurationError> {
        if self.values.is_empty() {
            self.values = vec![self.initial.clone(); len];
            Ok(())
        } else if self.values.len() == len {
            Ok(())
        } else {
            Err(ConfigurationError::QuadratureDataSizeMismatch {
                expected: len,
                actual: self.values.len(),
            })
        }
    }
}
