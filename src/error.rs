//! Error types.
//!
//! Fallible operations in this crate return [`eyre::Result`]. Errors that stem from an inconsistent or
//! unsupported model setup are reported as a [`ConfigurationError`] wrapped in the [`eyre::Report`], so that
//! callers may recover the precise cause with [`eyre::Report::downcast_ref`].
use crate::element::Geometry;
use crate::space::FieldSpace;
use thiserror::Error;

/// An error in the setup of spaces, integrals or evaluation arguments.
///
/// Configuration errors are detected at construction time or at the very start of an evaluation,
/// before any output is produced.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    #[error("domain has dimension {actual}, but the integral was declared with dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("element geometry {0:?} is not supported")]
    UnsupportedGeometry(Geometry),
    #[error("no quadrature rule of strength {strength} is available for {geometry:?} elements")]
    NoQuadratureRule { geometry: Geometry, strength: usize },
    #[error("field space {space:?} is not supported on {geometry:?} elements")]
    UnsupportedSpace { space: FieldSpace, geometry: Geometry },
    #[error("field space {0:?} is invalid (order and component count must be positive)")]
    InvalidFieldSpace(FieldSpace),
    #[error("field space {0:?} has no trace on boundary elements")]
    NoBoundaryTrace(FieldSpace),
    #[error("dependency index {index} is out of range for {num_trial_spaces} trial space(s)")]
    InvalidDependency { index: usize, num_trial_spaces: usize },
    #[error("dependency index {0} is listed more than once")]
    DuplicateDependency(usize),
    #[error("domain contains no elements")]
    EmptyDomain,
    #[error("element index {index} is out of bounds for {num_elements} element(s)")]
    ElementOutOfBounds { index: usize, num_elements: usize },
    #[error("domain integrals require a domain of interior elements, boundary integrals a domain of boundary elements")]
    DomainKindMismatch,
    #[error("all spaces of a functional must be defined on the same mesh")]
    MeshMismatch,
    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCountMismatch { expected: usize, actual: usize },
    #[error("argument {argument} has length {actual}, expected {expected}")]
    ArgumentSizeMismatch { argument: usize, expected: usize, actual: usize },
    #[error("no derivative with respect to argument {requested} is available (cached: {cached:?})")]
    NotDifferentiated { requested: usize, cached: Option<usize> },
    #[error("q-function {part} has shape {actual:?}, expected {expected:?}")]
    OutputShapeMismatch {
        part: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("prolongation maps to {actual} local dofs, but the space has {expected}")]
    ProlongationSizeMismatch { expected: usize, actual: usize },
    #[error("quadrature data holds {actual} entries, but the integral has {expected} quadrature points")]
    QuadratureDataSizeMismatch { expected: usize, actual: usize },
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
}
