//! Quadrature-based evaluation of weak forms on unstructured meshes, with exact derivatives computed by
//! forward-mode automatic differentiation.
//!
//! The main entry point is [`assembly::Functional`]. Users describe a weak form by pointwise
//! *q-functions* operating on [`dual::Dual`] numbers, and the library takes care of interpolation,
//! integration and assembly of the residual and its Jacobian.
pub mod assembly;
pub mod dual;
pub mod element;
pub mod error;
pub mod mesh;
pub mod quadrature;
pub mod restriction;
pub mod space;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use error::ConfigurationError;

pub extern crate eyre;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
