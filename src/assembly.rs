//! Evaluation and differentiation of weak forms.
//!
//! A [`Functional`] is a sum of [`Integral`]s over domains of a mesh. Each integral evaluates a user-supplied
//! q-function at the quadrature points of its elements through a [`QuadratureEvaluator`]. The derivative of a
//! functional with respect to one of its arguments is available as a [`Gradient`], which can be applied to
//! vectors or assembled into a sparse matrix with the help of a [`GradientAssemblyLookup`].
mod evaluator;
mod functional;
mod integral;
mod lookup;
mod qfunction;

pub use evaluator::*;
pub use functional::*;
pub use integral::Integral;
pub use lookup::*;
pub use qfunction::*;
