//! Solid mechanics functionality for `weakform`.
//!
//! Materials are expressed as stress functions of the displacement gradient $\vec H = \nabla \vec u$ on
//! dual numbers, so that they can be used directly as q-functions for the flux term
//! $$
//! \int_\Omega \vec P(\nabla \vec u) : \nabla \vec w \, \mathrm{d}\vec X
//! $$
//! and differentiated exactly.
use eyre::Result;
use weakform::dual::{Dual, DualMatrix};

pub mod body_force;
pub mod driver;
pub mod materials;

pub use body_force::BodyForce;
pub use driver::{uniaxial_strain_history, uniaxial_stress_test, UniaxialStressPoint};

/// A material described by a stress function of the displacement gradient.
pub trait StressModel: Send + Sync {
    /// Compute the strain energy density $\psi$ at the displacement gradient $\vec H$.
    fn compute_energy_density(&self, displacement_gradient: &DualMatrix) -> Result<Dual>;

    /// Compute the stress tensor $\vec P = \partial \psi / \partial \vec H$ at the displacement gradient $\vec H$.
    ///
    /// Fails if the material cannot be evaluated, for instance at an inverted deformation.
    fn compute_stress_tensor(&self, displacement_gradient: &DualMatrix) -> Result<DualMatrix>;
}

/// A material whose stress additionally depends on a per-point state and on scalar parameters, for instance
/// coefficients that vary in time.
///
/// Every [`StressModel`] is a stateful model without state and without parameters.
pub trait StatefulStressModel: Send + Sync {
    type State: Clone + Send;

    /// The number of scalar parameters expected by
    /// [`compute_stress_tensor_with_state`](Self::compute_stress_tensor_with_state).
    fn num_parameters(&self) -> usize {
        0
    }

    /// Compute the stress tensor at the displacement gradient $\vec H$, updating the state of the material point.
    fn compute_stress_tensor_with_state(
        &self,
        displacement_gradient: &DualMatrix,
        state: &mut Self::State,
        parameters: &[f64],
    ) -> Result<DualMatrix>;
}

impl<M: StressModel> StatefulStressModel for M {
    type State = ();

    fn compute_stress_tensor_with_state(
        &self,
        displacement_gradient: &DualMatrix,
        _state: &mut (),
        _parameters: &[f64],
    ) -> Result<DualMatrix> {
        self.compute_stress_tensor(displacement_gradient)
    }
}
