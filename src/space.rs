//! Field spaces and finite element spaces defined on a mesh.
//!
//! A [`FieldSpace`] is a pure description (family, order, number of components). A [`FiniteElementSpace`]
//! binds a field space to a concrete [`Mesh`], numbers its degrees of freedom and carries the
//! [`Prolongation`] between true and local dofs.
use crate::element::Geometry;
use crate::error::ConfigurationError;
use crate::mesh::{ElementKind, Mesh};
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod dofs;
mod prolongation;

pub use dofs::*;
pub use prolongation::*;

/// The family of a field space, determining which continuity is enforced between elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    /// Continuous Lagrange functions ($H^1$).
    Nodal,
    /// Vector fields with continuous tangential component ($H(\mathrm{curl})$).
    Tangential,
    /// Vector fields with continuous normal component ($H(\mathrm{div})$).
    Normal,
    /// Element-wise Lagrange functions without continuity ($L^2$).
    Discontinuous,
}

/// Describes a field: its family, polynomial order and number of components.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpace {
    pub family: Family,
    pub order: usize,
    pub components: usize,
}

impl FieldSpace {
    pub fn nodal(order: usize) -> Self {
        Self {
            family: Family::Nodal,
            order,
            components: 1,
        }
    }

    pub fn discontinuous(order: usize) -> Self {
        Self {
            family: Family::Discontinuous,
            order,
            components: 1,
        }
    }

    /// The lowest-order tangentially continuous (Nédélec) space.
    pub fn tangential() -> Self {
        Self {
            family: Family::Tangential,
            order: 1,
            components: 1,
        }
    }

    /// The lowest-order normally continuous (Raviart-Thomas) space.
    pub fn normal() -> Self {
        Self {
            family: Family::Normal,
            order: 1,
            components: 1,
        }
    }

    pub fn with_components(self, components: usize) -> Self {
        Self { components, ..self }
    }

    pub fn is_vector_valued(&self) -> bool {
        matches!(self.family, Family::Tangential | Family::Normal)
    }

    /// Checks that order and component count are meaningful for the family.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let valid = self.order > 0 && self.components > 0 && (!self.is_vector_valued() || self.components == 1);
        if valid {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidFieldSpace(*self))
        }
    }

    /// Whether basis functions of this space are available on the given geometry.
    pub fn supports(&self, geometry: Geometry) -> bool {
        if !geometry.is_supported() {
            return false;
        }
        match self.family {
            Family::Nodal | Family::Discontinuous => (1..=2).contains(&self.order),
            Family::Tangential | Family::Normal => {
                self.order == 1 && matches!(geometry, Geometry::Quadrilateral | Geometry::Hexahedron)
            }
        }
    }

    pub fn check_geometry(&self, geometry: Geometry) -> Result<(), ConfigurationError> {
        geometry.check_supported()?;
        if self.supports(geometry) {
            Ok(())
        } else {
            Err(ConfigurationError::UnsupportedSpace {
                space: *self,
                geometry,
            })
        }
    }

    /// Whether the space can be restricted to boundary elements.
    pub fn has_boundary_trace(&self) -> bool {
        self.family == Family::Nodal
    }

    /// Number of rows of the value of a single component at a quadrature point, for elements of the given
    /// reference dimension.
    pub fn value_rows(&self, dim: usize) -> usize {
        if self.is_vector_valued() {
            dim
        } else {
            1
        }
    }

    /// Number of rows of the derivative (gradient, curl or divergence) of a single component.
    pub fn derivative_rows(&self, dim: usize) -> usize {
        match self.family {
            Family::Nodal | Family::Discontinuous => dim,
            Family::Tangential if dim == 2 => 1,
            Family::Tangential => 3,
            Family::Normal => 1,
        }
    }
}

/// A field space on a mesh, with numbered degrees of freedom.
///
/// Degrees of freedom are associated with *nodes*. Every node carries one dof per component, and
/// local dof `components * node + component` is the `component`-th dof of `node`.
#[derive(Debug, Clone)]
pub struct FiniteElementSpace {
    mesh: Arc<Mesh>,
    field: FieldSpace,
    dofs: DofMap,
    prolongation: Arc<dyn Prolongation>,
}

impl FiniteElementSpace {
    /// Numbers the dofs of the field space on the domain elements of the mesh.
    ///
    /// The prolongation is the identity, i.e. true and local dofs coincide.
    pub fn new(mesh: Arc<Mesh>, field: FieldSpace) -> eyre::Result<Self> {
        field.validate()?;
        for element in mesh.elements() {
            field.check_geometry(element.geometry())?;
        }
        let dofs = DofMap::build(&mesh, &field)?;
        let num_local_dofs = dofs.num_nodes() * field.components;
        debug!(
            "Created {:?} space of order {} with {} nodes and {} local dofs on {} elements",
            field.family,
            field.order,
            dofs.num_nodes(),
            num_local_dofs,
            mesh.elements().len()
        );
        Ok(Self {
            mesh,
            field,
            dofs,
            prolongation: Arc::new(IdentityProlongation::new(num_local_dofs)),
        })
    }

    /// Replaces the prolongation, for example to impose periodicity or other linear constraints.
    pub fn with_prolongation(self, prolongation: impl Prolongation + 'static) -> eyre::Result<Self> {
        let expected = self.num_local_dofs();
        if prolongation.num_local_dofs() != expected {
            return Err(ConfigurationError::ProlongationSizeMismatch {
                expected,
                actual: prolongation.num_local_dofs(),
            }
            .into());
        }
        Ok(Self {
            prolongation: Arc::new(prolongation),
            ..self
        })
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn field(&self) -> &FieldSpace {
        &self.field
    }

    pub fn dofs(&self) -> &DofMap {
        &self.dofs
    }

    pub fn prolongation(&self) -> &dyn Prolongation {
        self.prolongation.as_ref()
    }

    pub fn num_nodes(&self) -> usize {
        self.dofs.num_nodes()
    }

    pub fn num_local_dofs(&self) -> usize {
        self.num_nodes() * self.field.components
    }

    pub fn num_true_dofs(&self) -> usize {
        self.prolongation.num_true_dofs()
    }

    /// Physical positions of the nodes.
    ///
    /// For nodal and discontinuous spaces these are the interpolation points, for vector-valued
    /// spaces the centroids of the associated edges or facets.
    pub fn node_positions(&self) -> &[DVector<f64>] {
        self.dofs.positions()
    }

    /// Interpolates a function into a nodal or discontinuous space, returning a local vector.
    ///
    /// The function must return `components` values.
    pub fn interpolate(&self, f: impl Fn(&DVector<f64>) -> DVector<f64>) -> DVector<f64> {
        let c = self.field.components;
        let mut local = DVector::zeros(self.num_local_dofs());
        for (node, x) in self.node_positions().iter().enumerate() {
            let value = f(x);
            assert_eq!(value.len(), c, "Interpolated function must return one value per component");
            local.rows_mut(c * node, c).copy_from(&value);
        }
        local
    }

    /// The nodes and orientation signs of the given element.
    ///
    /// Boundary elements are only available for spaces with a boundary trace.
    pub fn element_nodes(&self, kind: ElementKind, element: usize) -> eyre::Result<ElementNodes> {
        match kind {
            ElementKind::Domain => Ok(self.dofs.domain_element_nodes(element)),
            ElementKind::Boundary => {
                if !self.field.has_boundary_trace() {
                    return Err(ConfigurationError::NoBoundaryTrace(self.field).into());
                }
                self.dofs.boundary_element_nodes(&self.mesh, &self.field, element)
            }
        }
    }
}
