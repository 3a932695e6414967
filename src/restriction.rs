//! Element restriction: the map between local vectors and element vectors (E-vectors).
//!
//! An E-vector stores, for every element of one kind, the dofs of that element in local order. Dofs
//! shared between elements are duplicated. Within an element, dofs are node-major: the `c` components of the
//! first node come first, followed by the components of the second node and so on.
use crate::mesh::ElementKind;
use crate::space::FiniteElementSpace;
use log::debug;
use nalgebra::DVector;
use std::ops::Range;

/// Gathers local vectors into E-vectors and scatters E-vectors back.
///
/// Every E-vector entry refers to one local dof and carries an orientation sign. [`gather`](Self::gather)
/// computes `e[k] = sign[k] * local[index[k]]`, and [`scatter_add`](Self::scatter_add) is its exact adjoint,
/// `local[index[k]] += sign[k] * e[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRestriction {
    kind: ElementKind,
    components: usize,
    num_local_dofs: usize,
    offsets: Vec<usize>,
    indices: Vec<usize>,
    signs: Vec<f64>,
}

impl ElementRestriction {
    /// Builds the restriction of the space to all elements of the given kind.
    pub fn new(space: &FiniteElementSpace, kind: ElementKind) -> eyre::Result<Self> {
        let components = space.field().components;
        let num_elements = space.mesh().elements_of_kind(kind).len();
        let mut offsets = Vec::with_capacity(num_elements + 1);
        let mut indices = Vec::new();
        let mut signs = Vec::new();
        offsets.push(0);
        for element in 0..num_elements {
            let element_nodes = space.element_nodes(kind, element)?;
            for (&node, &sign) in element_nodes.nodes.iter().zip(&element_nodes.signs) {
                for c in 0..components {
                    indices.push(components * node + c);
                    signs.push(sign);
                }
            }
            offsets.push(indices.len());
        }

        debug!(
            "Built {kind:?} element restriction with {num_elements} elements and {} E-vector entries",
            indices.len()
        );
        Ok(Self {
            kind,
            components,
            num_local_dofs: space.num_local_dofs(),
            offsets,
            indices,
            signs,
        })
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn num_local_dofs(&self) -> usize {
        self.num_local_dofs
    }

    pub fn num_elements(&self) -> usize {
        self.offsets.len() - 1
    }

    /// The total number of entries of an E-vector.
    pub fn evector_len(&self) -> usize {
        self.indices.len()
    }

    /// The range of E-vector entries belonging to the given element.
    pub fn element_range(&self, element: usize) -> Range<usize> {
        self.offsets[element]..self.offsets[element + 1]
    }

    pub fn element_len(&self, element: usize) -> usize {
        self.offsets[element + 1] - self.offsets[element]
    }

    /// The local dof indices of the given element.
    pub fn element_indices(&self, element: usize) -> &[usize] {
        &self.indices[self.element_range(element)]
    }

    pub fn element_signs(&self, element: usize) -> &[f64] {
        &self.signs[self.element_range(element)]
    }

    /// Copies signed local vector entries into the E-vector, resizing it if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the local vector does not have one entry per local dof.
    pub fn gather(&self, local: &DVector<f64>, evector: &mut DVector<f64>) {
        assert_eq!(local.len(), self.num_local_dofs, "Local vector has wrong length");
        if evector.len() != self.evector_len() {
            evector.resize_vertically_mut(self.evector_len(), 0.0);
        }
        for ((e, &index), &sign) in evector.iter_mut().zip(&self.indices).zip(&self.signs) {
            *e = sign * local[index];
        }
    }

    /// Adds signed E-vector entries into the local vector.
    ///
    /// # Panics
    ///
    /// Panics if either vector has the wrong length.
    pub fn scatter_add(&self, evector: &DVector<f64>, local: &mut DVector<f64>) {
        assert_eq!(local.len(), self.num_local_dofs, "Local vector has wrong length");
        assert_eq!(evector.len(), self.evector_len(), "E-vector has wrong length");
        for ((e, &index), &sign) in evector.iter().zip(&self.indices).zip(&self.signs) {
            local[index] += sign * e;
        }
    }
}
