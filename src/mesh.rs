//! Unstructured meshes of possibly mixed element geometry, and domains of integration over them.
use crate::element::Geometry;
use crate::error::ConfigurationError;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

pub mod procedural;

/// Distinguishes interior (domain) elements from boundary elements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Domain,
    Boundary,
}

impl ElementKind {
    pub const ALL: [ElementKind; 2] = [ElementKind::Domain, ElementKind::Boundary];

    /// A dense index for use in per-kind arrays.
    pub fn index(&self) -> usize {
        match self {
            Self::Domain => 0,
            Self::Boundary => 1,
        }
    }
}

/// An element of a mesh, given by its geometry and its (global) vertex indices.
///
/// Vertices are ordered according to the reference vertices of the geometry
/// (see [`Geometry::reference_vertices`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshElement {
    geometry: Geometry,
    vertices: Vec<usize>,
    attribute: usize,
}

impl MeshElement {
    pub fn new(geometry: Geometry, vertices: Vec<usize>) -> Self {
        Self {
            geometry,
            vertices,
            attribute: 0,
        }
    }

    /// Tags the element with an attribute, which can be used to select integration domains.
    pub fn with_attribute(self, attribute: usize) -> Self {
        Self { attribute, ..self }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    pub fn attribute(&self) -> usize {
        self.attribute
    }
}

/// A mesh consisting of vertices, domain elements and boundary elements.
///
/// Domain elements have the same reference dimension as the spatial dimension of the mesh,
/// boundary elements have one dimension less.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    dim: usize,
    vertices: Vec<DVector<f64>>,
    elements: Vec<MeshElement>,
    boundary_elements: Vec<MeshElement>,
}

impl Mesh {
    pub fn try_new(
        dim: usize,
        vertices: Vec<DVector<f64>>,
        elements: Vec<MeshElement>,
        boundary_elements: Vec<MeshElement>,
    ) -> eyre::Result<Self> {
        let invalid = |message: String| ConfigurationError::InvalidMesh(message);
        if !(1..=3).contains(&dim) {
            return Err(invalid(format!("spatial dimension {dim} is not 1, 2 or 3")).into());
        }
        if let Some(i) = vertices.iter().position(|v| v.len() != dim) {
            return Err(invalid(format!("vertex {i} does not have {dim} coordinates")).into());
        }

        for (kind, list, expected_dim) in [
            (ElementKind::Domain, &elements, dim),
            (ElementKind::Boundary, &boundary_elements, dim - 1),
        ] {
            for (i, element) in list.iter().enumerate() {
                let geometry = element.geometry();
                if element.vertices().len() != geometry.num_vertices() {
                    return Err(invalid(format!(
                        "{kind:?} element {i} has {} vertices, but {geometry:?} requires {}",
                        element.vertices().len(),
                        geometry.num_vertices()
                    ))
                    .into());
                }
                if geometry.reference_dim() != expected_dim {
                    return Err(invalid(format!(
                        "{kind:?} element {i} has geometry {geometry:?}, which does not have dimension {expected_dim}"
                    ))
                    .into());
                }
                if let Some(&v) = element.vertices().iter().find(|&&v| v >= vertices.len()) {
                    return Err(invalid(format!("{kind:?} element {i} references non-existent vertex {v}")).into());
                }
            }
        }

        Ok(Self {
            dim,
            vertices,
            elements,
            boundary_elements,
        })
    }

    /// The spatial dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn vertices(&self) -> &[DVector<f64>] {
        &self.vertices
    }

    /// Mutable access to vertex coordinates, for example to perturb a structured mesh.
    ///
    /// The connectivity of the mesh cannot be changed.
    pub fn vertices_mut(&mut self) -> &mut [DVector<f64>] {
        &mut self.vertices
    }

    pub fn elements(&self) -> &[MeshElement] {
        &self.elements
    }

    pub fn boundary_elements(&self) -> &[MeshElement] {
        &self.boundary_elements
    }

    pub fn elements_of_kind(&self, kind: ElementKind) -> &[MeshElement] {
        match kind {
            ElementKind::Domain => &self.elements,
            ElementKind::Boundary => &self.boundary_elements,
        }
    }
}

/// A set of elements of one kind over which an integral is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    kind: ElementKind,
    dim: usize,
    elements: Vec<usize>,
}

impl Domain {
    /// A domain consisting of the given elements of the given kind.
    pub fn from_elements(mesh: &Mesh, kind: ElementKind, elements: Vec<usize>) -> eyre::Result<Self> {
        let num_elements = mesh.elements_of_kind(kind).len();
        if let Some(&index) = elements.iter().find(|&&e| e >= num_elements) {
            return Err(ConfigurationError::ElementOutOfBounds { index, num_elements }.into());
        }
        Ok(Self {
            kind,
            dim: Self::dim_of_kind(mesh, kind),
            elements,
        })
    }

    /// All domain elements of the mesh.
    pub fn all_elements(mesh: &Mesh) -> Self {
        Self::all_of_kind(mesh, ElementKind::Domain)
    }

    /// All boundary elements of the mesh.
    pub fn all_boundary_elements(mesh: &Mesh) -> Self {
        Self::all_of_kind(mesh, ElementKind::Boundary)
    }

    /// The domain elements with the given attribute.
    pub fn elements_with_attribute(mesh: &Mesh, attribute: usize) -> Self {
        Self::with_attribute(mesh, ElementKind::Domain, attribute)
    }

    /// The boundary elements with the given attribute.
    pub fn boundary_elements_with_attribute(mesh: &Mesh, attribute: usize) -> Self {
        Self::with_attribute(mesh, ElementKind::Boundary, attribute)
    }

    fn all_of_kind(mesh: &Mesh, kind: ElementKind) -> Self {
        Self {
            kind,
            dim: Self::dim_of_kind(mesh, kind),
            elements: (0..mesh.elements_of_kind(kind).len()).collect(),
        }
    }

    fn with_attribute(mesh: &Mesh, kind: ElementKind, attribute: usize) -> Self {
        let elements = mesh
            .elements_of_kind(kind)
            .iter()
            .enumerate()
            .filter(|(_, element)| element.attribute() == attribute)
            .map(|(i, _)| i)
            .collect();
        Self {
            kind,
            dim: Self::dim_of_kind(mesh, kind),
            elements,
        }
    }

    fn dim_of_kind(mesh: &Mesh, kind: ElementKind) -> usize {
        match kind {
            ElementKind::Domain => mesh.dim(),
            ElementKind::Boundary => mesh.dim() - 1,
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// The geometric dimension of the elements in the domain.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Indices into the elements of the mesh of the appropriate kind.
    pub fn elements(&self) -> &[usize] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
