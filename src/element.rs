//! Reference elements: geometries, their topology and basis functions on the reference domain.
//!
//! Tensor-product geometries (segments, quadrilaterals and hexahedra) use the reference domain
//! $[-1, 1]^d$, while simplices (triangles and tetrahedra) use the unit simplex with a vertex at the origin.
use crate::error::ConfigurationError;
use crate::space::{Family, FieldSpace};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

mod lagrange;
mod vector;

pub use lagrange::*;
pub use vector::*;

/// The geometric shape of an element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Geometry {
    Point,
    Segment,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
    Wedge,
    Pyramid,
}

impl Geometry {
    /// The dimension of the reference domain.
    pub fn reference_dim(&self) -> usize {
        match self {
            Self::Point => 0,
            Self::Segment => 1,
            Self::Triangle | Self::Quadrilateral => 2,
            Self::Tetrahedron | Self::Hexahedron | Self::Wedge | Self::Pyramid => 3,
        }
    }

    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Point => 1,
            Self::Segment => 2,
            Self::Triangle => 3,
            Self::Quadrilateral => 4,
            Self::Tetrahedron => 4,
            Self::Hexahedron => 8,
            Self::Wedge => 6,
            Self::Pyramid => 5,
        }
    }

    /// Whether integrals may be evaluated over elements of this geometry.
    ///
    /// Points, wedges and pyramids may be present in a [`Mesh`](crate::mesh::Mesh), but any attempt to
    /// build spaces, restrictions or integrals over them fails with a configuration error.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Point | Self::Wedge | Self::Pyramid)
    }

    pub fn is_simplex(&self) -> bool {
        matches!(self, Self::Triangle | Self::Tetrahedron)
    }

    pub fn is_tensor_product(&self) -> bool {
        matches!(self, Self::Segment | Self::Quadrilateral | Self::Hexahedron)
    }

    /// Returns an error unless the geometry is supported.
    pub fn check_supported(&self) -> Result<(), ConfigurationError> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(ConfigurationError::UnsupportedGeometry(*self))
        }
    }

    /// Reference coordinates of the vertices. Only the first `reference_dim` coordinates are meaningful.
    ///
    /// Returns an empty slice for unsupported geometries.
    pub fn reference_vertices(&self) -> &'static [[f64; 3]] {
        match self {
            Self::Segment => &[[-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            Self::Triangle => &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            #[rustfmt::skip]
            Self::Quadrilateral => &[
                [-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]
            ],
            #[rustfmt::skip]
            Self::Tetrahedron => &[
                [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]
            ],
            #[rustfmt::skip]
            Self::Hexahedron => &[
                [-1.0, -1.0, -1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0], [-1.0, 1.0, -1.0],
                [-1.0, -1.0,  1.0], [1.0, -1.0,  1.0], [1.0, 1.0,  1.0], [-1.0, 1.0,  1.0],
            ],
            Self::Point | Self::Wedge | Self::Pyramid => &[],
        }
    }

    /// Edges of the element as pairs of local vertex indices.
    ///
    /// Only edges that are proper sub-entities are listed, i.e. a segment has no edges.
    /// For quadrilaterals and hexahedra, every edge runs in the positive direction of one
    /// reference axis.
    pub fn edges(&self) -> &'static [[usize; 2]] {
        match self {
            Self::Triangle => &[[0, 1], [1, 2], [0, 2]],
            Self::Quadrilateral => &[[0, 1], [3, 2], [0, 3], [1, 2]],
            Self::Tetrahedron => &[[0, 1], [1, 2], [0, 2], [0, 3], [1, 3], [2, 3]],
            #[rustfmt::skip]
            Self::Hexahedron => &[
                [0, 1], [3, 2], [4, 5], [7, 6],
                [0, 3], [1, 2], [4, 7], [5, 6],
                [0, 4], [1, 5], [3, 7], [2, 6],
            ],
            _ => &[],
        }
    }

    /// Quadrilateral faces of a hexahedron as vertex cycles.
    ///
    /// Each cycle is ordered such that its right-hand normal points in the positive direction
    /// of the reference axis perpendicular to the face.
    pub fn faces(&self) -> &'static [[usize; 4]] {
        match self {
            #[rustfmt::skip]
            Self::Hexahedron => &[
                [0, 3, 7, 4], [1, 2, 6, 5],
                [0, 4, 5, 1], [3, 7, 6, 2],
                [0, 1, 2, 3], [4, 5, 6, 7],
            ],
            _ => &[],
        }
    }
}

/// A topological sub-entity of a reference element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Entity {
    Vertex(usize),
    Edge(usize),
    Face(usize),
    Interior,
}

impl Entity {
    /// The local vertices that span the entity.
    pub fn local_vertices(&self, geometry: Geometry) -> Vec<usize> {
        match *self {
            Entity::Vertex(v) => vec![v],
            Entity::Edge(e) => geometry.edges()[e].to_vec(),
            Entity::Face(f) => geometry.faces()[f].to_vec(),
            Entity::Interior => (0..geometry.num_vertices()).collect(),
        }
    }
}

/// Basis function values and derivatives at a single point of the reference domain.
///
/// Columns correspond to basis functions. For scalar (nodal or discontinuous) bases, `values` has a single
/// row and `derivatives` holds the reference gradient (one row per reference coordinate). For vector-valued
/// bases, `values` has one row per reference coordinate and `derivatives` holds the reference curl or
/// divergence.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceBasis {
    pub values: DMatrix<f64>,
    pub derivatives: DMatrix<f64>,
}

/// Evaluates the reference basis of the given field space on the given geometry.
pub fn evaluate_reference_basis(
    space: &FieldSpace,
    geometry: Geometry,
    xi: &[f64],
) -> Result<ReferenceBasis, ConfigurationError> {
    let unsupported = || ConfigurationError::UnsupportedSpace {
        space: *space,
        geometry,
    };
    geometry.check_supported()?;
    match space.family {
        Family::Nodal | Family::Discontinuous => {
            let (values, derivatives) = evaluate_lagrange_basis(geometry, space.order, xi).ok_or_else(unsupported)?;
            Ok(ReferenceBasis { values, derivatives })
        }
        Family::Tangential => evaluate_nedelec_basis(geometry, xi).ok_or_else(unsupported),
        Family::Normal => evaluate_raviart_thomas_basis(geometry, xi).ok_or_else(unsupported),
    }
}
