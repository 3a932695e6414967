//! Quadrature rules for the reference domains of the supported geometries.
//!
//! Segments, quadrilaterals and hexahedra use (tensor products of) Gauss rules on `[-1, 1]`. Simplices use
//! the `polyquad` rules, which have positive weights and points in the interior of the element, mapped to
//! the unit simplex.
use crate::element::Geometry;
use crate::error::ConfigurationError;
use fenris_quadrature::tensor::{hexahedron_gauss, quadrilateral_gauss};
use fenris_quadrature::univariate::gauss;
use fenris_quadrature::{polyquad, Rule};

/// A quadrature rule on a reference domain.
///
/// Points are stored contiguously, `dim` coordinates per point.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule {
    dim: usize,
    weights: Vec<f64>,
    points: Vec<f64>,
}

impl QuadratureRule {
    /// # Panics
    ///
    /// Panics if the number of point coordinates is not `dim` times the number of weights.
    pub fn from_parts(dim: usize, weights: Vec<f64>, points: Vec<f64>) -> Self {
        assert_eq!(weights.len() * dim, points.len(), "Inconsistent number of points and weights");
        Self { dim, weights, points }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn point(&self, index: usize) -> &[f64] {
        &self.points[self.dim * index..self.dim * (index + 1)]
    }

    pub fn points(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.len()).map(move |i| self.point(i))
    }

    /// Approximates the integral of the given function over the reference domain.
    pub fn integrate(&self, f: impl Fn(&[f64]) -> f64) -> f64 {
        self.weights
            .iter()
            .zip(self.points())
            .map(|(w, p)| w * f(p))
            .sum()
    }

    /// Maps a rule on the simplex with vertices `-1` and `-1 + 2 e_i` to the unit simplex.
    fn into_unit_simplex(self) -> Self {
        let scale = 0.5_f64.powi(self.dim as i32);
        Self {
            dim: self.dim,
            weights: self.weights.into_iter().map(|w| scale * w).collect(),
            points: self.points.into_iter().map(|x| 0.5 * (x + 1.0)).collect(),
        }
    }
}

impl<const D: usize> From<Rule<D>> for QuadratureRule {
    fn from((weights, points): Rule<D>) -> Self {
        let points = points.into_iter().flatten().collect();
        Self::from_parts(D, weights, points)
    }
}

fn simplex_rule(geometry: Geometry, num_points_per_dim: usize) -> Result<QuadratureRule, ConfigurationError> {
    let strength = (2 * num_points_per_dim).saturating_sub(1);
    let rule: Result<QuadratureRule, _> = match geometry {
        Geometry::Triangle => polyquad::triangle(strength).map(QuadratureRule::from),
        Geometry::Tetrahedron => polyquad::tetrahedron(strength).map(QuadratureRule::from),
        _ => return Err(ConfigurationError::UnsupportedGeometry(geometry)),
    };
    rule.map(QuadratureRule::into_unit_simplex)
        .map_err(|_| ConfigurationError::NoQuadratureRule { geometry, strength })
}

/// The quadrature rule used for elements of the given geometry, with the given number of points
/// per reference direction.
///
/// Tensor-product geometries get `n` Gauss points per direction. Simplices get the smallest available rule
/// that integrates polynomials of total degree `2 n - 1` exactly, on the unit simplex with vertices at the
/// origin and the unit coordinate vectors.
pub fn rule_for_geometry(geometry: Geometry, num_points_per_dim: usize) -> Result<QuadratureRule, ConfigurationError> {
    match geometry {
        Geometry::Segment => Ok(gauss(num_points_per_dim).into()),
        Geometry::Quadrilateral => Ok(quadrilateral_gauss(num_points_per_dim).into()),
        Geometry::Hexahedron => Ok(hexahedron_gauss(num_points_per_dim).into()),
        Geometry::Triangle | Geometry::Tetrahedron => simplex_rule(geometry, num_points_per_dim),
        Geometry::Point | Geometry::Wedge | Geometry::Pyramid => Err(ConfigurationError::UnsupportedGeometry(geometry)),
    }
}
