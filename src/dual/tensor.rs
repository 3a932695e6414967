//! Vector and matrix operations on dual numbers.
//!
//! Matrices of dual numbers are ordinary nalgebra matrices with [`Dual`] entries. Operations whose
//! derivative is not simply the entry-wise chain rule (determinant, inverse and linear solves) use the
//! matrix-calculus identities
//!
//! - $d(\det A) = \operatorname{tr}(\operatorname{adj}(A)\,dA)$,
//! - $d(A^{-1}) = -A^{-1}\,dA\,A^{-1}$,
//! - $dx = A^{-1}(db - dA\,x)$ for $A x = b$,
//!
//! applied to one partial derivative at a time.
use crate::dual::Dual;
use nalgebra::allocator::Allocator;
use nalgebra::base::storage::RawStorage;
use nalgebra::{DMatrix, DVector, DefaultAllocator, Dim, Matrix, OMatrix};

pub type DualVector = DVector<Dual>;
pub type DualMatrix = DMatrix<Dual>;

pub fn constant_vector(v: &DVector<f64>) -> DualVector {
    v.map(Dual::constant)
}

pub fn constant_matrix(m: &DMatrix<f64>) -> DualMatrix {
    m.map(Dual::constant)
}

/// Seeds every entry of the vector as an independent variable.
pub fn make_dual_vector(v: &DVector<f64>) -> DualVector {
    let n = v.len();
    DVector::from_fn(n, |i, _| Dual::variable(v[i], i, n))
}

/// Seeds every entry of the matrix as an independent variable.
///
/// Entry `(i, j)` becomes variable `i + nrows * j`, i.e. variables are numbered in column-major order.
pub fn make_dual_matrix(m: &DMatrix<f64>) -> DualMatrix {
    let (nrows, ncols) = m.shape();
    let n = nrows * ncols;
    DMatrix::from_fn(nrows, ncols, |i, j| Dual::variable(m[(i, j)], i + nrows * j, n))
}

/// The values of a matrix (or vector) of dual numbers.
pub fn values_of<R: Dim, C: Dim, S>(m: &Matrix<Dual, R, C, S>) -> OMatrix<f64, R, C>
where
    S: RawStorage<Dual, R, C>,
    DefaultAllocator: Allocator<f64, R, C>,
{
    m.map(|x| x.value())
}

/// The partial derivatives of all entries with respect to the `k`-th variable.
pub fn partials_of<R: Dim, C: Dim, S>(m: &Matrix<Dual, R, C, S>, k: usize) -> OMatrix<f64, R, C>
where
    S: RawStorage<Dual, R, C>,
    DefaultAllocator: Allocator<f64, R, C>,
{
    m.map(|x| x.partial(k))
}

/// The largest number of partials carried by any of the dual numbers.
pub fn num_partials<'a>(entries: impl IntoIterator<Item = &'a Dual>) -> usize {
    entries
        .into_iter()
        .map(Dual::num_partials)
        .max()
        .unwrap_or(0)
}

/// The Jacobian of a collection of dual numbers, with one row per dual number and `num_partials` columns.
pub fn jacobian<'a>(entries: impl IntoIterator<Item = &'a Dual>, num_partials: usize) -> DMatrix<f64> {
    let entries: Vec<&Dual> = entries.into_iter().collect();
    DMatrix::from_fn(entries.len(), num_partials, |i, k| entries[i].partial(k))
}

/// Combines the partials of dual numbers linearly, `sum_i c_i * dx_i`.
fn combine_partials<'a>(terms: impl IntoIterator<Item = (f64, &'a Dual)>, num_partials: usize) -> DVector<f64> {
    let mut result = DVector::zeros(num_partials);
    for (c, x) in terms {
        if !x.is_constant() {
            result.axpy(c, x.partials(), 1.0);
        }
    }
    result
}

/// Assembles a matrix of dual numbers from its values and the partial derivative matrices.
fn from_values_and_partials(values: &DMatrix<f64>, partials: &[DMatrix<f64>]) -> DualMatrix {
    let p = partials.len();
    DMatrix::from_fn(values.nrows(), values.ncols(), |i, j| {
        if p == 0 {
            Dual::constant(values[(i, j)])
        } else {
            Dual::from_parts(values[(i, j)], DVector::from_fn(p, |k, _| partials[k][(i, j)]))
        }
    })
}

pub fn identity(n: usize) -> DualMatrix {
    DMatrix::from_fn(n, n, |i, j| Dual::constant(if i == j { 1.0 } else { 0.0 }))
}

pub fn trace(a: &DualMatrix) -> Dual {
    (0..a.nrows().min(a.ncols())).map(|i| &a[(i, i)]).sum()
}

/// The symmetric part `(A + A^T) / 2`.
pub fn sym(a: &DualMatrix) -> DualMatrix {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| (&a[(i, j)] + &a[(j, i)]) * 0.5)
}

/// The deviatoric part `A - tr(A) / n I`.
pub fn dev(a: &DualMatrix) -> DualMatrix {
    let n = a.nrows();
    let mean = trace(a) / n as f64;
    DMatrix::from_fn(n, a.ncols(), |i, j| {
        if i == j {
            &a[(i, j)] - &mean
        } else {
            a[(i, j)].clone()
        }
    })
}

pub fn scale(a: &DualMatrix, s: &Dual) -> DualMatrix {
    a.map(|x| &x * s)
}

/// The matrix sum `A + B`.
pub fn add(a: &DualMatrix, b: &DualMatrix) -> DualMatrix {
    assert_eq!(a.shape(), b.shape(), "Matrix dimensions must agree");
    a.zip_map(b, |x, y| x + y)
}

/// The matrix difference `A - B`.
pub fn sub(a: &DualMatrix, b: &DualMatrix) -> DualMatrix {
    assert_eq!(a.shape(), b.shape(), "Matrix dimensions must agree");
    a.zip_map(b, |x, y| x - y)
}

/// The matrix product `A B`.
pub fn dot(a: &DualMatrix, b: &DualMatrix) -> DualMatrix {
    assert_eq!(a.ncols(), b.nrows(), "Matrix dimensions must agree");
    DMatrix::from_fn(a.nrows(), b.ncols(), |i, j| {
        (0..a.ncols()).map(|k| &a[(i, k)] * &b[(k, j)]).sum::<Dual>()
    })
}

/// The matrix-vector product `A v`.
pub fn dot_vector(a: &DualMatrix, v: &DualVector) -> DualVector {
    assert_eq!(a.ncols(), v.len(), "Matrix dimensions must agree");
    DVector::from_fn(a.nrows(), |i, _| (0..a.ncols()).map(|k| &a[(i, k)] * &v[k]).sum::<Dual>())
}

/// The inner product `u^T v`.
pub fn vector_dot(u: &DualVector, v: &DualVector) -> Dual {
    assert_eq!(u.len(), v.len(), "Vector dimensions must agree");
    u.iter().zip(v.iter()).map(|(x, y)| x * y).sum()
}

/// The bilinear form `u^T A v`.
pub fn bilinear(u: &DualVector, a: &DualMatrix, v: &DualVector) -> Dual {
    vector_dot(u, &dot_vector(a, v))
}

/// The double contraction `A : B = sum_ij A_ij B_ij`.
pub fn double_dot(a: &DualMatrix, b: &DualMatrix) -> Dual {
    assert_eq!(a.shape(), b.shape(), "Matrix dimensions must agree");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// The outer product `u v^T`.
pub fn outer(u: &DualVector, v: &DualVector) -> DualMatrix {
    DMatrix::from_fn(u.len(), v.len(), |i, j| &u[i] * &v[j])
}

pub fn squared_norm(v: &DualVector) -> Dual {
    vector_dot(v, v)
}

/// The adjugate (transposed cofactor matrix) of a square matrix.
fn adjugate(a: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.nrows();
    match n {
        0 => DMatrix::zeros(0, 0),
        1 => DMatrix::from_element(1, 1, 1.0),
        2 => DMatrix::from_row_slice(2, 2, &[a[(1, 1)], -a[(0, 1)], -a[(1, 0)], a[(0, 0)]]),
        _ => DMatrix::from_fn(n, n, |i, j| {
            // adj(A)_ij = (-1)^(i + j) det(minor_ji)
            let minor = a.clone().remove_row(j).remove_column(i);
            let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
            sign * minor.determinant()
        }),
    }
}

/// The determinant of a square matrix.
///
/// The derivative is computed from the adjugate, so it is also correct for singular matrices.
///
/// # Panics
///
/// Panics if the matrix is not square.
pub fn determinant(a: &DualMatrix) -> Dual {
    assert!(a.is_square(), "Determinant requires a square matrix");
    let values = values_of(a);
    let det = values.determinant();
    let p = num_partials(a.iter());
    if p == 0 {
        return Dual::constant(det);
    }
    let adj = adjugate(&values);
    let terms = (0..a.nrows()).flat_map(|i| (0..a.ncols()).map(move |j| (i, j)));
    let partials = combine_partials(terms.map(|(i, j)| (adj[(j, i)], &a[(i, j)])), p);
    Dual::from_parts(det, partials)
}

/// The inverse of a square matrix, or `None` if the matrix is singular.
pub fn inverse(a: &DualMatrix) -> Option<DualMatrix> {
    let inv = values_of(a).try_inverse()?;
    let p = num_partials(a.iter());
    let partials: Vec<_> = (0..p)
        .map(|k| -(&inv * partials_of(a, k) * &inv))
        .collect();
    Some(from_values_and_partials(&inv, &partials))
}

/// Solves `A X = B` for `X`, where `B` may have several columns.
///
/// The value matrix of `A` is factorized once and the factorization is reused for every partial
/// derivative. Returns `None` if `A` is singular.
pub fn linear_solve(a: &DualMatrix, b: &DualMatrix) -> Option<DualMatrix> {
    assert_eq!(a.nrows(), b.nrows(), "Matrix dimensions must agree");
    let lu = values_of(a).lu();
    let x = lu.solve(&values_of(b))?;
    let p = num_partials(a.iter().chain(b.iter()));
    let partials = (0..p)
        .map(|k| {
            let rhs = partials_of(b, k) - partials_of(a, k) * &x;
            lu.solve(&rhs)
        })
        .collect::<Option<Vec<_>>>()?;
    Some(from_values_and_partials(&x, &partials))
}
