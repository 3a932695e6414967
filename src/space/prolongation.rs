use nalgebra::DVector;
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::fmt::Debug;

/// A linear map from true dofs to local dofs.
///
/// The transpose accumulates local contributions into true dofs, so that `prolongate_transpose` applied to an
/// assembled local residual yields the residual with respect to the true dofs.
pub trait Prolongation: Debug + Send + Sync {
    fn num_true_dofs(&self) -> usize;

    fn num_local_dofs(&self) -> usize;

    /// Computes `local = P * true_dofs`.
    fn prolongate(&self, true_dofs: &DVector<f64>, local: &mut DVector<f64>);

    /// Computes `true_dofs = P^T * local`.
    fn prolongate_transpose(&self, local: &DVector<f64>, true_dofs: &mut DVector<f64>);

    /// The explicit matrix `P`, with one row per local dof.
    fn to_csr(&self) -> CsrMatrix<f64>;

    /// Whether `P` is known to be the identity, in which case assembled matrices need not be transformed.
    fn is_identity(&self) -> bool {
        false
    }
}

/// The prolongation of a space whose true and local dofs coincide.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IdentityProlongation {
    num_dofs: usize,
}

impl IdentityProlongation {
    pub fn new(num_dofs: usize) -> Self {
        Self { num_dofs }
    }
}

impl Prolongation for IdentityProlongation {
    fn num_true_dofs(&self) -> usize {
        self.num_dofs
    }

    fn num_local_dofs(&self) -> usize {
        self.num_dofs
    }

    fn prolongate(&self, true_dofs: &DVector<f64>, local: &mut DVector<f64>) {
        local.copy_from(true_dofs);
    }

    fn prolongate_transpose(&self, local: &DVector<f64>, true_dofs: &mut DVector<f64>) {
        true_dofs.copy_from(local);
    }

    fn to_csr(&self) -> CsrMatrix<f64> {
        CsrMatrix::identity(self.num_dofs)
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// A prolongation given by an explicit sparse matrix.
///
/// This covers linear constraints between local dofs, such as periodicity or hanging nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrProlongation {
    matrix: CsrMatrix<f64>,
}

impl CsrProlongation {
    /// Creates a prolongation from a matrix with one row per local dof and one column per true dof.
    ///
    /// The number of rows is validated when the prolongation is attached to a space.
    pub fn new(matrix: CsrMatrix<f64>) -> Self {
        Self { matrix }
    }

    /// A prolongation in which every local dof is a copy of a single true dof.
    ///
    /// `local_to_true[i]` is the true dof that local dof `i` copies.
    ///
    /// # Panics
    ///
    /// Panics if any entry of `local_to_true` is not smaller than `num_true_dofs`.
    pub fn from_local_to_true_map(num_true_dofs: usize, local_to_true: &[usize]) -> Self {
        let mut coo = CooMatrix::new(local_to_true.len(), num_true_dofs);
        for (i, &j) in local_to_true.iter().enumerate() {
            coo.push(i, j, 1.0);
        }
        Self::new(CsrMatrix::from(&coo))
    }

    pub fn matrix(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }
}

impl Prolongation for CsrProlongation {
    fn num_true_dofs(&self) -> usize {
        self.matrix.ncols()
    }

    fn num_local_dofs(&self) -> usize {
        self.matrix.nrows()
    }

    fn prolongate(&self, true_dofs: &DVector<f64>, local: &mut DVector<f64>) {
        assert_eq!(true_dofs.len(), self.num_true_dofs());
        assert_eq!(local.len(), self.num_local_dofs());
        spmm_csr_dense(0.0, local, 1.0, Op::NoOp(&self.matrix), Op::NoOp(true_dofs));
    }

    fn prolongate_transpose(&self, local: &DVector<f64>, true_dofs: &mut DVector<f64>) {
        assert_eq!(true_dofs.len(), self.num_true_dofs());
        assert_eq!(local.len(), self.num_local_dofs());
        spmm_csr_dense(0.0, true_dofs, 1.0, Op::Transpose(&self.matrix), Op::NoOp(local));
    }

    fn to_csr(&self) -> CsrMatrix<f64> {
        self.matrix.clone()
    }
}
