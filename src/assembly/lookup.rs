use crate::mesh::ElementKind;
use crate::restriction::ElementRestriction;
use eyre::eyre;
use itertools::Itertools;
use log::debug;
use nalgebra::DMatrix;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;

/// Nonzero slots and signs for the entries of all element matrices of one element kind.
#[derive(Debug, Clone)]
struct LookupBlock {
    /// Offsets into `slots` and `signs` per element.
    offsets: Vec<usize>,
    slots: Vec<usize>,
    signs: Vec<f64>,
    /// Number of rows of the element matrix of every element.
    rows: Vec<usize>,
}

/// Maps entries of dense element Jacobians to nonzeros of the assembled sparse Jacobian.
///
/// The row space is given by the local dofs of the test space, the column space by the local dofs of a
/// trial space. Entry `(i, j)` of the matrix of element `e` is added, multiplied by the product of the
/// orientation signs of local test dof `i` and local trial dof `j`, to the nonzero returned by
/// [`lookup`](Self::lookup).
#[derive(Debug, Clone)]
pub struct GradientAssemblyLookup {
    pattern: SparsityPattern,
    blocks: [Option<LookupBlock>; 2],
}

impl GradientAssemblyLookup {
    /// Builds the lookup from pairs of test and trial restrictions, one pair per element kind.
    ///
    /// # Panics
    ///
    /// Panics if the restrictions of one kind have different numbers of elements, or if restrictions of
    /// different kinds disagree on the number of local dofs.
    pub fn new(restrictions: [Option<(&ElementRestriction, &ElementRestriction)>; 2]) -> eyre::Result<Self> {
        let (nrows, ncols) = restrictions
            .iter()
            .flatten()
            .map(|(test, trial)| (test.num_local_dofs(), trial.num_local_dofs()))
            .next()
            .unwrap_or((0, 0));

        let mut row_columns = vec![Vec::new(); nrows];
        for (test, trial) in restrictions.iter().flatten() {
            assert_eq!(test.num_elements(), trial.num_elements(), "Restrictions must cover the same elements");
            assert_eq!((test.num_local_dofs(), trial.num_local_dofs()), (nrows, ncols));
            for e in 0..test.num_elements() {
                for &row in test.element_indices(e) {
                    row_columns[row].extend_from_slice(trial.element_indices(e));
                }
            }
        }

        let mut offsets = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        offsets.push(0);
        for columns in row_columns {
            indices.extend(columns.into_iter().sorted_unstable().dedup());
            offsets.push(indices.len());
        }
        let pattern = SparsityPattern::try_from_offsets_and_indices(nrows, ncols, offsets, indices)?;

        let blocks = restrictions.map(|pair| pair.map(|(test, trial)| Self::build_block(&pattern, test, trial)));
        debug!(
            "Built gradient assembly lookup: {} x {} with {} nonzeros",
            nrows,
            ncols,
            pattern.nnz()
        );
        Ok(Self { pattern, blocks })
    }

    fn build_block(pattern: &SparsityPattern, test: &ElementRestriction, trial: &ElementRestriction) -> LookupBlock {
        let mut offsets = Vec::with_capacity(test.num_elements() + 1);
        let mut slots = Vec::new();
        let mut signs = Vec::new();
        let mut rows = Vec::with_capacity(test.num_elements());
        offsets.push(0);
        for e in 0..test.num_elements() {
            let (test_indices, test_signs) = (test.element_indices(e), test.element_signs(e));
            // Column-major order of the element matrix
            for (&column, &column_sign) in trial.element_indices(e).iter().zip(trial.element_signs(e)) {
                for (&row, &row_sign) in test_indices.iter().zip(test_signs) {
                    let row_start = pattern.major_offsets()[row];
                    let position = pattern
                        .lane(row)
                        .binary_search(&column)
                        .expect("Sparsity pattern contains all element entries");
                    slots.push(row_start + position);
                    signs.push(row_sign * column_sign);
                }
            }
            offsets.push(slots.len());
            rows.push(test_indices.len());
        }
        LookupBlock {
            offsets,
            slots,
            signs,
            rows,
        }
    }

    pub fn pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    pub fn row_offsets(&self) -> &[usize] {
        self.pattern.major_offsets()
    }

    pub fn column_indices(&self) -> &[usize] {
        self.pattern.minor_indices()
    }

    pub fn nnz(&self) -> usize {
        self.pattern.nnz()
    }

    /// The nonzero index and sign for entry `(i, j)` of the matrix of element `element` of the given kind.
    pub fn lookup(&self, kind: ElementKind, element: usize, i: usize, j: usize) -> Option<(usize, f64)> {
        let block = self.blocks[kind.index()].as_ref()?;
        let end = *block.offsets.get(element + 1)?;
        let start = block.offsets[element];
        let rows = block.rows[element];
        let cols = (end - start) / rows.max(1);
        if i >= rows || j >= cols {
            return None;
        }
        let k = start + i + rows * j;
        Some((block.slots[k], block.signs[k]))
    }

    /// Assembles the sparse matrix from dense element matrices, given per element kind.
    ///
    /// An empty slice for a kind means that there are no contributions from that kind.
    ///
    /// # Panics
    ///
    /// Panics if a non-empty slice does not hold one matrix of the right shape per element.
    pub fn assemble(&self, element_matrices: [&[DMatrix<f64>]; 2]) -> eyre::Result<CsrMatrix<f64>> {
        let mut values = vec![0.0; self.nnz()];
        for (block, matrices) in self.blocks.iter().zip(element_matrices) {
            let Some(block) = block else {
                continue;
            };
            if matrices.is_empty() {
                continue;
            }
            assert_eq!(matrices.len() + 1, block.offsets.len(), "Need one matrix per element");
            for (e, matrix) in matrices.iter().enumerate() {
                let range = block.offsets[e]..block.offsets[e + 1];
                assert_eq!(matrix.len(), range.len(), "Element matrix has wrong size");
                assert_eq!(matrix.nrows(), block.rows[e], "Element matrix has wrong shape");
                for ((&slot, &sign), &entry) in block.slots[range.clone()]
                    .iter()
                    .zip(&block.signs[range])
                    .zip(matrix.iter())
                {
                    values[slot] += sign * entry;
                }
            }
        }
        // SparseFormatError boxes a non-Send source, so it cannot be converted with `?`
        CsrMatrix::try_from_pattern_and_values(self.pattern.clone(), values)
            .map_err(|err| eyre!("Failed to build gradient matrix from pattern: {err}"))
    }
}
