// Block-Jacobi preconditioner implementation

use super::{check_solve_vectors, BlockCompatible, DofTypeLayout, Preconditioner, PreconditionerBase};
use crate::config::PcOptions;
use crate::core::{DoubleMatrix, LinearAlgebraDistribution};
use crate::error::{LaError, Result};
use crate::vector::DoubleVector;
use faer::linalg::solvers::{FullPivLu, SolveCore};
use faer::{Conj, Mat, MatMut};
use std::collections::HashMap;
use std::sync::Arc;

enum BlockLayout {
    /// Explicit local row sets.
    Rows(Vec<Vec<usize>>),
    /// One block per entry of `groups`, holding the rows of those types.
    DofTypes { layout: DofTypeLayout, groups: Vec<Vec<usize>> },
}

/// Block-Jacobi preconditioner over the local rows.
///
/// Each block's diagonal submatrix is factored with a full-pivoting LU. Rows
/// outside every block are passed through unchanged (`z_i = r_i`).
pub struct BlockJacobi {
    base: PreconditionerBase,
    layout: BlockLayout,
    distribution: Option<Arc<LinearAlgebraDistribution>>,
    block_factors: Vec<(Vec<usize>, FullPivLu<f64>)>, // (local rows, LU)
}

impl BlockJacobi {
    /// Blocks given as sets of local row indices. The sets must be disjoint.
    pub fn from_blocks(blocks: Vec<Vec<usize>>, options: PcOptions) -> Self {
        Self::with_layout(BlockLayout::Rows(blocks), options)
    }

    /// One block per dof type of `layout`.
    pub fn from_dof_types(layout: DofTypeLayout, options: PcOptions) -> Self {
        let groups = (0..layout.ndof_types()).map(|t| vec![t]).collect();
        Self::with_layout(BlockLayout::DofTypes { layout, groups }, options)
    }

    fn with_layout(layout: BlockLayout, options: PcOptions) -> Self {
        Self {
            base: PreconditionerBase::new(options),
            layout,
            distribution: None,
            block_factors: Vec::new(),
        }
    }

    pub fn nblock(&self) -> usize {
        self.block_factors.len()
    }

    fn resolve_blocks(&self, nrow_local: usize) -> Result<Vec<Vec<usize>>> {
        const OP: &str = "BlockJacobi::setup";
        let blocks = match &self.layout {
            BlockLayout::Rows(blocks) => {
                let mut seen = vec![false; nrow_local];
                for &i in blocks.iter().flatten() {
                    let slot = seen
                        .get_mut(i)
                        .ok_or(LaError::IndexOutOfRange { op: OP, index: i, len: nrow_local })?;
                    if *slot {
                        return Err(LaError::InvalidDofTypeMap {
                            op: OP,
                            reason: format!("local row {i} appears in more than one block"),
                        });
                    }
                    *slot = true;
                }
                blocks.clone()
            }
            BlockLayout::DofTypes { layout, groups } => {
                if layout.nrow_local() != nrow_local {
                    return Err(LaError::SizeMismatch { op: OP, expected: nrow_local, found: layout.nrow_local() });
                }
                groups.iter().map(|g| layout.rows_of(g)).collect()
            }
        };
        Ok(blocks.into_iter().filter(|b| !b.is_empty()).collect())
    }

    fn factor_block(matrix: &dyn DoubleMatrix, first: usize, rows: &[usize]) -> Result<FullPivLu<f64>> {
        const OP: &str = "BlockJacobi::setup";
        let n = rows.len();
        let pos: HashMap<usize, usize> = rows.iter().enumerate().map(|(k, &i)| (first + i, k)).collect();
        let mut data = vec![0.0; n * n];
        for (ii, &i) in rows.iter().enumerate() {
            let row = matrix
                .local_row(i)
                .ok_or(LaError::NotImplemented("BlockJacobi::setup: matrix does not expose its rows"))?;
            for (c, &v) in row.cols.iter().zip(row.vals) {
                if let Some(&jj) = pos.get(c) {
                    data[jj * n + ii] += v;
                }
            }
            if (0..n).all(|jj| data[jj * n + ii] == 0.0) {
                log::debug!("{OP}: empty block row {}", first + i);
                return Err(LaError::ZeroPivot(first + i));
            }
        }
        let a = Mat::from_fn(n, n, |i, j| data[j * n + i]);
        let lu = FullPivLu::new(a.as_ref());

        // a singular block has a zero pivot, which shows up as a non-finite
        // column of the inverse
        let mut inv = vec![0.0; n * n];
        for k in 0..n {
            inv[k * n + k] = 1.0;
        }
        lu.solve_in_place_with_conj(Conj::No, MatMut::from_column_major_slice_mut(inv.as_mut_slice(), n, n));
        if let Some(k) = (0..n).find(|&k| inv[k * n..(k + 1) * n].iter().any(|v| !v.is_finite())) {
            log::debug!("{OP}: singular block at row {}", first + rows[k]);
            return Err(LaError::ZeroPivot(first + rows[k]));
        }
        Ok(lu)
    }

    fn apply(&self, r: &DoubleVector, z: &mut DoubleVector, transpose: bool, op: &'static str) -> Result<()> {
        let dist = self.distribution.as_ref().ok_or(LaError::SetupRequired(op))?;
        check_solve_vectors(dist, r, z, op)?;
        let rv = r.values();
        let solve_block = |(rows, lu): &(Vec<usize>, FullPivLu<f64>)| -> Vec<f64> {
            let mut x: Vec<f64> = rows.iter().map(|&i| rv[i]).collect();
            let n = x.len();
            let x_mat = MatMut::from_column_major_slice_mut(x.as_mut_slice(), n, 1);
            if transpose {
                lu.solve_transpose_in_place_with_conj(Conj::No, x_mat);
            } else {
                lu.solve_in_place_with_conj(Conj::No, x_mat);
            }
            x
        };

        #[cfg(feature = "rayon")]
        let solved: Vec<Vec<f64>> = {
            use rayon::prelude::*;
            self.block_factors.par_iter().map(solve_block).collect()
        };
        #[cfg(not(feature = "rayon"))]
        let solved: Vec<Vec<f64>> = self.block_factors.iter().map(solve_block).collect();

        let zv = z.values_mut();
        zv.copy_from_slice(rv);
        for ((rows, _), x) in self.block_factors.iter().zip(solved) {
            for (&i, xi) in rows.iter().zip(x) {
                zv[i] = xi;
            }
        }
        Ok(())
    }
}

impl Preconditioner for BlockJacobi {
    fn base(&self) -> &PreconditionerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PreconditionerBase {
        &mut self.base
    }

    fn setup_hook(&mut self) -> Result<()> {
        let matrix = self.matrix()?.clone();
        let dist = self
            .base
            .matrix_distribution()
            .cloned()
            .ok_or(LaError::NotImplemented("BlockJacobi::setup: matrix has no distribution"))?;
        let first = dist.first_row();
        let blocks = self.resolve_blocks(dist.nrow_local())?;
        self.block_factors = blocks
            .into_iter()
            .map(|rows| Self::factor_block(matrix.as_ref(), first, &rows).map(|lu| (rows, lu)))
            .collect::<Result<_>>()?;
        log::debug!(
            "BlockJacobi: factored {} blocks covering {} of {} local rows",
            self.block_factors.len(),
            self.block_factors.iter().map(|(r, _)| r.len()).sum::<usize>(),
            dist.nrow_local()
        );
        self.distribution = Some(dist);
        Ok(())
    }

    fn preconditioner_solve(&self, r: &DoubleVector, z: &mut DoubleVector) -> Result<()> {
        self.apply(r, z, false, "BlockJacobi::preconditioner_solve")
    }

    fn preconditioner_solve_transpose(&self, r: &DoubleVector, z: &mut DoubleVector) -> Result<()> {
        self.apply(r, z, true, "BlockJacobi::preconditioner_solve_transpose")
    }

    fn clean_up_memory(&mut self) {
        self.block_factors.clear();
        self.distribution = None;
    }

    fn as_block_compatible(&mut self) -> Option<&mut dyn BlockCompatible> {
        Some(self)
    }
}

impl BlockCompatible for BlockJacobi {
    fn turn_into_subsidiary_block_preconditioner(
        &mut self,
        master: &DofTypeLayout,
        doftype_in_master: &[usize],
        coarsen_map: Option<&[Vec<usize>]>,
    ) -> Result<()> {
        const OP: &str = "BlockJacobi::turn_into_subsidiary_block_preconditioner";
        let nmaster = master.ndof_types();
        let mut used = vec![false; nmaster];
        for &t in doftype_in_master {
            let slot = used
                .get_mut(t)
                .ok_or(LaError::IndexOutOfRange { op: OP, index: t, len: nmaster })?;
            if *slot {
                return Err(LaError::InvalidDofTypeMap {
                    op: OP,
                    reason: format!("master dof type {t} is claimed twice"),
                });
            }
            *slot = true;
        }

        let nfine = doftype_in_master.len();
        let groups: Vec<Vec<usize>> = match coarsen_map {
            None => doftype_in_master.iter().map(|&t| vec![t]).collect(),
            Some(map) => {
                let mut seen = vec![false; nfine];
                let mut groups = Vec::with_capacity(map.len());
                for fine_types in map {
                    let mut group = Vec::with_capacity(fine_types.len());
                    for &f in fine_types {
                        let slot = seen
                            .get_mut(f)
                            .ok_or(LaError::IndexOutOfRange { op: OP, index: f, len: nfine })?;
                        if *slot {
                            return Err(LaError::InvalidDofTypeMap {
                                op: OP,
                                reason: format!("dof type {f} appears in more than one coarse type"),
                            });
                        }
                        *slot = true;
                        group.push(doftype_in_master[f]);
                    }
                    groups.push(group);
                }
                groups
            }
        };

        self.layout = BlockLayout::DofTypes { layout: master.clone(), groups };
        self.clean_up_memory();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::CrDoubleMatrix;
    use crate::parallel::SerialComm;
    use approx::assert_abs_diff_eq;

    // rows 0..4 with types [0, 1, 0, 1]
    fn coupled() -> (Arc<LinearAlgebraDistribution>, Arc<CrDoubleMatrix>) {
        let d = Arc::new(LinearAlgebraDistribution::new(Arc::new(SerialComm), 4, false));
        let entries = [
            vec![(0, 4.0), (1, 1.0), (2, 1.0)],
            vec![(0, 1.0), (1, 3.0), (3, 1.0)],
            vec![(0, 1.0), (2, 5.0), (3, 1.0)],
            vec![(1, 2.0), (2, 1.0), (3, 6.0)],
        ];
        let a = CrDoubleMatrix::from_row_fn(&d, 4, |g| entries[g].clone()).unwrap();
        (d, Arc::new(a))
    }

    fn quiet() -> PcOptions {
        PcOptions { silent_setup: true }
    }

    #[test]
    fn dof_type_blocks_solve_their_diagonal_blocks() {
        let (d, a) = coupled();
        let mut pc = BlockJacobi::from_dof_types(DofTypeLayout::new(vec![0, 1, 0, 1]), quiet());
        pc.setup(a).unwrap();
        assert_eq!(pc.nblock(), 2);
        let r = DoubleVector::from_global(&d, &[6.0, 7.5, 11.0, 13.0]).unwrap();
        let mut z = DoubleVector::default();
        pc.preconditioner_solve(&r, &mut z).unwrap();
        // [[4,1],[1,5]] z02 = [6,11], [[3,1],[2,6]] z13 = [7.5,13]
        for (got, want) in z.values().iter().zip([1.0, 2.0, 2.0, 1.5]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn coarsened_subsidiary_is_an_exact_solve() {
        let (d, a) = coupled();
        let mut pc = BlockJacobi::from_blocks(vec![], quiet());
        let master = DofTypeLayout::new(vec![0, 1, 0, 1]);
        pc.as_block_compatible()
            .unwrap()
            .turn_into_subsidiary_block_preconditioner(&master, &[1, 0], Some(&[vec![0, 1]][..]))
            .unwrap();
        pc.setup(a.clone()).unwrap();
        assert_eq!(pc.nblock(), 1);

        let r = DoubleVector::from_global(&d, &[1.0, -1.0, 2.0, 0.5]).unwrap();
        let mut z = DoubleVector::default();
        pc.preconditioner_solve(&r, &mut z).unwrap();
        let mut az = DoubleVector::default();
        a.multiply(&z, &mut az).unwrap();
        for (got, want) in az.values().iter().zip(r.values()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn uncovered_rows_pass_through() {
        let (d, a) = coupled();
        let mut pc = BlockJacobi::from_blocks(vec![], quiet());
        let master = DofTypeLayout::new(vec![0, 1, 0, 1]);
        pc.turn_into_subsidiary_block_preconditioner(&master, &[1], None).unwrap();
        pc.setup(a).unwrap();
        let r = DoubleVector::from_global(&d, &[6.0, 7.5, 11.0, 13.0]).unwrap();
        let mut z = DoubleVector::default();
        pc.preconditioner_solve(&r, &mut z).unwrap();
        assert_eq!(z[0], 6.0);
        assert_eq!(z[2], 11.0);
        assert_abs_diff_eq!(z[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(z[3], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn invalid_maps_are_rejected() {
        let master = DofTypeLayout::new(vec![0, 1, 2]);
        let mut pc = BlockJacobi::from_blocks(vec![], quiet());
        assert!(matches!(
            pc.turn_into_subsidiary_block_preconditioner(&master, &[0, 3], None),
            Err(LaError::IndexOutOfRange { index: 3, len: 3, .. })
        ));
        assert!(matches!(
            pc.turn_into_subsidiary_block_preconditioner(&master, &[0, 0], None),
            Err(LaError::InvalidDofTypeMap { .. })
        ));
        assert!(matches!(
            pc.turn_into_subsidiary_block_preconditioner(&master, &[0, 1], Some(&[vec![0], vec![0, 1]][..])),
            Err(LaError::InvalidDofTypeMap { .. })
        ));
    }

    #[test]
    fn empty_block_row_is_a_zero_pivot() {
        let d = Arc::new(LinearAlgebraDistribution::new(Arc::new(SerialComm), 2, false));
        let a = CrDoubleMatrix::from_row_fn(&d, 2, |_| vec![(1, 1.0)]).unwrap();
        let mut pc = BlockJacobi::from_blocks(vec![vec![0]], quiet());
        assert_eq!(pc.setup(Arc::new(a)), Err(LaError::ZeroPivot(0)));
    }

    #[test]
    fn singular_block_is_a_zero_pivot() {
        let d = Arc::new(LinearAlgebraDistribution::new(Arc::new(SerialComm), 2, false));
        let a = CrDoubleMatrix::from_row_fn(&d, 2, |_| vec![(0, 1.0), (1, 1.0)]).unwrap();
        let mut pc = BlockJacobi::from_blocks(vec![vec![0, 1]], quiet());
        assert!(matches!(pc.setup(Arc::new(a)), Err(LaError::ZeroPivot(_))));
        assert_eq!(pc.nblock(), 0);
    }
}
