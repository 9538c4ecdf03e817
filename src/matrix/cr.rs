// Row-distributed compressed-row matrix

use crate::core::{Distributable, DoubleMatrix, LinearAlgebraDistribution, RowView};
use crate::error::{LaError, Result};
use crate::vector::{DoubleVector, DoubleVectorHaloScheme, DoubleVectorWithHaloEntries};
use std::sync::Arc;

/// Compressed-row matrix holding the rows its distribution assigns to this
/// rank. Column indices are global.
///
/// Vectors multiplied by the matrix live on the column distribution: the row
/// distribution itself for square matrices, a uniform layout of `ncol`
/// otherwise. Off-process columns are fetched through a halo scheme built at
/// construction.
pub struct CrDoubleMatrix {
    distribution: Arc<LinearAlgebraDistribution>,
    col_distribution: Arc<LinearAlgebraDistribution>,
    row_start: Vec<usize>,
    column_index: Vec<usize>,
    values: Vec<f64>,
    halo_scheme: Option<Arc<DoubleVectorHaloScheme>>,
    // per entry: local column, or n_local_cols + halo slot
    column_slot: Vec<usize>,
}

fn check_arrays(
    nrow_local: usize,
    ncol: usize,
    row_start: &[usize],
    column_index: &[usize],
    values: &[f64],
) -> Result<()> {
    const OP: &str = "CrDoubleMatrix::new";
    if row_start.len() != nrow_local + 1 {
        return Err(LaError::SizeMismatch { op: OP, expected: nrow_local + 1, found: row_start.len() });
    }
    if column_index.len() != values.len() {
        return Err(LaError::SizeMismatch { op: OP, expected: column_index.len(), found: values.len() });
    }
    let nnz = column_index.len();
    if row_start[0] != 0 || row_start.windows(2).any(|w| w[0] > w[1]) || row_start[nrow_local] != nnz {
        return Err(LaError::SizeMismatch { op: OP, expected: nnz, found: row_start[nrow_local] });
    }
    if let Some(&bad) = column_index.iter().find(|&&c| c >= ncol) {
        return Err(LaError::IndexOutOfRange { op: OP, index: bad, len: ncol });
    }
    Ok(())
}

impl CrDoubleMatrix {
    /// Builds from local compressed-row arrays. Collective when distributed:
    /// the halo scheme for off-process columns is set up here.
    pub fn new(
        distribution: &Arc<LinearAlgebraDistribution>,
        ncol: usize,
        row_start: Vec<usize>,
        column_index: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        const OP: &str = "CrDoubleMatrix::new";
        let checked = check_arrays(distribution.nrow_local(), ncol, &row_start, &column_index, &values);
        if distribution.distributed() {
            // a bad rank must not leave its peers inside the halo exchange
            distribution.communicator().agree(OP, checked)?;
        } else {
            checked?;
        }

        let col_distribution = if ncol == distribution.nrow() {
            distribution.clone()
        } else {
            Arc::new(LinearAlgebraDistribution::new(
                distribution.communicator().clone(),
                ncol,
                distribution.distributed(),
            ))
        };

        let (halo_scheme, column_slot) = if col_distribution.distributed() {
            let scheme = Arc::new(DoubleVectorHaloScheme::new(&col_distribution, &column_index)?);
            let first = col_distribution.first_row();
            let n_local = col_distribution.nrow_local();
            let slots = column_index
                .iter()
                .map(|&c| {
                    if col_distribution.is_local(c) {
                        Ok(c - first)
                    } else {
                        scheme.local_index(c).map(|k| n_local + k)
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            (Some(scheme), slots)
        } else {
            (None, column_index.clone())
        };

        Ok(Self {
            distribution: distribution.clone(),
            col_distribution,
            row_start,
            column_index,
            values,
            halo_scheme,
            column_slot,
        })
    }

    /// Builds from a row generator returning `(global column, value)` pairs
    /// for each locally held global row. Collective when distributed.
    pub fn from_row_fn<F>(distribution: &Arc<LinearAlgebraDistribution>, ncol: usize, row: F) -> Result<Self>
    where
        F: Fn(usize) -> Vec<(usize, f64)>,
    {
        let mut row_start = Vec::with_capacity(distribution.nrow_local() + 1);
        let mut column_index = Vec::new();
        let mut values = Vec::new();
        row_start.push(0);
        for g in distribution.local_range() {
            for (c, v) in row(g) {
                column_index.push(c);
                values.push(v);
            }
            row_start.push(column_index.len());
        }
        Self::new(distribution, ncol, row_start, column_index, values)
    }

    pub fn col_distribution(&self) -> &Arc<LinearAlgebraDistribution> {
        &self.col_distribution
    }

    pub fn nnz_local(&self) -> usize {
        self.values.len()
    }

    pub fn row_start(&self) -> &[usize] {
        &self.row_start
    }

    pub fn column_index(&self) -> &[usize] {
        &self.column_index
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Diagonal entries of the local rows (zero where not stored). Square
    /// matrices only.
    pub fn diagonal(&self) -> Result<DoubleVector> {
        if self.col_distribution.nrow() != self.distribution.nrow() {
            return Err(LaError::SizeMismatch {
                op: "CrDoubleMatrix::diagonal",
                expected: self.distribution.nrow(),
                found: self.col_distribution.nrow(),
            });
        }
        let mut diag = DoubleVector::new(&self.distribution, 0.0);
        let first = self.distribution.first_row();
        for i in 0..self.distribution.nrow_local() {
            let range = self.row_start[i]..self.row_start[i + 1];
            if let Some(k) = range.clone().find(|&k| self.column_index[k] == first + i) {
                diag[i] = self.values[k];
            }
        }
        Ok(diag)
    }
}

impl Distributable for CrDoubleMatrix {
    fn distribution(&self) -> &Arc<LinearAlgebraDistribution> {
        &self.distribution
    }
}

impl DoubleMatrix for CrDoubleMatrix {
    fn nrow(&self) -> usize {
        self.distribution.nrow()
    }

    fn ncol(&self) -> usize {
        self.col_distribution.nrow()
    }

    /// `y = A x`. `x` must live on the column distribution; `y` is built on
    /// the row distribution if unbuilt. Collective when distributed.
    fn multiply(&self, x: &DoubleVector, y: &mut DoubleVector) -> Result<()> {
        const OP: &str = "CrDoubleMatrix::multiply";
        if **x.dist(OP)? != *self.col_distribution {
            return Err(LaError::DistributionMismatch(OP));
        }
        match y.distribution() {
            Some(d) if **d != *self.distribution => return Err(LaError::DistributionMismatch(OP)),
            Some(_) => {}
            None => y.build(&self.distribution, 0.0),
        }

        let mut xh = DoubleVectorWithHaloEntries::from_vector(x.clone(), self.halo_scheme.clone())?;
        xh.synchronise()?;
        let (xv, halo) = (xh.values(), xh.halo_values());
        let (row_start, slots, vals) = (&self.row_start[..], &self.column_slot[..], &self.values[..]);
        let n_local = xv.len();
        let row = |i: usize| -> f64 {
            (row_start[i]..row_start[i + 1])
                .map(|k| {
                    let s = slots[k];
                    vals[k] * if s < n_local { xv[s] } else { halo[s - n_local] }
                })
                .sum()
        };

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            y.values_mut()
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, yi)| *yi = row(i));
        }
        #[cfg(not(feature = "rayon"))]
        {
            for (i, yi) in y.values_mut().iter_mut().enumerate() {
                *yi = row(i);
            }
        }
        Ok(())
    }

    fn as_distributable(&self) -> Option<&dyn Distributable> {
        Some(self)
    }

    fn local_row(&self, local_row: usize) -> Option<RowView<'_>> {
        let range = *self.row_start.get(local_row)?..*self.row_start.get(local_row + 1)?;
        Some(RowView { cols: &self.column_index[range.clone()], vals: &self.values[range] })
    }
}
