//! Collaborator traits: what vectors and preconditioners need from a matrix.

use crate::core::distribution::LinearAlgebraDistribution;
use crate::error::Result;
use crate::vector::DoubleVector;
use std::sync::Arc;

/// An object laid out on a [`LinearAlgebraDistribution`].
pub trait Distributable {
    fn distribution(&self) -> &Arc<LinearAlgebraDistribution>;
}

/// One locally held matrix row: global column indices and values.
#[derive(Clone, Copy, Debug)]
pub struct RowView<'a> {
    pub cols: &'a [usize],
    pub vals: &'a [f64],
}

/// Matrix–vector product and shape: y ← A x.
pub trait DoubleMatrix {
    /// Global number of rows.
    fn nrow(&self) -> usize;
    /// Global number of columns.
    fn ncol(&self) -> usize;
    /// Compute y = A · x. Collective for distributed matrices.
    fn multiply(&self, x: &DoubleVector, y: &mut DoubleVector) -> Result<()>;
    /// Distribution capability; `None` for matrices that are not laid out on a
    /// distribution.
    fn as_distributable(&self) -> Option<&dyn Distributable> {
        None
    }
    /// Entries of a locally held row, if the storage format exposes them.
    fn local_row(&self, _local_row: usize) -> Option<RowView<'_>> {
        None
    }
}
