//! Distributed vector of doubles.
//!
//! A `DoubleVector` holds the rows of a global vector that its
//! [`LinearAlgebraDistribution`] assigns to the calling rank (all rows when
//! the distribution is replicated). Indexing is by *local* row. Global
//! reductions (`dot`, `norm`, `max`) and layout changes (`redistribute`) are
//! collective: every rank of the communicator must call them together.

use super::storage::Storage;
use super::transfer::{transfer, Source, Target};
use crate::config::OutputOptions;
use crate::core::{DoubleMatrix, LinearAlgebraDistribution};
use crate::error::{LaError, Result};
use crate::parallel::local_dot;
use std::io::Write;
use std::ops::{AddAssign, DivAssign, Index, IndexMut, MulAssign, SubAssign};
use std::ptr::NonNull;
use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct DoubleVector {
    distribution: Option<Arc<LinearAlgebraDistribution>>,
    values: Storage,
}

impl DoubleVector {
    /// Builds a vector on `dist` with every local entry set to `v`.
    pub fn new(dist: &Arc<LinearAlgebraDistribution>, v: f64) -> Self {
        let mut out = Self::default();
        out.build(dist, v);
        out
    }

    /// Builds a vector from the FULL global array `values`; each rank keeps
    /// its own rows.
    pub fn from_global(dist: &Arc<LinearAlgebraDistribution>, values: &[f64]) -> Result<Self> {
        let mut out = Self::default();
        out.build_from_global(dist, values)?;
        Ok(out)
    }

    pub fn build(&mut self, dist: &Arc<LinearAlgebraDistribution>, v: f64) {
        self.values = Storage::Owned(vec![v; dist.nrow_local()]);
        self.distribution = Some(dist.clone());
    }

    pub fn build_from_global(&mut self, dist: &Arc<LinearAlgebraDistribution>, values: &[f64]) -> Result<()> {
        if values.len() != dist.nrow() {
            return Err(LaError::SizeMismatch {
                op: "DoubleVector::build_from_global",
                expected: dist.nrow(),
                found: values.len(),
            });
        }
        self.values = Storage::Owned(values[dist.local_range()].to_vec());
        self.distribution = Some(dist.clone());
        Ok(())
    }

    /// Deep copy of `other`, including an unbuilt state.
    pub fn build_from(&mut self, other: &DoubleVector) {
        *self = other.clone();
    }

    pub fn initialise(&mut self, v: f64) -> Result<()> {
        self.dist("DoubleVector::initialise")?;
        self.values.as_mut_slice().fill(v);
        Ok(())
    }

    /// Overwrites the local rows from the FULL global array `values`.
    pub fn initialise_from_global(&mut self, values: &[f64]) -> Result<()> {
        let dist = self.dist("DoubleVector::initialise_from_global")?.clone();
        if values.len() != dist.nrow() {
            return Err(LaError::SizeMismatch {
                op: "DoubleVector::initialise_from_global",
                expected: dist.nrow(),
                found: values.len(),
            });
        }
        self.values.as_mut_slice().copy_from_slice(&values[dist.local_range()]);
        Ok(())
    }

    /// Releases the values (caller buffers only if marked deletable) and
    /// returns to the unbuilt state.
    pub fn clear(&mut self) {
        self.values = Storage::default();
        self.distribution = None;
    }

    pub fn built(&self) -> bool {
        self.distribution.is_some()
    }

    pub fn distribution(&self) -> Option<&Arc<LinearAlgebraDistribution>> {
        self.distribution.as_ref()
    }

    pub(crate) fn dist(&self, op: &'static str) -> Result<&Arc<LinearAlgebraDistribution>> {
        self.distribution.as_ref().ok_or(LaError::NotBuilt(op))
    }

    /// Global number of rows (0 when unbuilt).
    pub fn nrow(&self) -> usize {
        self.distribution.as_ref().map_or(0, |d| d.nrow())
    }

    pub fn nrow_local(&self) -> usize {
        self.values.len()
    }

    pub fn first_row(&self) -> usize {
        self.distribution.as_ref().map_or(0, |d| d.first_row())
    }

    pub fn values(&self) -> &[f64] {
        self.values.as_slice()
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        self.values.as_mut_slice()
    }

    pub fn storage(&self) -> &Storage {
        &self.values
    }

    pub fn get(&self, i: usize) -> Result<f64> {
        let len = self.nrow_local();
        self.values
            .as_slice()
            .get(i)
            .copied()
            .ok_or(LaError::IndexOutOfRange { op: "DoubleVector::get", index: i, len })
    }

    pub fn get_mut(&mut self, i: usize) -> Result<&mut f64> {
        let len = self.nrow_local();
        self.values
            .as_mut_slice()
            .get_mut(i)
            .ok_or(LaError::IndexOutOfRange { op: "DoubleVector::get_mut", index: i, len })
    }

    /// Rebuilds the vector on `dist` over caller memory.
    ///
    /// # Safety
    /// See [`Storage::external`]: `values` must stay valid for
    /// `dist.nrow_local()` entries while the vector uses it, and with
    /// `delete_external_values` it must be a `Box<[f64]>` of that length.
    pub unsafe fn set_external_values(
        &mut self,
        dist: &Arc<LinearAlgebraDistribution>,
        values: NonNull<f64>,
        delete_external_values: bool,
    ) {
        self.clear();
        // SAFETY: forwarded contract.
        self.values = unsafe { Storage::external(values, dist.nrow_local(), delete_external_values) };
        self.distribution = Some(dist.clone());
    }

    /// Swaps in caller memory under the current distribution.
    ///
    /// # Safety
    /// Same contract as [`DoubleVector::set_external_values`].
    pub unsafe fn set_external_values_keep_distribution(
        &mut self,
        values: NonNull<f64>,
        delete_external_values: bool,
    ) -> Result<()> {
        let n = self.dist("DoubleVector::set_external_values")?.nrow_local();
        // SAFETY: forwarded contract.
        self.values = unsafe { Storage::external(values, n, delete_external_values) };
        Ok(())
    }

    /// Moves the global vector onto `new_dist`. Collective.
    ///
    /// The global row count and communicator must match the current layout.
    /// Redistributing to an equal layout only swaps the bookkeeping.
    pub fn redistribute(&mut self, new_dist: &Arc<LinearAlgebraDistribution>) -> Result<()> {
        const OP: &str = "DoubleVector::redistribute";
        let old = self.dist(OP)?.clone();
        if old.nrow() != new_dist.nrow() {
            return Err(LaError::SizeMismatch { op: OP, expected: old.nrow(), found: new_dist.nrow() });
        }
        if !old.communicator().same_group(new_dist.communicator().as_ref()) {
            return Err(LaError::CommunicatorMismatch(OP));
        }
        if *old == **new_dist {
            self.distribution = Some(new_dist.clone());
            return Ok(());
        }
        log::debug!(
            "redistribute {} rows: local {} -> {}",
            old.nrow(),
            old.nrow_local(),
            new_dist.nrow_local()
        );
        let mut values = vec![0.0; new_dist.nrow_local()];
        transfer(
            old.communicator().as_ref(),
            &[Source { dist: &old, offset: 0, values: self.values.as_slice() }],
            &mut [Target { dist: new_dist, offset: 0, values: &mut values }],
        )?;
        self.values = Storage::Owned(values);
        self.distribution = Some(new_dist.clone());
        Ok(())
    }

    fn check_same_layout(&self, other: &DoubleVector, op: &'static str) -> Result<()> {
        let a = self.dist(op)?;
        let b = other.dist(op)?;
        if Arc::ptr_eq(a, b) || **a == **b {
            Ok(())
        } else {
            Err(LaError::DistributionMismatch(op))
        }
    }

    /// `self += other`; distributions must match.
    pub fn try_add_assign(&mut self, other: &DoubleVector) -> Result<()> {
        self.check_same_layout(other, "DoubleVector::add_assign")?;
        self.zip_apply(other, |a, b| *a += b);
        Ok(())
    }

    /// `self -= other`; distributions must match.
    pub fn try_sub_assign(&mut self, other: &DoubleVector) -> Result<()> {
        self.check_same_layout(other, "DoubleVector::sub_assign")?;
        self.zip_apply(other, |a, b| *a -= b);
        Ok(())
    }

    fn zip_apply(&mut self, other: &DoubleVector, f: impl Fn(&mut f64, f64) + Sync + Send) {
        let rhs = other.values.as_slice();
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            self.values
                .as_mut_slice()
                .par_iter_mut()
                .zip(rhs.par_iter())
                .for_each(|(a, &b)| f(a, b));
        }
        #[cfg(not(feature = "rayon"))]
        {
            self.values
                .as_mut_slice()
                .iter_mut()
                .zip(rhs)
                .for_each(|(a, &b)| f(a, b));
        }
    }

    /// Global inner product. Collective for distributed vectors.
    pub fn dot(&self, other: &DoubleVector) -> Result<f64> {
        self.check_same_layout(other, "DoubleVector::dot")?;
        let dist = self.dist("DoubleVector::dot")?;
        let local = local_dot(self.values(), other.values());
        Ok(if dist.distributed() {
            dist.communicator().all_reduce(local)
        } else {
            local
        })
    }

    /// Euclidean norm of the global vector. Collective.
    pub fn norm(&self) -> Result<f64> {
        let dist = self.dist("DoubleVector::norm")?;
        let local = local_dot(self.values(), self.values());
        let sum = if dist.distributed() {
            dist.communicator().all_reduce(local)
        } else {
            local
        };
        Ok(sum.sqrt())
    }

    /// A-norm `sqrt(xᵗ A x)`. Collective.
    pub fn norm_with(&self, matrix: &dyn DoubleMatrix) -> Result<f64> {
        let dist = self.dist("DoubleVector::norm_with")?;
        let mut ax = DoubleVector::new(dist, 0.0);
        matrix.multiply(self, &mut ax)?;
        Ok(self.dot(&ax)?.sqrt())
    }

    /// Largest entry of the global vector. Collective.
    pub fn max(&self) -> Result<f64> {
        let dist = self.dist("DoubleVector::max")?;
        let local = self.values().iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(if dist.distributed() {
            dist.communicator().all_reduce_max(local)
        } else {
            local
        })
    }

    /// Writes the global vector, one value per line in global row order.
    /// Collective: the local parts are gathered on every rank first.
    pub fn output<W: Write>(&self, out: &mut W, opts: &OutputOptions) -> Result<()> {
        let dist = self.dist("DoubleVector::output")?;
        if dist.distributed() {
            let parts = dist.communicator().all_gather_v(self.values());
            for v in parts.iter().flatten() {
                writeln!(out, "{}", opts.format(*v))?;
            }
        } else {
            self.output_local_values(out, opts)?;
        }
        Ok(())
    }

    /// Writes the local rows, one value per line.
    pub fn output_local_values<W: Write>(&self, out: &mut W, opts: &OutputOptions) -> Result<()> {
        for v in self.values() {
            writeln!(out, "{}", opts.format(*v))?;
        }
        Ok(())
    }

    /// Writes `global_row value` pairs for the local rows.
    pub fn output_local_values_with_offset<W: Write>(&self, out: &mut W, opts: &OutputOptions) -> Result<()> {
        let first = self.first_row();
        for (i, v) in self.values().iter().enumerate() {
            writeln!(out, "{} {}", first + i, opts.format(*v))?;
        }
        Ok(())
    }
}

impl PartialEq for DoubleVector {
    fn eq(&self, other: &Self) -> bool {
        match (&self.distribution, &other.distribution) {
            (Some(a), Some(b)) => **a == **b && self.values() == other.values(),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Index<usize> for DoubleVector {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        &self.values.as_slice()[i]
    }
}

impl IndexMut<usize> for DoubleVector {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.values.as_mut_slice()[i]
    }
}

impl AddAssign<&DoubleVector> for DoubleVector {
    /// # Panics
    /// On mismatched distributions; use [`DoubleVector::try_add_assign`] to
    /// handle that case.
    fn add_assign(&mut self, rhs: &DoubleVector) {
        if let Err(e) = self.try_add_assign(rhs) {
            panic!("{e}");
        }
    }
}

impl SubAssign<&DoubleVector> for DoubleVector {
    /// # Panics
    /// On mismatched distributions; use [`DoubleVector::try_sub_assign`] to
    /// handle that case.
    fn sub_assign(&mut self, rhs: &DoubleVector) {
        if let Err(e) = self.try_sub_assign(rhs) {
            panic!("{e}");
        }
    }
}

impl MulAssign<f64> for DoubleVector {
    fn mul_assign(&mut self, d: f64) {
        self.values.as_mut_slice().iter_mut().for_each(|v| *v *= d);
    }
}

impl DivAssign<f64> for DoubleVector {
    fn div_assign(&mut self, d: f64) {
        self.values.as_mut_slice().iter_mut().for_each(|v| *v /= d);
    }
}
