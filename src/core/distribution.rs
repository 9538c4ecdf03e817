//! Row partitioning of a global index range across the ranks of a
//! communicator.
//!
//! A [`LinearAlgebraDistribution`] is immutable once built and is shared
//! (`Arc`) by every vector, matrix and preconditioner laid out on it. Rank `p`
//! owns the contiguous global rows `first_row_on(p)..first_row_on(p) +
//! nrow_local_on(p)`; a replicated (non-distributed) layout gives every rank
//! all rows.

use crate::error::{LaError, Result};
use crate::parallel::Comm;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[derive(Clone)]
pub struct LinearAlgebraDistribution {
    comm: Arc<dyn Comm>,
    nrow: usize,
    distributed: bool,
    first_rows: Vec<usize>,
    nrow_locals: Vec<usize>,
}

impl LinearAlgebraDistribution {
    /// Uniform layout: rank `p` starts at `p * nrow / nproc`. With
    /// `distributed == false` (or a single rank) every rank holds all rows.
    pub fn new(comm: Arc<dyn Comm>, nrow: usize, distributed: bool) -> Self {
        let nproc = comm.size();
        let distributed = distributed && nproc > 1;
        let (first_rows, nrow_locals) = if distributed {
            let first: Vec<usize> = (0..nproc).map(|p| p * nrow / nproc).collect();
            let counts = (0..nproc)
                .map(|p| {
                    let end = if p + 1 < nproc { first[p + 1] } else { nrow };
                    end - first[p]
                })
                .collect();
            (first, counts)
        } else {
            (vec![0; nproc], vec![nrow; nproc])
        };
        Self { comm, nrow, distributed, first_rows, nrow_locals }
    }

    /// Builds a distributed layout from explicit per-rank extents, known on
    /// every rank. The extents must tile `0..nrow` in rank order.
    pub fn from_parts(
        comm: Arc<dyn Comm>,
        first_rows: Vec<usize>,
        nrow_locals: Vec<usize>,
    ) -> Result<Self> {
        const OP: &str = "LinearAlgebraDistribution::from_parts";
        let nproc = comm.size();
        if first_rows.len() != nproc {
            return Err(LaError::SizeMismatch { op: OP, expected: nproc, found: first_rows.len() });
        }
        if nrow_locals.len() != nproc {
            return Err(LaError::SizeMismatch { op: OP, expected: nproc, found: nrow_locals.len() });
        }
        let mut next = 0;
        for (&first, &n) in first_rows.iter().zip(&nrow_locals) {
            if first != next {
                return Err(LaError::SizeMismatch { op: OP, expected: next, found: first });
            }
            next += n;
        }
        Ok(Self {
            distributed: nproc > 1,
            comm,
            nrow: next,
            first_rows,
            nrow_locals,
        })
    }

    /// Collective: every rank states its own extent and the layout is
    /// assembled from an all-gather.
    pub fn from_local(comm: Arc<dyn Comm>, first_row: usize, nrow_local: usize) -> Result<Self> {
        let extents = comm.all_gather([first_row, nrow_local]);
        let first_rows = extents.iter().map(|e| e[0]).collect();
        let nrow_locals = extents.iter().map(|e| e[1]).collect();
        Self::from_parts(comm, first_rows, nrow_locals)
    }

    /// Layout whose local part on each rank is the concatenation of the local
    /// parts of `dists` on that rank. No data moves under this layout, which
    /// is what the `*_without_communication` helpers rely on.
    pub fn concatenate(dists: &[&LinearAlgebraDistribution]) -> Result<Self> {
        const OP: &str = "LinearAlgebraDistribution::concatenate";
        let first = dists.first().ok_or(LaError::NotBuilt(OP))?;
        for d in dists {
            if !d.comm.same_group(first.comm.as_ref()) {
                return Err(LaError::CommunicatorMismatch(OP));
            }
            if d.distributed != first.distributed {
                return Err(LaError::DistributionMismatch(OP));
            }
        }
        let nrow: usize = dists.iter().map(|d| d.nrow).sum();
        if !first.distributed {
            return Ok(Self::new(first.comm.clone(), nrow, false));
        }
        let nproc = first.comm.size();
        let nrow_locals: Vec<usize> = (0..nproc)
            .map(|p| dists.iter().map(|d| d.nrow_locals[p]).sum())
            .collect();
        let first_rows = nrow_locals
            .iter()
            .scan(0, |acc, &n| {
                let f = *acc;
                *acc += n;
                Some(f)
            })
            .collect();
        Self::from_parts(first.comm.clone(), first_rows, nrow_locals)
    }

    pub fn communicator(&self) -> &Arc<dyn Comm> {
        &self.comm
    }

    /// Global number of rows.
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn distributed(&self) -> bool {
        self.distributed
    }

    pub fn nrow_local(&self) -> usize {
        self.nrow_locals[self.comm.rank()]
    }

    pub fn first_row(&self) -> usize {
        self.first_rows[self.comm.rank()]
    }

    pub fn nrow_local_on(&self, rank: usize) -> usize {
        self.nrow_locals[rank]
    }

    pub fn first_row_on(&self, rank: usize) -> usize {
        self.first_rows[rank]
    }

    /// Global rows held on this rank.
    pub fn local_range(&self) -> Range<usize> {
        let first = self.first_row();
        first..first + self.nrow_local()
    }

    pub fn is_local(&self, global: usize) -> bool {
        self.local_range().contains(&global)
    }

    /// Rank owning global row `global`; `None` when out of range. In a
    /// replicated layout the calling rank owns everything.
    pub fn rank_of_row(&self, global: usize) -> Option<usize> {
        if global >= self.nrow {
            return None;
        }
        if !self.distributed {
            return Some(self.comm.rank());
        }
        // last rank whose first row is <= global; empty ranks share a first row
        let p = self.first_rows.partition_point(|&f| f <= global) - 1;
        let p = (0..=p).rev().find(|&q| self.nrow_locals[q] > 0 && self.first_rows[q] <= global)?;
        Some(p)
    }
}

impl PartialEq for LinearAlgebraDistribution {
    fn eq(&self, other: &Self) -> bool {
        self.comm.same_group(other.comm.as_ref())
            && self.nrow == other.nrow
            && self.distributed == other.distributed
            && self.first_rows == other.first_rows
            && self.nrow_locals == other.nrow_locals
    }
}

impl fmt::Debug for LinearAlgebraDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearAlgebraDistribution")
            .field("rank", &self.comm.rank())
            .field("nproc", &self.comm.size())
            .field("nrow", &self.nrow)
            .field("distributed", &self.distributed)
            .field("first_rows", &self.first_rows)
            .field("nrow_locals", &self.nrow_locals)
            .finish()
    }
}
