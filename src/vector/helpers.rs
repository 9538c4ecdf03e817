//! Concatenation and splitting of vectors that share one communicator.
//!
//! With communication, the output keeps the rows "as they are": the global
//! output vector is the inputs stacked end to end, whatever the layouts, and
//! rows travel to whichever rank owns them in the output layout.
//!
//! Without communication, every rank keeps exactly the rows it already holds:
//! the local part of the output is the local parts of the inputs stacked on
//! each rank, so the global ordering is a permutation of the stacked vector.
//! The layouts must then be related by
//! [`LinearAlgebraDistribution::concatenate`].

use super::transfer::{transfer, Source, Target};
use super::DoubleVector;
use crate::core::LinearAlgebraDistribution;
use crate::error::{LaError, Result};
use std::sync::Arc;

fn built_dists<'a>(
    vectors: impl IntoIterator<Item = &'a DoubleVector>,
    op: &'static str,
) -> Result<Vec<Arc<LinearAlgebraDistribution>>> {
    let dists: Vec<_> = vectors
        .into_iter()
        .map(|v| v.dist(op).cloned())
        .collect::<Result<_>>()?;
    let first = dists.first().ok_or(LaError::NotBuilt(op))?;
    if dists
        .iter()
        .any(|d| !d.communicator().same_group(first.communicator().as_ref()))
    {
        return Err(LaError::CommunicatorMismatch(op));
    }
    Ok(dists)
}

fn offsets(dists: &[Arc<LinearAlgebraDistribution>]) -> Vec<usize> {
    dists
        .iter()
        .scan(0, |acc, d| {
            let o = *acc;
            *acc += d.nrow();
            Some(o)
        })
        .collect()
}

/// Stacks `inputs` into `out`. Collective.
///
/// If `out` is unbuilt it is built on a uniform layout of the summed row
/// count, distributed like the first input; otherwise its global row count
/// must equal that sum.
pub fn concatenate(inputs: &[&DoubleVector], out: &mut DoubleVector) -> Result<()> {
    const OP: &str = "DoubleVector::concatenate";
    let dists = built_dists(inputs.iter().copied(), OP)?;
    let nrow: usize = dists.iter().map(|d| d.nrow()).sum();
    let comm = dists[0].communicator().clone();

    let out_dist = match out.distribution() {
        Some(d) => {
            if d.nrow() != nrow {
                return Err(LaError::SizeMismatch { op: OP, expected: nrow, found: d.nrow() });
            }
            if !d.communicator().same_group(comm.as_ref()) {
                return Err(LaError::CommunicatorMismatch(OP));
            }
            d.clone()
        }
        None => Arc::new(LinearAlgebraDistribution::new(comm.clone(), nrow, dists[0].distributed())),
    };

    let sources: Vec<Source<'_>> = inputs
        .iter()
        .zip(&dists)
        .zip(offsets(&dists))
        .map(|((v, d), offset)| Source { dist: d, offset, values: v.values() })
        .collect();
    let mut values = vec![0.0; out_dist.nrow_local()];
    transfer(
        comm.as_ref(),
        &sources,
        &mut [Target { dist: &out_dist, offset: 0, values: &mut values }],
    )?;
    out.build_from_global_unchecked(&out_dist, values);
    Ok(())
}

/// Splits `input` across the already built `outs`. Collective.
///
/// The outputs' global row counts must sum to the input's.
pub fn split(input: &DoubleVector, outs: &mut [&mut DoubleVector]) -> Result<()> {
    const OP: &str = "DoubleVector::split";
    let in_dist = input.dist(OP)?.clone();
    let dists = built_dists(outs.iter().map(|v| &**v), OP)?;
    if !dists[0].communicator().same_group(in_dist.communicator().as_ref()) {
        return Err(LaError::CommunicatorMismatch(OP));
    }
    let nrow: usize = dists.iter().map(|d| d.nrow()).sum();
    if nrow != in_dist.nrow() {
        return Err(LaError::SizeMismatch { op: OP, expected: in_dist.nrow(), found: nrow });
    }

    let mut targets: Vec<Target<'_>> = outs
        .iter_mut()
        .zip(&dists)
        .zip(offsets(&dists))
        .map(|((v, d), offset)| Target { dist: d, offset, values: v.values_mut() })
        .collect();
    transfer(
        in_dist.communicator().as_ref(),
        &[Source { dist: &in_dist, offset: 0, values: input.values() }],
        &mut targets,
    )
}

/// Stacks the local parts of `inputs` on every rank. No communication.
///
/// If `out` is built its layout must be the concatenation of the inputs'
/// layouts.
pub fn concatenate_without_communication(inputs: &[&DoubleVector], out: &mut DoubleVector) -> Result<()> {
    const OP: &str = "DoubleVector::concatenate_without_communication";
    let dists = built_dists(inputs.iter().copied(), OP)?;
    let refs: Vec<&LinearAlgebraDistribution> = dists.iter().map(|d| &**d).collect();
    let expected = LinearAlgebraDistribution::concatenate(&refs)?;
    let out_dist = match out.distribution() {
        Some(d) if **d == expected => d.clone(),
        Some(_) => return Err(LaError::DistributionMismatch(OP)),
        None => Arc::new(expected),
    };
    let values: Vec<f64> = inputs.iter().flat_map(|v| v.values().iter().copied()).collect();
    out.build_from_global_unchecked(&out_dist, values);
    Ok(())
}

/// Splits the local part of `input` across the built `outs`. No
/// communication; `input`'s layout must be the concatenation of theirs.
pub fn split_without_communication(input: &DoubleVector, outs: &mut [&mut DoubleVector]) -> Result<()> {
    const OP: &str = "DoubleVector::split_without_communication";
    let in_dist = input.dist(OP)?;
    let dists = built_dists(outs.iter().map(|v| &**v), OP)?;
    let refs: Vec<&LinearAlgebraDistribution> = dists.iter().map(|d| &**d).collect();
    if LinearAlgebraDistribution::concatenate(&refs)? != **in_dist {
        return Err(LaError::DistributionMismatch(OP));
    }
    let mut rest = input.values();
    for out in outs.iter_mut() {
        let (head, tail) = rest.split_at(out.nrow_local());
        out.values_mut().copy_from_slice(head);
        rest = tail;
    }
    Ok(())
}

impl DoubleVector {
    // `values` already holds exactly the local rows of `dist`
    fn build_from_global_unchecked(&mut self, dist: &Arc<LinearAlgebraDistribution>, values: Vec<f64>) {
        debug_assert_eq!(values.len(), dist.nrow_local());
        self.clear();
        self.build(dist, 0.0);
        self.values_mut().copy_from_slice(&values);
    }
}
