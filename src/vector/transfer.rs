//! Row movement between layouts.
//!
//! Redistribution, concatenation and splitting all reduce to the same
//! problem: a set of source vectors and a set of target vectors each occupy a
//! contiguous run of one shared index space, and every rank must receive the
//! rows of its targets from whichever ranks hold them in the sources.
//! Because distributions are contiguous and rank-ordered, both ends can derive
//! every message layout from the distributions alone, so only values travel.

use crate::core::LinearAlgebraDistribution;
use crate::error::{LaError, Result};
use crate::parallel::Comm;
use std::ops::Range;

/// A source vector occupying `offset..offset + dist.nrow()`.
pub(crate) struct Source<'a> {
    pub dist: &'a LinearAlgebraDistribution,
    pub offset: usize,
    pub values: &'a [f64],
}

/// A target vector occupying `offset..offset + dist.nrow()`.
pub(crate) struct Target<'a> {
    pub dist: &'a LinearAlgebraDistribution,
    pub offset: usize,
    pub values: &'a mut [f64],
}

/// Rows of the shared space held by `rank` under `dist`.
fn held(dist: &LinearAlgebraDistribution, offset: usize, rank: usize) -> Range<usize> {
    if dist.distributed() {
        let first = offset + dist.first_row_on(rank);
        first..first + dist.nrow_local_on(rank)
    } else {
        offset..offset + dist.nrow()
    }
}

fn overlap(a: &Range<usize>, b: &Range<usize>) -> Range<usize> {
    let lo = a.start.max(b.start);
    let hi = a.end.min(b.end);
    lo..hi.max(lo)
}

/// Collective when any source is distributed.
pub(crate) fn transfer(comm: &dyn Comm, sources: &[Source<'_>], targets: &mut [Target<'_>]) -> Result<()> {
    let me = comm.rank();

    // replicated sources are complete on every rank
    for t in targets.iter_mut() {
        let need = held(t.dist, t.offset, me);
        for s in sources.iter().filter(|s| !s.dist.distributed()) {
            let r = overlap(&held(s.dist, s.offset, me), &need);
            if r.is_empty() {
                continue;
            }
            let from = r.start - s.offset;
            let to = r.start - need.start;
            t.values[to..to + r.len()].copy_from_slice(&s.values[from..from + r.len()]);
        }
    }

    let distributed: Vec<&Source<'_>> = sources.iter().filter(|s| s.dist.distributed()).collect();
    if distributed.is_empty() {
        return Ok(());
    }

    let send: Vec<Vec<f64>> = (0..comm.size())
        .map(|p| {
            let mut buf = Vec::new();
            for t in targets.iter() {
                let need = held(t.dist, t.offset, p);
                for s in &distributed {
                    let mine = held(s.dist, s.offset, me);
                    let r = overlap(&mine, &need);
                    if !r.is_empty() {
                        buf.extend_from_slice(&s.values[r.start - mine.start..r.end - mine.start]);
                    }
                }
            }
            buf
        })
        .collect();
    log::trace!(
        "rank {}: transfer sends {:?} values",
        me,
        send.iter().map(Vec::len).collect::<Vec<_>>()
    );

    let recv = comm.all_to_all_v(&send);
    for (q, buf) in recv.iter().enumerate() {
        let mut pos = 0;
        for t in targets.iter_mut() {
            let need = held(t.dist, t.offset, me);
            for s in &distributed {
                let r = overlap(&held(s.dist, s.offset, q), &need);
                if r.is_empty() {
                    continue;
                }
                if pos + r.len() > buf.len() {
                    return Err(LaError::Comm(format!(
                        "rank {me}: message from rank {q} holds {} values, expected more",
                        buf.len()
                    )));
                }
                let to = r.start - need.start;
                t.values[to..to + r.len()].copy_from_slice(&buf[pos..pos + r.len()]);
                pos += r.len();
            }
        }
        if pos != buf.len() {
            return Err(LaError::Comm(format!(
                "rank {me}: message from rank {q} holds {} values, expected {pos}",
                buf.len()
            )));
        }
    }
    Ok(())
}
