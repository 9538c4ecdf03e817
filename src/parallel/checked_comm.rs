//! Debug wrapper that catches ranks entering different collectives.
//!
//! In builds with `debug_assertions`, every collective first exchanges a
//! `(sequence number, operation)` stamp with all ranks and panics if the
//! stamps disagree. Release builds forward straight to the inner backend.

use super::Comm;
use bytemuck::{Pod, Zeroable};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
enum Op {
    Barrier = 1,
    AllReduce = 2,
    AllReduceMax = 3,
    AllToAll = 4,
}

// exchanged before every collective
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
struct Stamp {
    seq: u64,
    op: u64,
}

pub struct CheckedComm<C: Comm> {
    inner: C,
    seq: AtomicU64,
}

impl<C: Comm> CheckedComm<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, seq: AtomicU64::new(0) }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Number of collectives entered so far on this rank.
    pub fn collectives_called(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    fn stamp(&self, op: Op) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        if !cfg!(debug_assertions) {
            return;
        }
        let mine = Stamp { seq, op: op as u64 };
        let bytes: Vec<u8> = bytemuck::bytes_of(&mine).to_vec();
        let recv = self.inner.all_to_all_bytes(vec![bytes; self.inner.size()]);
        for (src, msg) in recv.iter().enumerate() {
            let theirs: Stamp = bytemuck::pod_read_unaligned(msg);
            if theirs != mine {
                panic!(
                    "collective mismatch: rank {} is in call #{} ({:?}) but rank {} is in call #{} (op {})",
                    self.inner.rank(),
                    seq,
                    op,
                    src,
                    theirs.seq,
                    theirs.op
                );
            }
        }
    }
}

impl<C: Comm> Comm for CheckedComm<C> {
    fn rank(&self) -> usize { self.inner.rank() }
    fn size(&self) -> usize { self.inner.size() }
    fn group_id(&self) -> u64 { self.inner.group_id() }

    fn barrier(&self) {
        self.stamp(Op::Barrier);
        self.inner.barrier();
    }

    fn all_reduce(&self, x: f64) -> f64 {
        self.stamp(Op::AllReduce);
        self.inner.all_reduce(x)
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        self.stamp(Op::AllReduceMax);
        self.inner.all_reduce_max(x)
    }

    fn all_to_all_bytes(&self, send: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        self.stamp(Op::AllToAll);
        self.inner.all_to_all_bytes(send)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::ThreadComm;

    #[test]
    fn matching_sequences_pass() {
        let comms = ThreadComm::group(2);
        let got: Vec<(f64, u64)> = std::thread::scope(|s| {
            let hs: Vec<_> = comms
                .into_iter()
                .map(|c| {
                    s.spawn(move || {
                        let c = CheckedComm::new(c);
                        c.barrier();
                        let sum = c.all_reduce(1.0);
                        (sum, c.collectives_called())
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(got, vec![(2.0, 2), (2.0, 2)]);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn mismatched_collectives_panic() {
        let comms = ThreadComm::group(2);
        let outcomes: Vec<bool> = std::thread::scope(|s| {
            let hs: Vec<_> = comms
                .into_iter()
                .map(|c| {
                    s.spawn(move || {
                        let c = CheckedComm::new(c);
                        if c.rank() == 0 {
                            c.all_reduce(1.0);
                        } else {
                            c.all_reduce_max(1.0);
                        }
                    })
                })
                .collect();
            hs.into_iter().map(|h| h.join().is_err()).collect()
        });
        assert_eq!(outcomes, vec![true, true]);
    }
}
