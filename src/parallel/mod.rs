//! Process-group communication.
//!
//! Every distributed object in this crate talks to its peers through the
//! [`Comm`] trait. The required methods are the handful of primitives a
//! backend has to supply; typed collectives are layered on top of them in the
//! inherent `impl dyn Comm` block.
//!
//! # Collective contract
//!
//! Every collective (`barrier`, `all_reduce`, `all_reduce_max`,
//! `all_to_all_bytes` and everything built on them) must be entered by every
//! rank of the group, in the same order and the same number of times. This is
//! not checked at runtime: a rank that skips a collective leaves the others
//! blocked forever. [`CheckedComm`] can be layered over any backend in debug
//! builds to turn such mismatches into a panic.

use crate::error::{LaError, Result};
use bytemuck::Pod;

/// Rank/size abstraction with the collective primitives needed by the
/// distributed vectors.
pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    /// Identity of the process group. Two communicators refer to the same
    /// group iff their ids and sizes agree.
    fn group_id(&self) -> u64;
    fn barrier(&self);
    /// Sum of `x` over all ranks.
    fn all_reduce(&self, x: f64) -> f64;
    /// Maximum of `x` over all ranks.
    fn all_reduce_max(&self, x: f64) -> f64;
    /// All-to-all with variable message sizes: `send[p]` goes to rank `p`, and
    /// entry `p` of the result is what rank `p` sent here.
    fn all_to_all_bytes(&self, send: Vec<Vec<u8>>) -> Vec<Vec<u8>>;
    // Global inner product of two local slices
    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        let local = local_dot(a, b);
        self.all_reduce(local)
    }
}

impl<'a> dyn Comm + 'a {
    /// Typed all-to-all-v: `send[p]` is delivered to rank `p`.
    pub fn all_to_all_v<T: Pod>(&self, send: &[Vec<T>]) -> Vec<Vec<T>> {
        debug_assert_eq!(send.len(), self.size(), "one send buffer per rank");
        let raw = send
            .iter()
            .map(|buf| bytemuck::cast_slice::<T, u8>(buf).to_vec())
            .collect();
        self.all_to_all_bytes(raw)
            .into_iter()
            .map(|bytes| decode(&bytes))
            .collect()
    }

    /// Gathers one value from every rank, in rank order, on every rank.
    pub fn all_gather<T: Pod>(&self, x: T) -> Vec<T> {
        let send = vec![vec![x]; self.size()];
        self.all_to_all_v(&send)
            .into_iter()
            .map(|v| v[0])
            .collect()
    }

    /// Gathers a variable-length slice from every rank on every rank.
    pub fn all_gather_v<T: Pod>(&self, local: &[T]) -> Vec<Vec<T>> {
        let send = vec![local.to_vec(); self.size()];
        self.all_to_all_v(&send)
    }

    /// Settles a per-rank check before the collectives that depend on it.
    /// If any rank failed, every rank returns an error: a failing rank keeps
    /// its own, the others get [`LaError::FailedOnPeer`]. Collective.
    pub fn agree<T>(&self, op: &'static str, local: Result<T>) -> Result<T> {
        let failed = self.all_reduce_max(if local.is_err() { 1.0 } else { 0.0 });
        match local {
            Ok(_) if failed > 0.0 => Err(LaError::FailedOnPeer(op)),
            other => other,
        }
    }

    pub fn same_group(&self, other: &dyn Comm) -> bool {
        self.group_id() == other.group_id() && self.size() == other.size()
    }
}

fn decode<T: Pod>(bytes: &[u8]) -> Vec<T> {
    let width = std::mem::size_of::<T>();
    debug_assert_eq!(bytes.len() % width, 0, "truncated message");
    bytes
        .chunks_exact(width)
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect()
}

pub(crate) fn local_dot(a: &[f64], b: &[f64]) -> f64 {
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
    }
    #[cfg(not(feature = "rayon"))]
    {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }
}

/// Single-process communicator: every collective is a local copy.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn group_id(&self) -> u64 { 0 }
    fn barrier(&self) {}
    fn all_reduce(&self, x: f64) -> f64 { x }
    fn all_reduce_max(&self, x: f64) -> f64 { x }
    fn all_to_all_bytes(&self, send: Vec<Vec<u8>>) -> Vec<Vec<u8>> { send }
}

pub mod thread_comm;
pub use thread_comm::ThreadComm;

pub mod checked_comm;
pub use checked_comm::CheckedComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
