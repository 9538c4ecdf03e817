//! MPI-based parallel communication module.
//!
//! This module provides an implementation of the `Comm` trait using the MPI (Message Passing Interface)
//! backend for distributed-memory parallelism. It is only available when the `mpi` feature is enabled.
//!
//! # Usage
//!
//! - `MpiComm` owns the MPI universe (MPI is finalised when it is dropped) and the world communicator.
//! - Share it between distributions as `Arc<dyn Comm>`.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")] {
//! use std::sync::Arc;
//! use distla::parallel::{Comm, MpiComm};
//! let comm: Arc<dyn Comm> = Arc::new(MpiComm::new().unwrap());
//! println!("Rank: {} / {}", comm.rank(), comm.size());
//! comm.barrier();
//! # }
//! ```

use crate::error::LaError;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

/// MPI communicator wrapper for distributed parallelism.
pub struct MpiComm {
    /// The MPI world communicator (all processes in the job).
    pub world: SimpleCommunicator,
    /// The rank (ID) of this process within the communicator.
    pub rank: usize,
    /// The total number of processes in the communicator.
    pub size: usize,
    // Dropped last; finalises MPI.
    _universe: Universe,
}

impl MpiComm {
    /// Initializes MPI and wraps the world communicator.
    pub fn new() -> Result<Self, LaError> {
        let universe = mpi::initialize()
            .ok_or_else(|| LaError::Comm("MPI has already been initialised".to_string()))?;
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Ok(MpiComm { world, rank, size, _universe: universe })
    }
}

fn displacements(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &c| {
            let d = *acc;
            *acc += c;
            Some(d)
        })
        .collect()
}

impl super::Comm for MpiComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }
    // The only group this backend exposes is the world.
    fn group_id(&self) -> u64 { u64::MAX }
    fn barrier(&self) { self.world.barrier(); }

    fn all_reduce(&self, x: f64) -> f64 {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::sum());
        y
    }

    fn all_reduce_max(&self, x: f64) -> f64 {
        let mut y = x;
        self.world.all_reduce_into(&x, &mut y, &SystemOperation::max());
        y
    }

    fn all_to_all_bytes(&self, send: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        assert_eq!(send.len(), self.size, "one send buffer per rank");
        let send_counts: Vec<Count> = send.iter().map(|b| b.len() as Count).collect();
        let mut recv_counts: Vec<Count> = vec![0; self.size];
        self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

        let send_displs = displacements(&send_counts);
        let recv_displs = displacements(&recv_counts);
        let flat: Vec<u8> = send.concat();
        let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
        let mut recv = vec![0u8; total];
        {
            let send_part = Partition::new(&flat[..], &send_counts[..], &send_displs[..]);
            let mut recv_part = PartitionMut::new(&mut recv[..], &recv_counts[..], &recv_displs[..]);
            self.world.all_to_all_varcount_into(&send_part, &mut recv_part);
        }
        recv_displs
            .iter()
            .zip(&recv_counts)
            .map(|(&d, &c)| recv[d as usize..(d + c) as usize].to_vec())
            .collect()
    }
}
