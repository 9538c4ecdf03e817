//! distla: distributed vectors, halo exchange and preconditioners
//!
//! This crate provides row-distributed double vectors over a pluggable
//! communicator, precomputed halo (ghost) exchange plans, a compressed-row
//! matrix collaborator and a preconditioner interface with identity, Jacobi
//! and block-Jacobi implementations. Ranks may be MPI processes (feature
//! `mpi`) or threads of one process (`ThreadComm`).

pub mod parallel;

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod preconditioner;
pub mod vector;

// Re-exports for convenience
pub use config::*;
pub use core::*;
pub use error::*;
pub use matrix::*;
pub use parallel::{CheckedComm, Comm, SerialComm, ThreadComm};
pub use preconditioner::*;
pub use vector::*;
