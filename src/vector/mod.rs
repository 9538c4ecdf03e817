//! Distributed vectors, halo exchange and the concatenate/split helpers.

pub mod double_vector;
pub mod halo_scheme;
pub mod helpers;
pub mod storage;
pub(crate) mod transfer;
pub mod with_halo;

pub use double_vector::DoubleVector;
pub use halo_scheme::DoubleVectorHaloScheme;
pub use helpers::{concatenate, concatenate_without_communication, split, split_without_communication};
pub use storage::Storage;
pub use with_halo::DoubleVectorWithHaloEntries;
