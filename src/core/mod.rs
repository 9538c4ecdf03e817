//! Core descriptors and collaborator traits shared by vectors, matrices and
//! preconditioners.

pub mod distribution;
pub mod traits;

pub use distribution::LinearAlgebraDistribution;
pub use traits::{Distributable, DoubleMatrix, RowView};
