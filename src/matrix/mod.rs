//! Matrix module: the compressed-row matrix used as the matrix collaborator
//! of vectors and preconditioners.

pub mod cr;
pub use cr::CrDoubleMatrix;
