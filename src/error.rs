use thiserror::Error;

// Unified error type for distla

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaError {
    #[error("{0}: object has not been built")]
    NotBuilt(&'static str),
    #[error("{0}: distributions do not match")]
    DistributionMismatch(&'static str),
    #[error("{0}: objects live on different communicators")]
    CommunicatorMismatch(&'static str),
    #[error("{op}: expected size {expected}, found {found}")]
    SizeMismatch {
        op: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{op}: index {index} out of range for length {len}")]
    IndexOutOfRange {
        op: &'static str,
        index: usize,
        len: usize,
    },
    #[error("global equation {0} has not been set as halo")]
    HaloNotRegistered(usize),
    #[error("no halo data supplied for global equation {0}")]
    MissingHaloData(usize),
    #[error("halo data requested for global equation {0}, but no halo scheme has been set up")]
    NoHaloScheme(usize),
    #[error("{0}: setup() must be called first")]
    SetupRequired(&'static str),
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("{op}: {reason}")]
    InvalidDofTypeMap { op: &'static str, reason: String },
    #[error("zero pivot at row {0}")]
    ZeroPivot(usize),
    #[error("{0}: failed on another rank")]
    FailedOnPeer(&'static str),
    #[error("communication error: {0}")]
    Comm(String),
    #[error("output error: {0}")]
    Io(String),
}

impl From<std::io::Error> for LaError {
    fn from(e: std::io::Error) -> Self {
        LaError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LaError>;
