//! Plain option structs passed at construction time.

pub mod options;
pub use options::{OutputOptions, PcOptions};
