//! API options for preconditioners and vector output.
//!
//! This module provides the `PcOptions` struct, consumed by every
//! preconditioner's setup, and the `OutputOptions` struct used by the
//! textual vector dumps.

/// Preconditioner setup options.
#[derive(Debug, Clone, Default)]
pub struct PcOptions {
    /// Suppress the setup-time report normally logged at `info` level
    pub silent_setup: bool,
}

/// Formatting of textual vector dumps.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Digits after the decimal point; `None` uses `Display` formatting
    pub precision: Option<usize>,
}

impl OutputOptions {
    pub fn with_precision(precision: usize) -> Self {
        Self { precision: Some(precision) }
    }

    pub(crate) fn format(&self, v: f64) -> String {
        match self.precision {
            Some(p) => format!("{:.*}", p, v),
            None => format!("{}", v),
        }
    }
}
