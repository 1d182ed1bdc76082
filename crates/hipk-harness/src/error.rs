//! Harness error types.

use hipk_runtime::RocmError;
use thiserror::Error;

use crate::signature::LayoutError;
use crate::validate::Mismatch;

/// Errors produced by the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A device runtime call failed; status surfaced verbatim.
    #[error(transparent)]
    Runtime(#[from] RocmError),

    /// The packed argument buffer does not match the kernel's signature.
    #[error("argument layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Device output disagreed with the host reference.
    #[error("validation failure: {0}")]
    Validation(#[from] Mismatch),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, HarnessError>;
