//! ROCm/HIP error types.

use std::path::PathBuf;
use thiserror::Error;

/// HIP runtime error codes (subset).
///
/// Unknown codes map to [`HipErrorCode::Unknown`]; the raw status is always
/// kept alongside so nothing is lost in translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum HipErrorCode {
    Success = 0,
    InvalidValue = 1,
    OutOfMemory = 2,
    NotInitialized = 3,
    InvalidDevice = 101,
    InvalidImage = 200,
    FileNotFound = 301,
    InvalidHandle = 400,
    NotFound = 500,
    NotReady = 600,
    LaunchFailure = 719,
    Unknown = 999,
}

impl HipErrorCode {
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::InvalidValue,
            2 => Self::OutOfMemory,
            3 => Self::NotInitialized,
            101 => Self::InvalidDevice,
            200 => Self::InvalidImage,
            301 => Self::FileNotFound,
            400 => Self::InvalidHandle,
            500 => Self::NotFound,
            600 => Self::NotReady,
            719 => Self::LaunchFailure,
            _ => Self::Unknown,
        }
    }

    /// The numeric `hipError_t` value.
    pub const fn raw(self) -> i32 {
        self as i32
    }
}

/// Errors produced by the device runtime layer.
#[derive(Debug, Error)]
pub enum RocmError {
    #[error("HIP runtime error {raw} ({code:?}) in {context}")]
    Device {
        code: HipErrorCode,
        raw: i32,
        context: String,
    },

    #[error("failed to load code object {}: {code:?} (status {raw})", path.display())]
    Load {
        path: PathBuf,
        code: HipErrorCode,
        raw: i32,
    },

    #[error("kernel entry point `{symbol}` not found in loaded module")]
    SymbolNotFound { symbol: String },

    #[error("ROCm runtime not found: {0}")]
    RuntimeNotFound(String),

    #[error("no AMD GPU device found")]
    NoDevice,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl RocmError {
    /// Build a [`RocmError::Device`] from a known code.
    pub fn device(code: HipErrorCode, context: impl Into<String>) -> Self {
        Self::Device { code, raw: code.raw(), context: context.into() }
    }

    /// Raw device status carried by this error, if any.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Device { raw, .. } | Self::Load { raw, .. } => Some(*raw),
            Self::SymbolNotFound { .. } => Some(HipErrorCode::NotFound.raw()),
            _ => None,
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, RocmError>;

/// Check a HIP status code and return an error if non-zero.
pub fn check_hip(status: i32, context: &str) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(RocmError::Device {
            code: HipErrorCode::from_raw(status),
            raw: status,
            context: context.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_round_trip() {
        for code in [
            HipErrorCode::InvalidValue,
            HipErrorCode::FileNotFound,
            HipErrorCode::NotFound,
            HipErrorCode::NotReady,
        ] {
            assert_eq!(HipErrorCode::from_raw(code.raw()), code);
        }
    }

    #[test]
    fn unknown_code_keeps_raw_status() {
        let err = check_hip(4242, "hipMalloc").unwrap_err();
        assert_eq!(err.status(), Some(4242));
        assert!(matches!(err, RocmError::Device { code: HipErrorCode::Unknown, .. }));
        assert!(err.to_string().contains("hipMalloc"));
    }

    #[test]
    fn success_is_ok() {
        assert!(check_hip(0, "hipFree").is_ok());
    }
}
