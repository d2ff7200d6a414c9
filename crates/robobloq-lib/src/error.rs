//! Unified error type for the robobloq-lib crate.
//!
//! [`RobobloqError`] wraps module-specific errors (`DeviceError`,
//! `ValidationError`, `CaptureError`) and domain-specific error kinds
//! (`Config`, `Color`). `From` impls allow `?` to propagate across module
//! boundaries seamlessly.

use std::fmt;

use crate::capture::CaptureError;
use crate::device::DeviceError;
use crate::scheduler::ValidationError;

/// Unified error type for robobloq-lib operations.
#[derive(Debug)]
pub enum RobobloqError {
    /// Device discovery or write error.
    Device(DeviceError),
    /// A driver request was rejected before anything was cancelled.
    Validation(ValidationError),
    /// Frame source error during screen sync.
    Capture(CaptureError),
    /// Standard I/O error (file read/write, config persistence).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
    /// Color parsing error.
    Color(String),
}

impl fmt::Display for RobobloqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RobobloqError::Device(e) => write!(f, "{e}"),
            RobobloqError::Validation(e) => write!(f, "{e}"),
            RobobloqError::Capture(e) => write!(f, "{e}"),
            RobobloqError::Io(e) => write!(f, "I/O error: {e}"),
            RobobloqError::Config(e) => write!(f, "Config error: {e}"),
            RobobloqError::Color(e) => write!(f, "Color error: {e}"),
        }
    }
}

impl std::error::Error for RobobloqError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RobobloqError::Device(e) => Some(e),
            RobobloqError::Validation(e) => Some(e),
            RobobloqError::Capture(e) => Some(e),
            RobobloqError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for RobobloqError {
    fn from(e: DeviceError) -> Self {
        RobobloqError::Device(e)
    }
}

impl From<ValidationError> for RobobloqError {
    fn from(e: ValidationError) -> Self {
        RobobloqError::Validation(e)
    }
}

impl From<CaptureError> for RobobloqError {
    fn from(e: CaptureError) -> Self {
        RobobloqError::Capture(e)
    }
}

impl From<std::io::Error> for RobobloqError {
    fn from(e: std::io::Error) -> Self {
        RobobloqError::Io(e)
    }
}

/// Crate-level Result alias using [`RobobloqError`].
pub type Result<T> = std::result::Result<T, RobobloqError>;
