//! Error types shared by every pipeline component.
//!
//! The front door never panics: every fallible operation returns
//! [`Result`] and sink-level failures are converted to one of these kinds
//! at the nearest decorator boundary.

use std::fmt;
use std::io;

/// Error kinds surfaced by the pipeline.
#[derive(Debug)]
pub enum Error {
    /// Malformed configuration: non-positive capacity, missing WAL path,
    /// zero batch size and similar construction-time mistakes.
    InvalidArgument(String),
    /// A non-blocking overflow policy rejected a record.
    QueueFull,
    /// A write or flush observed the queue during or after shutdown.
    QueueStopped,
    /// The underlying sink failed a write or flush.
    Io(io::Error),
    /// A file rename/create failed during rotation.
    RotationFailed(String),
    /// A cryptographic operation could not complete.
    EncryptionFailed(String),
    /// A path validator rejected a candidate file path.
    PathTraversal(String),
    /// The filesystem rejected the operation.
    PermissionDenied(String),
    /// A formatter failed; the record was replaced by sentinel bytes.
    Format(String),
    /// The operation required a running logger.
    NotRunning,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(detail) => write!(f, "invalid argument: {}", detail),
            Error::QueueFull => write!(f, "queue full: record rejected by overflow policy"),
            Error::QueueStopped => write!(f, "queue stopped: writer is shutting down"),
            Error::Io(err) => write!(f, "i/o error: {}", err),
            Error::RotationFailed(detail) => write!(f, "rotation failed: {}", detail),
            Error::EncryptionFailed(detail) => write!(f, "encryption failed: {}", detail),
            Error::PathTraversal(detail) => write!(f, "path traversal rejected: {}", detail),
            Error::PermissionDenied(detail) => write!(f, "permission denied: {}", detail),
            Error::Format(detail) => write!(f, "format error: {}", detail),
            Error::NotRunning => write!(f, "logger is not running"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    /// Classify an OS error: permission failures get their own kind, the
    /// rest stay as `Io`.
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            Error::PermissionDenied(err.to_string())
        } else {
            Error::Io(err)
        }
    }
}

/// Convenient result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
