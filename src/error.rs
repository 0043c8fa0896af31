//! Unified error handling for the delta-tracker library.
//!
//! Location-subsystem failures have their own [`LocationError`] type because they
//! travel through the sample stream as values. Everything else is a [`DeltaError`].

use thiserror::Error;

/// Failure reported by a location source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The user (or platform) refused location access
    #[error("Location permission denied")]
    PermissionDenied,
    /// No fix could be obtained (no hardware, no signal, source gone)
    #[error("Location information unavailable")]
    PositionUnavailable,
    /// The request did not complete within the configured timeout
    #[error("Location request timeout")]
    Timeout,
}

/// Unified error type for delta-tracker operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeltaError {
    /// Location subsystem error
    #[error(transparent)]
    Location(#[from] LocationError),
    /// Persistence read/write error
    #[error("Storage error: {message}")]
    Storage { message: String },
    /// Invalid input or missing precondition
    #[error("Validation error: {message}")]
    Validation { message: String },
    /// JSON encoding/decoding error
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl DeltaError {
    pub fn storage(message: impl Into<String>) -> Self {
        DeltaError::Storage {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DeltaError::Validation {
            message: message.into(),
        }
    }

    /// Validation error for a record that does not exist.
    pub fn not_found(kind: &str, id: &str) -> Self {
        DeltaError::Validation {
            message: format!("{} '{}' not found", kind, id),
        }
    }
}

impl From<serde_json::Error> for DeltaError {
    fn from(e: serde_json::Error) -> Self {
        DeltaError::Serialization {
            message: e.to_string(),
        }
    }
}

/// Result type alias for delta-tracker operations.
pub type Result<T> = std::result::Result<T, DeltaError>;

/// Extension trait for converting Option to DeltaError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a validation error naming the missing record.
    fn ok_or_missing(self, kind: &str, id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing(self, kind: &str, id: &str) -> Result<T> {
        self.ok_or_else(|| DeltaError::not_found(kind, id))
    }
}
