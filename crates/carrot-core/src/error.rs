//! Caller-facing error taxonomy.
//!
//! Argument errors fail fast, before any persistence or network I/O. All
//! network and server-side failures are reported as [`Response`] values at the
//! dispatcher boundary instead of errors; only transport setup problems and
//! malformed arguments surface here.
//!
//! [`Response`]: crate::auth::Response

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to callers of the session API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CarrotError {
    /// A required argument was missing or malformed.
    #[error("invalid argument `{field}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// No user id has been assigned to the session.
    #[error("user id is empty; assign a user id before making calls")]
    MissingUserId,

    /// The HTTP transport could not be initialized.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CarrotError {
    /// Shorthand for an empty required field.
    pub(crate) fn empty_field(field: &str) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            reason: "must not be empty".to_string(),
        }
    }
}

/// Rejects empty or whitespace-only required string arguments.
pub(crate) fn require_field(field: &str, value: &str) -> Result<(), CarrotError> {
    if value.trim().is_empty() {
        return Err(CarrotError::empty_field(field));
    }
    Ok(())
}
