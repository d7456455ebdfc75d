//! Error types for the light client.
//!
//! Two layers of failure exist in this crate:
//!
//! - [`FramingError`]: a datagram (or one of its payloads) could not be
//!   decoded. These are expected on a broadcast medium and are logged and
//!   dropped by the dispatcher rather than surfaced to callers.
//! - [`LightError`]: resource-level failures — the socket could not be
//!   opened, a send failed, or the session was already closed. These are
//!   returned to the caller of the operation that hit them.
//!
//! ```rust
//! use glowlink::LightError;
//!
//! let err = LightError::Closed;
//! assert!(!err.is_retryable());
//! ```

use std::io;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T, E = LightError> = std::result::Result<T, E>;

/// Main error type for client operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LightError {
    #[error("Socket operation failed: {context}")]
    Socket {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Session is closed")]
    Closed,

    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// Decode failure for an inbound datagram or payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FramingError {
    #[error("Datagram too short: {len} bytes, header needs {minimum}")]
    Truncated { len: usize, minimum: usize },

    #[error("Declared size {declared} does not match buffer length {actual}")]
    SizeMismatch { declared: u16, actual: usize },

    #[error("{message} payload too short: expected {expected} bytes, got {actual}")]
    PayloadTooShort { message: &'static str, expected: usize, actual: usize },
}

impl LightError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Socket send failures may be transient; a closed session and framing
    /// failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LightError::Socket { .. } => true,
            LightError::Closed => false,
            LightError::Framing(_) => false,
        }
    }

    /// Helper constructor for socket errors with operation context.
    pub fn socket(context: impl Into<String>, source: io::Error) -> Self {
        LightError::Socket { context: context.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_traits_validation() {
        // Compile-time check: LightError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<LightError>();

        let error = LightError::Closed;
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retryable_classification() {
        let send_err =
            LightError::socket("send", io::Error::new(io::ErrorKind::Other, "down"));
        assert!(send_err.is_retryable());
        assert!(!LightError::Closed.is_retryable());

        let framing: LightError = FramingError::Truncated { len: 4, minimum: 36 }.into();
        assert!(!framing.is_retryable());
    }

    #[test]
    fn framing_messages_carry_context() {
        let err = FramingError::SizeMismatch { declared: 52, actual: 36 };
        let msg = err.to_string();
        assert!(msg.contains("52"));
        assert!(msg.contains("36"));
    }
}
