//! Error types for the Coastal services.

use thiserror::Error;

/// Result type alias using the Coastal error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Coastal services.
///
/// Display text for the 4xx variants is the exact message returned to the
/// client, so those carry no prefix.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid admin credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Invalid input or request
    #[error("{0}")]
    InvalidInput(String),

    /// External service error (LLM, weather, traffic)
    #[error("External service error: {0}")]
    External(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::InvalidInput(_) => 400,
            Self::External(_) => 502,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::Unauthorized("test".into()).status_code(), 401);
        assert_eq!(Error::InvalidInput("test".into()).status_code(), 400);
        assert_eq!(Error::External("test".into()).status_code(), 502);
        assert_eq!(Error::Internal("test".into()).status_code(), 500);
    }

    #[test]
    fn test_client_facing_messages_are_bare() {
        assert_eq!(
            Error::InvalidInput("Message is required".into()).to_string(),
            "Message is required"
        );
        assert_eq!(
            Error::Unauthorized("Unauthorized".into()).to_string(),
            "Unauthorized"
        );
        assert_eq!(
            Error::External("timeout".into()).to_string(),
            "External service error: timeout"
        );
    }
}
