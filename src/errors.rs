//! Standardized error types following the `error-tokenmill-<domain>-<number>` format.

use thiserror::Error;

/// Configuration errors that occur while reading engine settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-tokenmill-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when a duration string cannot be parsed
    #[error("error-tokenmill-config-2 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when an integer setting cannot be parsed
    #[error("error-tokenmill-config-3 Failed to parse '{0}' as an integer: {1}")]
    IntParsingFailed(String, std::num::ParseIntError),
}

/// Grant processing failures raised by the grant-type handlers.
///
/// Handlers raise these and never suppress them; the dispatcher halts the
/// request at the failing stage. Mapping to a wire-level `error` code is done
/// by [`GrantError::wire_code`], not by the handlers.
#[derive(Debug, Error)]
pub enum GrantError {
    /// Required body parameter absent or empty
    #[error("error-tokenmill-grant-1 Missing required parameter: {0}")]
    MissingParameter(String),

    /// client_id on the request does not match the client bound to the grant
    #[error("error-tokenmill-grant-2 Client does not match grant: {0}")]
    InvalidClient(String),

    /// redirect_uri present/absent inconsistency between request and grant
    #[error("error-tokenmill-grant-3 Redirect URI mismatch: {0}")]
    MismatchedRedirectUri(String),

    /// Requested scope does not equal the originally granted scope
    #[error("error-tokenmill-grant-4 Invalid scope: {0}")]
    InvalidScope(String),

    /// Expired/unknown/unverifiable grant, or refresh limit reached
    #[error("error-tokenmill-grant-5 Invalid grant: {0}")]
    InvalidGrant(String),

    /// grant_type value names no known flow
    #[error("error-tokenmill-grant-6 Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Infrastructure failure (token cache, factory)
    #[error("error-tokenmill-grant-7 Server error: {0}")]
    Server(String),
}

impl GrantError {
    /// RFC 6749 `error` code for the wire-level error response.
    pub fn wire_code(&self) -> &'static str {
        match self {
            GrantError::MissingParameter(_) => "invalid_request",
            GrantError::InvalidClient(_) => "invalid_client",
            GrantError::MismatchedRedirectUri(_) => "invalid_grant",
            GrantError::InvalidScope(_) => "invalid_scope",
            GrantError::InvalidGrant(_) => "invalid_grant",
            GrantError::UnsupportedGrantType(_) => "unsupported_grant_type",
            GrantError::Server(_) => "server_error",
        }
    }
}

/// Token cache and storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when a cache or store operation fails
    #[error("error-tokenmill-storage-1 Cache operation failed: {0}")]
    OperationFailed(String),

    /// Error when data validation fails
    #[error("error-tokenmill-storage-2 Invalid data: {0}")]
    InvalidData(String),
}

impl From<StorageError> for GrantError {
    fn from(err: StorageError) -> Self {
        GrantError::Server(err.to_string())
    }
}
