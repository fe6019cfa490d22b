//! Delegated verifier for app-password and app-token bearer strings.

use crate::oauth::types::AppCredentialKind;
use async_trait::async_trait;
use thiserror::Error;

/// Verifier rejection; surfaced to clients as an invalid grant
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("error-tokenmill-verifier-1 Credential rejected: {0}")]
    Rejected(String),

    #[error("error-tokenmill-verifier-2 Verifier unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a successful bearer-string verification
#[derive(Debug, Clone)]
pub struct VerifiedAppCredential {
    /// Resource owner the credential belongs to
    pub username: String,
}

/// External check for the bearer string presented to the app_password and
/// app_token flows. Timeout and retry policy belong to the implementation.
#[async_trait]
pub trait AppCredentialVerifier: Send + Sync {
    async fn verify(
        &self,
        token_string: &str,
        kind: AppCredentialKind,
    ) -> Result<VerifiedAppCredential, VerifierError>;
}

/// Verifier for deployments with the app flows disabled; rejects everything.
pub struct DenyAllVerifier;

#[async_trait]
impl AppCredentialVerifier for DenyAllVerifier {
    async fn verify(
        &self,
        _token_string: &str,
        _kind: AppCredentialKind,
    ) -> Result<VerifiedAppCredential, VerifierError> {
        Err(VerifierError::Rejected(
            "app credential flows are not enabled".to_string(),
        ))
    }
}
