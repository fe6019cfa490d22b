//! Core token types and data structures.
//!
//! Defines the issued-credential record, grant-type and token-kind enums, and
//! the scope and identifier helpers shared by the grant handlers.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// OAuth 2.0 grant types, including the app-credential provider extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    Password,
    RefreshToken,
    AppPassword,
    AppToken,
}

impl GrantType {
    /// Parse the `grant_type` request parameter.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(GrantType::AuthorizationCode),
            "client_credentials" => Some(GrantType::ClientCredentials),
            "password" => Some(GrantType::Password),
            "refresh_token" => Some(GrantType::RefreshToken),
            "app_password" => Some(GrantType::AppPassword),
            "app_token" => Some(GrantType::AppToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
            GrantType::AppPassword => "app_password",
            GrantType::AppToken => "app_token",
        }
    }
}

/// Kind of issued credential.
///
/// The engine mints `Access` and `Refresh` tokens and consumes
/// `AuthorizationCode` grants. `AppPassword` and `AppToken` are long-lived
/// credential records the embedding server stores in the same cache; the app
/// flows verify their bearer strings through the [`AppCredentialVerifier`]
/// rather than by cache lookup.
///
/// [`AppCredentialVerifier`]: crate::oauth::app_verifier::AppCredentialVerifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    AuthorizationCode,
    AppPassword,
    AppToken,
}

/// App-credential subtypes for access tokens minted by the app flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppCredentialKind {
    AppPassword,
    AppToken,
}

impl AppCredentialKind {
    pub fn grant_type(&self) -> GrantType {
        match self {
            AppCredentialKind::AppPassword => GrantType::AppPassword,
            AppCredentialKind::AppToken => GrantType::AppToken,
        }
    }
}

/// Extension property names carried on tokens for audit linkage
pub mod extensions {
    /// Grant type of the flow that originally established the authorization
    pub const ORIGINAL_GRANT_TYPE: &str = "original_grant_type";
    /// Id of the refresh token paired with an access token
    pub const REFRESH_TOKEN_ID: &str = "refresh_token_id";
    /// Id of the refresh token a rotation superseded
    pub const SUPERSEDED_REFRESH_TOKEN_ID: &str = "superseded_refresh_token_id";
    /// Opaque id minted for app-credential access tokens
    pub const APP_ID: &str = "app_id";
}

/// One issued credential.
///
/// Tokens are created exactly once by the factory at grant time and are
/// read-only afterwards. Expiry and revocation are the cache owner's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Globally unique, opaque token id
    pub id: String,
    /// Opaque serialized form handed to the client
    pub token_string: String,
    /// Kind of credential
    pub kind: TokenKind,
    /// App-credential subtype, for access tokens minted by the app flows
    pub sub_kind: Option<AppCredentialKind>,
    /// Client the token is bound to
    pub client_id: String,
    /// Resource owner; equals the client id for client_credentials tokens
    pub username: String,
    /// Redirect URI bound at authorization time
    pub redirect_uri: Option<String>,
    /// Granted scope, order preserved
    pub scope: Vec<String>,
    /// Correlates all tokens issued from one authorization event
    pub state_id: String,
    /// Flow that minted this token
    pub grant_type: GrantType,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds from creation
    pub lifetime_seconds: i64,
    /// Named multi-valued extension properties (audit linkage, passthrough)
    pub extensions: HashMap<String, Vec<String>>,
}

impl Token {
    /// Effective expiry: `created_at + lifetime_seconds`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::seconds(self.lifetime_seconds)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at() <= Utc::now()
    }

    /// Seconds remaining before expiry, clamped at zero.
    pub fn seconds_remaining(&self) -> i64 {
        (self.expires_at() - Utc::now()).num_seconds().max(0)
    }

    /// Creation time as epoch milliseconds.
    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    /// First value of a named extension property.
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Generate a secure random token string
pub fn generate_token_string() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a unique token id
pub fn generate_token_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Generate a state id correlating tokens from one authorization event
pub fn generate_state_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate the opaque `app_id` extension value for app-credential tokens
pub fn generate_app_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parse a scope parameter into an ordered, de-duplicated list.
///
/// Accepts space- or comma-delimited values.
pub fn parse_scope(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for part in scope.split([' ', ',']) {
        let part = part.trim();
        if !part.is_empty() && !scopes.iter().any(|s| s == part) {
            scopes.push(part.to_string());
        }
    }
    scopes
}

/// Join a scope list into the space-separated response form
pub fn join_scope(scope: &[String]) -> String {
    scope.join(" ")
}

/// Order-insensitive scope equality, used by the refresh-grant scope check
pub fn scope_sets_equal(a: &[String], b: &[String]) -> bool {
    let mut a_sorted: Vec<&String> = a.iter().collect();
    let mut b_sorted: Vec<&String> = b.iter().collect();
    a_sorted.sort();
    b_sorted.sort();
    a_sorted == b_sorted
}
