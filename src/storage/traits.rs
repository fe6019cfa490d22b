//! Token cache trait consumed by the grant engine.

use crate::errors::StorageError;
use crate::oauth::types::Token;
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Key/value token cache plus the per-(user, client) enumeration used by the
/// refresh-limit accounting.
///
/// `get`/`put`/`remove` must each be individually atomic. The enumeration
/// followed by a decision and a later `put` is deliberately not transactional:
/// concurrent refresh requests for the same user and client may both observe a
/// sub-limit count and both succeed, slightly exceeding the configured limit.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Look up a token by its lookup key (the opaque token string).
    ///
    /// Expired tokens are treated as absent.
    async fn get(&self, key: &str) -> Result<Option<Token>>;

    /// Store a token under its lookup key.
    async fn put(&self, token: &Token) -> Result<()>;

    /// Remove a token by its lookup key.
    async fn remove(&self, key: &str) -> Result<()>;

    /// All currently-live tokens for a (username, client_id) pair.
    async fn user_client_tokens(&self, username: &str, client_id: &str) -> Result<Vec<Token>>;
}
