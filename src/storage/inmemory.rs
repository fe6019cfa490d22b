//! In-memory token cache implementation.
//!
//! Suitable for tests and single-process deployments. Expired entries are
//! evicted lazily on read; a sweep is available for periodic cleanup.

use crate::errors::StorageError;
use crate::oauth::types::Token;
use crate::storage::traits::{Result, TokenCache};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory token cache keyed by token string
#[derive(Default)]
pub struct MemoryTokenCache {
    tokens: Mutex<HashMap<String, Token>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let mut tokens = lock(&self.tokens)?;
        let initial_count = tokens.len();
        tokens.retain(|_, token| !token.is_expired());
        Ok(initial_count - tokens.len())
    }
}

fn lock(tokens: &Mutex<HashMap<String, Token>>) -> Result<std::sync::MutexGuard<'_, HashMap<String, Token>>> {
    tokens
        .lock()
        .map_err(|e| StorageError::OperationFailed(format!("Lock error: {}", e)))
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self, key: &str) -> Result<Option<Token>> {
        let mut tokens = lock(&self.tokens)?;
        if let Some(token) = tokens.get(key) {
            if token.is_expired() {
                tokens.remove(key);
                return Ok(None);
            }
            Ok(Some(token.clone()))
        } else {
            Ok(None)
        }
    }

    async fn put(&self, token: &Token) -> Result<()> {
        let mut tokens = lock(&self.tokens)?;
        tokens.insert(token.token_string.clone(), token.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut tokens = lock(&self.tokens)?;
        tokens.remove(key);
        Ok(())
    }

    async fn user_client_tokens(&self, username: &str, client_id: &str) -> Result<Vec<Token>> {
        let tokens = lock(&self.tokens)?;
        Ok(tokens
            .values()
            .filter(|t| t.username == username && t.client_id == client_id && !t.is_expired())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::types::*;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    fn token(username: &str, client_id: &str, lifetime: i64) -> Token {
        Token {
            id: generate_token_id(),
            token_string: generate_token_string(),
            kind: TokenKind::Access,
            sub_kind: None,
            client_id: client_id.to_string(),
            username: username.to_string(),
            redirect_uri: None,
            scope: vec!["read".to_string()],
            state_id: generate_state_id(),
            grant_type: GrantType::AuthorizationCode,
            created_at: Utc::now(),
            lifetime_seconds: lifetime,
            extensions: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let cache = MemoryTokenCache::new();
        let t = token("alice", "c1", 3600);

        cache.put(&t).await.unwrap();
        let fetched = cache.get(&t.token_string).await.unwrap().unwrap();
        assert_eq!(fetched.id, t.id);

        cache.remove(&t.token_string).await.unwrap();
        assert!(cache.get(&t.token_string).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_tokens_are_absent() {
        let cache = MemoryTokenCache::new();
        let mut t = token("alice", "c1", 5);
        t.created_at = Utc::now() - Duration::seconds(10);

        cache.put(&t).await.unwrap();
        assert!(cache.get(&t.token_string).await.unwrap().is_none());
        // lazy eviction removed the entry
        assert_eq!(cache.cleanup_expired().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_user_client_enumeration_filters_live_tokens() {
        let cache = MemoryTokenCache::new();
        cache.put(&token("alice", "c1", 3600)).await.unwrap();
        cache.put(&token("alice", "c1", 3600)).await.unwrap();
        cache.put(&token("alice", "c2", 3600)).await.unwrap();
        cache.put(&token("bob", "c1", 3600)).await.unwrap();

        let mut expired = token("alice", "c1", 5);
        expired.created_at = Utc::now() - Duration::seconds(10);
        cache.put(&expired).await.unwrap();

        let live = cache.user_client_tokens("alice", "c1").await.unwrap();
        assert_eq!(live.len(), 2);
    }

    #[tokio::test]
    async fn test_app_credential_records_share_the_cache() {
        // the embedding server stores long-lived app credentials alongside
        // the minted tokens
        let cache = MemoryTokenCache::new();
        let mut record = token("alice", "c1", 90 * 86400);
        record.kind = TokenKind::AppPassword;
        cache.put(&record).await.unwrap();

        let fetched = cache.get(&record.token_string).await.unwrap().unwrap();
        assert_eq!(fetched.kind, TokenKind::AppPassword);

        let mut record = token("alice", "c1", 90 * 86400);
        record.kind = TokenKind::AppToken;
        cache.put(&record).await.unwrap();

        let live = cache.user_client_tokens("alice", "c1").await.unwrap();
        assert_eq!(live.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_expired_sweep() {
        let cache = MemoryTokenCache::new();
        cache.put(&token("alice", "c1", 3600)).await.unwrap();
        let mut expired = token("alice", "c1", 5);
        expired.created_at = Utc::now() - Duration::seconds(10);
        cache.put(&expired).await.unwrap();

        assert_eq!(cache.cleanup_expired().unwrap(), 1);
    }
}
