//! Token construction and persistence.
//!
//! The builder collects every protocol field for one token, is finalized
//! exactly once, and never leaks a mutable map across call boundaries. The
//! factory generates id, token string, and creation time per call, then
//! persists the token through the cache.

use crate::config::GrantConfig;
use crate::errors::StorageError;
use crate::oauth::attributes::{names, AttributeBag, AttributeCategory};
use crate::oauth::types::*;
use crate::storage::traits::TokenCache;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable blueprint for one token, finalized by the factory.
#[derive(Debug, Clone)]
pub struct TokenBuilder {
    client_id: String,
    username: String,
    grant_type: GrantType,
    redirect_uri: Option<String>,
    state_id: String,
    scope: Vec<String>,
    extensions: HashMap<String, Vec<String>>,
}

impl TokenBuilder {
    pub fn redirect_uri(mut self, redirect_uri: Option<&str>) -> Self {
        self.redirect_uri = redirect_uri.map(str::to_string);
        self
    }

    pub fn state_id(mut self, state_id: &str) -> Self {
        self.state_id = state_id.to_string();
        self
    }

    pub fn scope(mut self, scope: &[String]) -> Self {
        self.scope = scope.to_vec();
        self
    }

    /// Add a single-valued extension property.
    pub fn extension(mut self, name: &str, value: &str) -> Self {
        self.extensions
            .insert(name.to_string(), vec![value.to_string()]);
        self
    }

    /// Copy every extension property of a source token forward.
    pub fn extensions_from(mut self, source: &Token) -> Self {
        for (name, values) in &source.extensions {
            self.extensions.insert(name.clone(), values.clone());
        }
        self
    }

    /// Copy passthrough request fields verbatim: the proxy host and any
    /// externally supplied claim attributes. Other request parameters,
    /// including credentials, are ignored rather than rejected.
    pub fn passthrough_from(mut self, attrs: &AttributeBag) -> Self {
        for attr in attrs.in_category(AttributeCategory::BodyParam) {
            let relevant = attr.name == names::PROXY_HOST
                || attr.name.starts_with(names::EXTERNAL_CLAIM_PREFIX);
            if relevant && !attr.values.is_empty() {
                self.extensions.insert(attr.name.clone(), attr.values.clone());
            }
        }
        self
    }
}

/// Builds and persists tokens on behalf of the grant handlers.
pub struct TokenFactory {
    cache: Arc<dyn TokenCache>,
    config: GrantConfig,
}

impl TokenFactory {
    pub fn new(cache: Arc<dyn TokenCache>, config: GrantConfig) -> Self {
        Self { cache, config }
    }

    /// Start a blueprint prefilled with the protocol-required fields.
    pub fn token_builder(
        &self,
        client_id: &str,
        username: &str,
        grant_type: GrantType,
    ) -> TokenBuilder {
        TokenBuilder {
            client_id: client_id.to_string(),
            username: username.to_string(),
            grant_type,
            redirect_uri: None,
            state_id: generate_state_id(),
            scope: Vec::new(),
            extensions: HashMap::new(),
        }
    }

    /// Mint and persist an access token.
    pub async fn create_access_token(&self, builder: TokenBuilder) -> Result<Token, StorageError> {
        self.finalize(
            builder,
            TokenKind::Access,
            None,
            self.config.access_token_lifetime.seconds(),
        )
        .await
    }

    /// Mint and persist a refresh token.
    pub async fn create_refresh_token(&self, builder: TokenBuilder) -> Result<Token, StorageError> {
        self.finalize(
            builder,
            TokenKind::Refresh,
            None,
            self.config.refresh_token_lifetime.seconds(),
        )
        .await
    }

    /// Mint and persist an access token for the app-credential flows, with
    /// the lifetime selected by subtype.
    pub async fn create_app_access_token(
        &self,
        builder: TokenBuilder,
        kind: AppCredentialKind,
    ) -> Result<Token, StorageError> {
        let lifetime = match kind {
            AppCredentialKind::AppPassword => self.config.app_password_lifetime.seconds(),
            AppCredentialKind::AppToken => self.config.app_token_lifetime.seconds(),
        };
        self.finalize(builder, TokenKind::Access, Some(kind), lifetime)
            .await
    }

    /// Best-effort removal of an already-persisted token after a later step
    /// of the same request failed.
    pub async fn discard(&self, token: &Token) {
        if let Err(err) = self.cache.remove(&token.token_string).await {
            tracing::warn!(token_id = %token.id, error = %err, "failed to discard token");
        }
    }

    async fn finalize(
        &self,
        builder: TokenBuilder,
        kind: TokenKind,
        sub_kind: Option<AppCredentialKind>,
        lifetime_seconds: i64,
    ) -> Result<Token, StorageError> {
        let token = Token {
            id: generate_token_id(),
            token_string: generate_token_string(),
            kind,
            sub_kind,
            client_id: builder.client_id,
            username: builder.username,
            redirect_uri: builder.redirect_uri,
            scope: builder.scope,
            state_id: builder.state_id,
            grant_type: builder.grant_type,
            created_at: Utc::now(),
            lifetime_seconds,
            extensions: builder.extensions,
        };
        self.cache.put(&token).await?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::inmemory::MemoryTokenCache;

    fn factory() -> (Arc<MemoryTokenCache>, TokenFactory) {
        let cache = Arc::new(MemoryTokenCache::new());
        let factory = TokenFactory::new(cache.clone(), GrantConfig::default());
        (cache, factory)
    }

    #[tokio::test]
    async fn test_access_token_fields_and_persistence() {
        let (cache, factory) = factory();
        let builder = factory
            .token_builder("c1", "alice", GrantType::AuthorizationCode)
            .scope(&[String::from("read")])
            .redirect_uri(Some("https://cb"));

        let token = factory.create_access_token(builder).await.unwrap();
        assert_eq!(token.kind, TokenKind::Access);
        assert_eq!(token.lifetime_seconds, 3600);
        assert_eq!(token.redirect_uri.as_deref(), Some("https://cb"));

        let cached = cache.get(&token.token_string).await.unwrap().unwrap();
        assert_eq!(cached.id, token.id);
    }

    #[tokio::test]
    async fn test_fresh_identity_per_call() {
        let (_cache, factory) = factory();
        let builder = factory.token_builder("c1", "alice", GrantType::Password);

        let a = factory.create_access_token(builder.clone()).await.unwrap();
        let b = factory.create_access_token(builder).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.token_string, b.token_string);
    }

    #[tokio::test]
    async fn test_app_token_lifetime_selected_by_subtype() {
        let cache = Arc::new(MemoryTokenCache::new());
        let config = GrantConfig::with_lifetimes(60, 120, 1000, 2000, 5);
        let factory = TokenFactory::new(cache, config);

        let b = factory.token_builder("c1", "alice", GrantType::AppPassword);
        let pw = factory
            .create_app_access_token(b, AppCredentialKind::AppPassword)
            .await
            .unwrap();
        assert_eq!(pw.lifetime_seconds, 1000);
        assert_eq!(pw.sub_kind, Some(AppCredentialKind::AppPassword));

        let b = factory.token_builder("c1", "alice", GrantType::AppToken);
        let tok = factory
            .create_app_access_token(b, AppCredentialKind::AppToken)
            .await
            .unwrap();
        assert_eq!(tok.lifetime_seconds, 2000);
    }

    #[tokio::test]
    async fn test_passthrough_copies_only_relevant_fields() {
        let (_cache, factory) = factory();
        let mut attrs = AttributeBag::new();
        attrs.set(names::PROXY_HOST, AttributeCategory::BodyParam, "proxy.example");
        attrs.set(
            "external_claim:tenant",
            AttributeCategory::BodyParam,
            "acme",
        );
        attrs.set(names::PASSWORD, AttributeCategory::BodyParam, "hunter2");

        let builder = factory
            .token_builder("c1", "alice", GrantType::Password)
            .passthrough_from(&attrs);
        let token = factory.create_access_token(builder).await.unwrap();

        assert_eq!(token.extension(names::PROXY_HOST), Some("proxy.example"));
        assert_eq!(token.extension("external_claim:tenant"), Some("acme"));
        assert!(token.extension(names::PASSWORD).is_none());
    }

    #[tokio::test]
    async fn test_extensions_copied_forward() {
        let (_cache, factory) = factory();
        let source = factory
            .token_builder("c1", "alice", GrantType::Password)
            .extension(extensions::ORIGINAL_GRANT_TYPE, "password");
        let source = factory.create_refresh_token(source).await.unwrap();

        let rotated = factory
            .token_builder("c1", "alice", GrantType::RefreshToken)
            .extensions_from(&source);
        let rotated = factory.create_refresh_token(rotated).await.unwrap();
        assert_eq!(
            rotated.extension(extensions::ORIGINAL_GRANT_TYPE),
            Some("password")
        );
    }

    #[tokio::test]
    async fn test_discard_removes_persisted_token() {
        let (cache, factory) = factory();
        let builder = factory.token_builder("c1", "alice", GrantType::Password);
        let token = factory.create_access_token(builder).await.unwrap();

        factory.discard(&token).await;
        assert!(cache.get(&token.token_string).await.unwrap().is_none());
    }
}
