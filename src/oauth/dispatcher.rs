//! Per-request grant orchestration.
//!
//! Runs one token request through the stage sequence: extract cache keys,
//! resolve prerequisite tokens, validate, build tokens, build response. A
//! validation failure halts the request before any token is minted.

use crate::config::GrantConfig;
use crate::errors::GrantError;
use crate::oauth::app_verifier::AppCredentialVerifier;
use crate::oauth::attributes::{names, AttributeBag, AttributeCategory};
use crate::oauth::grants::{GrantContext, GrantHandler};
use crate::oauth::token_factory::TokenFactory;
use crate::oauth::types::{GrantType, Token};
use crate::storage::traits::TokenCache;
use serde_json::{json, Value};
use std::sync::Arc;

/// Result of a successfully processed token request.
#[derive(Debug)]
pub struct GrantOutcome {
    /// Newly minted tokens, access first
    pub tokens: Vec<Token>,
    /// Prerequisite tokens the grant consumed (authorization code, superseded
    /// refresh token). Both remain resolvable in the cache; invalidating them
    /// is the caller's decision.
    pub superseded: Vec<Token>,
}

/// Orchestrates grant processing for inbound token requests.
///
/// The dispatcher holds no request-scoped state; concurrent requests are safe
/// at this level and share only the token cache.
pub struct GrantDispatcher {
    cache: Arc<dyn TokenCache>,
    factory: TokenFactory,
    ctx: GrantContext,
}

impl GrantDispatcher {
    pub fn new(
        cache: Arc<dyn TokenCache>,
        verifier: Arc<dyn AppCredentialVerifier>,
        config: GrantConfig,
    ) -> Self {
        let factory = TokenFactory::new(cache.clone(), config.clone());
        let ctx = GrantContext {
            cache: cache.clone(),
            verifier,
            refresh_token_limit: config.refresh_token_limit,
        };
        Self {
            cache,
            factory,
            ctx,
        }
    }

    /// Process one client-authenticated token request.
    ///
    /// On success the bag carries the response attributes and the outcome the
    /// minted and consumed tokens. On failure no token has been minted.
    pub async fn process_token_request(
        &self,
        attrs: &mut AttributeBag,
    ) -> Result<GrantOutcome, GrantError> {
        let grant_type_param = attrs
            .non_empty_body_param(names::GRANT_TYPE)
            .ok_or_else(|| GrantError::MissingParameter(names::GRANT_TYPE.to_string()))?;
        let grant_type = GrantType::from_wire(grant_type_param).ok_or_else(|| {
            GrantError::UnsupportedGrantType(grant_type_param.to_string())
        })?;
        let handler = GrantHandler::for_grant_type(grant_type);

        let client_id = attrs
            .non_empty_body_param(names::CLIENT_ID)
            .ok_or_else(|| GrantError::MissingParameter(names::CLIENT_ID.to_string()))?
            .to_string();
        tracing::debug!(
            grant_type = grant_type.as_str(),
            client_id = %client_id,
            "token request received"
        );

        let keys = handler.cache_keys(attrs)?;
        let mut resolved: Vec<Token> = Vec::with_capacity(keys.len());
        for key in &keys {
            let token = self.cache.get(key).await?.ok_or_else(|| {
                GrantError::InvalidGrant("grant token is unknown or expired".to_string())
            })?;
            resolved.push(token);
        }

        if let Err(err) = handler.validate(attrs, &resolved, &self.ctx).await {
            tracing::debug!(
                grant_type = grant_type.as_str(),
                client_id = %client_id,
                error = %err,
                "token request rejected"
            );
            return Err(err);
        }

        let new_tokens = handler.build_tokens(attrs, &self.factory, &resolved).await?;
        handler.build_response(attrs, &new_tokens);

        tracing::info!(
            grant_type = grant_type.as_str(),
            client_id = %client_id,
            minted = new_tokens.len(),
            "token request granted"
        );
        Ok(GrantOutcome {
            tokens: new_tokens,
            superseded: resolved,
        })
    }

    /// Render the response-attribute category of the bag as the JSON token
    /// response body.
    pub fn response_body(attrs: &AttributeBag) -> Value {
        let mut body = serde_json::Map::new();
        for attr in attrs.in_category(AttributeCategory::ResponseAttr) {
            let value = match attr.values.as_slice() {
                [single] => {
                    if attr.name == names::EXPIRES_IN {
                        single
                            .parse::<i64>()
                            .map(Value::from)
                            .unwrap_or_else(|_| Value::from(single.clone()))
                    } else {
                        Value::from(single.clone())
                    }
                }
                many => Value::from(many.to_vec()),
            };
            body.insert(attr.name.clone(), value);
        }
        Value::Object(body)
    }

    /// Render a typed failure as the RFC 6749 error body.
    pub fn error_body(err: &GrantError) -> Value {
        json!({
            "error": err.wire_code(),
            "error_description": err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::app_verifier::{VerifiedAppCredential, VerifierError};
    use crate::oauth::types::*;
    use crate::storage::inmemory::MemoryTokenCache;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    struct StaticVerifier;

    #[async_trait]
    impl AppCredentialVerifier for StaticVerifier {
        async fn verify(
            &self,
            token_string: &str,
            _kind: AppCredentialKind,
        ) -> Result<VerifiedAppCredential, VerifierError> {
            if token_string == "good-bearer" {
                Ok(VerifiedAppCredential {
                    username: "alice".to_string(),
                })
            } else {
                Err(VerifierError::Rejected("unknown credential".to_string()))
            }
        }
    }

    fn dispatcher() -> (Arc<MemoryTokenCache>, GrantDispatcher) {
        let cache = Arc::new(MemoryTokenCache::new());
        let dispatcher = GrantDispatcher::new(
            cache.clone(),
            Arc::new(StaticVerifier),
            GrantConfig::default(),
        );
        (cache, dispatcher)
    }

    fn seeded_code(client_id: &str, redirect_uri: Option<&str>, scope: &[&str]) -> Token {
        Token {
            id: generate_token_id(),
            token_string: generate_token_string(),
            kind: TokenKind::AuthorizationCode,
            sub_kind: None,
            client_id: client_id.to_string(),
            username: "alice".to_string(),
            redirect_uri: redirect_uri.map(str::to_string),
            scope: scope.iter().map(|s| s.to_string()).collect(),
            state_id: generate_state_id(),
            grant_type: GrantType::AuthorizationCode,
            created_at: Utc::now(),
            lifetime_seconds: 600,
            extensions: HashMap::new(),
        }
    }

    fn request(grant_type: &str, client_id: &str) -> AttributeBag {
        let mut attrs = AttributeBag::new();
        attrs.set(names::GRANT_TYPE, AttributeCategory::BodyParam, grant_type);
        attrs.set(names::CLIENT_ID, AttributeCategory::BodyParam, client_id);
        attrs
    }

    #[tokio::test]
    async fn test_code_exchange_end_to_end() {
        let (cache, dispatcher) = dispatcher();
        let code = seeded_code("c1", Some("https://cb"), &["read"]);
        cache.put(&code).await.unwrap();

        let mut attrs = request("authorization_code", "c1");
        attrs.set(names::CODE, AttributeCategory::BodyParam, &code.token_string);
        attrs.set(names::REDIRECT_URI, AttributeCategory::BodyParam, "https://cb");

        let outcome = dispatcher.process_token_request(&mut attrs).await.unwrap();
        assert_eq!(outcome.tokens.len(), 2);
        assert_eq!(outcome.superseded.len(), 1);
        assert_eq!(outcome.superseded[0].id, code.id);

        let body = GrantDispatcher::response_body(&attrs);
        assert_eq!(
            body["access_token"].as_str(),
            Some(outcome.tokens[0].token_string.as_str())
        );
        assert_eq!(body["token_type"].as_str(), Some("Bearer"));
        assert!(body["expires_in"].is_i64());
        assert_eq!(body["scope"].as_str(), Some("read"));

        // consumed code is still resolvable until the caller removes it
        assert!(cache.get(&code.token_string).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_code_is_invalid_grant() {
        let (_cache, dispatcher) = dispatcher();
        let mut attrs = request("authorization_code", "c1");
        attrs.set(names::CODE, AttributeCategory::BodyParam, "no-such-code");

        let err = dispatcher.process_token_request(&mut attrs).await.unwrap_err();
        assert!(matches!(err, GrantError::InvalidGrant(_)));
        assert_eq!(err.wire_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_validation_failure_mints_nothing() {
        let (cache, dispatcher) = dispatcher();
        let code = seeded_code("c1", Some("https://cb"), &["read"]);
        cache.put(&code).await.unwrap();

        let mut attrs = request("authorization_code", "c1");
        attrs.set(names::CODE, AttributeCategory::BodyParam, &code.token_string);
        attrs.set(names::REDIRECT_URI, AttributeCategory::BodyParam, "https://other");

        let err = dispatcher.process_token_request(&mut attrs).await.unwrap_err();
        assert!(matches!(err, GrantError::MismatchedRedirectUri(_)));

        // only the seeded code remains
        let all = cache.user_client_tokens("alice", "c1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(attrs
            .first_in(names::ACCESS_TOKEN, AttributeCategory::ResponseAttr)
            .is_none());
    }

    #[tokio::test]
    async fn test_unsupported_grant_type() {
        let (_cache, dispatcher) = dispatcher();
        let mut attrs = request("implicit", "c1");

        let err = dispatcher.process_token_request(&mut attrs).await.unwrap_err();
        assert!(matches!(err, GrantError::UnsupportedGrantType(_)));
        assert_eq!(err.wire_code(), "unsupported_grant_type");

        let body = GrantDispatcher::error_body(&err);
        assert_eq!(body["error"].as_str(), Some("unsupported_grant_type"));
        assert!(body["error_description"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_missing_grant_type_and_client_id() {
        let (_cache, dispatcher) = dispatcher();

        let mut attrs = AttributeBag::new();
        let err = dispatcher.process_token_request(&mut attrs).await.unwrap_err();
        assert!(matches!(err, GrantError::MissingParameter(ref n) if n == "grant_type"));

        let mut attrs = AttributeBag::new();
        attrs.set(names::GRANT_TYPE, AttributeCategory::BodyParam, "password");
        let err = dispatcher.process_token_request(&mut attrs).await.unwrap_err();
        assert!(matches!(err, GrantError::MissingParameter(ref n) if n == "client_id"));
        assert_eq!(err.wire_code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_app_token_grant_via_dispatcher() {
        let (_cache, dispatcher) = dispatcher();
        let mut attrs = request("app_token", "c1");
        attrs.set(names::ACCESS_TOKEN, AttributeCategory::BodyParam, "good-bearer");

        let outcome = dispatcher.process_token_request(&mut attrs).await.unwrap();
        assert_eq!(outcome.tokens.len(), 1);
        assert_eq!(
            outcome.tokens[0].sub_kind,
            Some(AppCredentialKind::AppToken)
        );

        let body = GrantDispatcher::response_body(&attrs);
        assert!(body.get("refresh_token").is_none());
    }

    #[tokio::test]
    async fn test_rejected_app_bearer_is_invalid_grant() {
        let (_cache, dispatcher) = dispatcher();
        let mut attrs = request("app_password", "c1");
        attrs.set(names::ACCESS_TOKEN, AttributeCategory::BodyParam, "bad-bearer");

        let err = dispatcher.process_token_request(&mut attrs).await.unwrap_err();
        assert_eq!(err.wire_code(), "invalid_grant");
    }
}
