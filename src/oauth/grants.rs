//! Grant-type handlers.
//!
//! Each flow implements the same four-stage contract: extract cache lookup
//! keys, validate flow invariants against the resolved tokens, build the new
//! token set, and write the standard response attributes. The flows are one
//! sum type dispatched on the request's grant type; response population is a
//! single shared routine.

use crate::errors::GrantError;
use crate::oauth::app_verifier::AppCredentialVerifier;
use crate::oauth::attributes::{names, AttributeBag, AttributeCategory};
use crate::oauth::token_factory::TokenFactory;
use crate::oauth::types::*;
use crate::storage::traits::TokenCache;
use std::sync::Arc;

/// Collaborators the validation stage reads from.
pub struct GrantContext {
    pub cache: Arc<dyn TokenCache>,
    pub verifier: Arc<dyn AppCredentialVerifier>,
    /// Cap on refresh-originated access tokens per (user, client)
    pub refresh_token_limit: usize,
}

/// One grant flow, selected from the request's `grant_type` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantHandler {
    AuthorizationCode,
    ClientCredentials,
    ResourceOwnerPassword,
    RefreshToken,
    AppCredential(AppCredentialKind),
}

impl GrantHandler {
    pub fn for_grant_type(grant_type: GrantType) -> Self {
        match grant_type {
            GrantType::AuthorizationCode => GrantHandler::AuthorizationCode,
            GrantType::ClientCredentials => GrantHandler::ClientCredentials,
            GrantType::Password => GrantHandler::ResourceOwnerPassword,
            GrantType::RefreshToken => GrantHandler::RefreshToken,
            GrantType::AppPassword => GrantHandler::AppCredential(AppCredentialKind::AppPassword),
            GrantType::AppToken => GrantHandler::AppCredential(AppCredentialKind::AppToken),
        }
    }

    /// Cache lookup keys for the tokens this flow must already possess.
    ///
    /// Empty for flows that start from nothing.
    pub fn cache_keys(&self, attrs: &AttributeBag) -> Result<Vec<String>, GrantError> {
        match self {
            GrantHandler::AuthorizationCode => {
                let code = attrs
                    .non_empty_body_param(names::CODE)
                    .ok_or_else(|| GrantError::MissingParameter(names::CODE.to_string()))?;
                Ok(vec![code.to_string()])
            }
            GrantHandler::RefreshToken => {
                let refresh = attrs
                    .non_empty_body_param(names::REFRESH_TOKEN)
                    .ok_or_else(|| GrantError::MissingParameter(names::REFRESH_TOKEN.to_string()))?;
                Ok(vec![refresh.to_string()])
            }
            GrantHandler::ClientCredentials
            | GrantHandler::ResourceOwnerPassword
            | GrantHandler::AppCredential(_) => Ok(Vec::new()),
        }
    }

    /// Enforce flow invariants. No token is ever minted for a request that
    /// fails here.
    pub async fn validate(
        &self,
        attrs: &mut AttributeBag,
        tokens: &[Token],
        ctx: &GrantContext,
    ) -> Result<(), GrantError> {
        match self {
            GrantHandler::AuthorizationCode => {
                let code = resolved_token(tokens, TokenKind::AuthorizationCode)?;
                let client_id = required_client_id(attrs)?;
                if code.client_id != client_id {
                    return Err(GrantError::InvalidClient(format!(
                        "authorization code was issued to another client: {}",
                        code.client_id
                    )));
                }
                // redirect_uri must be absent on both sides or equal on both
                let requested = attrs.non_empty_body_param(names::REDIRECT_URI);
                match (requested, code.redirect_uri.as_deref()) {
                    (None, None) => Ok(()),
                    (Some(a), Some(b)) if a == b => Ok(()),
                    (requested, bound) => Err(GrantError::MismatchedRedirectUri(format!(
                        "request '{}' does not match grant '{}'",
                        requested.unwrap_or("<absent>"),
                        bound.unwrap_or("<absent>")
                    ))),
                }
            }
            // client authentication happened upstream; nothing left to check
            GrantHandler::ClientCredentials => Ok(()),
            GrantHandler::ResourceOwnerPassword => {
                for name in [names::USERNAME, names::PASSWORD] {
                    if attrs.non_empty_body_param(name).is_none() {
                        return Err(GrantError::MissingParameter(name.to_string()));
                    }
                }
                Ok(())
            }
            GrantHandler::RefreshToken => {
                let refresh = resolved_token(tokens, TokenKind::Refresh)?;
                let client_id = required_client_id(attrs)?;
                if refresh.client_id != client_id {
                    return Err(GrantError::InvalidClient(format!(
                        "refresh token was issued to another client: {}",
                        refresh.client_id
                    )));
                }
                if let Some(requested) = attrs.non_empty_body_param(names::SCOPE) {
                    let requested = parse_scope(requested);
                    if !scope_sets_equal(&requested, &refresh.scope) {
                        return Err(GrantError::InvalidScope(format!(
                            "requested scope '{}' does not equal granted scope '{}'",
                            join_scope(&requested),
                            join_scope(&refresh.scope)
                        )));
                    }
                }
                check_refresh_limit(ctx, &refresh.username, client_id).await
            }
            GrantHandler::AppCredential(kind) => {
                let bearer = attrs
                    .non_empty_body_param(names::ACCESS_TOKEN)
                    .ok_or_else(|| GrantError::MissingParameter(names::ACCESS_TOKEN.to_string()))?;
                let verified = ctx
                    .verifier
                    .verify(bearer, *kind)
                    .await
                    .map_err(|e| GrantError::InvalidGrant(e.to_string()))?;
                attrs.set(
                    names::VERIFIED_SUBJECT,
                    AttributeCategory::ResponseState,
                    &verified.username,
                );
                Ok(())
            }
        }
    }

    /// Create and persist the token set for this flow, ordered access first.
    pub async fn build_tokens(
        &self,
        attrs: &AttributeBag,
        factory: &TokenFactory,
        tokens: &[Token],
    ) -> Result<Vec<Token>, GrantError> {
        match self {
            GrantHandler::AuthorizationCode => {
                let code = resolved_token(tokens, TokenKind::AuthorizationCode)?;
                let base = factory
                    .token_builder(&code.client_id, &code.username, GrantType::AuthorizationCode)
                    .state_id(&code.state_id)
                    .scope(&code.scope)
                    .redirect_uri(code.redirect_uri.as_deref())
                    .passthrough_from(attrs);

                let refresh = factory
                    .create_refresh_token(base.clone().extension(
                        extensions::ORIGINAL_GRANT_TYPE,
                        GrantType::AuthorizationCode.as_str(),
                    ))
                    .await?;
                let access =
                    paired_access_token(factory, base.extension(extensions::REFRESH_TOKEN_ID, &refresh.id), &refresh)
                        .await?;
                Ok(vec![access, refresh])
            }
            GrantHandler::ClientCredentials => {
                let client_id = required_client_id(attrs)?;
                let scope = requested_scope(attrs);
                let access = factory
                    .create_access_token(
                        factory
                            .token_builder(client_id, client_id, GrantType::ClientCredentials)
                            .scope(&scope)
                            .passthrough_from(attrs),
                    )
                    .await?;
                Ok(vec![access])
            }
            GrantHandler::ResourceOwnerPassword => {
                let client_id = required_client_id(attrs)?;
                let username = attrs
                    .non_empty_body_param(names::USERNAME)
                    .ok_or_else(|| GrantError::MissingParameter(names::USERNAME.to_string()))?;
                let scope = requested_scope(attrs);
                let base = factory
                    .token_builder(client_id, username, GrantType::Password)
                    .state_id(&generate_state_id())
                    .scope(&scope)
                    .passthrough_from(attrs);

                let refresh = factory
                    .create_refresh_token(base.clone().extension(
                        extensions::ORIGINAL_GRANT_TYPE,
                        GrantType::Password.as_str(),
                    ))
                    .await?;
                let access =
                    paired_access_token(factory, base.extension(extensions::REFRESH_TOKEN_ID, &refresh.id), &refresh)
                        .await?;
                Ok(vec![access, refresh])
            }
            GrantHandler::RefreshToken => {
                let old = resolved_token(tokens, TokenKind::Refresh)?;
                // validation already pinned the requested scope to the
                // original one; an omitted scope silently reuses it
                let granted = match attrs.non_empty_body_param(names::SCOPE) {
                    Some(requested) => parse_scope(requested),
                    None => old.scope.clone(),
                };
                let base = factory
                    .token_builder(&old.client_id, &old.username, GrantType::RefreshToken)
                    .state_id(&old.state_id)
                    .redirect_uri(old.redirect_uri.as_deref())
                    .passthrough_from(attrs);

                let refresh = factory
                    .create_refresh_token(base.clone().scope(&old.scope).extensions_from(old))
                    .await?;
                let access = paired_access_token(
                    factory,
                    base.scope(&granted)
                        .extension(extensions::REFRESH_TOKEN_ID, &refresh.id)
                        .extension(extensions::SUPERSEDED_REFRESH_TOKEN_ID, &old.id),
                    &refresh,
                )
                .await?;
                Ok(vec![access, refresh])
            }
            GrantHandler::AppCredential(kind) => {
                let client_id = required_client_id(attrs)?;
                let username = attrs
                    .first_in(names::VERIFIED_SUBJECT, AttributeCategory::ResponseState)
                    .ok_or_else(|| {
                        GrantError::Server("verified subject missing after validation".to_string())
                    })?
                    .to_string();
                let scope = requested_scope(attrs);
                let access = factory
                    .create_app_access_token(
                        factory
                            .token_builder(client_id, &username, kind.grant_type())
                            .scope(&scope)
                            .extension(extensions::APP_ID, &generate_app_id())
                            .passthrough_from(attrs),
                        *kind,
                    )
                    .await?;
                Ok(vec![access])
            }
        }
    }

    /// Write the standard response attributes from the built token set.
    pub fn build_response(&self, attrs: &mut AttributeBag, new_tokens: &[Token]) {
        let include_state = !matches!(self, GrantHandler::ClientCredentials);
        write_standard_response(attrs, new_tokens, include_state);
    }
}

/// Populate the standard response fields from the minted token pair.
///
/// Shared by every flow; a flow with no tokens produces no response
/// attributes rather than an error.
fn write_standard_response(attrs: &mut AttributeBag, tokens: &[Token], include_state: bool) {
    let Some(access) = tokens.first() else {
        return;
    };
    attrs.set(
        names::ACCESS_TOKEN,
        AttributeCategory::ResponseAttr,
        &access.token_string,
    );
    attrs.set(names::TOKEN_TYPE, AttributeCategory::ResponseAttr, "Bearer");
    attrs.set(
        names::EXPIRES_IN,
        AttributeCategory::ResponseAttr,
        &access.seconds_remaining().to_string(),
    );
    if !access.scope.is_empty() {
        attrs.set(
            names::SCOPE,
            AttributeCategory::ResponseAttr,
            &join_scope(&access.scope),
        );
    }
    if include_state {
        attrs.set(names::STATE, AttributeCategory::ResponseAttr, &access.state_id);
    }
    attrs.set(
        names::ACCESS_TOKEN_ID,
        AttributeCategory::ResponseMeta,
        &access.id,
    );
    if let Some(refresh) = tokens.get(1) {
        attrs.set(
            names::REFRESH_TOKEN,
            AttributeCategory::ResponseAttr,
            &refresh.token_string,
        );
        attrs.set(
            names::REFRESH_TOKEN_ID,
            AttributeCategory::ResponseMeta,
            &refresh.id,
        );
    }
}

/// Two-part refresh issuance gate.
///
/// A user's first refreshes are allowed while the overall (user, client)
/// token population is below the limit; once saturated, only the
/// refresh-originated access tokens are counted against it.
async fn check_refresh_limit(
    ctx: &GrantContext,
    username: &str,
    client_id: &str,
) -> Result<(), GrantError> {
    let tokens = ctx.cache.user_client_tokens(username, client_id).await?;
    if tokens.len() < ctx.refresh_token_limit {
        return Ok(());
    }
    let refreshed = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Access && t.grant_type == GrantType::RefreshToken)
        .count();
    if refreshed >= ctx.refresh_token_limit {
        tracing::debug!(
            username,
            client_id,
            refreshed,
            limit = ctx.refresh_token_limit,
            "refresh token limit reached"
        );
        return Err(GrantError::InvalidGrant(format!(
            "refresh token limit of {} reached",
            ctx.refresh_token_limit
        )));
    }
    Ok(())
}

/// Mint the access token paired with an already-persisted refresh token,
/// discarding the refresh token if the mint fails so a half-built pair is
/// never observable.
async fn paired_access_token(
    factory: &TokenFactory,
    builder: crate::oauth::token_factory::TokenBuilder,
    refresh: &Token,
) -> Result<Token, GrantError> {
    match factory.create_access_token(builder).await {
        Ok(access) => Ok(access),
        Err(err) => {
            factory.discard(refresh).await;
            Err(err.into())
        }
    }
}

fn resolved_token<'a>(tokens: &'a [Token], kind: TokenKind) -> Result<&'a Token, GrantError> {
    tokens
        .first()
        .filter(|t| t.kind == kind)
        .ok_or_else(|| GrantError::InvalidGrant("grant token could not be resolved".to_string()))
}

fn required_client_id(attrs: &AttributeBag) -> Result<&str, GrantError> {
    attrs
        .non_empty_body_param(names::CLIENT_ID)
        .ok_or_else(|| GrantError::MissingParameter(names::CLIENT_ID.to_string()))
}

fn requested_scope(attrs: &AttributeBag) -> Vec<String> {
    attrs
        .non_empty_body_param(names::SCOPE)
        .map(parse_scope)
        .unwrap_or_default()
}
