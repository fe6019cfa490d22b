//! OAuth 2.0 grant processing: attribute bag, token factory, grant handlers,
//! and the per-request dispatcher.

pub mod app_verifier;
pub mod attributes;
pub mod dispatcher;
pub mod grants;
pub mod token_factory;
pub mod types;


// Re-export frequently used items from each module
pub use crate::storage::{MemoryTokenCache, TokenCache};
pub use app_verifier::{AppCredentialVerifier, DenyAllVerifier, VerifiedAppCredential, VerifierError};
pub use attributes::{names, Attribute, AttributeBag, AttributeCategory};
pub use dispatcher::{GrantDispatcher, GrantOutcome};
pub use grants::{GrantContext, GrantHandler};
pub use token_factory::{TokenBuilder, TokenFactory};
pub use types::{
    extensions, generate_state_id, generate_token_id, generate_token_string, join_scope,
    parse_scope, scope_sets_equal, AppCredentialKind, GrantType, Token, TokenKind,
};
