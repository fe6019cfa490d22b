//! OAuth 2.0 grant processing and token lifecycle engine.
//!
//! Dispatches already-authenticated token requests to the grant-type handlers,
//! mints access/refresh tokens, enforces the refresh-token issuance limit, and
//! serializes the protocol response attributes. HTTP parsing, client secret
//! verification, and token signing are the embedding server's concern.

pub mod config;
pub mod errors;
pub mod oauth;
pub mod storage;
