//! Ordered, categorized request/response attribute bag.
//!
//! The bag is the sole data bus between the dispatcher, the grant handlers,
//! and the embedding request layer. Every attribute is a named, multi-valued
//! string tagged with the part of the exchange it belongs to, so no runtime
//! downcasts are ever needed.

use serde::{Deserialize, Serialize};

/// Well-known attribute names used by the grant handlers
pub mod names {
    pub const GRANT_TYPE: &str = "grant_type";
    pub const CLIENT_ID: &str = "client_id";
    pub const REDIRECT_URI: &str = "redirect_uri";
    pub const CODE: &str = "code";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const SCOPE: &str = "scope";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const PROXY_HOST: &str = "proxy_host";

    pub const TOKEN_TYPE: &str = "token_type";
    pub const EXPIRES_IN: &str = "expires_in";
    pub const STATE: &str = "state";
    pub const ACCESS_TOKEN_ID: &str = "access_token_id";
    pub const REFRESH_TOKEN_ID: &str = "refresh_token_id";
    pub const VERIFIED_SUBJECT: &str = "verified_subject";

    /// Prefix for externally supplied claim attributes copied through verbatim
    pub const EXTERNAL_CLAIM_PREFIX: &str = "external_claim:";
}

/// Which part of the token exchange an attribute belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeCategory {
    BodyParam,
    QueryParam,
    ResponseAttr,
    ResponseMeta,
    ResponseState,
}

/// One named, multi-valued attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub category: AttributeCategory,
    pub values: Vec<String>,
}

/// Ordered collection of named, categorized, multi-valued attributes.
///
/// Insertion order is preserved; replacing an attribute keeps its position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeBag {
    attributes: Vec<Attribute>,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single-valued attribute, replacing any prior values under the
    /// same name and category.
    pub fn set(&mut self, name: &str, category: AttributeCategory, value: &str) {
        self.set_all(name, category, vec![value.to_string()]);
    }

    /// Set a multi-valued attribute, replacing any prior entry in place.
    pub fn set_all(&mut self, name: &str, category: AttributeCategory, values: Vec<String>) {
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.name == name && a.category == category)
        {
            existing.values = values;
        } else {
            self.attributes.push(Attribute {
                name: name.to_string(),
                category,
                values,
            });
        }
    }

    /// First value of the named attribute in any category.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.values.first())
            .map(String::as_str)
    }

    /// First value of the named attribute within one category.
    pub fn first_in(&self, name: &str, category: AttributeCategory) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.category == category)
            .and_then(|a| a.values.first())
            .map(String::as_str)
    }

    /// All values of the named attribute within one category.
    pub fn all_in(&self, name: &str, category: AttributeCategory) -> &[String] {
        self.attributes
            .iter()
            .find(|a| a.name == name && a.category == category)
            .map(|a| a.values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of a request body parameter.
    pub fn body_param(&self, name: &str) -> Option<&str> {
        self.first_in(name, AttributeCategory::BodyParam)
    }

    /// Non-empty first value of a request body parameter.
    pub fn non_empty_body_param(&self, name: &str) -> Option<&str> {
        self.body_param(name).filter(|v| !v.is_empty())
    }

    /// Iterate attributes of one category in insertion order.
    pub fn in_category(
        &self,
        category: AttributeCategory,
    ) -> impl Iterator<Item = &Attribute> + '_ {
        self.attributes
            .iter()
            .filter(move |a| a.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> + '_ {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
