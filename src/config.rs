//! Environment-based configuration for the grant engine.

use crate::errors::ConfigError;
use chrono::Duration;

/// Token lifetime setting parsed from a duration string such as `2h` or `90d`
#[derive(Clone, Copy)]
pub struct TokenLifetime(Duration);

impl TokenLifetime {
    pub fn seconds(&self) -> i64 {
        self.0.num_seconds()
    }
}

impl TryFrom<(&str, String)> for TokenLifetime {
    type Error = ConfigError;

    fn try_from((_name, value): (&str, String)) -> Result<Self, Self::Error> {
        let parsed = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value.clone(), e.to_string()))?;
        let secs = i64::try_from(parsed.as_secs())
            .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))?;
        Ok(TokenLifetime(Duration::seconds(secs)))
    }
}

/// Grant engine configuration.
///
/// Lifetimes are per flow; the refresh limit caps refresh-originated access
/// tokens for a single (user, client) pair.
#[derive(Clone)]
pub struct GrantConfig {
    pub access_token_lifetime: TokenLifetime,
    pub refresh_token_lifetime: TokenLifetime,
    pub app_password_lifetime: TokenLifetime,
    pub app_token_lifetime: TokenLifetime,
    pub refresh_token_limit: usize,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: TokenLifetime(Duration::hours(1)),
            refresh_token_lifetime: TokenLifetime(Duration::days(7)),
            app_password_lifetime: TokenLifetime(Duration::days(90)),
            app_token_lifetime: TokenLifetime(Duration::days(90)),
            refresh_token_limit: 25,
        }
    }
}

impl GrantConfig {
    /// Create a configuration from environment variables, falling back to the
    /// documented defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token_lifetime: TokenLifetime =
            default_env("ACCESS_TOKEN_LIFETIME", "1h").try_into()?;
        let refresh_token_lifetime: TokenLifetime =
            default_env("REFRESH_TOKEN_LIFETIME", "7d").try_into()?;
        let app_password_lifetime: TokenLifetime =
            default_env("APP_PASSWORD_LIFETIME", "90d").try_into()?;
        let app_token_lifetime: TokenLifetime =
            default_env("APP_TOKEN_LIFETIME", "90d").try_into()?;

        let (name, value) = default_env("REFRESH_TOKEN_LIMIT", "25");
        let refresh_token_limit = value
            .parse::<usize>()
            .map_err(|e| ConfigError::IntParsingFailed(name.to_string(), e))?;

        Ok(Self {
            access_token_lifetime,
            refresh_token_lifetime,
            app_password_lifetime,
            app_token_lifetime,
            refresh_token_limit,
        })
    }

    /// Programmatic constructor for embedders that carry their own settings.
    pub fn with_lifetimes(
        access_seconds: i64,
        refresh_seconds: i64,
        app_password_seconds: i64,
        app_token_seconds: i64,
        refresh_token_limit: usize,
    ) -> Self {
        Self {
            access_token_lifetime: TokenLifetime(Duration::seconds(access_seconds)),
            refresh_token_lifetime: TokenLifetime(Duration::seconds(refresh_seconds)),
            app_password_lifetime: TokenLifetime(Duration::seconds(app_password_seconds)),
            app_token_lifetime: TokenLifetime(Duration::seconds(app_token_seconds)),
            refresh_token_limit,
        }
    }
}

fn default_env(name: &'static str, default_value: &str) -> (&'static str, String) {
    (
        name,
        std::env::var(name).unwrap_or_else(|_| default_value.to_string()),
    )
}
