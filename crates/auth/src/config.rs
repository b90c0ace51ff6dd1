//! Credential-core configuration, injected at construction.

use chrono::Duration;
use thiserror::Error;

/// Default access-token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
/// Default refresh-token lifetime (7 days).
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;
/// Upper bound for the refresh-token lifetime (10 years).
pub const MAX_REFRESH_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("token secret must not be empty")]
    EmptySecret,

    #[error("access token ttl must be positive and shorter than refresh token ttl, which is at most 10 years")]
    InvalidTtl,

    #[error("max sessions per user must be at least 1")]
    InvalidSessionCap,

    #[error("invalid password hash cost: {0}")]
    InvalidHashCost(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PasswordHashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashCost {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl PasswordHashCost {
    /// Cheapest cost argon2 accepts; for tests only.
    pub fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub token_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// `None` = unlimited concurrent sessions.
    pub max_sessions_per_user: Option<usize>,
    pub password_hash_cost: PasswordHashCost,
}

impl core::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("max_sessions_per_user", &self.max_sessions_per_user)
            .field("password_hash_cost", &self.password_hash_cost)
            .finish()
    }
}

/// Lifetime from a number of seconds; values `Duration` cannot hold are `InvalidTtl`.
pub fn ttl_from_secs(secs: i64) -> Result<Duration, ConfigError> {
    Duration::try_seconds(secs).ok_or(ConfigError::InvalidTtl)
}

impl AuthConfig {
    /// Defaults for everything except the secret.
    pub fn new(token_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            token_secret: token_secret.into(),
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
            max_sessions_per_user: None,
            password_hash_cost: PasswordHashCost::default(),
        }
    }

    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn with_max_sessions_per_user(mut self, max: Option<usize>) -> Self {
        self.max_sessions_per_user = max;
        self
    }

    pub fn with_password_hash_cost(mut self, cost: PasswordHashCost) -> Self {
        self.password_hash_cost = cost;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_secret.is_empty() {
            return Err(ConfigError::EmptySecret);
        }
        if self.access_ttl <= Duration::zero()
            || self.access_ttl >= self.refresh_ttl
            || self.refresh_ttl > Duration::seconds(MAX_REFRESH_TTL_SECS)
        {
            return Err(ConfigError::InvalidTtl);
        }
        if self.max_sessions_per_user == Some(0) {
            return Err(ConfigError::InvalidSessionCap);
        }
        let cost = self.password_hash_cost;
        argon2::Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| ConfigError::InvalidHashCost(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AuthConfig::new("secret");
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.access_ttl, Duration::minutes(15));
        assert_eq!(config.refresh_ttl, Duration::days(7));
        assert_eq!(config.max_sessions_per_user, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(AuthConfig::new("").validate(), Err(ConfigError::EmptySecret));

        let inverted = AuthConfig::new("s").with_ttls(Duration::days(7), Duration::minutes(15));
        assert_eq!(inverted.validate(), Err(ConfigError::InvalidTtl));

        let capped = AuthConfig::new("s").with_max_sessions_per_user(Some(0));
        assert_eq!(capped.validate(), Err(ConfigError::InvalidSessionCap));

        let cost = PasswordHashCost { memory_kib: 1, iterations: 0, parallelism: 0 };
        let bad_cost = AuthConfig::new("s").with_password_hash_cost(cost);
        assert!(matches!(bad_cost.validate(), Err(ConfigError::InvalidHashCost(_))));
    }

    #[test]
    fn oversized_ttls_are_rejected() {
        assert_eq!(ttl_from_secs(i64::MAX), Err(ConfigError::InvalidTtl));
        assert_eq!(ttl_from_secs(60), Ok(Duration::minutes(1)));

        let huge = AuthConfig::new("s")
            .with_ttls(Duration::minutes(15), Duration::seconds(10_000_000_000_000));
        assert_eq!(huge.validate(), Err(ConfigError::InvalidTtl));

        let at_cap = AuthConfig::new("s")
            .with_ttls(Duration::minutes(15), Duration::seconds(MAX_REFRESH_TTL_SECS));
        assert_eq!(at_cap.validate(), Ok(()));
    }

    #[test]
    fn debug_redacts_secret() {
        let rendered = format!("{:?}", AuthConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}
