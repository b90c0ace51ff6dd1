//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

use keygate_auth::{AuthConfig, PasswordHashCost, ttl_from_secs};

const DEV_SECRET: &str = "dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a number, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("BIND_ADDR is not a socket address: '{0}'")]
    InvalidBindAddr(String),

    #[error(transparent)]
    Auth(#[from] keygate_auth::ConfigError),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub auth: AuthConfig,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_SECRET.to_string()
        });

        let raw_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(raw_addr.clone()))?;

        let access_ttl = number(&get, "ACCESS_TOKEN_TTL_SECS")?
            .unwrap_or(keygate_auth::config::DEFAULT_ACCESS_TTL_SECS);
        let refresh_ttl = number(&get, "REFRESH_TOKEN_TTL_SECS")?
            .unwrap_or(keygate_auth::config::DEFAULT_REFRESH_TTL_SECS);
        let max_sessions: Option<usize> = number(&get, "MAX_SESSIONS_PER_USER")?;

        let defaults = PasswordHashCost::default();
        let cost = PasswordHashCost {
            memory_kib: number(&get, "PASSWORD_HASH_MEMORY_KIB")?.unwrap_or(defaults.memory_kib),
            iterations: number(&get, "PASSWORD_HASH_ITERATIONS")?.unwrap_or(defaults.iterations),
            parallelism: number(&get, "PASSWORD_HASH_PARALLELISM")?.unwrap_or(defaults.parallelism),
        };

        let auth = AuthConfig::new(secret)
            .with_ttls(ttl_from_secs(access_ttl)?, ttl_from_secs(refresh_ttl)?)
            .with_max_sessions_per_user(max_sessions)
            .with_password_hash_cost(cost);
        auth.validate()?;

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            auth,
        })
    }
}

fn number<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    get(var)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var, value: raw.clone() })
        })
        .transpose()
}
