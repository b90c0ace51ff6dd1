use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use keygate_core::{SessionId, UserId};

/// Which half of a token pair a token is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried by every bearer token.
///
/// Access and refresh tokens minted for the same session share `session_id`.
/// `jti` is unique per token so two tokens minted in the same second never
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id rendered as a string.
    pub sub: String,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub token_type: TokenKind,
    pub jti: Uuid,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
}

impl TokenClaims {
    pub fn new(
        user_id: UserId,
        session_id: SessionId,
        kind: TokenKind,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            user_id,
            session_id,
            token_type: kind,
            jti: Uuid::new_v4(),
            iat: issued_at,
            exp: expires_at,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.token_type
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.iat
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.exp
    }
}

/// Token verification failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Bad signature, malformed structure, unparsable or inconsistent claims.
    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    /// Signing failed (key or serialization problem).
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Deterministically validate decoded claims against `now`.
///
/// Signature verification happens before this in the codec.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if claims.exp <= claims.iat {
        return Err(TokenError::InvalidToken);
    }
    if claims.sub != claims.user_id.to_string() {
        return Err(TokenError::InvalidToken);
    }
    if now < claims.iat {
        return Err(TokenError::InvalidToken);
    }
    if now >= claims.exp {
        return Err(TokenError::TokenExpired);
    }
    Ok(())
}
