//! Server-side sessions and refresh-token rotation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use keygate_core::{AuthError, AuthResult, SessionId, UserId};

use crate::claims::{TokenError, TokenKind};
use crate::codec::TokenCodec;
use crate::store::{CredentialStore, StoreError};

/// Persisted session row. Only the digest of the current refresh token is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub refresh_token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// SHA-256 of the token, lowercase hex.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time equality over two digests.
pub fn compare_hash(candidate: &str, stored: &str) -> bool {
    let (a, b) = (candidate.as_bytes(), stored.as_bytes());
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Sessions to revoke so that, after adding one more, at most `max` stay active.
///
/// `active` must be ordered oldest first.
pub fn sessions_to_evict(active: &[Session], max: usize) -> Vec<SessionId> {
    let excess = (active.len() + 1).saturating_sub(max);
    active.iter().take(excess).map(|s| s.id).collect()
}

/// Why a refresh was turned away. Logged, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshRejection {
    BadToken,
    TokenExpired,
    WrongKind,
    UnknownSession,
    Revoked,
    SessionExpired,
    UserMismatch,
    DigestMismatch,
    LostRace,
}

impl RefreshRejection {
    fn reject(self) -> AuthError {
        debug!(reason = ?self, "refresh rejected");
        AuthError::Unauthorized
    }
}

/// Creates, rotates and revokes sessions on top of a [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct SessionManager<S> {
    store: S,
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
    max_sessions_per_user: Option<usize>,
}

impl<S> SessionManager<S>
where
    S: CredentialStore,
{
    pub fn new(store: S, codec: TokenCodec, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            store,
            codec,
            access_ttl,
            refresh_ttl,
            max_sessions_per_user: None,
        }
    }

    pub fn with_max_sessions_per_user(mut self, max: Option<usize>) -> Self {
        self.max_sessions_per_user = max;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Open a new session for `user_id` and mint its first token pair.
    #[instrument(skip(self), err)]
    pub async fn start(&self, user_id: UserId, now: DateTime<Utc>) -> AuthResult<AuthTokens> {
        let now = whole_seconds(now);
        let session_id = SessionId::new();
        let tokens = self.mint(user_id, session_id, now)?;

        let session = Session {
            id: session_id,
            user_id,
            refresh_token_hash: hash_token(&tokens.refresh_token),
            expires_at: tokens.refresh_expires_at,
            created_at: now,
            updated_at: now,
            revoked_at: None,
        };
        let evicted = self
            .store
            .create_session(&session, self.max_sessions_per_user)
            .await
            .map_err(StoreError::into_auth_error)?;
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "session cap reached, evicted oldest sessions");
        }

        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair, invalidating the old one.
    #[instrument(skip_all, err)]
    pub async fn rotate(&self, refresh_token: &str, now: DateTime<Utc>) -> AuthResult<AuthTokens> {
        let now = whole_seconds(now);

        let claims = self.codec.verify(refresh_token, now).map_err(|e| match e {
            TokenError::TokenExpired => RefreshRejection::TokenExpired.reject(),
            _ => RefreshRejection::BadToken.reject(),
        })?;
        if claims.kind() != TokenKind::Refresh {
            return Err(RefreshRejection::WrongKind.reject());
        }

        let session = match self.store.get_session(claims.session_id).await {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(RefreshRejection::UnknownSession.reject()),
            Err(e) => return Err(e.into_auth_error()),
        };
        if session.is_revoked() {
            return Err(RefreshRejection::Revoked.reject());
        }
        if session.is_expired(now) {
            return Err(RefreshRejection::SessionExpired.reject());
        }
        if session.user_id != claims.user_id {
            return Err(RefreshRejection::UserMismatch.reject());
        }
        let presented = hash_token(refresh_token);
        if !compare_hash(&presented, &session.refresh_token_hash) {
            return Err(RefreshRejection::DigestMismatch.reject());
        }

        let tokens = self.mint(session.user_id, session.id, now)?;
        let swapped = self
            .store
            .rotate_session_refresh(
                session.id,
                &session.refresh_token_hash,
                &hash_token(&tokens.refresh_token),
                tokens.refresh_expires_at,
                now,
            )
            .await
            .map_err(StoreError::into_credential_error)?;
        if !swapped {
            return Err(RefreshRejection::LostRace.reject());
        }

        Ok(tokens)
    }

    /// Revoke a session owned by `user_id`. Revoking twice is a no-op.
    #[instrument(skip(self), err)]
    pub async fn revoke(
        &self,
        session_id: SessionId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let session = self
            .store
            .get_session(session_id)
            .await
            .map_err(StoreError::into_credential_error)?;
        if session.user_id != user_id {
            return Err(AuthError::Unauthorized);
        }
        if session.is_revoked() {
            return Ok(());
        }
        self.store
            .revoke_session(session_id, now)
            .await
            .map_err(StoreError::into_auth_error)
    }

    fn mint(
        &self,
        user_id: UserId,
        session_id: SessionId,
        now: DateTime<Utc>,
    ) -> AuthResult<AuthTokens> {
        let expiry = |ttl: Duration| {
            now.checked_add_signed(ttl)
                .ok_or_else(|| AuthError::internal("token expiry out of range"))
        };
        let access_expires_at = expiry(self.access_ttl)?;
        let refresh_expires_at = expiry(self.refresh_ttl)?;

        let access_token = self
            .codec
            .sign(user_id, session_id, TokenKind::Access, now, access_expires_at)
            .map_err(|e| AuthError::internal(e.to_string()))?;
        let refresh_token = self
            .codec
            .sign(user_id, session_id, TokenKind::Refresh, now, refresh_expires_at)
            .map_err(|e| AuthError::internal(e.to_string()))?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }
}

/// Tokens carry second resolution; keep expiries in step with what is signed.
fn whole_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn compare_hash_is_exact() {
        let digest = hash_token("token");
        assert!(compare_hash(&digest, &hash_token("token")));
        assert!(!compare_hash(&digest, &hash_token("token2")));
        assert!(!compare_hash(&digest, &digest[..10]));
        assert!(!compare_hash("", &digest));
    }

    fn session_at(created_at: DateTime<Utc>) -> Session {
        Session {
            id: SessionId::new(),
            user_id: UserId::new(),
            refresh_token_hash: hash_token("t"),
            expires_at: created_at + Duration::days(1),
            created_at,
            updated_at: created_at,
            revoked_at: None,
        }
    }

    #[test]
    fn eviction_keeps_room_for_the_new_session() {
        let now = Utc::now();
        let active: Vec<_> = (0..3).map(|i| session_at(now + Duration::seconds(i))).collect();

        assert_eq!(sessions_to_evict(&active, 3), vec![active[0].id]);
        assert_eq!(sessions_to_evict(&active, 1), active.iter().map(|s| s.id).collect::<Vec<_>>());
        assert!(sessions_to_evict(&active, 4).is_empty());
        assert!(sessions_to_evict(&[], 1).is_empty());
    }

    #[test]
    fn session_activity_tracks_revocation_and_expiry() {
        let now = Utc::now();
        let mut session = Session {
            id: SessionId::new(),
            user_id: UserId::new(),
            refresh_token_hash: hash_token("t"),
            expires_at: now + Duration::hours(1),
            created_at: now,
            updated_at: now,
            revoked_at: None,
        };
        assert!(session.is_active(now));
        assert!(!session.is_active(now + Duration::hours(1)));

        session.revoked_at = Some(now);
        assert!(!session.is_active(now));
    }
}
