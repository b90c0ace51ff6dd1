use keygate_auth::TokenClaims;
use keygate_core::{SessionId, UserId};

/// Verified identity of the caller, attached by the auth middleware.
///
/// Handlers pass this explicitly into service calls; nothing downstream reads
/// identity from anywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    claims: TokenClaims,
}

impl AuthenticatedUser {
    pub fn new(claims: TokenClaims) -> Self {
        Self { claims }
    }

    pub fn user_id(&self) -> UserId {
        self.claims.user_id
    }

    pub fn session_id(&self) -> SessionId {
        self.claims.session_id
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }
}
