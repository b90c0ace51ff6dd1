//! User account record and registration input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keygate_core::{AuthError, AuthResult, UserId};

const MAX_PASSWORD_BYTES: usize = 1024;
const MAX_FULL_NAME_CHARS: usize = 255;

/// Persisted user account.
///
/// Users are never hard-deleted; `archived_at` is a soft marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// PHC-formatted Argon2id hash. Never leaves the process.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Registration input carrying a plaintext password.
#[derive(Clone, Deserialize)]
pub struct NewUser {
    /// Assigned by the service when absent.
    #[serde(default)]
    pub id: Option<UserId>,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("full_name", &self.full_name)
            .finish()
    }
}

impl NewUser {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        full_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            email: email.into(),
            password: password.into(),
            full_name: full_name.into(),
        }
    }

    /// Validate shape and return the normalized email.
    pub fn validate(&self) -> AuthResult<String> {
        let email = normalize_email(&self.email);
        validate_email(&email)?;

        if self.password.is_empty() {
            return Err(AuthError::validation("password must not be empty"));
        }
        if self.password.len() > MAX_PASSWORD_BYTES {
            return Err(AuthError::validation(format!(
                "password must be at most {MAX_PASSWORD_BYTES} bytes"
            )));
        }
        if self.full_name.chars().count() > MAX_FULL_NAME_CHARS {
            return Err(AuthError::validation(format!(
                "full name must be at most {MAX_FULL_NAME_CHARS} characters"
            )));
        }

        Ok(email)
    }
}

/// Canonical form used for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> AuthResult<()> {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::validation("email must contain exactly one '@'"));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(AuthError::validation("email must have a local part and a domain"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(AuthError::validation("email must not contain whitespace"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let input = NewUser::new("  Alice@Example.COM ", "p1", "Alice");
        assert_eq!(input.validate().unwrap(), "alice@example.com");
    }

    #[test]
    fn short_passwords_are_accepted() {
        assert!(NewUser::new("a@x.com", "p1", "").validate().is_ok());
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for email in ["", "plain", "@x.com", "a@", "a@b@c", "a b@x.com"] {
            let input = NewUser::new(email, "pw", "");
            assert!(
                matches!(input.validate(), Err(AuthError::Validation(_))),
                "expected {email:?} to be rejected"
            );
        }
    }

    #[test]
    fn empty_and_oversized_passwords_are_rejected() {
        assert!(NewUser::new("a@x.com", "", "").validate().is_err());
        let huge = "x".repeat(MAX_PASSWORD_BYTES + 1);
        assert!(NewUser::new("a@x.com", huge, "").validate().is_err());
    }

    #[test]
    fn debug_output_redacts_password() {
        let input = NewUser::new("a@x.com", "hunter2", "");
        assert!(!format!("{input:?}").contains("hunter2"));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: "a@x.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            full_name: "A".to_string(),
            created_at: now,
            updated_at: now,
            activated_at: None,
            archived_at: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
    }
}
