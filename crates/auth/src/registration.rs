//! Bus messages other modules publish to register with the RBAC engine.
//!
//! The auth module registers its own manifest directly at startup; every other
//! module sends these two messages instead and the auth service applies them
//! through the same idempotent upserts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keygate_core::{AuthError, AuthResult};
use keygate_events::{Event, EventEnvelope, subjects};

use crate::menu::MenuDefinition;

/// Payload of `system.permissions.register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPermissions {
    pub module: String,
    pub permissions: Vec<String>,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl Event for RegisterPermissions {
    fn subject(&self) -> &'static str {
        subjects::SYSTEM_PERMISSIONS_REGISTER
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// Payload of `system.menus.register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterMenus {
    pub domain: String,
    /// Menu schema version chosen by the sending module.
    #[serde(default)]
    pub version: i32,
    pub menu: Vec<MenuDefinition>,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl Event for RegisterMenus {
    fn subject(&self) -> &'static str {
        subjects::SYSTEM_MENUS_REGISTER
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// A registration message decoded from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Permissions(RegisterPermissions),
    Menus(RegisterMenus),
}

impl Registration {
    /// Decode a registration envelope; `None` for any other subject.
    pub fn decode(envelope: &EventEnvelope) -> AuthResult<Option<Self>> {
        let decoded = match envelope.subject() {
            subjects::SYSTEM_PERMISSIONS_REGISTER => envelope.decode().map(Self::Permissions),
            subjects::SYSTEM_MENUS_REGISTER => envelope.decode().map(Self::Menus),
            _ => return Ok(None),
        };
        decoded.map(Some).map_err(|e| {
            AuthError::validation(format!("malformed {} payload: {e}", envelope.subject()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn envelope(subject: &str, payload: serde_json::Value) -> EventEnvelope {
        EventEnvelope::new(Uuid::now_v7(), subject, 1, Utc::now(), payload)
    }

    #[test]
    fn decodes_by_subject() {
        let permissions = envelope(
            subjects::SYSTEM_PERMISSIONS_REGISTER,
            serde_json::json!({ "module": "cms", "permissions": ["cms.pages.view"] }),
        );
        let Some(Registration::Permissions(decoded)) = Registration::decode(&permissions).unwrap()
        else {
            panic!("expected a permissions registration");
        };
        assert_eq!(decoded.module, "cms");
        assert_eq!(decoded.permissions, vec!["cms.pages.view"]);

        let other = envelope(subjects::AUTH_USER_REGISTERED, serde_json::json!({}));
        assert_eq!(Registration::decode(&other), Ok(None));
    }

    #[test]
    fn malformed_payload_is_validation_error() {
        let bad = envelope(subjects::SYSTEM_MENUS_REGISTER, serde_json::json!({ "domain": 7 }));
        assert!(matches!(Registration::decode(&bad), Err(AuthError::Validation(_))));
    }

    #[test]
    fn menus_payload_accepts_wire_shape_without_timestamps() {
        let payload = serde_json::json!({
            "domain": "cms",
            "version": 2,
            "menu": [
                { "id": "cms.pages", "label": "Pages", "permission": "cms.pages.view", "path": "/cms/pages" }
            ]
        });

        let decoded: RegisterMenus = serde_json::from_value(payload).unwrap();
        assert_eq!(decoded.domain, "cms");
        assert_eq!(decoded.version, 2);
        assert_eq!(decoded.menu[0].permission.as_deref(), Some("cms.pages.view"));
        assert_eq!(decoded.subject(), "system.menus.register");
    }
}
