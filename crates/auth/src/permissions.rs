use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The permission that grants every other permission.
pub const WILDCARD: &str = "*";

/// Registered permission.
///
/// Ids are stable string keys shaped `module.resource.action`
/// (e.g. `billing.invoices.view`); the module that registered a permission
/// owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: String,
    pub module: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(id: impl Into<String>, module: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        let id = id.into();
        Self {
            description: describe_permission(&id),
            id,
            module: module.into(),
            created_at,
        }
    }
}

/// Human-readable description derived from the id shape.
pub fn describe_permission(id: &str) -> String {
    if id == WILDCARD {
        return "Grants all permissions".to_string();
    }

    let parts: Vec<&str> = id.split('.').collect();
    if parts.len() < 2 {
        return id.to_string();
    }

    let module = parts[0];
    let action = parts[parts.len() - 1];
    let resource = if parts.len() > 2 {
        parts[1..parts.len() - 1].join(".")
    } else {
        module.to_string()
    };

    let action_desc = match action {
        "read" | "view" => "View",
        "write" => "Create/update/delete",
        "create" => "Create",
        "list" => "List",
        "manage" => "Manage",
        "delete" => "Delete",
        _ => action,
    };

    format!("{action_desc} {resource}")
}
