//! Payloads published by the authentication module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keygate_core::UserId;

use crate::event::Event;
use crate::subjects;

/// A new account was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub user_id: UserId,
    pub email: String,
    pub full_name: String,
    pub occurred_at: DateTime<Utc>,
}

impl Event for UserRegistered {
    fn subject(&self) -> &'static str {
        subjects::AUTH_USER_REGISTERED
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
