use chrono::{DateTime, Utc};

/// A named, versioned fact published by the credential core.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable subject the event is published under (e.g. "auth.user.registered").
    fn subject(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;
}
