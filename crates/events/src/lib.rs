//! `keygate-events` — subjects, envelopes and the pub/sub mechanics shared by
//! the credential core and the modules around it.
//!
//! Delivery is fire-and-forget and at-least-once; every consumer must be
//! idempotent.

pub mod auth;
pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod subjects;

pub use auth::UserRegistered;
pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
