//! `keygate-core` — identifiers, error taxonomy and time source shared by every
//! keygate crate.
//!
//! This crate has no I/O and no knowledge of tokens, storage or HTTP.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{AuthError, AuthResult};
pub use id::{RoleId, SessionId, UserId};
