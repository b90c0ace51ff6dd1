//! Credential store implementations.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCredentialStore;
pub use postgres::{MIGRATOR, PostgresCredentialStore};
