//! Infrastructure layer: concrete credential stores and migrations.

pub mod credentials;

pub use credentials::{InMemoryCredentialStore, MIGRATOR, PostgresCredentialStore};
