//! Service wiring: store selection, event bus, module registration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};

use keygate_auth::{AuthService, CredentialStore, auth_manifest};
use keygate_events::{EventEnvelope, InMemoryEventBus, Subscription, subjects};
use keygate_infra::{InMemoryCredentialStore, PostgresCredentialStore};

use crate::config::ApiConfig;

pub type Store = Arc<dyn CredentialStore>;
pub type Bus = Arc<InMemoryEventBus<EventEnvelope>>;
pub type Auth = AuthService<Store, Bus>;

/// Everything handlers need, shared behind `Arc`s.
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<Auth>,
    pub bus: Bus,
}

/// Connect the configured store and build services.
///
/// Uses Postgres (with migrations applied) when `DATABASE_URL` is set,
/// otherwise an in-memory store.
pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let store: Store = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresCredentialStore::connect(url)
                .await
                .context("failed to connect to postgres")?;
            store.migrate().await.context("failed to run migrations")?;
            info!("using postgres credential store");
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set; using in-memory credential store");
            Arc::new(InMemoryCredentialStore::new())
        }
    };
    build_services_with_store(config, store).await
}

/// Build services on an existing store, register the auth module and start
/// listening for other modules' registrations on the bus.
///
/// Registration is awaited; an error here must abort startup.
pub async fn build_services_with_store(
    config: &ApiConfig,
    store: Store,
) -> anyhow::Result<AppServices> {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let auth = AuthService::new(&config.auth, store, bus.clone())
        .context("invalid auth configuration")?;

    auth.register_module(auth_manifest())
        .await
        .context("auth module registration failed")?;

    let services = AppServices {
        auth: Arc::new(auth),
        bus,
    };
    let registrations = services.bus.subscribe_to(&[
        subjects::SYSTEM_PERMISSIONS_REGISTER,
        subjects::SYSTEM_MENUS_REGISTER,
    ]);
    tokio::spawn(registration_listener(services.auth.clone(), registrations));

    Ok(services)
}

const LISTENER_TICK: Duration = Duration::from_millis(250);

/// Drain `system.*.register` messages into the RBAC engine for the life of the runtime.
async fn registration_listener(auth: Arc<Auth>, subscription: Subscription<EventEnvelope>) {
    let mut tick = tokio::time::interval(LISTENER_TICK);
    loop {
        tick.tick().await;
        let batch = subscription.drain();
        if batch.is_empty() {
            continue;
        }
        let received = batch.len();
        let applied = auth.apply_registrations(batch).await;
        debug!(received, applied, "applied module registrations from bus");
    }
}
