use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod backoffice;
pub mod system;

/// Routes reachable without a bearer token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/register", post(auth::register))
}

/// Routes behind the request authenticator.
pub fn protected_router() -> Router {
    Router::new()
        .route("/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .nest("/backoffice", backoffice::router())
}
