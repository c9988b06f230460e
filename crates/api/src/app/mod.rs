//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, intercom, product dispatcher and the realtime feed
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: reply → response mapping and consistent error bodies

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::config::ApiConfig;
use crate::middleware;

pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> anyhow::Result<Router> {
    let jwt = Arc::new(facet_auth::Hs256JwtValidator::new(
        config.jwt_secret.clone().into_bytes(),
    ));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::build_services(config).await?);

    // Protected routes: require a valid bearer token.
    let protected = routes::router(&config.products_route)
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new()))
}
