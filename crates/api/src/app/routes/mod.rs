use axum::{Router, routing::get};

pub mod products;
pub mod system;

/// Router for all authenticated endpoints; products are mounted at `products_route`.
pub fn router(products_route: &str) -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/stream", get(system::stream))
        .nest(products_route, products::router())
}
