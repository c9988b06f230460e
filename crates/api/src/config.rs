//! Process configuration read from the environment.

use std::net::SocketAddr;

use anyhow::Context;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// `BIND_ADDR`, default `0.0.0.0:8080`.
    pub bind_addr: SocketAddr,
    /// `JWT_SECRET`; an insecure dev default is used when unset.
    pub jwt_secret: String,
    /// `PRODUCTS_ROUTE`, the base path the product routes are mounted under.
    pub products_route: String,
    /// `USE_PERSISTENT_STORES`; needs the `postgres` feature and `DATABASE_URL`.
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
}

impl ApiConfig {
    /// In-memory configuration with the given signing secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: jwt_secret.into(),
            products_route: "/products".to_string(),
            use_persistent_stores: false,
            database_url: None,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });
        let mut config = Self::new(jwt_secret);

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .with_context(|| format!("invalid BIND_ADDR {addr:?}"))?;
        }
        if let Some(route) = get("PRODUCTS_ROUTE") {
            config.products_route = normalize_route(&route)
                .with_context(|| format!("invalid PRODUCTS_ROUTE {route:?}"))?;
        }
        config.use_persistent_stores = get("USE_PERSISTENT_STORES")
            .map(|v| v.parse::<bool>().unwrap_or(false))
            .unwrap_or(false);
        config.database_url = get("DATABASE_URL");

        if config.use_persistent_stores && config.database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
        }
        Ok(config)
    }
}

/// `products/` → `/products`. The root is not a valid mount point.
fn normalize_route(route: &str) -> Option<String> {
    let trimmed = route.trim().trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("/{trimmed}"))
    }
}
