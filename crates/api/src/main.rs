use anyhow::Context;

use facet_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    facet_observability::init();

    let config = ApiConfig::from_env()?;
    let app = facet_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        products_route = %config.products_route,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
