use std::sync::Arc;

use anyhow::Context;

use fulfil_engine::{Engine, EngineConfig};
use fulfil_infra::postgres::PgStores;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fulfil_observability::init();

    let config = EngineConfig::from_env().context("failed to load engine configuration")?;

    let bind_addr = std::env::var("FULFIL_BIND_ADDR").unwrap_or_else(|_| {
        tracing::warn!("FULFIL_BIND_ADDR not set; using 0.0.0.0:8080");
        "0.0.0.0:8080".to_string()
    });

    let engine = match config.database_url.clone() {
        Some(url) => {
            let stores = PgStores::connect(&url)
                .await
                .context("failed to prepare Postgres stores")?;
            Engine::postgres(config, stores)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; stock and invoice numbers are kept in memory");
            Engine::in_memory(config)
        }
    };
    let engine = Arc::new(engine);
    let app = fulfil_engine::http::build_app(engine);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
