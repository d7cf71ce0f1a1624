use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use uql_gateway::config;
use uql_gateway::demo;
use uql_gateway::handlers::{app, AppState};
use uql_gateway::store::{Fixtures, MemoryStore, PgStore, RowStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config();
    tracing::info!("Starting uql-gateway in {:?} mode", config.environment);
    if uql_gateway::is_production!() && config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set in production");
    }
    if uql_gateway::is_development!() && config.gateway.raise_errors {
        tracing::warn!("GATEWAY_RAISE_ERRORS is on, handler errors will surface as transport errors");
    }

    let schema = demo::entities()?.schema();
    let store: Arc<dyn RowStore> = match &config.database.url {
        Some(url) => Arc::new(
            PgStore::connect(url, &config.database, schema)
                .await
                .context("connecting to postgres")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, serving from the in-memory store");
            let store = MemoryStore::new(schema);
            let fixtures = match &config.database.fixtures_path {
                Some(path) => Fixtures::load(path)?,
                None => demo::fixtures()?,
            };
            fixtures.seed(&store).await?;
            Arc::new(store)
        }
    };

    let dispatcher = demo::dispatcher(config, store)?;
    let app = app(AppState::new(dispatcher), config);

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("uql-gateway listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
