use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sapb1_gateway::config::AppConfig;
use sapb1_gateway::http::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connecting to the company database")?;
    let nats = async_nats::connect(&config.nats_url)
        .await
        .context("connecting to the automation bridge")?;

    let port = config.http_port;
    let state = AppState {
        config: Arc::new(config),
        db,
        nats,
    };
    let app = http::router(state);

    tracing::info!("sapb1-gateway listening on 0.0.0.0:{port}");
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?,
        app,
    )
    .await?;
    Ok(())
}
