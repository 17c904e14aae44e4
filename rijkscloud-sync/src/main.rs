use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use rijkscloud_sync::backend::RijkscloudBackend;
use rijkscloud_sync::pg_store::PgStore;
use rijkscloud_sync::settings::ProviderSettings;
use rijkscloud_sync::{migrations, sync_job};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    migrations::run_inline_migrations(&pool).await?;

    let settings = ProviderSettings::from_env()?;
    let store = Arc::new(PgStore::new(pool));
    let backend = RijkscloudBackend::new(settings, store);

    if !backend.ping().await {
        tracing::warn!("[sync] initial connectivity probe failed, continuing anyway");
    }

    sync_job::run(backend).await;
    Ok(())
}
