//! PostgreSQL pool construction from [`PoolSettings`].

use crate::config::PoolSettings;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// Translate configured settings into pool options. A zero idle timeout or lifetime means never.
pub fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    let non_zero = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(non_zero(settings.idle_timeout_secs))
        .max_lifetime(non_zero(settings.max_lifetime_secs))
}

/// Connect and run migrations.
pub async fn connect(url: &str, settings: &PoolSettings) -> anyhow::Result<PgPool> {
    let pool = pool_options(settings).connect(url).await?;
    crate::migrator().run(&pool).await?;
    info!(max_connections = settings.max_connections, "Connected to PostgreSQL, migrations applied");
    Ok(pool)
}
