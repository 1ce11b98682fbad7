//! Database module
//!
//! Pool construction and schema verification.
//! Note: We use raw SQL files in migrations/ directory.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::Config;

/// Build the shared connection pool: a floor of warm connections, a hard
/// cap, and bounded blocking on acquisition when saturated.
pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(config.database_min_connections)
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.database_acquire_timeout)
        .connect(&config.database_url)
        .await
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec!["events", "outbox"];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    // Delivery-tracking columns come from a later migration; the relay's
    // claim query depends on them.
    let tracking_ready: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_schema = 'public'
              AND table_name = 'outbox'
              AND column_name = 'attempts'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !tracking_ready {
        tracing::error!("Outbox delivery-tracking columns are missing. Please run migrations.");
        return Ok(false);
    }

    Ok(true)
}
