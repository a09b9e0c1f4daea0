use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::RELABEL_SCHEMA;

/// Connects to the records database with a pool of at most `max_connections` connections.
///
/// Each page transaction holds one connection for its whole duration, so the pool size
/// bounds the number of pages committing concurrently.
pub async fn connect_to_records_database(
    config: &PgConnectionConfig,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let options: PgConnectOptions = config.with_db();

    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Creates the `relabel` schema and applies pending migrations.
///
/// A dedicated single-connection pool is used with its search path pinned to the `relabel`
/// schema, so the migrations bookkeeping table lives next to the records table.
pub async fn migrate_records_store(config: &PgConnectionConfig) -> Result<(), sqlx::Error> {
    let options: PgConnectOptions = config.with_db();

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .after_connect(|connection, _meta| {
            Box::pin(async move {
                connection
                    .execute(format!("create schema if not exists {RELABEL_SCHEMA};").as_str())
                    .await?;
                connection
                    .execute(format!("set search_path = '{RELABEL_SCHEMA}';").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    pool.close().await;

    info!(database = %config.name, "records store migrations applied");

    Ok(())
}
