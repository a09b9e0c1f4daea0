use config::shared::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
use secrecy::SecretString;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use tokio::runtime::Handle;

use crate::db::migrate_records_store;

/// Reads test database settings from the `TESTS_DATABASE_*` environment variables.
///
/// The database name is unique per call so tests never share state.
///
/// # Panics
///
/// Panics if a required variable is missing or malformed.
pub fn local_pg_connection_config(database_name: String) -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: database_name,
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(SecretString::new),
        tls: TlsConfig::default(),
    }
}

/// A throwaway database with the records schema migrated, dropped when the value is dropped.
///
/// Dropping blocks the current thread, so it must happen inside a multi-threaded runtime.
pub struct PgDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl PgDatabase {
    /// # Panics
    ///
    /// Panics if the database cannot be created or migrated.
    pub async fn new(config: PgConnectionConfig) -> Self {
        let mut connection = PgConnection::connect_with(&config.without_db())
            .await
            .expect("Failed to connect to Postgres");
        connection
            .execute(format!(r#"create database "{}";"#, config.name).as_str())
            .await
            .expect("Failed to create database");

        migrate_records_store(&config)
            .await
            .expect("Failed to migrate the records store");

        let pool = PgPool::connect_with(config.with_db())
            .await
            .expect("Failed to connect to the test database");

        Self { config, pool }
    }
}

impl Drop for PgDatabase {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let config = &self.config;

        tokio::task::block_in_place(move || {
            Handle::current().block_on(async move {
                pool.close().await;
                drop_pg_database(config).await;
            });
        });
    }
}

/// Drops the database named by `config`, terminating stray connections first.
///
/// Never panics, since it runs while a failed test may already be unwinding.
pub async fn drop_pg_database(config: &PgConnectionConfig) {
    let mut connection = match PgConnection::connect_with(&config.without_db()).await {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("warning: failed to connect to Postgres for cleanup: {err}");
            return;
        }
    };

    let terminate = format!(
        r#"
        select pg_terminate_backend(pid)
        from pg_stat_activity
        where datname = '{}' and pid <> pg_backend_pid();"#,
        config.name
    );
    if let Err(err) = connection.execute(terminate.as_str()).await {
        eprintln!(
            "warning: failed to terminate connections to {}: {err}",
            config.name
        );
    }

    let drop = format!(r#"drop database if exists "{}";"#, config.name);
    if let Err(err) = connection.execute(drop.as_str()).await {
        eprintln!("warning: failed to drop database {}: {err}", config.name);
    }
}
