use postgres::test_utils::{PgDatabase, local_pg_connection_config};
use uuid::Uuid;

use crate::store::postgres::PostgresRecordStore;

/// Fetch size used by test stores, small enough to exercise keyset pagination.
pub const TEST_FETCH_SIZE: u64 = 64;

/// Creates a fresh database with the records table and a store over it.
///
/// The database is dropped together with the returned [`PgDatabase`].
///
/// # Panics
///
/// Panics if the `TESTS_DATABASE_*` variables are missing or the database cannot be created.
pub async fn spawn_records_database() -> (PgDatabase, PostgresRecordStore) {
    let config = local_pg_connection_config(format!("relabel_test_{}", Uuid::new_v4().simple()));
    let database = PgDatabase::new(config).await;
    let store = PostgresRecordStore::new(database.pool.clone(), TEST_FETCH_SIZE);

    (database, store)
}
