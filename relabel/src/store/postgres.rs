use config::shared::PgConnectionConfig;
use futures::{StreamExt, TryStreamExt, stream};
use postgres::db::connect_to_records_database;
use postgres::records::{
    RecordRow, add_tag, count_records, fetch_records_from, first_tag_counts, insert_record,
    record_id_range, remove_tag,
};
use sqlx::{PgPool, Postgres};
use std::collections::BTreeMap;
use tracing::debug;

use crate::{bail, relabel_error};
use crate::error::{ErrorKind, RelabelResult};
use crate::store::base::{RecordCursor, RecordStore, StoreTransaction};
use crate::types::{Record, RecordId};

/// Record store backed by the `relabel.records` table.
///
/// Scans walk the table in id order with keyset pagination, holding at most `fetch_size`
/// rows in memory per round trip. Every transaction holds one pooled connection until it is
/// committed or dropped.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
    fetch_size: i64,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool, fetch_size: u64) -> Self {
        Self {
            pool,
            fetch_size: i64::try_from(fetch_size).unwrap_or(i64::MAX).max(1),
        }
    }

    /// Connects to the database described by `config`.
    pub async fn connect(
        config: &PgConnectionConfig,
        max_connections: u32,
        fetch_size: u64,
    ) -> RelabelResult<Self> {
        let pool = connect_to_records_database(config, max_connections)
            .await
            .map_err(|err| {
                relabel_error!(
                    ErrorKind::StoreConnectionFailed,
                    "Failed to connect to the records database",
                    err.to_string(),
                    source: err
                )
            })?;

        Ok(Self::new(pool, fetch_size))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert(
        &self,
        tags: Vec<String>,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> RelabelResult<RecordId> {
        let attributes = serde_json::Value::Object(attributes.into_iter().collect());
        let id = insert_record(&self.pool, &tags, &attributes).await?;

        Ok(RecordId(id))
    }

    /// Counts records per first tag. Records without tags are not counted.
    pub async fn first_tag_counts(&self) -> RelabelResult<BTreeMap<String, u64>> {
        let counts = first_tag_counts(&self.pool)
            .await?
            .into_iter()
            .filter_map(|(tag, count)| Some((tag?, count.max(0) as u64)))
            .collect();

        Ok(counts)
    }
}

/// Result of one keyset round trip: the records read and the id to resume from, if any.
type Batch = (Vec<RelabelResult<Record>>, Option<i64>);

async fn fetch_batch(
    pool: PgPool,
    from_id: Option<i64>,
    max_id: i64,
    fetch_size: i64,
) -> RelabelResult<Option<Batch>> {
    let Some(from_id) = from_id else {
        return Ok(None);
    };

    let rows = fetch_records_from(&pool, from_id, max_id, fetch_size).await?;
    let Some(last_id) = rows.last().map(|row| row.id) else {
        return Ok(None);
    };

    // `last_id < max_id`, so the increment cannot overflow.
    let next = (last_id < max_id).then(|| last_id + 1);
    let records = rows.into_iter().map(record_from_row).collect();

    Ok(Some((records, next)))
}

fn record_from_row(row: RecordRow) -> RelabelResult<Record> {
    let attributes = match row.attributes {
        serde_json::Value::Object(attributes) => attributes,
        other => bail!(
            ErrorKind::DeserializationError,
            "Record attributes are not a JSON object",
            format!("record {} has attributes {other}", row.id)
        ),
    };

    Ok(Record {
        id: RecordId(row.id),
        tags: row.tags,
        attributes: attributes.into_iter().collect(),
    })
}

impl RecordStore for PostgresRecordStore {
    type Transaction = PostgresTransaction;

    async fn scan(&self) -> RelabelResult<RecordCursor> {
        let Some((min_id, max_id)) = record_id_range(&self.pool).await? else {
            return Ok(stream::empty().boxed());
        };

        debug!(min_id, max_id, fetch_size = self.fetch_size, "opening records scan");

        let pool = self.pool.clone();
        let fetch_size = self.fetch_size;
        let batches = stream::try_unfold(Some(min_id), move |from_id| {
            fetch_batch(pool.clone(), from_id, max_id, fetch_size)
        });

        let cursor = batches.map_ok(stream::iter).try_flatten();

        Ok(cursor.boxed())
    }

    async fn begin(&self) -> RelabelResult<PostgresTransaction> {
        let transaction = self.pool.begin().await?;

        Ok(PostgresTransaction { transaction })
    }

    async fn count(&self) -> RelabelResult<u64> {
        let count = count_records(&self.pool).await?;

        Ok(count.max(0) as u64)
    }
}

/// Transaction over a [`PostgresRecordStore`], rolled back by sqlx when dropped uncommitted.
#[derive(Debug)]
pub struct PostgresTransaction {
    transaction: sqlx::Transaction<'static, Postgres>,
}

impl StoreTransaction for PostgresTransaction {
    async fn add_tag(&mut self, id: RecordId, tag: &str) -> RelabelResult<()> {
        let updated = add_tag(&mut self.transaction, id.into_inner(), tag).await?;
        if updated == 0 {
            bail!(
                ErrorKind::RecordNotFound,
                "Record not found",
                format!("record {id} does not exist")
            );
        }

        Ok(())
    }

    async fn remove_tag(&mut self, id: RecordId, tag: &str) -> RelabelResult<()> {
        let updated = remove_tag(&mut self.transaction, id.into_inner(), tag).await?;
        if updated == 0 {
            bail!(
                ErrorKind::RecordNotFound,
                "Record not found",
                format!("record {id} does not exist")
            );
        }

        Ok(())
    }

    async fn commit(self) -> RelabelResult<()> {
        self.transaction.commit().await?;

        Ok(())
    }
}
