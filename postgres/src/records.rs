use sqlx::prelude::FromRow;
use sqlx::{PgConnection, PgPool};

/// A row of the `relabel.records` table.
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: i64,
    pub tags: Vec<String>,
    pub attributes: serde_json::Value,
}

/// Returns the lowest and highest record ids, or `None` when the table is empty.
pub async fn record_id_range(pool: &PgPool) -> sqlx::Result<Option<(i64, i64)>> {
    let (min_id, max_id) = sqlx::query_as::<_, (Option<i64>, Option<i64>)>(
        "select min(id), max(id) from relabel.records",
    )
    .fetch_one(pool)
    .await?;

    Ok(min_id.zip(max_id))
}

pub async fn count_records(pool: &PgPool) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("select count(*) from relabel.records")
        .fetch_one(pool)
        .await
}

/// Fetches up to `limit` records with `from_id <= id <= up_to_id`, ordered by id.
pub async fn fetch_records_from(
    pool: &PgPool,
    from_id: i64,
    up_to_id: i64,
    limit: i64,
) -> sqlx::Result<Vec<RecordRow>> {
    sqlx::query_as::<_, RecordRow>(
        r#"
        select id, tags, attributes
        from relabel.records
        where id >= $1 and id <= $2
        order by id
        limit $3
        "#,
    )
    .bind(from_id)
    .bind(up_to_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Appends `tag` to the record's tags unless already present.
///
/// Returns the number of matched records, which is zero when the record does not exist.
pub async fn add_tag(connection: &mut PgConnection, id: i64, tag: &str) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        update relabel.records
        set tags = case when $2 = any(tags) then tags else array_append(tags, $2) end
        where id = $1
        "#,
    )
    .bind(id)
    .bind(tag)
    .execute(connection)
    .await?;

    Ok(result.rows_affected())
}

/// Removes every occurrence of `tag` from the record's tags.
///
/// Returns the number of matched records, which is zero when the record does not exist.
pub async fn remove_tag(connection: &mut PgConnection, id: i64, tag: &str) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        update relabel.records
        set tags = array_remove(tags, $2)
        where id = $1
        "#,
    )
    .bind(id)
    .bind(tag)
    .execute(connection)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_record(
    pool: &PgPool,
    tags: &[String],
    attributes: &serde_json::Value,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        insert into relabel.records (tags, attributes)
        values ($1, $2)
        returning id
        "#,
    )
    .bind(tags)
    .bind(attributes)
    .fetch_one(pool)
    .await
}

/// Counts records grouped by their first tag. Records without tags are grouped under `None`.
pub async fn first_tag_counts(pool: &PgPool) -> sqlx::Result<Vec<(Option<String>, i64)>> {
    sqlx::query_as::<_, (Option<String>, i64)>(
        r#"
        select tags[1], count(*)
        from relabel.records
        group by 1
        order by 1
        "#,
    )
    .fetch_all(pool)
    .await
}
