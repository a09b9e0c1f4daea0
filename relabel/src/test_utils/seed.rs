use serde_json::json;
use std::collections::BTreeMap;

use crate::error::RelabelResult;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PostgresRecordStore;
use crate::types::{Record, USERNAME_ATTRIBUTE};

/// Tag every seeded record starts with.
pub const PERSON_TAG: &str = "Person";

/// Username of the `index`-th seeded record, cycling through `buckets` distinct values.
pub fn person_username(index: u64, buckets: u64) -> String {
    format!("person_{}", index % buckets)
}

/// Tag a seeded record carries after one relabeling run.
pub fn relabeled_tag(bucket: u64) -> String {
    format!("{PERSON_TAG}_person_{bucket}")
}

fn person_attributes(index: u64, buckets: u64) -> BTreeMap<String, serde_json::Value> {
    BTreeMap::from([(
        USERNAME_ATTRIBUTE.to_owned(),
        json!(person_username(index, buckets)),
    )])
}

/// Inserts `count` records tagged `Person` whose usernames cycle through `buckets` values.
pub async fn seed_people(store: &MemoryStore, count: u64, buckets: u64) {
    for index in 0..count {
        store
            .insert(
                vec![PERSON_TAG.to_owned()],
                person_attributes(index, buckets),
            )
            .await;
    }
}

/// Same as [`seed_people`] for a Postgres store.
pub async fn seed_people_in_postgres(
    store: &PostgresRecordStore,
    count: u64,
    buckets: u64,
) -> RelabelResult<()> {
    for index in 0..count {
        store
            .insert(
                vec![PERSON_TAG.to_owned()],
                person_attributes(index, buckets),
            )
            .await?;
    }

    Ok(())
}

/// Counts records by their first tag.
pub fn tag_histogram(records: &[Record]) -> BTreeMap<String, usize> {
    let mut histogram = BTreeMap::new();
    for tag in records.iter().filter_map(Record::first_tag) {
        *histogram.entry(tag.to_owned()).or_insert(0) += 1;
    }

    histogram
}
