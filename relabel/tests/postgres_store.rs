use config::shared::{IntoConnectOptions, PageFailureConfig, PipelineConfig};
use futures::TryStreamExt;
use relabel::error::ErrorKind;
use relabel::procedures::{run_loop, run_loop_improved};
use relabel::store::{RecordStore, StoreTransaction};
use relabel::test_utils::database::{TEST_FETCH_SIZE, spawn_records_database};
use relabel::test_utils::seed::{PERSON_TAG, relabeled_tag, seed_people_in_postgres};
use relabel::types::{Record, RecordId};
use serde_json::json;
use sqlx::{Connection, PgConnection};
use std::collections::BTreeMap;
use telemetry::init_test_tracing;

fn config() -> PipelineConfig {
    PipelineConfig {
        page_delay_ms: 0,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn scan_walks_every_record_across_fetches() {
    init_test_tracing();
    let (_database, store) = spawn_records_database().await;

    let total = TEST_FETCH_SIZE * 3 + 5;
    seed_people_in_postgres(&store, total, 10).await.unwrap();

    let records: Vec<Record> = store.scan().await.unwrap().try_collect().await.unwrap();
    let ids: Vec<i64> = records.iter().map(|record| record.id.into_inner()).collect();

    assert_eq!(records.len() as u64, total);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(store.count().await.unwrap(), total);
}

#[tokio::test(flavor = "multi_thread")]
async fn scan_ignores_records_inserted_after_it_began() {
    init_test_tracing();
    let (_database, store) = spawn_records_database().await;

    seed_people_in_postgres(&store, 3, 1).await.unwrap();
    let cursor = store.scan().await.unwrap();
    seed_people_in_postgres(&store, 2, 1).await.unwrap();

    let records: Vec<Record> = cursor.try_collect().await.unwrap();
    assert_eq!(records.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn uncommitted_transaction_is_rolled_back() {
    init_test_tracing();
    let (_database, store) = spawn_records_database().await;

    seed_people_in_postgres(&store, 1, 1).await.unwrap();
    {
        let mut transaction = store.begin().await.unwrap();
        transaction.add_tag(RecordId(1), "Other").await.unwrap();
        transaction.remove_tag(RecordId(1), PERSON_TAG).await.unwrap();
    }

    let counts = store.first_tag_counts().await.unwrap();
    assert_eq!(counts, BTreeMap::from([(PERSON_TAG.to_owned(), 1)]));
}

#[tokio::test(flavor = "multi_thread")]
async fn mutating_unknown_record_fails() {
    init_test_tracing();
    let (_database, store) = spawn_records_database().await;

    let mut transaction = store.begin().await.unwrap();
    let err = transaction
        .add_tag(RecordId(42), "Other")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RecordNotFound);
    drop(transaction);
}

#[tokio::test(flavor = "multi_thread")]
async fn both_pipelines_relabel_the_postgres_store() {
    init_test_tracing();

    for bounded in [false, true] {
        let (_database, store) = spawn_records_database().await;
        seed_people_in_postgres(&store, 1000, 10).await.unwrap();

        let report = if bounded {
            run_loop_improved(store.clone(), 100, &config()).await
        } else {
            run_loop(store.clone(), 100, &config()).await
        }
        .unwrap();

        assert_eq!(report.pages_committed, 10);
        assert_eq!(report.records_relabeled, 1000);

        let expected: BTreeMap<String, u64> =
            (0..10).map(|bucket| (relabeled_tag(bucket), 100)).collect();
        assert_eq!(store.first_tag_counts().await.unwrap(), expected);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn record_without_username_rolls_back_its_page() {
    init_test_tracing();
    let (_database, store) = spawn_records_database().await;

    store
        .insert(vec![PERSON_TAG.to_owned()], BTreeMap::new())
        .await
        .unwrap();
    seed_people_in_postgres(&store, 19, 1).await.unwrap();

    let config = PipelineConfig {
        page_failure: PageFailureConfig::Skip,
        ..config()
    };
    let report = run_loop_improved(store.clone(), 10, &config).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error.kind(), ErrorKind::MissingAttribute);
    assert_eq!(
        store.first_tag_counts().await.unwrap(),
        BTreeMap::from([(PERSON_TAG.to_owned(), 10), (relabeled_tag(0), 10)])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn scan_includes_records_with_non_positive_ids() {
    init_test_tracing();
    let (_database, store) = spawn_records_database().await;

    for id in [-5i64, 0] {
        sqlx::query("insert into relabel.records (id, tags, attributes) values ($1, $2, $3)")
            .bind(id)
            .bind(vec![PERSON_TAG.to_owned()])
            .bind(json!({"username": "person_0"}))
            .execute(store.pool())
            .await
            .unwrap();
    }
    seed_people_in_postgres(&store, 3, 1).await.unwrap();

    let records: Vec<Record> = store.scan().await.unwrap().try_collect().await.unwrap();
    let ids: Vec<i64> = records.iter().map(|record| record.id.into_inner()).collect();
    assert_eq!(ids, vec![-5, 0, 1, 2, 3]);

    let report = run_loop(store.clone(), 2, &config()).await.unwrap();
    assert_eq!(report.records_relabeled, 5);
    assert_eq!(
        store.first_tag_counts().await.unwrap(),
        BTreeMap::from([(relabeled_tag(0), 5)])
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_test_database_removes_it() {
    init_test_tracing();
    let (database, _store) = spawn_records_database().await;
    let config = database.config.clone();

    drop(database);

    let mut connection = PgConnection::connect_with(&config.without_db()).await.unwrap();
    let remaining: i64 = sqlx::query_scalar("select count(*) from pg_database where datname = $1")
        .bind(&config.name)
        .fetch_one(&mut connection)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}
