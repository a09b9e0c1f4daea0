use config::shared::{PageFailureConfig, PipelineConfig};
use relabel::error::ErrorKind;
use relabel::failpoints::{BOUNDED_WORKER__AFTER_TAKE, MUTATE_PAGE__BEFORE_COMMIT};
use relabel::procedures::{run_loop, run_loop_improved};
use relabel::store::memory::MemoryStore;
use relabel::test_utils::failpoints::CustomFailScenario;
use relabel::test_utils::seed::{PERSON_TAG, seed_people};
use telemetry::init_test_tracing;

fn config(page_failure: PageFailureConfig) -> PipelineConfig {
    PipelineConfig {
        page_failure,
        page_delay_ms: 0,
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_before_commit_rolls_back_every_page() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(MUTATE_PAGE__BEFORE_COMMIT, "return(no_retry)")]);

    let store = MemoryStore::new();
    seed_people(&store, 30, 3).await;

    let report = run_loop(store.clone(), 10, &config(PageFailureConfig::Skip))
        .await
        .unwrap();

    assert_eq!(report.pages_committed, 0);
    assert_eq!(report.failures.len(), 3);
    assert!(
        report
            .failures
            .iter()
            .all(|failure| failure.error.kind() == ErrorKind::WithNoRetry)
    );
    assert_eq!(store.count_of(PERSON_TAG).await, 30);
    assert_eq!(store.rollbacks(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failure_before_commit_is_retried() {
    init_test_tracing();
    let _scenario =
        CustomFailScenario::setup(&[(MUTATE_PAGE__BEFORE_COMMIT, "2*return(timed_retry)")]);

    let store = MemoryStore::new();
    seed_people(&store, 30, 3).await;

    let retry = PageFailureConfig::Retry {
        max_attempts: 3,
        delay_ms: 1,
    };
    let report = run_loop_improved(store.clone(), 10, &config(retry))
        .await
        .unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.pages_committed, 3);
    assert_eq!(store.count_of(PERSON_TAG).await, 0);
    assert_eq!(store.rollbacks(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_stops_the_bounded_pipeline() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(MUTATE_PAGE__BEFORE_COMMIT, "return(no_retry)")]);

    let store = MemoryStore::new();
    seed_people(&store, 500, 5).await;

    let err = run_loop_improved(store.clone(), 10, &config(PageFailureConfig::Abort))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PipelineAborted);
    assert!(err.kinds().contains(&ErrorKind::WithNoRetry));
    assert_eq!(store.commits(), 0);
    assert_eq!(store.count_of(PERSON_TAG).await, 500);
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_error_after_take_is_surfaced() {
    init_test_tracing();
    let _scenario =
        CustomFailScenario::setup(&[(BOUNDED_WORKER__AFTER_TAKE, "1*return(no_retry)")]);

    let store = MemoryStore::new();
    seed_people(&store, 50, 5).await;

    let err = run_loop_improved(store.clone(), 10, &config(PageFailureConfig::Skip))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WithNoRetry);
    // The page taken by the failed worker is never processed.
    assert!(store.count_of(PERSON_TAG).await >= 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_panic_after_take_is_surfaced() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(BOUNDED_WORKER__AFTER_TAKE, "1*panic")]);

    let store = MemoryStore::new();
    seed_people(&store, 50, 5).await;

    let err = run_loop_improved(store.clone(), 10, &config(PageFailureConfig::Skip))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WorkerPanic);
    assert!(store.count_of(PERSON_TAG).await >= 10);
}
