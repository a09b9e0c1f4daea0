use config::shared::{PipelineConfig, validate_page_size};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, RelabelError, RelabelResult};
use crate::mutate::PageMutator;
use crate::pipeline::policy::PageFailurePolicy;
use crate::pipeline::report::{PageOutcome, RunReport};
use crate::pipeline::{conclude, process_page, worker_count};
use crate::relabel_error;
use crate::scan::PagedScanner;
use crate::store::base::RecordStore;

/// Fire-and-forget pipeline: one spawned task per page.
///
/// Tasks are submitted as fast as the scan produces pages. A semaphore with one permit per
/// worker bounds how many pages are mutated at once, but nothing bounds how many pages wait
/// for a permit, so memory grows with the backlog when workers are slower than the scan.
///
/// Once the scan ends the pipeline waits for outstanding pages up to the configured shutdown
/// timeout. When the timeout elapses the remaining tasks are detached and keep running after
/// [`UnboundedPipeline::run`] returns.
#[derive(Debug, Clone)]
pub struct UnboundedPipeline<S> {
    mutator: PageMutator<S>,
    policy: PageFailurePolicy,
    shutdown_timeout: Duration,
    worker_count: usize,
}

impl<S> UnboundedPipeline<S>
where
    S: RecordStore,
{
    pub fn new(store: S, config: &PipelineConfig) -> Self {
        Self {
            mutator: PageMutator::new(store),
            policy: PageFailurePolicy::from(&config.page_failure),
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            worker_count: worker_count(),
        }
    }

    /// Relabels every record of the store in pages of `page_size` records.
    pub async fn run(&self, page_size: i64) -> RelabelResult<RunReport> {
        let page_size = validate_page_size(page_size)?;
        let cursor = self.mutator.store().scan().await?;
        let mut scanner = PagedScanner::with_page_size(cursor, page_size);

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let permits = Arc::new(Semaphore::new(self.worker_count));
        let mut tasks: JoinSet<PageOutcome> = JoinSet::new();
        let mut report = RunReport::new(self.worker_count);
        let mut errors = Vec::new();

        info!(
            worker_count = self.worker_count,
            page_size = page_size.get(),
            "starting unbounded relabeling"
        );

        while let Some(next) = scanner.next_page().await {
            if shutdown_rx.is_shutdown() {
                info!("shutdown requested, no further pages are submitted");
                break;
            }

            let page = match next {
                Ok(page) => page,
                Err(err) => {
                    error!(error = %err, "scan failed, waiting for submitted pages");
                    errors.push(err);
                    break;
                }
            };

            let page_number = page.number;
            let records = page.len();

            let mutator = self.mutator.clone();
            let policy = self.policy;
            let permits = permits.clone();
            let shutdown_tx = shutdown_tx.clone();
            let shutdown_rx = shutdown_rx.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return PageOutcome::Abandoned { page_number };
                };

                if shutdown_rx.is_shutdown() {
                    return PageOutcome::Abandoned { page_number };
                }

                let outcome = process_page(&mutator, &policy, &page).await;
                if let PageOutcome::Failed(_) = outcome {
                    abort_if_required(&policy, &shutdown_tx);
                } else {
                    info!(page_number, records, "processed page");
                }

                outcome
            });

            report.pages_submitted += 1;
            info!(page_number, records, "submitted page");

            // Reap finished tasks so their outcomes do not pile up in the join set.
            while let Some(result) = tasks.try_join_next() {
                absorb(&mut report, &mut errors, result);
            }
        }

        debug!(
            pending = tasks.len(),
            "scan finished, waiting for submitted pages"
        );

        let drained = tokio::time::timeout(
            self.shutdown_timeout,
            drain(&mut tasks, &mut report, &mut errors),
        )
        .await;

        if drained.is_err() {
            let still_running = tasks.len();
            warn!(
                still_running,
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "timed out waiting for submitted pages, leaving them running"
            );
            report.shutdown_timed_out = true;
            tasks.detach_all();
        }

        conclude(report, errors, &self.policy)
    }
}

fn abort_if_required(policy: &PageFailurePolicy, shutdown_tx: &ShutdownTx) {
    if policy.aborts_run() {
        shutdown_tx.shutdown();
    }
}

async fn drain(
    tasks: &mut JoinSet<PageOutcome>,
    report: &mut RunReport,
    errors: &mut Vec<RelabelError>,
) {
    while let Some(result) = tasks.join_next().await {
        absorb(report, errors, result);
    }
}

fn absorb(
    report: &mut RunReport,
    errors: &mut Vec<RelabelError>,
    result: Result<PageOutcome, tokio::task::JoinError>,
) {
    match result {
        Ok(outcome) => report.record(outcome),
        Err(join_err) => {
            if join_err.is_cancelled() {
                debug!("page task was cancelled");
            } else {
                errors.push(relabel_error!(
                    ErrorKind::WorkerPanic,
                    "Page worker panicked",
                    join_err
                ));
            }
        }
    }
}
