use config::shared::{PipelineConfig, validate_page_size};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, RelabelResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{BOUNDED_WORKER__AFTER_TAKE, relabel_fail_point};
use crate::mutate::PageMutator;
use crate::pipeline::policy::PageFailurePolicy;
use crate::pipeline::report::{PageOutcome, RunReport};
use crate::pipeline::{conclude, process_page, worker_count};
use crate::relabel_error;
use crate::scan::PagedScanner;
use crate::store::base::RecordStore;
use crate::types::Page;

/// Receiving end of the page queue, shared by every worker.
type SharedPageRx = Arc<Mutex<mpsc::Receiver<Page>>>;

/// Backpressure pipeline: long-lived workers fed through a bounded queue.
///
/// The queue holds at most `worker_count` pages, so the scan never runs further ahead of the
/// workers than that. End of stream is signaled by closing the queue: a worker exits once the
/// queue is both closed and empty, which means no page handed to the queue is left behind on
/// the fault-free path.
///
/// [`BoundedPipeline::run`] returns only after every worker has exited.
#[derive(Debug, Clone)]
pub struct BoundedPipeline<S> {
    mutator: PageMutator<S>,
    policy: PageFailurePolicy,
    page_delay: Duration,
    worker_count: usize,
}

impl<S> BoundedPipeline<S>
where
    S: RecordStore,
{
    pub fn new(store: S, config: &PipelineConfig) -> Self {
        Self {
            mutator: PageMutator::new(store),
            policy: PageFailurePolicy::from(&config.page_failure),
            page_delay: Duration::from_millis(config.page_delay_ms),
            worker_count: worker_count(),
        }
    }

    /// Relabels every record of the store in pages of `page_size` records.
    pub async fn run(&self, page_size: i64) -> RelabelResult<RunReport> {
        let page_size = validate_page_size(page_size)?;
        let cursor = self.mutator.store().scan().await?;
        let mut scanner = PagedScanner::with_page_size(cursor, page_size);

        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();
        let (page_tx, page_rx) = mpsc::channel::<Page>(self.worker_count);
        let page_rx: SharedPageRx = Arc::new(Mutex::new(page_rx));

        info!(
            worker_count = self.worker_count,
            page_size = page_size.get(),
            page_delay_ms = self.page_delay.as_millis() as u64,
            "starting bounded relabeling"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.worker_count {
            let worker = BoundedWorker {
                id: worker_id,
                mutator: self.mutator.clone(),
                policy: self.policy,
                page_delay: self.page_delay,
                page_rx: page_rx.clone(),
                shutdown_tx: shutdown_tx.clone(),
                shutdown_rx: shutdown_tx.subscribe(),
            };
            workers.spawn(worker.run());
        }
        // Only the workers may keep the queue open, so it closes if all of them die.
        drop(page_rx);

        let mut report = RunReport::new(self.worker_count);
        let mut errors = Vec::new();

        loop {
            let next = tokio::select! {
                biased;

                _ = shutdown_rx.wait() => {
                    info!("shutdown requested, no further pages are queued");
                    break;
                }
                next = scanner.next_page() => next,
            };

            let page = match next {
                Some(Ok(page)) => page,
                Some(Err(err)) => {
                    error!(error = %err, "scan failed, draining queued pages");
                    errors.push(err);
                    break;
                }
                None => break,
            };

            let page_number = page.number;
            let records = page.len();

            let sent = tokio::select! {
                biased;

                _ = shutdown_rx.wait() => {
                    info!(page_number, "shutdown requested while queueing page");
                    report.pages_abandoned += 1;
                    break;
                }
                sent = page_tx.send(page) => sent,
            };

            if sent.is_err() {
                error!(page_number, "every worker has exited, stopping the scan");
                report.pages_abandoned += 1;
                break;
            }

            report.pages_submitted += 1;

            let queue_depth = page_tx.max_capacity() - page_tx.capacity();
            report.max_queue_depth = report.max_queue_depth.max(queue_depth);

            info!(page_number, records, queue_depth, "submitted page");
        }

        // Closing the queue is the end-of-stream signal.
        drop(page_tx);

        while let Some(result) = workers.join_next().await {
            match result {
                Ok((worker_id, outcomes, result)) => {
                    for outcome in outcomes {
                        report.record(outcome);
                    }

                    if let Err(err) = result {
                        error!(worker_id, error = %err, "worker exited with error");
                        errors.push(err);
                    }
                }
                Err(join_err) => {
                    if join_err.is_cancelled() {
                        debug!("worker task was cancelled");
                    } else {
                        errors.push(relabel_error!(
                            ErrorKind::WorkerPanic,
                            "Bounded worker panicked",
                            join_err
                        ));
                    }
                }
            }
        }

        conclude(report, errors, &self.policy)
    }
}

/// A worker of the bounded pipeline.
struct BoundedWorker<S> {
    id: usize,
    mutator: PageMutator<S>,
    policy: PageFailurePolicy,
    page_delay: Duration,
    page_rx: SharedPageRx,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<S> BoundedWorker<S>
where
    S: RecordStore,
{
    /// Takes pages until the queue is closed and drained, or the run shuts down.
    ///
    /// Returns the outcome of every page it took. An error ends the worker early; the page it
    /// was holding is neither committed nor failed and is later counted as abandoned.
    async fn run(mut self) -> (usize, Vec<PageOutcome>, RelabelResult<()>) {
        let mut outcomes = Vec::new();
        debug!(worker_id = self.id, "worker started");

        loop {
            let Some(page) = self.take().await else {
                break;
            };

            #[cfg(feature = "failpoints")]
            if let Err(err) = relabel_fail_point(BOUNDED_WORKER__AFTER_TAKE) {
                return (self.id, outcomes, Err(err));
            }

            let outcome = process_page(&self.mutator, &self.policy, &page).await;
            match outcome {
                PageOutcome::Failed(_) => {
                    outcomes.push(outcome);
                    if self.policy.aborts_run() {
                        self.shutdown_tx.shutdown();
                        break;
                    }
                }
                _ => {
                    info!(
                        worker_id = self.id,
                        page_number = page.number,
                        records = page.len(),
                        "processed page"
                    );
                    outcomes.push(outcome);
                }
            }

            self.pause().await;
        }

        debug!(worker_id = self.id, "worker stopped");

        (self.id, outcomes, Ok(()))
    }

    /// Waits for the next page. Returns `None` once the queue is closed and empty, or on
    /// shutdown.
    async fn take(&mut self) -> Option<Page> {
        let mut page_rx = tokio::select! {
            biased;

            _ = self.shutdown_rx.wait() => return None,
            page_rx = self.page_rx.lock() => page_rx,
        };

        tokio::select! {
            biased;

            _ = self.shutdown_rx.wait() => None,
            page = page_rx.recv() => page,
        }
    }

    async fn pause(&mut self) {
        if self.page_delay.is_zero() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.page_delay) => {}
            _ = self.shutdown_rx.wait() => {}
        }
    }
}
