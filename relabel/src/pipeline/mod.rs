//! The two relabeling pipelines and what they share.
//!
//! Both pipelines scan the store into pages and relabel each page in its own transaction on a
//! pool of `worker_count` concurrent workers, where `worker_count` is the hardware parallelism.
//! They differ in how pages reach the workers:
//!
//! - [`unbounded::UnboundedPipeline`] spawns one task per page as soon as the page is read.
//!   Submission never waits, so pages pile up in memory when workers fall behind.
//! - [`bounded::BoundedPipeline`] feeds long-lived workers through a queue holding at most
//!   `worker_count` pages. The scan waits whenever the queue is full.

pub mod bounded;
pub mod policy;
pub mod report;
pub mod unbounded;

pub use bounded::BoundedPipeline;
pub use policy::{PageFailurePolicy, RetryDirective};
pub use report::{PageFailure, PageOutcome, RunReport};
pub use unbounded::UnboundedPipeline;

use std::num::NonZeroUsize;
use tracing::{error, info, warn};

use crate::error::{ErrorKind, RelabelError, RelabelResult};
use crate::mutate::PageMutator;
use crate::relabel_error;
use crate::store::base::RecordStore;
use crate::types::Page;

/// Number of concurrent workers, derived from the available hardware parallelism.
pub fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Relabels `page`, retrying as the policy allows, and reports how it went.
pub(crate) async fn process_page<S>(
    mutator: &PageMutator<S>,
    policy: &PageFailurePolicy,
    page: &Page,
) -> PageOutcome
where
    S: RecordStore,
{
    let mut attempt = 1;

    loop {
        match mutator.mutate(page).await {
            Ok(records) => {
                return PageOutcome::Committed {
                    page_number: page.number,
                    records,
                };
            }
            Err(err) => match policy.retry_directive(&err, attempt) {
                RetryDirective::Timed(delay) => {
                    warn!(
                        page_number = page.number,
                        attempt,
                        error = %err,
                        "page failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDirective::NoRetry => {
                    error!(
                        page_number = page.number,
                        records = page.len(),
                        attempt,
                        error = %err,
                        "page failed, transaction rolled back"
                    );
                    return PageOutcome::Failed(PageFailure {
                        page_number: page.number,
                        records: page.len(),
                        error: err,
                    });
                }
            },
        }
    }
}

/// Turns the final state of a run into its result.
///
/// `errors` holds the failures that always fail the run (scan errors, crashed workers). Under
/// the abort policy, page failures fail the run too.
pub(crate) fn conclude(
    mut report: RunReport,
    mut errors: Vec<RelabelError>,
    policy: &PageFailurePolicy,
) -> RelabelResult<RunReport> {
    report.settle();

    if policy.aborts_run() && !report.failures.is_empty() {
        errors.insert(
            0,
            relabel_error!(
                ErrorKind::PipelineAborted,
                "Relabeling run aborted after a page failure",
                format!(
                    "{} page(s) failed and {} page(s) were abandoned",
                    report.failures.len(),
                    report.pages_abandoned
                )
            ),
        );
        errors.extend(report.failures.iter().map(|failure| failure.error.clone()));
    }

    if !errors.is_empty() {
        error!(%report, "relabeling run failed");
        return Err(errors.into());
    }

    info!(%report, "relabeling run completed");

    Ok(report)
}
