use std::fmt;
use tracing::debug;

use crate::error::{RelabelError, RelabelResult};

/// A page whose transaction did not commit.
#[derive(Debug, Clone)]
pub struct PageFailure {
    pub page_number: u64,
    pub records: usize,
    pub error: RelabelError,
}

/// What happened to a single page handed to a worker.
#[derive(Debug)]
pub enum PageOutcome {
    Committed { page_number: u64, records: usize },
    Failed(PageFailure),
    /// The page was never attempted because the run was shutting down.
    Abandoned { page_number: u64 },
}

/// Summary of a relabeling run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub worker_count: usize,
    pub pages_submitted: u64,
    pub pages_committed: u64,
    pub records_relabeled: u64,
    pub failures: Vec<PageFailure>,
    /// Pages handed off or produced but never committed nor failed.
    pub pages_abandoned: u64,
    /// Highest number of pages observed waiting in the bounded queue.
    pub max_queue_depth: usize,
    /// Set when the unbounded pipeline stopped waiting for its pages.
    pub shutdown_timed_out: bool,
}

impl RunReport {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Committed {
                page_number,
                records,
            } => {
                debug!(page_number, records, "page committed");
                self.pages_committed += 1;
                self.records_relabeled += records as u64;
            }
            PageOutcome::Failed(failure) => self.failures.push(failure),
            PageOutcome::Abandoned { page_number } => {
                debug!(page_number, "page abandoned");
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.pages_abandoned == 0 && !self.shutdown_timed_out
    }

    /// Counts submitted pages that neither committed nor failed as abandoned.
    pub(crate) fn settle(&mut self) {
        let finished = self.pages_committed + self.failures.len() as u64;
        self.pages_abandoned += self.pages_submitted.saturating_sub(finished);
    }

    /// Converts a report with page failures into an error aggregating them.
    pub fn into_result(self) -> RelabelResult<RunReport> {
        if self.failures.is_empty() {
            return Ok(self);
        }

        let errors: Vec<RelabelError> = self
            .failures
            .into_iter()
            .map(|failure| failure.error)
            .collect();

        Err(errors.into())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages submitted, {} committed, {} failed, {} abandoned, {} records relabeled by {} workers",
            self.pages_submitted,
            self.pages_committed,
            self.failures.len(),
            self.pages_abandoned,
            self.records_relabeled,
            self.worker_count
        )
    }
}
