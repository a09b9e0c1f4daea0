use config::shared::PageFailureConfig;
use std::time::Duration;

use crate::error::RelabelError;

/// What a pipeline does with a page whose transaction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageFailurePolicy {
    /// The page is rolled back, reported, and the run continues.
    #[default]
    Skip,
    /// Transient failures are retried after `delay`, up to `max_attempts` attempts in total.
    /// A page still failing afterwards is handled as under [`PageFailurePolicy::Skip`].
    Retry { max_attempts: u32, delay: Duration },
    /// The first failed page shuts the run down and fails it.
    Abort,
}

/// Retry behavior for a failed page attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDirective {
    /// Attempt the page again after the delay.
    Timed(Duration),
    /// Give up on the page.
    NoRetry,
}

impl PageFailurePolicy {
    /// Decides whether the page should be attempted again after `attempt` failed with `error`.
    ///
    /// Attempts are numbered from 1. Record shape errors are never retried since they fail the
    /// same way every time.
    pub fn retry_directive(&self, error: &RelabelError, attempt: u32) -> RetryDirective {
        match *self {
            PageFailurePolicy::Retry {
                max_attempts,
                delay,
            } if attempt < max_attempts && error.is_transient() => RetryDirective::Timed(delay),
            _ => RetryDirective::NoRetry,
        }
    }

    pub fn aborts_run(&self) -> bool {
        matches!(self, PageFailurePolicy::Abort)
    }
}

impl From<&PageFailureConfig> for PageFailurePolicy {
    fn from(config: &PageFailureConfig) -> Self {
        match *config {
            PageFailureConfig::Skip => PageFailurePolicy::Skip,
            PageFailureConfig::Retry {
                max_attempts,
                delay_ms,
            } => PageFailurePolicy::Retry {
                max_attempts,
                delay: Duration::from_millis(delay_ms),
            },
            PageFailureConfig::Abort => PageFailurePolicy::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn err(kind: ErrorKind) -> RelabelError {
        RelabelError::from((kind, "test error"))
    }

    fn retry(max_attempts: u32) -> PageFailurePolicy {
        PageFailurePolicy::Retry {
            max_attempts,
            delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn retries_transient_errors_until_attempts_run_out() {
        let policy = retry(3);
        let error = err(ErrorKind::StoreConnectionFailed);

        assert_eq!(
            policy.retry_directive(&error, 1),
            RetryDirective::Timed(Duration::from_millis(10))
        );
        assert_eq!(
            policy.retry_directive(&error, 2),
            RetryDirective::Timed(Duration::from_millis(10))
        );
        assert_eq!(policy.retry_directive(&error, 3), RetryDirective::NoRetry);
    }

    #[test]
    fn never_retries_record_shape_errors() {
        let policy = retry(5);

        assert_eq!(
            policy.retry_directive(&err(ErrorKind::MissingAttribute), 1),
            RetryDirective::NoRetry
        );
        assert_eq!(
            policy.retry_directive(&err(ErrorKind::MissingTag), 1),
            RetryDirective::NoRetry
        );
    }

    #[test]
    fn skip_and_abort_never_retry() {
        let error = err(ErrorKind::StoreTransactionFailed);

        assert_eq!(
            PageFailurePolicy::Skip.retry_directive(&error, 1),
            RetryDirective::NoRetry
        );
        assert_eq!(
            PageFailurePolicy::Abort.retry_directive(&error, 1),
            RetryDirective::NoRetry
        );
        assert!(PageFailurePolicy::Abort.aborts_run());
        assert!(!PageFailurePolicy::Skip.aborts_run());
    }

    #[test]
    fn builds_from_configuration() {
        let policy = PageFailurePolicy::from(&PageFailureConfig::Retry {
            max_attempts: 4,
            delay_ms: 250,
        });

        assert_eq!(
            policy,
            PageFailurePolicy::Retry {
                max_attempts: 4,
                delay: Duration::from_millis(250),
            }
        );
    }
}
