use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, RelabelError, RelabelResult};

/// Fires after a page's tag changes are staged and before its transaction commits.
pub const MUTATE_PAGE__BEFORE_COMMIT: &str = "mutate_page.before_commit";
/// Fires right after a bounded worker takes a page from the queue.
pub const BOUNDED_WORKER__AFTER_TAKE: &str = "bounded_worker.after_take";

/// Returns an error when the failpoint `name` is configured with `return`.
///
/// The optional parameter picks the error kind: `no_retry` (default) or `timed_retry`.
pub fn relabel_fail_point(name: &str) -> RelabelResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("timed_retry") => ErrorKind::WithTimedRetry,
            _ => ErrorKind::WithNoRetry,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
