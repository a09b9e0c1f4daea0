//! Entry points invoked by the host, one per pipeline design.
//!
//! Both take the store to relabel and the page size supplied by the caller. Configuration and
//! page size are validated before the store is touched.

use config::shared::{PipelineConfig, validate_page_size};
use tracing::info;

use crate::error::RelabelResult;
use crate::pipeline::{BoundedPipeline, RunReport, UnboundedPipeline};
use crate::store::base::RecordStore;

/// Relabels the whole store with the fire-and-forget pipeline.
///
/// Per-page failures are reported in the returned [`RunReport`] unless the failure policy is
/// `abort`. When the shutdown timeout elapses the call returns while pages may still be
/// running, see [`RunReport::shutdown_timed_out`].
pub async fn run_loop<S>(
    store: S,
    page_size: i64,
    config: &PipelineConfig,
) -> RelabelResult<RunReport>
where
    S: RecordStore,
{
    config.validate()?;
    validate_page_size(page_size)?;

    let records = store.count().await?;
    info!(records, page_size, "relabeling with unbounded pipeline");

    UnboundedPipeline::new(store, config).run(page_size).await
}

/// Relabels the whole store with the bounded backpressure pipeline.
///
/// Returns only after every worker has exited.
pub async fn run_loop_improved<S>(
    store: S,
    page_size: i64,
    config: &PipelineConfig,
) -> RelabelResult<RunReport>
where
    S: RecordStore,
{
    config.validate()?;
    validate_page_size(page_size)?;

    let records = store.count().await?;
    info!(records, page_size, "relabeling with bounded pipeline");

    BoundedPipeline::new(store, config).run(page_size).await
}
