use std::collections::BTreeMap;

use config::load_config;
use config::shared::{PipelineConfig, RelabelerConfig, StoreConfig};
use postgres::db::migrate_records_store;
use relabel::pipeline::RunReport;
use relabel::procedures::{run_loop, run_loop_improved};
use relabel::store::base::RecordStore;
use relabel::store::memory::MemoryStore;
use relabel::store::postgres::PostgresRecordStore;
use relabel::types::USERNAME_ATTRIBUTE;
use serde_json::json;
use tracing::{error, info};

/// Tag given to every record of a seeded memory store.
const SEED_TAG: &str = "Person";

/// Which pipeline relabels the store.
#[derive(Debug, Clone, Copy)]
pub enum Design {
    Unbounded,
    Bounded,
}

// Static dispatch over the store type, the pipelines are generic over it.
macro_rules! run_design_dispatch {
    ($design:expr, $store:expr, $page_size:expr, $pipeline_config:expr) => {{
        match $design {
            Design::Unbounded => run_loop($store, $page_size, $pipeline_config).await,
            Design::Bounded => run_loop_improved($store, $page_size, $pipeline_config).await,
        }
    }};
}

pub async fn start_relabeler(design: Design, page_size: i64) -> anyhow::Result<()> {
    let relabeler_config: RelabelerConfig = load_config()?;
    relabeler_config.validate()?;

    let pipeline_config = &relabeler_config.pipeline;

    let report = match &relabeler_config.store {
        StoreConfig::Memory {
            seed_records,
            seed_buckets,
        } => {
            let store = MemoryStore::new();
            seed_memory_store(&store, *seed_records, *seed_buckets).await;

            let report = run_design(design, store.clone(), page_size, pipeline_config).await?;
            log_tag_counts(store.tag_counts().await);

            report
        }
        StoreConfig::Postgres {
            connection,
            fetch_size,
            max_connections,
        } => {
            migrate_records_store(connection).await?;

            let store =
                PostgresRecordStore::connect(connection, *max_connections, *fetch_size as u64)
                    .await?;

            let report = run_design(design, store.clone(), page_size, pipeline_config).await?;
            log_tag_counts(store.first_tag_counts().await?);

            report
        }
    };

    info!(%report, "relabeling finished");

    // Skipped pages still fail the process.
    report.into_result()?;

    Ok(())
}

async fn run_design<S>(
    design: Design,
    store: S,
    page_size: i64,
    pipeline_config: &PipelineConfig,
) -> anyhow::Result<RunReport>
where
    S: RecordStore,
{
    match run_design_dispatch!(design, store, page_size, pipeline_config) {
        Ok(report) => Ok(report),
        Err(err) => {
            error!(kinds = ?err.kinds(), "relabeling failed");
            Err(err.into())
        }
    }
}

/// Fills the memory store with `count` records tagged [`SEED_TAG`] whose usernames cycle
/// through `buckets` values.
async fn seed_memory_store(store: &MemoryStore, count: u64, buckets: u64) {
    for index in 0..count {
        let attributes = BTreeMap::from([(
            USERNAME_ATTRIBUTE.to_owned(),
            json!(format!("person_{}", index % buckets)),
        )]);

        store.insert(vec![SEED_TAG.to_owned()], attributes).await;
    }

    if count > 0 {
        info!(records = count, buckets, "memory store seeded");
    }
}

fn log_tag_counts<N: std::fmt::Display>(counts: BTreeMap<String, N>) {
    for (tag, count) in counts {
        info!(%tag, %count, "records by tag");
    }
}
