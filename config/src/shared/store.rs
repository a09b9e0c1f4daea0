use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Which record store the relabeler operates on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local store, optionally seeded with `seed_records` records tagged `Person`
    /// whose `username` cycles through `seed_buckets` values.
    Memory {
        #[serde(default)]
        seed_records: u64,
        #[serde(default = "default_seed_buckets")]
        seed_buckets: u64,
    },
    /// The `relabel.records` table of a Postgres database.
    Postgres {
        connection: PgConnectionConfig,
        /// Records fetched per round trip by the scan cursor.
        #[serde(default = "default_fetch_size")]
        fetch_size: usize,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl StoreConfig {
    pub const DEFAULT_SEED_BUCKETS: u64 = 10;

    pub const DEFAULT_FETCH_SIZE: usize = 1000;

    pub const DEFAULT_MAX_CONNECTIONS: u32 = 16;

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Memory {
                seed_records,
                seed_buckets,
            } => {
                if *seed_records > 0 && *seed_buckets == 0 {
                    return Err(ValidationError::SeedBucketsZero);
                }
            }
            StoreConfig::Postgres {
                connection,
                fetch_size,
                max_connections,
            } => {
                connection.validate()?;

                if *fetch_size == 0 {
                    return Err(ValidationError::FetchSizeZero);
                }

                if *max_connections == 0 {
                    return Err(ValidationError::MaxConnectionsZero);
                }
            }
        }

        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory {
            seed_records: 0,
            seed_buckets: default_seed_buckets(),
        }
    }
}

fn default_seed_buckets() -> u64 {
    StoreConfig::DEFAULT_SEED_BUCKETS
}

fn default_fetch_size() -> usize {
    StoreConfig::DEFAULT_FETCH_SIZE
}

fn default_max_connections() -> u32 {
    StoreConfig::DEFAULT_MAX_CONNECTIONS
}
