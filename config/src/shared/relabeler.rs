use serde::Deserialize;

use crate::load::Config;
use crate::shared::{PipelineConfig, StoreConfig, ValidationError};

/// Top-level configuration of the `relabeler` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RelabelerConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl RelabelerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.store.validate()?;
        self.pipeline.validate()
    }
}

impl Config for RelabelerConfig {}
