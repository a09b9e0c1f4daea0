use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// What a pipeline does with a page whose transaction failed.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PageFailureConfig {
    /// Roll back the page, report it and keep going.
    #[default]
    Skip,
    /// Retry transient failures with a fixed delay, then skip.
    Retry {
        /// Total attempts per page, including the first one.
        max_attempts: u32,
        #[serde(default = "default_retry_delay_ms")]
        delay_ms: u64,
    },
    /// Stop handing out pages after the first failure and fail the run.
    Abort,
}

/// Settings shared by both relabeling pipelines.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    #[serde(default)]
    pub page_failure: PageFailureConfig,
    /// Pause, in milliseconds, a bounded worker takes after each page. Zero disables it.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// How long the unbounded pipeline waits for submitted pages after the scan ends.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl PipelineConfig {
    /// Per-page delay of the bounded pipeline, kept from its original work-cost simulation.
    pub const DEFAULT_PAGE_DELAY_MS: u64 = 1000;

    /// One hour.
    pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 60 * 60 * 1000;

    pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let PageFailureConfig::Retry { max_attempts, .. } = self.page_failure
            && max_attempts == 0
        {
            return Err(ValidationError::RetryMaxAttemptsZero);
        }

        if self.shutdown_timeout_ms == 0 {
            return Err(ValidationError::ShutdownTimeoutZero);
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_failure: PageFailureConfig::default(),
            page_delay_ms: default_page_delay_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_page_delay_ms() -> u64 {
    PipelineConfig::DEFAULT_PAGE_DELAY_MS
}

fn default_shutdown_timeout_ms() -> u64 {
    PipelineConfig::DEFAULT_SHUTDOWN_TIMEOUT_MS
}

fn default_retry_delay_ms() -> u64 {
    PipelineConfig::DEFAULT_RETRY_DELAY_MS
}
