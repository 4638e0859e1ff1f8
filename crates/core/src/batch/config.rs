//! Configuration for the batch module.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// Runtime configuration for [`BatchCoordinator`](super::BatchCoordinator).
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Parent of every batch directory.
    pub output_dir: PathBuf,
    /// Upper bound on items running at once.
    pub max_parallel: usize,
    /// Kept so persisted configs still load. Never consulted.
    pub retry_count: u32,
    /// Kept so persisted configs still load. Never consulted.
    pub retry_delay_secs: f64,
    /// Item directory template. Placeholders: `{category}`, `{name}`,
    /// `{id}`, `{date}`.
    pub naming_pattern: String,
    /// Write `index.json` when the batch finishes.
    pub create_index: bool,
    pub progress_queue_capacity: usize,
    pub progress_max_block: Duration,
}

impl BatchConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_parallel: 3,
            retry_count: 2,
            retry_delay_secs: 5.0,
            naming_pattern: crate::config::default_naming_pattern(),
            create_index: true,
            progress_queue_capacity: 64,
            progress_max_block: Duration::from_millis(250),
        }
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_naming_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.naming_pattern = pattern.into();
        self
    }
}

impl From<&Config> for BatchConfig {
    fn from(config: &Config) -> Self {
        let batch = &config.batch;
        Self {
            output_dir: config.output.batch_dir.clone(),
            max_parallel: batch.max_parallel,
            retry_count: batch.retry_count,
            retry_delay_secs: batch.retry_delay_secs,
            naming_pattern: batch.naming_pattern.clone(),
            create_index: batch.create_index,
            progress_queue_capacity: batch.progress_queue_capacity,
            progress_max_block: Duration::from_millis(batch.progress_max_block_ms),
        }
    }
}
