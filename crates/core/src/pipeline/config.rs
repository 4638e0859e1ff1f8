//! Configuration for the pipeline module.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::poller::PollerConfig;
use crate::services::{MeshQuality, ModelFormat};

/// Runtime configuration for [`PipelineRunner`](super::PipelineRunner).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Default parent of job working directories.
    pub output_dir: PathBuf,
    /// Bounds for waiting on the 3D task.
    pub poller: PollerConfig,
    pub mesh_quality: MeshQuality,
    pub model_format: ModelFormat,
}

impl PipelineConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            poller: PollerConfig::default(),
            mesh_quality: MeshQuality::default(),
            model_format: ModelFormat::default(),
        }
    }

    pub fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            output_dir: config.output.dir.clone(),
            poller: PollerConfig::new(
                Duration::from_secs(config.pipeline.model_timeout_secs),
                Duration::from_secs(config.pipeline.poll_interval_secs),
            ),
            mesh_quality: config.pipeline.mesh_quality,
            model_format: config.pipeline.model_format,
        }
    }
}
