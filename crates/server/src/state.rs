use std::sync::Arc;

use forge_core::{
    AssociationService, BatchManager, Config, JobRegistry, ModelLibrary, PipelineRunner,
    SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    runner: Arc<PipelineRunner>,
    jobs: Arc<JobRegistry>,
    batches: BatchManager,
    library: ModelLibrary,
    associations: Option<Arc<dyn AssociationService>>,
}

impl AppState {
    pub fn new(config: Config, runner: Arc<PipelineRunner>, batches: BatchManager) -> Self {
        let library = ModelLibrary::new(
            runner.config().output_dir.clone(),
            batches.config().output_dir.clone(),
        );
        Self {
            config,
            runner,
            jobs: Arc::new(JobRegistry::new()),
            batches,
            library,
            associations: None,
        }
    }

    /// Enable association-seeded batches.
    pub fn with_association_service(mut self, service: Arc<dyn AssociationService>) -> Self {
        self.associations = Some(service);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn runner(&self) -> &Arc<PipelineRunner> {
        &self.runner
    }

    /// Jobs started through `POST /generate`.
    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    pub fn batches(&self) -> &BatchManager {
        &self.batches
    }

    pub fn library(&self) -> &ModelLibrary {
        &self.library
    }

    pub fn associations(&self) -> Option<&Arc<dyn AssociationService>> {
        self.associations.as_ref()
    }
}
