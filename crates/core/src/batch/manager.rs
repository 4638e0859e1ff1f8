//! In-memory store of batches started by this process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::config::BatchConfig;
use super::coordinator::BatchCoordinator;
use super::types::BatchSummary;
use crate::pipeline::PipelineRunner;

/// Finished batches kept in memory unless configured otherwise.
pub const DEFAULT_RETAINED_BATCHES: usize = 50;

/// Owns every coordinator created through it, keyed by batch id.
///
/// Finished coordinators stay readable until `retained` newer ones have
/// finished. Older batches are read through the index functions instead.
pub struct BatchManager {
    config: BatchConfig,
    runner: Arc<PipelineRunner>,
    batches: RwLock<HashMap<String, Arc<BatchCoordinator>>>,
    retained: usize,
}

impl BatchManager {
    pub fn new(config: BatchConfig, runner: Arc<PipelineRunner>) -> Self {
        Self {
            config,
            runner,
            batches: RwLock::new(HashMap::new()),
            retained: DEFAULT_RETAINED_BATCHES,
        }
    }

    /// Keep at most `retained` finished batches. Batches that are running
    /// or still have pending items are never evicted.
    pub fn with_retention(mut self, retained: usize) -> Self {
        self.retained = retained;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Create and register a coordinator using the manager's config.
    ///
    /// `max_parallel` overrides the configured bound for this batch only.
    pub async fn create(&self, max_parallel: Option<usize>) -> Arc<BatchCoordinator> {
        let mut config = self.config.clone();
        if let Some(max_parallel) = max_parallel {
            config.max_parallel = max_parallel;
        }
        let coordinator = Arc::new(BatchCoordinator::new(config, Arc::clone(&self.runner)));
        self.insert(Arc::clone(&coordinator)).await;
        coordinator
    }

    /// Register a coordinator built elsewhere, e.g. one with an observer.
    ///
    /// Evicts the oldest finished batches beyond the retention bound.
    pub async fn insert(&self, coordinator: Arc<BatchCoordinator>) {
        let mut batches = self.batches.write().await;

        let mut finished = Vec::new();
        for existing in batches.values() {
            let summary = existing.summary().await;
            let done = summary.completed + summary.failed;
            if !summary.running && summary.total > 0 && done == summary.total {
                finished.push((summary.created_at, summary.batch_id));
            }
        }
        if finished.len() > self.retained {
            finished.sort();
            let excess = finished.len() - self.retained;
            for (_, batch_id) in finished.into_iter().take(excess) {
                batches.remove(&batch_id);
            }
            debug!(evicted = excess, "Evicted finished batches");
        }

        batches.insert(coordinator.batch_id().to_string(), coordinator);
    }

    pub async fn get(&self, batch_id: &str) -> Option<Arc<BatchCoordinator>> {
        self.batches.read().await.get(batch_id).cloned()
    }

    /// Summaries of every registered batch, newest first.
    pub async fn list(&self) -> Vec<BatchSummary> {
        let coordinators: Vec<Arc<BatchCoordinator>> =
            self.batches.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(coordinators.len());
        for coordinator in coordinators {
            summaries.push(coordinator.summary().await);
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }
}
