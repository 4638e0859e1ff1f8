//! Bounded-concurrency batch runner.
//!
//! Drives every pending item through its own [`PipelineRunner::run`]:
//! - Scheduling: `max_parallel` workers, each pulling the next pending item
//! - Isolation: each run happens in its own task, so a panic fails only
//!   that item
//! - Progress: item stage and percent follow the runner's progress events

use std::any::Any;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use super::config::BatchConfig;
use super::error::BatchError;
use super::index::{list_batches, write_index};
use super::naming::{assign_location, render_location};
use super::types::{
    stage_percent, BatchIndex, BatchIndexEntry, BatchItem, BatchProgress, BatchResult,
    BatchSummary, IndexConfig, IndexItem, ItemStatus, NewBatchItem,
};
use crate::identity::short_id;
use crate::job::{Job, JobOverrides, JobStage};
use crate::metrics::{BATCHES_TOTAL, BATCH_ITEMS};
use crate::pipeline::PipelineRunner;
use crate::progress::{JobProgress, ProgressObserver, ProgressReporter};
use crate::services::AssociatedItem;

/// Mutable state of a batch. Every read and write goes through one lock.
#[derive(Debug)]
struct BatchState {
    items: Vec<BatchItem>,
    /// Directory names handed out so far.
    locations: HashSet<String>,
    category: Option<String>,
    running: bool,
    created_at: DateTime<Utc>,
}

impl BatchState {
    /// Claim the next pending item and plan its output location.
    ///
    /// The planned name is only a request: the runner claims it on disk and
    /// falls back to a suffixed name if it is taken. Items whose location
    /// cannot be planned are failed on the spot and skipped.
    fn claim_next(&mut self, config: &BatchConfig, batch_dir: &Path) -> Option<usize> {
        let category = self.category.clone().unwrap_or_default();
        let date = Utc::now().date_naive();

        loop {
            let index = self
                .items
                .iter()
                .position(|i| i.status == ItemStatus::Pending)?;
            let item = &self.items[index];

            let location = match &item.output_location {
                Some(location) => Ok(location.clone()),
                None => {
                    let candidate = render_location(
                        &config.naming_pattern,
                        &category,
                        &item.name,
                        &item.id,
                        date,
                    );
                    assign_location(&mut self.locations, candidate, &item.id)
                        .map(|name| batch_dir.join(name))
                }
            };

            let now = Utc::now();
            let item = &mut self.items[index];
            match location {
                Ok(location) => {
                    item.output_location = Some(location);
                    item.status = ItemStatus::Running;
                    item.started_at = Some(now);
                    return Some(index);
                }
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "Could not assign item location");
                    item.status = ItemStatus::Failed;
                    item.error = Some(e.to_string());
                    item.progress_percent = 100;
                    item.completed_at = Some(now);
                    BATCH_ITEMS.with_label_values(&["failed"]).inc();
                }
            }
        }
    }
}

/// Shared pieces every worker needs.
struct WorkerContext {
    batch_id: String,
    batch_dir: PathBuf,
    config: BatchConfig,
    runner: Arc<PipelineRunner>,
    state: Arc<RwLock<BatchState>>,
    progress: ProgressReporter<BatchProgress>,
}

impl WorkerContext {
    async fn snapshot(&self) -> BatchProgress {
        let state = self.state.read().await;
        BatchProgress::from_items(&self.batch_id, &state.items, self.config.max_parallel)
    }

    async fn publish(&self) {
        if self.progress.is_enabled() {
            self.progress.report(self.snapshot().await).await;
        }
    }
}

/// Maps the runner's progress events onto one item.
struct ItemProgress {
    ctx: Arc<WorkerContext>,
    index: usize,
}

#[async_trait]
impl ProgressObserver<JobProgress> for ItemProgress {
    async fn observe(&self, event: JobProgress) {
        {
            let mut state = self.ctx.state.write().await;
            if let Some(item) = state.items.get_mut(self.index) {
                if item.status == ItemStatus::Running {
                    item.current_stage = Some(event.stage);
                    item.progress_percent = stage_percent(event.stage);
                }
            }
        }
        self.ctx.publish().await;
    }
}

/// Runs a set of items with bounded parallelism.
pub struct BatchCoordinator {
    batch_id: String,
    config: BatchConfig,
    runner: Arc<PipelineRunner>,
    state: Arc<RwLock<BatchState>>,
    observer: Option<Arc<dyn ProgressObserver<BatchProgress>>>,
}

impl BatchCoordinator {
    pub fn new(config: BatchConfig, runner: Arc<PipelineRunner>) -> Self {
        Self {
            batch_id: short_id(),
            config,
            runner,
            state: Arc::new(RwLock::new(BatchState {
                items: Vec::new(),
                locations: HashSet::new(),
                category: None,
                running: false,
                created_at: Utc::now(),
            })),
            observer: None,
        }
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Directory holding every item of this batch.
    pub fn batch_dir(&self) -> PathBuf {
        self.config.output_dir.join(&self.batch_id)
    }

    /// Receive a snapshot after every item update.
    ///
    /// Snapshots go through a bounded queue, so a slow observer delays
    /// workers by at most `progress_max_block` per event. Replaces any
    /// earlier observer.
    pub fn set_progress_observer(&mut self, observer: Arc<dyn ProgressObserver<BatchProgress>>) {
        self.observer = Some(observer);
    }

    /// Append items in `pending` status. Nothing runs until [`run`](Self::run).
    pub async fn add_items(&self, items: Vec<NewBatchItem>) -> Vec<BatchItem> {
        let added: Vec<BatchItem> = items.into_iter().map(BatchItem::new).collect();
        let mut state = self.state.write().await;
        state.items.extend(added.iter().cloned());
        debug!(batch_id = %self.batch_id, added = added.len(), total = state.items.len(), "Items added");
        added
    }

    /// Append one pending item per associated variant.
    pub async fn add_from_association(&self, variants: Vec<AssociatedItem>) -> Vec<BatchItem> {
        self.add_items(variants.into_iter().map(NewBatchItem::from).collect())
            .await
    }

    pub async fn items(&self) -> Vec<BatchItem> {
        self.state.read().await.items.clone()
    }

    pub async fn get_progress(&self) -> BatchProgress {
        let state = self.state.read().await;
        BatchProgress::from_items(&self.batch_id, &state.items, self.config.max_parallel)
    }

    pub async fn summary(&self) -> BatchSummary {
        let state = self.state.read().await;
        let progress =
            BatchProgress::from_items(&self.batch_id, &state.items, self.config.max_parallel);
        BatchSummary {
            batch_id: self.batch_id.clone(),
            category: state.category.clone(),
            total: progress.total,
            completed: progress.completed,
            failed: progress.failed,
            progress_percent: progress.progress_percent,
            running: state.running,
            created_at: state.created_at,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.read().await.running
    }

    /// Every batch persisted under this coordinator's output directory,
    /// newest first.
    pub async fn get_index(&self) -> Result<Vec<BatchIndexEntry>, BatchError> {
        list_batches(&self.config.output_dir).await
    }

    /// Run every pending item to a terminal status.
    ///
    /// Item failures, including panics inside the runner, are recorded on
    /// the item and never stop other items. Items are not retried. Only a
    /// concurrent second call, or failing to write the index, returns `Err`.
    pub async fn run(&self, category: &str) -> Result<BatchResult, BatchError> {
        let start_time = Utc::now();
        {
            let mut state = self.state.write().await;
            if state.running {
                return Err(BatchError::AlreadyRunning(self.batch_id.clone()));
            }
            state.running = true;
            state.category = Some(category.to_string());
        }

        let progress = match &self.observer {
            Some(observer) => ProgressReporter::queued(
                Arc::clone(observer),
                self.config.progress_queue_capacity,
                self.config.progress_max_block,
            ),
            None => ProgressReporter::disabled(),
        };
        let ctx = Arc::new(WorkerContext {
            batch_id: self.batch_id.clone(),
            batch_dir: self.batch_dir(),
            config: self.config.clone(),
            runner: Arc::clone(&self.runner),
            state: Arc::clone(&self.state),
            progress,
        });

        let pending = ctx.snapshot().await.pending;
        let workers = self.config.max_parallel.max(1).min(pending);
        info!(
            batch_id = %self.batch_id,
            category = %category,
            items = pending,
            workers,
            "Starting batch"
        );

        let handles: Vec<_> = (0..workers)
            .map(|worker| tokio::spawn(run_worker(Arc::clone(&ctx), worker)))
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(batch_id = %self.batch_id, error = %e, "Batch worker stopped unexpectedly");
            }
        }

        let end_time = Utc::now();
        let (items, created_at) = {
            let mut state = self.state.write().await;
            state.running = false;
            (state.items.clone(), state.created_at)
        };
        ctx.publish().await;

        let completed = items
            .iter()
            .filter(|i| i.status == ItemStatus::Completed)
            .count();
        let failed = items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .count();

        let index_file = if self.config.create_index {
            let index = BatchIndex {
                batch_id: self.batch_id.clone(),
                category: category.to_string(),
                created_at,
                config: IndexConfig {
                    max_parallel: self.config.max_parallel,
                    naming_pattern: self.config.naming_pattern.clone(),
                },
                items: items.iter().map(IndexItem::from).collect(),
            };
            Some(write_index(&self.config.output_dir, &index).await?)
        } else {
            None
        };

        BATCHES_TOTAL.inc();
        let duration_secs = (end_time - start_time).num_milliseconds() as f64 / 1000.0;
        info!(
            batch_id = %self.batch_id,
            completed,
            failed,
            duration_secs,
            "Batch finished"
        );

        Ok(BatchResult {
            batch_id: self.batch_id.clone(),
            category: category.to_string(),
            total: items.len(),
            completed,
            failed,
            items,
            start_time,
            end_time,
            duration_secs,
            output_dir: self.batch_dir(),
            index_file,
        })
    }
}

async fn run_worker(ctx: Arc<WorkerContext>, worker: usize) {
    debug!(batch_id = %ctx.batch_id, worker, "Worker started");

    loop {
        let claimed = {
            let mut state = ctx.state.write().await;
            state
                .claim_next(&ctx.config, &ctx.batch_dir)
                .map(|index| (index, state.items[index].clone()))
        };
        let Some((index, item)) = claimed else {
            break;
        };
        ctx.publish().await;

        let outcome = run_item(&ctx, index, &item).await;
        finish_item(&ctx, index, outcome).await;
        ctx.publish().await;
    }

    debug!(batch_id = %ctx.batch_id, worker, "Worker finished");
}

/// Run one item's job in its own task.
async fn run_item(ctx: &Arc<WorkerContext>, index: usize, item: &BatchItem) -> Result<Job, String> {
    let working_handle = item
        .output_location
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned());
    let overrides = JobOverrides {
        custom_prompt: item.custom_prompt.clone(),
        base_dir: Some(ctx.batch_dir.clone()),
        working_handle,
        temp_id: Some(item.id.clone()),
        ..Default::default()
    };
    let progress = ProgressReporter::direct(Arc::new(ItemProgress {
        ctx: Arc::clone(ctx),
        index,
    }));

    info!(batch_id = %ctx.batch_id, item_id = %item.id, name = %item.name, "Running item");

    let runner = Arc::clone(&ctx.runner);
    let description = item.description.clone();
    let task = tokio::spawn(async move { runner.run(&description, overrides, progress).await });

    match task.await {
        Ok(Ok(job)) => Ok(job),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(join_failure(e)),
    }
}

fn join_failure(e: JoinError) -> String {
    if !e.is_panic() {
        return format!("item task stopped: {}", e);
    }
    let payload: Box<dyn Any + Send> = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("item task panicked: {}", message)
}

async fn finish_item(ctx: &WorkerContext, index: usize, outcome: Result<Job, String>) {
    let mut state = ctx.state.write().await;
    let Some(item) = state.items.get_mut(index) else {
        return;
    };

    if let Ok(job) = &outcome {
        item.output_location = Some(job.output_dir.clone());
    }
    match outcome {
        Ok(job) if job.stage == JobStage::Completed => {
            item.status = ItemStatus::Completed;
            item.current_stage = Some(job.stage);
            item.job = Some(job);
        }
        Ok(job) => {
            item.status = ItemStatus::Failed;
            item.current_stage = Some(job.stage);
            item.error = Some(
                job.error
                    .clone()
                    .unwrap_or_else(|| format!("job ended in stage {}", job.stage)),
            );
            item.job = Some(job);
        }
        Err(error) => {
            item.status = ItemStatus::Failed;
            item.error = Some(error);
        }
    }
    item.progress_percent = 100;
    item.completed_at = Some(Utc::now());

    BATCH_ITEMS.with_label_values(&[item.status.as_str()]).inc();
    match &item.error {
        Some(error) => warn!(
            batch_id = %ctx.batch_id,
            item_id = %item.id,
            error = %error,
            "Item failed"
        ),
        None => info!(batch_id = %ctx.batch_id, item_id = %item.id, "Item completed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockImageService, MockModelService, MockPromptService};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn coordinator(temp: &TempDir, max_parallel: usize) -> BatchCoordinator {
        let runner = fixtures::pipeline_runner(
            &temp.path().join("jobs"),
            Arc::new(MockPromptService::new()),
            Arc::new(MockImageService::new()),
            Arc::new(MockModelService::new()),
        );
        let config = BatchConfig::new(temp.path().join("batch"))
            .with_max_parallel(max_parallel)
            .with_naming_pattern("{category}_{name}");
        BatchCoordinator::new(config, Arc::new(runner))
    }

    #[tokio::test]
    async fn test_add_items_are_pending() {
        let temp = TempDir::new().unwrap();
        let batch = coordinator(&temp, 2);

        let added = batch
            .add_items(vec![
                NewBatchItem::new("chair", "oak chair"),
                NewBatchItem::new("table", "oak table"),
            ])
            .await;

        assert_eq!(added.len(), 2);
        assert!(added.iter().all(|i| i.status == ItemStatus::Pending));
        assert_ne!(added[0].id, added[1].id);
        let progress = batch.get_progress().await;
        assert_eq!(progress.pending, 2);
        assert_eq!(progress.progress_percent, 0.0);
        assert!(!temp.path().join("batch").exists());
    }

    #[tokio::test]
    async fn test_associated_variants_use_their_prompts() {
        let temp = TempDir::new().unwrap();
        let batch = coordinator(&temp, 2);
        let variants = crate::services::parse_association_reply(
            r#"[{"name": "Office chair", "description": "mesh back", "prompt": "mesh office chair"},
                {"name": "Stool", "description": "three legs"}]"#,
        )
        .unwrap();

        let added = batch.add_from_association(variants).await;

        assert_eq!(added.len(), 2);
        assert_eq!(added[0].custom_prompt.as_deref(), Some("mesh office chair"));
        assert!(added[1].custom_prompt.is_none());
        assert_eq!(batch.get_progress().await.pending, 2);

        let result = batch.run("chairs").await.unwrap();
        assert_eq!(result.completed, 2);
        let job = result.items[0].job.as_ref().unwrap();
        assert_eq!(job.prompt.as_deref(), Some("mesh office chair"));
    }

    #[tokio::test]
    async fn test_run_completes_items_and_writes_index() {
        let temp = TempDir::new().unwrap();
        let batch = coordinator(&temp, 2);
        batch
            .add_items(vec![
                NewBatchItem::new("Oak Chair", "oak chair"),
                NewBatchItem::new("Lamp", "desk lamp").with_custom_prompt("brass desk lamp"),
            ])
            .await;

        let result = batch.run("furniture").await.unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.completed, 2);
        assert_eq!(result.failed, 0);
        assert_eq!(result.output_dir, temp.path().join("batch").join(batch.batch_id()));
        let chair = &result.items[0];
        assert_eq!(
            chair.output_location,
            Some(result.output_dir.join("furniture_oak_chair"))
        );
        let job = chair.job.as_ref().unwrap();
        assert_eq!(job.temp_id, chair.id);
        assert!(job.output_dir.join("model").join("model.glb").exists());
        assert!(result.items.iter().all(|i| i.progress_percent == 100));

        let index_file = result.index_file.unwrap();
        assert!(index_file.exists());
        assert!(!batch.is_running().await);
    }

    #[tokio::test]
    async fn test_get_index_lists_finished_batch() {
        let temp = TempDir::new().unwrap();
        let batch = coordinator(&temp, 1);
        assert!(batch.get_index().await.unwrap().is_empty());

        batch
            .add_items(vec![NewBatchItem::new("chair", "oak chair")])
            .await;
        batch.run("furniture").await.unwrap();

        let index = batch.get_index().await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[0].batch_id, batch.batch_id());
        assert_eq!(index[0].category, "furniture");
        assert_eq!(index[0].completed, 1);
    }

    #[tokio::test]
    async fn test_duplicate_names_get_suffix() {
        let temp = TempDir::new().unwrap();
        let batch = coordinator(&temp, 1);
        let added = batch
            .add_items(vec![
                NewBatchItem::new("chair", "oak chair"),
                NewBatchItem::new("chair", "pine chair"),
            ])
            .await;

        let result = batch.run("f").await.unwrap();

        let names: Vec<String> = result
            .items
            .iter()
            .map(|i| {
                i.output_location
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names[0], "f_chair");
        assert_eq!(names[1], format!("f_chair_{}", &added[1].id[..4]));
        assert_eq!(result.completed, 2);
    }

    #[tokio::test]
    async fn test_second_run_only_picks_new_items() {
        let temp = TempDir::new().unwrap();
        let batch = coordinator(&temp, 2);
        batch.add_items(vec![NewBatchItem::new("a", "oak chair")]).await;
        batch.run("f").await.unwrap();

        batch.add_items(vec![NewBatchItem::new("b", "oak table")]).await;
        let result = batch.run("f").await.unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.completed, 2);
    }

    #[tokio::test]
    async fn test_observer_sees_final_snapshot() {
        let temp = TempDir::new().unwrap();
        let mut batch = coordinator(&temp, 2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        batch.set_progress_observer(Arc::new(crate::progress::FnObserver::new(
            move |p: BatchProgress| seen_clone.lock().unwrap().push(p),
        )));
        batch
            .add_items(vec![NewBatchItem::new("a", "oak chair")])
            .await;

        batch.run("f").await.unwrap();

        // The dispatcher drains in the background.
        for _ in 0..100 {
            if seen.lock().unwrap().last().is_some_and(|p| p.is_finished()) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|p| p.batch_id == batch.batch_id()));
        assert_eq!(seen.last().unwrap().completed, 1);
    }

    #[test]
    fn test_join_failure_message() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let err = rt
            .block_on(tokio::spawn(async { panic!("boom") }))
            .unwrap_err();
        assert_eq!(join_failure(err), "item task panicked: boom");
    }
}
