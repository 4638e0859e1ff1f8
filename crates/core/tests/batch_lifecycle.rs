//! Batch lifecycle integration tests.
//!
//! These tests run whole batches against mock services:
//! - Partial failure leaves other items untouched
//! - Running items never exceed `max_parallel`
//! - Progress snapshots stay consistent mid-run
//! - Panics inside a job fail only that item
//! - The persisted index reflects every item

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use forge_core::{
    batch::{
        batch_models, list_batches, read_index, BatchConfig, BatchCoordinator, BatchProgress,
        ItemStatus, NewBatchItem,
    },
    pipeline::{PipelineConfig, PipelineRunner},
    services::TaskStatus,
    testing::{fixtures, MockImageService, MockModelService, MockPromptService},
};

struct TestHarness {
    prompts: Arc<MockPromptService>,
    images: Arc<MockImageService>,
    models: Arc<MockModelService>,
    runner: Arc<PipelineRunner>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let prompts = Arc::new(MockPromptService::new());
        let images = Arc::new(MockImageService::new());
        let models = Arc::new(MockModelService::new());
        let runner = Arc::new(fixtures::pipeline_runner(
            &temp_dir.path().join("jobs"),
            Arc::clone(&prompts),
            Arc::clone(&images),
            Arc::clone(&models),
        ));

        Self {
            prompts,
            images,
            models,
            runner,
            temp_dir,
        }
    }

    fn batch_output(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("batch")
    }

    fn coordinator(&self, max_parallel: usize) -> BatchCoordinator {
        let config = BatchConfig::new(self.batch_output()).with_max_parallel(max_parallel);
        BatchCoordinator::new(config, Arc::clone(&self.runner))
    }
}

fn items(descriptions: &[&str]) -> Vec<NewBatchItem> {
    descriptions
        .iter()
        .enumerate()
        .map(|(n, d)| NewBatchItem::new(format!("item {}", n + 1), *d))
        .collect()
}

fn assert_consistent(progress: &BatchProgress) {
    let expected = if progress.total > 0 {
        (progress.completed + progress.failed) as f64 / progress.total as f64 * 100.0
    } else {
        0.0
    };
    assert_eq!(progress.progress_percent, expected);
    assert_eq!(
        progress.completed + progress.failed + progress.running + progress.pending,
        progress.total
    );
    assert_eq!(progress.current_items.len(), progress.running);
}

// =============================================================================
// Partial failure
// =============================================================================

#[tokio::test]
async fn test_one_failed_model_task_does_not_affect_others() {
    let harness = TestHarness::new();
    harness
        .models
        .set_script_for("lamp", vec![TaskStatus::Running, TaskStatus::Failed])
        .await;
    let batch = harness.coordinator(2);
    batch
        .add_items(items(&["oak chair", "desk lamp", "steel table"]))
        .await;

    let result = batch.run("furniture").await.unwrap();

    assert_eq!(result.total, 3);
    assert_eq!(result.completed, 2);
    assert_eq!(result.failed, 1);
    let statuses: Vec<ItemStatus> = result.items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![ItemStatus::Completed, ItemStatus::Failed, ItemStatus::Completed]
    );

    let failed = &result.items[1];
    assert!(failed.error.as_deref().unwrap().contains("failed"));
    // Partial output stays inspectable.
    let job = failed.job.as_ref().unwrap();
    assert!(job.image_path.as_ref().unwrap().exists());

    let progress = batch.get_progress().await;
    assert_consistent(&progress);
    assert_eq!(progress.progress_percent, 100.0);
}

#[tokio::test]
async fn test_same_identifier_in_one_batch() {
    let harness = TestHarness::new();
    harness.prompts.set_identifier("chair_oak").await;
    let batch = harness.coordinator(2);
    let added = batch
        .add_items(items(&["oak chair", "another oak chair"]))
        .await;

    let result = batch.run("furniture").await.unwrap();

    assert_eq!(result.completed, 2);
    let ids: HashSet<String> = result
        .items
        .iter()
        .map(|i| i.job.as_ref().unwrap().id.clone())
        .collect();
    assert!(ids.contains("chair_oak"));
    let suffixed: Vec<String> = added
        .iter()
        .map(|i| format!("chair_oak_{}", &i.id[..4]))
        .filter(|h| ids.contains(h))
        .collect();
    assert_eq!(suffixed.len(), 1);

    let batch_dir = harness.batch_output().join(batch.batch_id());
    assert!(batch_dir.join("chair_oak").is_dir());
    assert!(batch_dir.join(&suffixed[0]).is_dir());

    let index = read_index(&harness.batch_output(), batch.batch_id())
        .await
        .unwrap();
    let dirs: HashSet<_> = index.items.iter().map(|i| i.output_dir.clone()).collect();
    assert_eq!(dirs.len(), 2);
}

#[tokio::test]
async fn test_renamed_item_does_not_share_a_later_items_directory() {
    let harness = TestHarness::new();
    harness.prompts.set_identifier("chair_oak").await;
    let config = BatchConfig::new(harness.batch_output())
        .with_max_parallel(1)
        .with_naming_pattern("{name}");
    let batch = BatchCoordinator::new(config, Arc::clone(&harness.runner));
    let added = batch
        .add_items(vec![
            NewBatchItem::new("first", "oak chair"),
            NewBatchItem::new("chair_oak", "pine chair"),
        ])
        .await;

    let result = batch.run("furniture").await.unwrap();

    assert_eq!(result.completed, 2);
    let batch_dir = harness.batch_output().join(batch.batch_id());
    let first = result.items[0].output_location.clone().unwrap();
    let second = result.items[1].output_location.clone().unwrap();
    assert_eq!(first, batch_dir.join("chair_oak"));
    assert_eq!(
        second,
        batch_dir.join(format!("chair_oak_{}", &added[1].id[..4]))
    );
    assert_eq!(result.items[0].job.as_ref().unwrap().output_dir, first);
    assert_eq!(result.items[1].job.as_ref().unwrap().output_dir, second);
    assert!(first.join("model").join("model.glb").exists());
    assert!(second.join("model").join("model.glb").exists());
    // The first job moved away from its planned name.
    assert!(!batch_dir.join("first").exists());

    let index = read_index(&harness.batch_output(), batch.batch_id())
        .await
        .unwrap();
    let dirs: HashSet<_> = index.items.iter().map(|i| i.output_dir.clone()).collect();
    assert_eq!(dirs.len(), 2);
}

// =============================================================================
// Concurrency and progress
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_running_items_bounded_and_snapshots_consistent() {
    let harness = TestHarness::new();
    harness.images.set_delay(Duration::from_millis(40)).await;
    let batch = Arc::new(harness.coordinator(2));
    batch
        .add_items(items(&[
            "oak chair",
            "steel table",
            "leather sofa",
            "pine shelf",
            "glass cabinet",
        ]))
        .await;

    let run = {
        let batch = Arc::clone(&batch);
        tokio::spawn(async move { batch.run("furniture").await })
    };

    let mut samples = 0;
    let mut saw_running = false;
    while !run.is_finished() {
        let progress = batch.get_progress().await;
        assert!(progress.running <= 2, "running = {}", progress.running);
        assert_consistent(&progress);
        saw_running |= progress.running > 0;
        samples += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let result = run.await.unwrap().unwrap();

    assert!(samples > 0);
    assert!(saw_running);
    assert_eq!(result.completed, 5);
    assert!(harness.images.max_concurrent() <= 2);
    assert_eq!(harness.images.max_concurrent(), 2);
}

#[tokio::test]
async fn test_running_item_reports_stage_percent() {
    let harness = TestHarness::new();
    harness.images.set_delay(Duration::from_millis(200)).await;
    let batch = Arc::new(harness.coordinator(1));
    batch.add_items(items(&["oak chair"])).await;

    let run = {
        let batch = Arc::clone(&batch);
        tokio::spawn(async move { batch.run("furniture").await })
    };

    let mut seen_image = false;
    for _ in 0..100 {
        let progress = batch.get_progress().await;
        if let Some(item) = progress.current_items.first() {
            if item.progress_percent == 50 {
                seen_image = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    run.await.unwrap().unwrap();

    assert!(seen_image);
}

// =============================================================================
// Isolation
// =============================================================================

#[tokio::test]
async fn test_panicking_item_is_recorded_and_others_finish() {
    let harness = TestHarness::new();
    harness.images.panic_for("explosive").await;
    let batch = harness.coordinator(2);
    batch
        .add_items(items(&["oak chair", "explosive barrel", "steel table"]))
        .await;

    let result = batch.run("misc").await.unwrap();

    assert_eq!(result.completed, 2);
    assert_eq!(result.failed, 1);
    let failed = &result.items[1];
    assert_eq!(failed.status, ItemStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("panicked"));

    let index = read_index(&harness.batch_output(), batch.batch_id())
        .await
        .unwrap();
    let entry = index.items.iter().find(|i| i.id == failed.id).unwrap();
    assert_eq!(entry.status, ItemStatus::Failed);
    assert!(!entry.error.as_deref().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_misconfigured_runner_fails_every_item() {
    let temp_dir = TempDir::new().unwrap();
    let runner = PipelineRunner::new(PipelineConfig::new(temp_dir.path()));
    let batch = BatchCoordinator::new(
        BatchConfig::new(temp_dir.path().join("batch")).with_max_parallel(2),
        Arc::new(runner),
    );
    batch.add_items(items(&["oak chair", "steel table"])).await;

    let result = batch.run("furniture").await.unwrap();

    assert_eq!(result.failed, 2);
    assert!(result
        .items
        .iter()
        .all(|i| i.error.as_deref().unwrap().contains("misconfigured")));
}

// =============================================================================
// Index
// =============================================================================

#[tokio::test]
async fn test_index_lists_batches_and_models() {
    let harness = TestHarness::new();
    harness
        .models
        .set_script_for("lamp", vec![TaskStatus::Failed])
        .await;

    let first = harness.coordinator(2);
    first.add_items(items(&["oak chair", "desk lamp"])).await;
    first.run("furniture").await.unwrap();

    let second = harness.coordinator(2);
    second.add_items(items(&["steel table"])).await;
    second.run("tables").await.unwrap();

    let batches = list_batches(&harness.batch_output()).await.unwrap();
    let ids: Vec<&str> = batches.iter().map(|b| b.batch_id.as_str()).collect();
    assert_eq!(ids, vec![second.batch_id(), first.batch_id()]);
    assert_eq!(batches[1].item_count, 2);
    assert_eq!(batches[1].failed, 1);

    let models = batch_models(&harness.batch_output(), first.batch_id())
        .await
        .unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].description, "oak chair");
    assert_eq!(models[0].model_files.len(), 1);
    assert!(models[0].model_files[0].path.exists());
}

#[tokio::test]
async fn test_index_can_be_disabled() {
    let harness = TestHarness::new();
    let mut config = BatchConfig::new(harness.batch_output());
    config.create_index = false;
    let batch = BatchCoordinator::new(config, Arc::clone(&harness.runner));
    batch.add_items(items(&["oak chair"])).await;

    let result = batch.run("furniture").await.unwrap();

    assert!(result.index_file.is_none());
    assert!(list_batches(&harness.batch_output()).await.unwrap().is_empty());
}
