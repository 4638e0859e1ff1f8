//! Pipeline lifecycle integration tests.
//!
//! These tests drive the pipeline runner end to end against mock services:
//! - Artifacts written per stage and the one-time rename
//! - Stage ordering as seen through progress events
//! - Failure states keeping partial output
//! - Poller bounds and rename collisions

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use forge_core::{
    job::{Job, JobOverrides, JobStage},
    pipeline::{
        read_json, MetadataRecord, PipelineConfig, PipelineRunner, IMAGE_FILE, METADATA_FILE,
        PROMPT_FILE, RESULT_FILE,
    },
    poller::PollerConfig,
    progress::{FnObserver, JobProgress, ProgressReporter},
    services::{ServiceError, TaskStatus},
    testing::{fixtures, MockImageService, MockModelService, MockPromptService},
};

/// Test helper wiring a runner to mocks under a temp directory.
struct TestHarness {
    runner: PipelineRunner,
    prompts: Arc<MockPromptService>,
    images: Arc<MockImageService>,
    models: Arc<MockModelService>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_poller(fixtures::fast_poller())
    }

    fn with_poller(poller: PollerConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let prompts = Arc::new(MockPromptService::new());
        let images = Arc::new(MockImageService::new());
        let models = Arc::new(MockModelService::new());

        let runner = PipelineRunner::new(PipelineConfig::new(temp_dir.path()).with_poller(poller))
            .with_prompt_service(Arc::clone(&prompts) as _)
            .with_image_service(Arc::clone(&images) as _)
            .with_model_service(Arc::clone(&models) as _);

        Self {
            runner,
            prompts,
            images,
            models,
            temp_dir,
        }
    }

    fn output(&self) -> &Path {
        self.temp_dir.path()
    }

    async fn run(&self, description: &str) -> Job {
        self.runner
            .run(description, JobOverrides::default(), ProgressReporter::disabled())
            .await
            .expect("run returned a configuration error")
    }

    async fn run_recorded(&self, description: &str) -> (Job, Vec<JobProgress>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let reporter = ProgressReporter::direct(Arc::new(FnObserver::new(
            move |event: JobProgress| sink.lock().unwrap().push(event),
        )));

        let job = self
            .runner
            .run(description, JobOverrides::default(), reporter)
            .await
            .expect("run returned a configuration error");
        let events = events.lock().unwrap().clone();
        (job, events)
    }

    fn dirs(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.output())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn load_result(dir: &Path) -> Job {
    let text = std::fs::read_to_string(dir.join(RESULT_FILE)).expect("result.json missing");
    serde_json::from_str(&text).expect("result.json unreadable")
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_job_completes_and_renames() {
    let harness = TestHarness::new();
    harness.prompts.set_identifier("chair_oak").await;

    let job = harness.run("Oak dining chair").await;

    assert_eq!(job.stage, JobStage::Completed);
    assert_eq!(job.id, "chair_oak");
    assert_eq!(job.folder_name.as_deref(), Some("chair_oak"));
    assert!(job.is_renamed());
    assert_eq!(job.detected_domain.as_deref(), Some("furniture"));
    assert!(job.completed_at.is_some());
    assert!(job.error.is_none());

    // Only the renamed directory is left.
    assert_eq!(harness.dirs(), vec!["chair_oak".to_string()]);
    let dir = harness.output().join("chair_oak");
    assert_eq!(job.output_dir, dir);
    for file in [PROMPT_FILE, METADATA_FILE, IMAGE_FILE, RESULT_FILE] {
        assert!(dir.join(file).exists(), "{} missing", file);
    }
    assert_eq!(job.image_path, Some(dir.join(IMAGE_FILE)));
    assert_eq!(job.model_files.len(), 1);
    assert_eq!(job.model_files[0].path, dir.join("model").join("model.glb"));

    let metadata: MetadataRecord = read_json(&dir.join(METADATA_FILE)).await.unwrap();
    assert_eq!(metadata.id, "chair_oak");
    assert_eq!(metadata.temp_id, job.temp_id);

    assert_eq!(load_result(&dir), job);
}

#[tokio::test]
async fn test_job_without_identifier_keeps_temp_handle() {
    let harness = TestHarness::new();

    let job = harness.run("something").await;

    assert_eq!(job.stage, JobStage::Completed);
    assert_eq!(job.id, job.temp_id);
    assert_eq!(job.temp_id.len(), 8);
    assert_eq!(harness.dirs(), vec![job.temp_id.clone()]);
}

#[tokio::test]
async fn test_model_request_uses_configured_defaults_and_overrides() {
    let harness = TestHarness::new();
    let overrides = JobOverrides {
        mesh_quality: Some(forge_core::services::MeshQuality::High),
        ..Default::default()
    };

    harness
        .runner
        .run("oak chair", overrides, ProgressReporter::disabled())
        .await
        .unwrap();

    let submissions = harness.models.recorded_submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].quality, forge_core::services::MeshQuality::High);
    assert_eq!(submissions[0].format, forge_core::services::ModelFormat::Glb);
    assert_eq!(
        submissions[0].image,
        MockImageService::image_for("oak chair, studio lighting")
    );
}

// =============================================================================
// Stage ordering
// =============================================================================

#[tokio::test]
async fn test_progress_stages_never_regress() {
    let harness = TestHarness::new();
    harness.prompts.set_identifier("chair_oak").await;

    let (job, events) = harness.run_recorded("oak chair").await;

    assert_eq!(job.stage, JobStage::Completed);
    let stages: Vec<JobStage> = events.iter().map(|e| e.stage).collect();
    for pair in stages.windows(2) {
        assert!(
            pair[0] == pair[1] || pair[0].can_advance_to(pair[1]),
            "stage went from {} to {}",
            pair[0],
            pair[1]
        );
    }
    for stage in [JobStage::Prompt, JobStage::Image, JobStage::Model] {
        assert!(stages.contains(&stage), "no event for {}", stage);
    }
    assert_eq!(stages.last(), Some(&JobStage::Completed));

    // The handle changes once, during the prompt stage.
    let mut ids: Vec<&str> = events.iter().map(|e| e.job_id.as_str()).collect();
    ids.dedup();
    assert_eq!(ids, vec![job.temp_id.as_str(), "chair_oak"]);
    let first_renamed = events.iter().find(|e| e.job_id == "chair_oak").unwrap();
    assert_eq!(first_renamed.stage, JobStage::Prompt);
}

#[tokio::test]
async fn test_poller_status_changes_are_reported() {
    let harness = TestHarness::new();
    harness
        .models
        .set_default_script(vec![
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Running,
            TaskStatus::Succeeded,
        ])
        .await;

    let (job, events) = harness.run_recorded("oak chair").await;

    assert_eq!(job.stage, JobStage::Completed);
    let statuses: Vec<&str> = events
        .iter()
        .filter_map(|e| e.extra.get("status").and_then(|s| s.as_str()))
        .collect();
    assert_eq!(statuses, vec!["pending", "running", "succeeded"]);
    let task_event = events
        .iter()
        .find(|e| e.extra.contains_key("status"))
        .unwrap();
    assert_eq!(task_event.extra["task_id"], "mock-task-1");
    assert!(task_event.extra.contains_key("remaining_secs"));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_model_task_keeps_image() {
    let harness = TestHarness::new();
    harness
        .models
        .set_script_for("lamp", vec![TaskStatus::Running, TaskStatus::Failed])
        .await;

    let job = harness.run("desk lamp").await;

    assert_eq!(job.stage, JobStage::Failed);
    let error = job.error.clone().unwrap();
    assert!(error.contains("failed"), "unexpected error: {}", error);
    assert_eq!(job.task_id.as_deref(), Some("mock-task-1"));
    assert!(job.model_files.is_empty());

    let image = job.image_path.clone().expect("image kept on failure");
    assert!(image.exists());
    assert_eq!(load_result(&job.output_dir), job);
}

#[tokio::test]
async fn test_prompt_failure_writes_result() {
    let harness = TestHarness::new();
    harness
        .prompts
        .fail_for("broken", ServiceError::invalid("empty reply"))
        .await;

    let job = harness.run("a broken chair").await;

    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.prompt.is_none());
    assert!(job.error.unwrap().contains("empty reply"));
    assert_eq!(harness.images.call_count().await, 0);
    assert!(job.output_dir.join(RESULT_FILE).exists());
}

#[tokio::test]
async fn test_submit_failure_keeps_prompt_and_image() {
    let harness = TestHarness::new();
    harness
        .models
        .set_next_submit_error(ServiceError::Api {
            status: 429,
            message: "quota".to_string(),
        })
        .await;

    let job = harness.run("oak chair").await;

    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.prompt.is_some());
    assert!(job.image_path.is_some());
    assert!(job.task_id.is_none());
    assert!(job.error.unwrap().contains("429"));
}

#[tokio::test]
async fn test_unsafe_archive_fails_job() {
    let harness = TestHarness::new();
    harness
        .models
        .set_archive(fixtures::model_archive(&[("../../escape.glb", b"x")]))
        .await;

    let job = harness.run("oak chair").await;

    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.error.unwrap().contains("archive"));
    assert!(!harness.output().join("escape.glb").exists());
}

#[tokio::test]
async fn test_stuck_task_times_out_within_bound() {
    let harness = TestHarness::with_poller(PollerConfig::new(
        Duration::from_millis(300),
        Duration::from_millis(20),
    ));
    harness.models.set_default_script(vec![TaskStatus::Running]).await;

    let started = Instant::now();
    let job = harness.run("oak chair").await;
    let elapsed = started.elapsed();

    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.error.unwrap().contains("timed out"));
    assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    assert!(harness.models.poll_count("mock-task-1").await >= 2);
}

#[tokio::test]
async fn test_missing_service_is_configuration_error() {
    let temp_dir = TempDir::new().unwrap();
    let runner = PipelineRunner::new(PipelineConfig::new(temp_dir.path()))
        .with_prompt_service(Arc::new(MockPromptService::new()));

    let result = runner
        .run("oak chair", JobOverrides::default(), ProgressReporter::disabled())
        .await;

    assert!(matches!(
        result,
        Err(forge_core::PipelineError::Configuration(_))
    ));
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

// =============================================================================
// Identity collisions
// =============================================================================

#[tokio::test]
async fn test_concurrent_jobs_with_same_identifier() {
    let harness = Arc::new(TestHarness::new());
    harness.prompts.set_identifier("chair_oak").await;

    let a = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.run("oak chair").await })
    };
    let b = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move { harness.run("oak chair, darker").await })
    };
    let a = a.await.unwrap();
    let b = b.await.unwrap();

    assert_eq!(a.stage, JobStage::Completed);
    assert_eq!(b.stage, JobStage::Completed);
    let (plain, suffixed) = if a.id == "chair_oak" { (a, b) } else { (b, a) };
    assert_eq!(plain.id, "chair_oak");
    assert_eq!(suffixed.id, format!("chair_oak_{}", &suffixed.temp_id[..4]));
    assert_ne!(plain.output_dir, suffixed.output_dir);

    let mut expected = vec![plain.id.clone(), suffixed.id.clone()];
    expected.sort();
    assert_eq!(harness.dirs(), expected);
}

#[tokio::test]
async fn test_third_collision_fails_job() {
    let harness = TestHarness::new();
    harness.prompts.set_identifier("chair_oak").await;

    // Occupy both the handle and the fallback derived from the pinned temp id.
    std::fs::create_dir_all(harness.output().join("chair_oak")).unwrap();
    std::fs::create_dir_all(harness.output().join("chair_oak_abcd")).unwrap();
    let overrides = JobOverrides {
        temp_id: Some("abcd1234".to_string()),
        ..Default::default()
    };

    let job = harness
        .runner
        .run("oak chair", overrides, ProgressReporter::disabled())
        .await
        .unwrap();

    assert_eq!(job.stage, JobStage::Failed);
    assert!(job.error.as_ref().unwrap().contains("collision"));
    assert_eq!(job.id, "abcd1234");
    assert!(!job.is_renamed());
    assert!(job.output_dir.ends_with("abcd1234"));
}

#[tokio::test]
async fn test_existing_working_dir_is_never_reused() {
    let harness = TestHarness::new();
    let taken = harness.output().join("lamp");
    std::fs::create_dir_all(&taken).unwrap();
    std::fs::write(taken.join(RESULT_FILE), b"{}").unwrap();
    let overrides = JobOverrides {
        working_handle: Some("lamp".to_string()),
        temp_id: Some("beef0001".to_string()),
        ..Default::default()
    };

    let job = harness
        .runner
        .run("desk lamp", overrides, ProgressReporter::disabled())
        .await
        .unwrap();

    assert_eq!(job.stage, JobStage::Completed);
    assert_eq!(job.id, "lamp_beef");
    assert_eq!(job.output_dir, harness.output().join("lamp_beef"));
    assert_eq!(std::fs::read(taken.join(RESULT_FILE)).unwrap(), b"{}");
}
