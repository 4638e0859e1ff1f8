//! Drives one job through prompt, image and model stages.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::fs;
use tracing::{debug, error, info, warn};

use super::archive::extract_archive;
use super::artifacts::{
    read_json, write_json, MetadataRecord, PromptRecord, IMAGE_FILE, METADATA_FILE, MODEL_DIR,
    PROMPT_FILE, RESULT_FILE,
};
use super::config::PipelineConfig;
use super::error::PipelineError;
use crate::identity::{sanitize_handle, short_id, JobIdentityManager};
use crate::job::{Job, JobOverrides, JobStage};
use crate::metrics::{EXTERNAL_SERVICE_REQUESTS, JOBS_TOTAL, JOB_DURATION, STAGE_DURATION};
use crate::poller::ExternalTaskPoller;
use crate::progress::{JobProgress, ProgressReporter};
use crate::services::{
    GeneratedPrompt, ImageService, IndustryDomain, Model3DService, PromptRequest, PromptService,
    ServiceError, DEFAULT_NEGATIVE_PROMPT,
};

/// Collaborators resolved for one run.
struct Services {
    prompt: Option<Arc<dyn PromptService>>,
    image: Arc<dyn ImageService>,
    model: Arc<dyn Model3DService>,
}

/// Runs single jobs end to end.
///
/// One runner can drive many jobs concurrently. Jobs that share a base
/// directory also share the runner's [`JobIdentityManager`], which keeps
/// their renames from colliding.
pub struct PipelineRunner {
    config: PipelineConfig,
    prompt_service: Option<Arc<dyn PromptService>>,
    image_service: Option<Arc<dyn ImageService>>,
    model_service: Option<Arc<dyn Model3DService>>,
    identity: Arc<JobIdentityManager>,
    poller: ExternalTaskPoller,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        let poller = ExternalTaskPoller::new(config.poller);
        Self {
            config,
            prompt_service: None,
            image_service: None,
            model_service: None,
            identity: Arc::new(JobIdentityManager::new()),
            poller,
        }
    }

    pub fn with_prompt_service(mut self, service: Arc<dyn PromptService>) -> Self {
        self.prompt_service = Some(service);
        self
    }

    pub fn with_image_service(mut self, service: Arc<dyn ImageService>) -> Self {
        self.image_service = Some(service);
        self
    }

    pub fn with_model_service(mut self, service: Arc<dyn Model3DService>) -> Self {
        self.model_service = Some(service);
        self
    }

    /// Share an identity manager with other runners writing to the same
    /// directories.
    pub fn with_identity_manager(mut self, identity: Arc<JobIdentityManager>) -> Self {
        self.identity = identity;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether a job with `overrides` has every collaborator it needs.
    pub fn ensure_configured(&self, overrides: &JobOverrides) -> Result<(), PipelineError> {
        self.services(overrides).map(|_| ())
    }

    fn services(&self, overrides: &JobOverrides) -> Result<Services, PipelineError> {
        let needs_prompt = custom_prompt(overrides).is_none();
        if needs_prompt && self.prompt_service.is_none() {
            return Err(PipelineError::Configuration(
                "prompt service not configured".to_string(),
            ));
        }
        let image = self.image_service.clone().ok_or_else(|| {
            PipelineError::Configuration("image service not configured".to_string())
        })?;
        let model = self.model_service.clone().ok_or_else(|| {
            PipelineError::Configuration("3D model service not configured".to_string())
        })?;

        Ok(Services {
            prompt: self.prompt_service.clone(),
            image,
            model,
        })
    }

    /// Run one job to a terminal stage.
    ///
    /// Stage failures do not surface as `Err`: the returned job is in the
    /// `failed` stage with `error` set and every field produced before the
    /// failure kept. Only a missing collaborator returns `Err`, before any
    /// directory is created.
    pub async fn run(
        &self,
        description: &str,
        overrides: JobOverrides,
        progress: ProgressReporter<JobProgress>,
    ) -> Result<Job, PipelineError> {
        let services = self.services(&overrides)?;

        let temp_id = overrides.temp_id.clone().unwrap_or_else(short_id);
        let base_dir = overrides
            .base_dir
            .clone()
            .unwrap_or_else(|| self.config.output_dir.clone());
        let handle = overrides
            .working_handle
            .as_deref()
            .map(sanitize_handle)
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| temp_id.clone());

        let mut job = Job::new(temp_id, description, base_dir.join(&handle));
        job.id = handle.clone();

        let started = Instant::now();
        info!(job_id = %job.id, "Starting job");

        let claimed = self.claim_working_dir(&mut job, &base_dir, &handle).await;
        let owns_dir = claimed.is_ok();
        let outcome = match claimed {
            Ok(()) => {
                self.execute(&mut job, &overrides, &services, &progress)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = job.advance(JobStage::Completed) {
                    job.fail(e.to_string());
                }
                info!(
                    job_id = %job.id,
                    files = job.model_files.len(),
                    elapsed_secs = started.elapsed().as_secs(),
                    "Job completed"
                );
            }
            Err(e) => {
                warn!(job_id = %job.id, stage = %job.stage, error = %e, "Job failed");
                job.fail(e.to_string());
            }
        }

        if owns_dir {
            if let Err(e) = write_json(&job.output_dir.join(RESULT_FILE), &job).await {
                error!(job_id = %job.id, error = %e, "Failed to write result record");
            }
        }

        let result = job.stage.as_str();
        JOBS_TOTAL.with_label_values(&[result]).inc();
        JOB_DURATION
            .with_label_values(&[result])
            .observe(started.elapsed().as_secs_f64());

        let message = match &job.error {
            Some(error) => format!("Failed: {}", error),
            None => "Completed".to_string(),
        };
        progress
            .report(event(&job, message).with_extra("files", job.model_files.len()))
            .await;

        Ok(job)
    }

    /// Create a working directory no other job uses.
    ///
    /// On a taken name the job moves to the suffixed fallback.
    async fn claim_working_dir(
        &self,
        job: &mut Job,
        base_dir: &Path,
        handle: &str,
    ) -> Result<(), PipelineError> {
        fs::create_dir_all(base_dir)
            .await
            .map_err(|e| PipelineError::io(base_dir, e))?;
        let claimed = self.identity.claim(base_dir, handle, &job.temp_id).await?;
        job.id = claimed.handle;
        job.output_dir = claimed.path;
        Ok(())
    }

    async fn execute(
        &self,
        job: &mut Job,
        overrides: &JobOverrides,
        services: &Services,
        progress: &ProgressReporter<JobProgress>,
    ) -> Result<(), PipelineError> {
        self.prompt_stage(job, overrides, services.prompt.as_deref(), progress)
            .await?;
        let image = self
            .image_stage(job, &*services.image, progress)
            .await?;
        self.model_stage(job, overrides, &services.model, image, progress)
            .await
    }

    async fn prompt_stage(
        &self,
        job: &mut Job,
        overrides: &JobOverrides,
        service: Option<&dyn PromptService>,
        progress: &ProgressReporter<JobProgress>,
    ) -> Result<(), PipelineError> {
        job.advance(JobStage::Prompt)?;
        progress.report(event(job, "Generating prompt")).await;
        let started = Instant::now();

        let custom = custom_prompt(overrides);
        let generated = match custom {
            Some(prompt) => GeneratedPrompt {
                prompt: prompt.to_string(),
                negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
                analysis: None,
                confidence: None,
                detected_domain: overrides
                    .domain
                    .unwrap_or(IndustryDomain::General)
                    .as_str()
                    .to_string(),
                style: overrides.style.unwrap_or_default().as_str().to_string(),
                suggested_identifier: None,
            },
            None => {
                let service = service.ok_or_else(|| {
                    PipelineError::Configuration("prompt service not configured".to_string())
                })?;
                let request = PromptRequest {
                    description: job.description.clone(),
                    equipment_type: overrides.equipment_type.clone(),
                    voltage_level: overrides.voltage_level.clone(),
                    domain: overrides.domain,
                    style: overrides.style,
                };
                let reply = service.generate(request).await;
                record_call(service.name(), "prompt", &reply);
                reply?
            }
        };

        job.prompt = Some(generated.prompt.clone());
        job.negative_prompt = Some(generated.negative_prompt.clone());
        job.analysis = generated.analysis.clone();
        job.confidence = generated.confidence.clone();
        job.detected_domain = Some(generated.detected_domain.clone());
        job.style = Some(generated.style.clone());

        let record = PromptRecord {
            description: job.description.clone(),
            prompt: generated.prompt,
            negative_prompt: generated.negative_prompt,
            analysis: generated.analysis,
            confidence: generated.confidence,
            detected_domain: generated.detected_domain,
            style: generated.style,
            suggested_identifier: generated.suggested_identifier.clone(),
            custom: custom.is_some(),
            created_at: chrono::Utc::now(),
        };
        write_json(&job.output_dir.join(PROMPT_FILE), &record).await?;

        if let Some(identifier) = generated
            .suggested_identifier
            .as_deref()
            .filter(|s| !s.is_empty())
        {
            let renamed = self
                .identity
                .rename(&job.output_dir, identifier, &job.temp_id)
                .await?;
            debug!(from = %job.id, to = %renamed.handle, "Job renamed");
            job.rename(renamed.handle, renamed.path)?;
        }

        write_json(&job.output_dir.join(METADATA_FILE), &MetadataRecord::from(&*job)).await?;

        STAGE_DURATION
            .with_label_values(&["prompt"])
            .observe(started.elapsed().as_secs_f64());
        progress
            .report(
                event(job, "Prompt ready")
                    .with_extra("prompt", job.prompt.clone().unwrap_or_default())
                    .with_extra("folder_name", job.folder_name.clone()),
            )
            .await;
        Ok(())
    }

    async fn image_stage(
        &self,
        job: &mut Job,
        service: &dyn ImageService,
        progress: &ProgressReporter<JobProgress>,
    ) -> Result<Vec<u8>, PipelineError> {
        job.advance(JobStage::Image)?;
        progress.report(event(job, "Generating image")).await;
        let started = Instant::now();

        let prompt = job.prompt.as_deref().unwrap_or_default();
        let negative = job.negative_prompt.as_deref().unwrap_or_default();
        let reply = service.generate(prompt, negative).await;
        record_call(service.name(), "image", &reply);
        let image = reply?;

        let path = job.output_dir.join(IMAGE_FILE);
        fs::write(&path, &image)
            .await
            .map_err(|e| PipelineError::io(&path, e))?;
        job.image_size_bytes = Some(image.len() as u64);
        job.image_path = Some(path);

        STAGE_DURATION
            .with_label_values(&["image"])
            .observe(started.elapsed().as_secs_f64());
        progress
            .report(event(job, "Image ready").with_extra("image_size_bytes", image.len()))
            .await;
        Ok(image)
    }

    async fn model_stage(
        &self,
        job: &mut Job,
        overrides: &JobOverrides,
        service: &Arc<dyn Model3DService>,
        image: Vec<u8>,
        progress: &ProgressReporter<JobProgress>,
    ) -> Result<(), PipelineError> {
        job.advance(JobStage::Model)?;
        progress.report(event(job, "Submitting 3D task")).await;
        let started = Instant::now();

        let quality = overrides.mesh_quality.unwrap_or(self.config.mesh_quality);
        let format = overrides.model_format.unwrap_or(self.config.model_format);
        let submitted = service.submit(&image, quality, format).await;
        record_call(service.name(), "submit", &submitted);
        let task_id = submitted?;
        job.task_id = Some(task_id.clone());
        info!(job_id = %job.id, task_id = %task_id, "3D task submitted");

        let waiting = event(job, "Waiting for 3D task").with_extra("task_id", task_id.clone());
        let snapshot = self
            .poller
            .wait(
                &task_id,
                |id| {
                    let service = Arc::clone(service);
                    async move { service.status(&id).await }
                },
                |change| {
                    let mut update = waiting.clone();
                    update.message = format!("3D task {}", change.status);
                    update.timestamp = chrono::Utc::now();
                    let update = update
                        .with_extra("status", change.status.as_str())
                        .with_extra("elapsed_secs", change.elapsed.as_secs())
                        .with_extra("remaining_secs", change.remaining.as_secs());
                    let progress = progress.clone();
                    async move { progress.report(update).await }
                },
            )
            .await?;

        progress
            .report(event(job, "Downloading model").with_extra("task_id", task_id.clone()))
            .await;
        let archive = service.fetch_archive(&snapshot.payload).await;
        record_call(service.name(), "download", &archive);

        let model_dir = job.output_dir.join(MODEL_DIR);
        let files = extract_archive(archive?, &model_dir).await?;
        job.model_dir = Some(model_dir);
        job.model_files = files;

        STAGE_DURATION
            .with_label_values(&["model"])
            .observe(started.elapsed().as_secs_f64());
        progress
            .report(event(job, "Model ready").with_extra("files", job.model_files.len()))
            .await;
        Ok(())
    }

    /// Read the result record of a job under the output directory.
    pub async fn get_job(&self, job_id: &str) -> Result<Job, PipelineError> {
        let handle = sanitize_handle(job_id);
        if handle.is_empty() {
            return Err(PipelineError::JobNotFound(job_id.to_string()));
        }
        let path = self.config.output_dir.join(&handle).join(RESULT_FILE);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PipelineError::JobNotFound(job_id.to_string()));
        }
        read_json(&path).await
    }

    /// All job result records under the output directory, newest first.
    ///
    /// Unreadable records are skipped.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, PipelineError> {
        list_results(&self.config.output_dir).await
    }
}

pub(crate) async fn list_results(dir: &Path) -> Result<Vec<Job>, PipelineError> {
    let mut jobs = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(jobs),
        Err(e) => return Err(PipelineError::io(dir, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PipelineError::io(dir, e))?
    {
        let path = entry.path().join(RESULT_FILE);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            continue;
        }
        match read_json::<Job>(&path).await {
            Ok(job) => jobs.push(job),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable result"),
        }
    }

    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(jobs)
}

fn custom_prompt(overrides: &JobOverrides) -> Option<&str> {
    overrides
        .custom_prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

fn event(job: &Job, message: impl Into<String>) -> JobProgress {
    let mut event = JobProgress::new(job.id.clone(), job.stage, message, job.description.clone());
    event.detected_domain = job.detected_domain.clone();
    event.style = job.style.clone();
    event
}

fn record_call<T>(service: &str, operation: &str, result: &Result<T, ServiceError>) {
    let status = if result.is_ok() { "success" } else { "error" };
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, status])
        .inc();
}
