//! Single job API handlers.

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{error, info, warn};

use forge_core::identity::short_id;
use forge_core::job::{JobEntry, RegistryObserver};
use forge_core::services::{IndustryDomain, MeshQuality, ModelFormat, RenderStyle};
use forge_core::{Job, JobOverrides, JobStage, PipelineError, ProgressReporter};

use super::handlers::{api_error, ApiError};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for starting a job
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    /// Natural-language description of the object
    pub description: String,
    /// Used verbatim instead of generating a prompt
    pub custom_prompt: Option<String>,
    pub equipment_type: Option<String>,
    pub voltage_level: Option<String>,
    pub domain: Option<IndustryDomain>,
    pub style: Option<RenderStyle>,
    pub mesh_quality: Option<MeshQuality>,
    pub model_format: Option<ModelFormat>,
}

impl GenerateBody {
    fn overrides(&self, handle: &str) -> JobOverrides {
        JobOverrides {
            custom_prompt: self.custom_prompt.clone(),
            equipment_type: self.equipment_type.clone(),
            voltage_level: self.voltage_level.clone(),
            domain: self.domain,
            style: self.style,
            mesh_quality: self.mesh_quality,
            model_format: self.model_format,
            temp_id: Some(handle.to_string()),
            ..Default::default()
        }
    }
}

/// Response for a started job
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Handle to poll. Stays valid after the job is renamed.
    pub job_id: String,
    pub status: JobStage,
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a job in the background
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GenerateBody>,
) -> Result<(StatusCode, Json<GenerateResponse>), ApiError> {
    let description = body.description.trim().to_string();
    if description.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "description must not be empty",
        ));
    }

    let handle = short_id();
    let overrides = body.overrides(&handle);
    state
        .runner()
        .ensure_configured(&overrides)
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

    let entry = state.jobs().insert(&handle, &description).await;
    info!(handle = %handle, description = %description, "Job submitted");

    let runner = Arc::clone(state.runner());
    let jobs = Arc::clone(state.jobs());
    tokio::spawn(async move {
        let observer = Arc::new(RegistryObserver::new(Arc::clone(&jobs), handle.clone()));
        let progress = ProgressReporter::direct(observer);
        let outcome = runner.run(&description, overrides, progress).await;
        let job = match outcome {
            Ok(job) => job,
            Err(e) => {
                error!(handle = %handle, error = %e, "Job could not start");
                let mut job = Job::new(
                    handle.clone(),
                    description,
                    runner.config().output_dir.join(&handle),
                );
                job.fail(e.to_string());
                job
            }
        };
        jobs.finish(&handle, job).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            job_id: entry.handle,
            status: entry.stage,
        }),
    ))
}

/// List finished jobs recorded under the output directory
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let jobs = state
        .runner()
        .list_jobs()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(ListJobsResponse {
        total: jobs.len(),
        jobs,
    }))
}

/// Get a job's record by handle or job id
///
/// Jobs started by this process are answered from memory, with the final
/// record once terminal. Anything else is read from its `result.json`.
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    find_job(&state, &id).await.map(Json)
}

async fn find_job(state: &AppState, id: &str) -> Result<Job, ApiError> {
    if let Some(job) = state.jobs().get(id).await.and_then(|e| e.result) {
        return Ok(job);
    }

    match state.runner().get_job(id).await {
        Ok(job) => Ok(job),
        Err(PipelineError::JobNotFound(_)) => {
            if state.jobs().get(id).await.is_some() {
                Err(api_error(
                    StatusCode::NOT_FOUND,
                    format!("Job still running: {}", id),
                ))
            } else {
                Err(api_error(
                    StatusCode::NOT_FOUND,
                    format!("Job not found: {}", id),
                ))
            }
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Download a job's generated image
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let job = find_job(&state, &id).await?;
    let path = job
        .image_path
        .as_deref()
        .filter(|p| p.starts_with(&job.output_dir))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("No image for job: {}", id)))?;
    serve_file(path, request).await
}

/// Download one of a job's extracted model files
///
/// `filename` is the file's path inside the model directory, as listed in
/// the job record. Nothing outside that list is served.
pub async fn get_model_file(
    State(state): State<Arc<AppState>>,
    Path((id, filename)): Path<(String, String)>,
    request: Request,
) -> Result<Response, ApiError> {
    let unsafe_name = filename.contains('\\')
        || filename.split('/').any(|part| part.is_empty() || part == "..");
    if unsafe_name {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid file name: {}", filename),
        ));
    }

    let job = find_job(&state, &id).await?;
    let file = job
        .model_files
        .iter()
        .find(|f| f.name == filename && f.path.starts_with(&job.output_dir))
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                format!("No model file {} for job: {}", filename, id),
            )
        })?;
    serve_file(&file.path, request).await
}

async fn serve_file(path: &std::path::Path, request: Request) -> Result<Response, ApiError> {
    let response = ServeFile::new(path)
        .oneshot(request)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if response.status() == StatusCode::NOT_FOUND {
        warn!(path = %path.display(), "Recorded artifact missing on disk");
    }
    Ok(response.into_response())
}

/// Latest progress of a job started by this process
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobEntry>, ApiError> {
    state
        .jobs()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Job not found: {}", id)))
}
