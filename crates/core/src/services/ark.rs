//! Ark image-to-3D task client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ServiceError;
use super::traits::Model3DService;
use super::types::{MeshQuality, ModelFormat, TaskSnapshot, TaskStatus};
use crate::config::ArkConfig;

/// Client for the Ark content generation task API.
pub struct ArkModelClient {
    client: reqwest::Client,
    download_client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl ArkModelClient {
    pub fn new(config: &ArkConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::NotConfigured("ark api_key is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Http(e.to_string()))?;
        let download_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(|e| ServiceError::Http(e.to_string()))?;

        Ok(Self {
            client,
            download_client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn tasks_url(&self) -> String {
        format!("{}/contents/generations/tasks", self.api_base)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ArkError>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(ServiceError::Api { status, message })
    }
}

fn task_directive(quality: MeshQuality, format: ModelFormat) -> String {
    format!(
        "--meshquality {} --fileformat {}",
        quality.as_str(),
        format.as_str()
    )
}

fn image_data_url(image: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(image)
    )
}

/// Extracts the archive URL from a succeeded task payload.
pub fn archive_url(payload: &serde_json::Value) -> Option<&str> {
    payload
        .get("content")
        .and_then(|c| c.get("file_url"))
        .and_then(|u| u.as_str())
        .filter(|u| !u.is_empty())
}

#[async_trait]
impl Model3DService for ArkModelClient {
    fn name(&self) -> &str {
        "ark"
    }

    async fn submit(
        &self,
        image: &[u8],
        quality: MeshQuality,
        format: ModelFormat,
    ) -> Result<String, ServiceError> {
        let request = ArkTaskRequest {
            model: self.model.clone(),
            content: vec![
                ArkContent::Text {
                    text: task_directive(quality, format),
                },
                ArkContent::ImageUrl {
                    image_url: ArkImageUrl {
                        url: image_data_url(image),
                    },
                },
            ],
        };

        let response = self
            .client
            .post(self.tasks_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let created: ArkTaskCreated = Self::check(response).await?.json().await?;

        match created.id {
            Some(id) if !id.is_empty() => {
                debug!(task_id = %id, "3D task submitted");
                Ok(id)
            }
            _ => Err(ServiceError::invalid("task creation returned no id")),
        }
    }

    async fn status(&self, task_id: &str) -> Result<TaskSnapshot, ServiceError> {
        let response = self
            .client
            .get(format!("{}/{}", self.tasks_url(), task_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let payload: serde_json::Value = Self::check(response).await?.json().await?;

        let status = payload
            .get("status")
            .and_then(|s| s.as_str())
            .map(TaskStatus::from_api)
            .unwrap_or(TaskStatus::Pending);
        let submitted_at = payload
            .get("created_at")
            .and_then(|t| t.as_i64())
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        Ok(TaskSnapshot {
            task_id: task_id.to_string(),
            status,
            payload,
            submitted_at,
        })
    }

    async fn fetch_archive(&self, payload: &serde_json::Value) -> Result<Vec<u8>, ServiceError> {
        let url = archive_url(payload)
            .ok_or_else(|| ServiceError::invalid("task result has no file_url"))?;

        let response = self.download_client.get(url).send().await?;
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Serialize)]
struct ArkTaskRequest {
    model: String,
    content: Vec<ArkContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ArkContent {
    Text { text: String },
    ImageUrl { image_url: ArkImageUrl },
}

#[derive(Debug, Serialize)]
struct ArkImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ArkTaskCreated {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArkError {
    error: ArkErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ArkErrorDetail {
    message: String,
}
