use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use forge_core::services::{IndustryDomain, RenderStyle};
use forge_core::SanitizedConfig;

use crate::metrics::encode_metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Error body shared by every API handler.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

#[derive(Serialize)]
pub struct DomainInfo {
    pub id: &'static str,
    pub keywords: &'static [&'static str],
}

#[derive(Serialize)]
pub struct StyleInfo {
    pub id: &'static str,
    pub hint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Industry domains accepted by `POST /generate`, with detection keywords.
pub async fn list_domains() -> Json<Vec<DomainInfo>> {
    Json(
        IndustryDomain::ALL
            .iter()
            .map(|d| DomainInfo {
                id: d.as_str(),
                keywords: d.keywords(),
            })
            .collect(),
    )
}

pub async fn list_styles() -> Json<Vec<StyleInfo>> {
    Json(
        RenderStyle::ALL
            .iter()
            .map(|s| StyleInfo {
                id: s.as_str(),
                hint: s.hint(),
            })
            .collect(),
    )
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
