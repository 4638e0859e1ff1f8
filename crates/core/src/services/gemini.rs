//! Gemini client for prompt, image and association generation.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::association::{parse_association_reply, AssociatedItem, AssociationRequest};
use super::error::ServiceError;
use super::prompt_parser::parse_prompt_reply;
use super::traits::{AssociationService, ImageService, PromptService};
use super::types::{GeneratedPrompt, PromptRequest};
use crate::config::GeminiConfig;

/// Gemini `generateContent` client.
///
/// One instance serves the prompt stage and category association (text
/// model) as well as the image stage (image model).
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    prompt_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, ServiceError> {
        if config.api_key.trim().is_empty() {
            return Err(ServiceError::NotConfigured(
                "gemini api_key is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            prompt_model: config.prompt_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    async fn generate_content(
        &self,
        model: &str,
        text: String,
        modalities: Option<Vec<&'static str>>,
    ) -> Result<GeminiResponse, ServiceError> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiRequestPart { text }],
            }],
            generation_config: modalities.map(|m| GenerationConfig {
                response_modalities: m,
            }),
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.api_base, model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(ServiceError::Api { status, message });
        }

        response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

fn build_meta_prompt(request: &PromptRequest) -> String {
    let domain = request.effective_domain();
    let style = request.style.unwrap_or_default();

    let mut context = format!("- Domain: {}\n- Target Style: {}\n", domain, style.hint());
    if let Some(ref equipment) = request.equipment_type {
        context.push_str(&format!("- Equipment Type: {}\n", equipment));
    }
    if let Some(ref voltage) = request.voltage_level {
        context.push_str(&format!("- Voltage Level: {}\n", voltage));
    }

    format!(
        "You write prompts for an image model whose output is converted into a 3D asset.\n\
         Describe a single object, centered, full view, neutral background.\n\n\
         ## Description\n{}\n\n## Context\n{}\n\
         Answer with these labelled sections, each on its own line:\n\
         ANALYSIS: <short analysis of the object>\n\
         PROMPT: <English image prompt>\n\
         NEGATIVE: <comma separated negative prompt>\n\
         CONFIDENCE: <HIGH|MEDIUM|LOW>\n\
         FOLDER: <short snake_case english identifier, e.g. chair_oak>\n",
        request.description, context
    )
}

#[async_trait]
impl PromptService for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: PromptRequest) -> Result<GeneratedPrompt, ServiceError> {
        let domain = request.effective_domain();
        let style = request.style.unwrap_or_default();

        let response = self
            .generate_content(&self.prompt_model, build_meta_prompt(&request), None)
            .await?;

        let text = response.text();
        debug!(model = %self.prompt_model, chars = text.len(), "Prompt reply received");
        parse_prompt_reply(&text, domain, style)
    }
}

#[async_trait]
impl AssociationService for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn associate(
        &self,
        request: &AssociationRequest,
    ) -> Result<Vec<AssociatedItem>, ServiceError> {
        let response = self
            .generate_content(&self.prompt_model, request.to_prompt(), None)
            .await?;

        let text = response.text();
        let mut items = parse_association_reply(&text)?;
        items.truncate(request.count);
        debug!(
            category = %request.category,
            requested = request.count,
            received = items.len(),
            "Association reply received"
        );
        Ok(items)
    }
}

#[async_trait]
impl ImageService for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        negative_prompt: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        let mut text = prompt.to_string();
        if !negative_prompt.is_empty() {
            text.push_str(&format!("\n\nNegative: {}", negative_prompt));
        }

        let response = self
            .generate_content(&self.image_model, text, Some(vec!["IMAGE", "TEXT"]))
            .await?;

        let data = response
            .inline_data()
            .ok_or_else(|| ServiceError::invalid("reply contains no image"))?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| ServiceError::InvalidResponse(format!("image is not base64: {}", e)))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

#[derive(Debug, Serialize)]
struct GeminiRequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponsePart {
    text: Option<String>,
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Deserialize)]
struct GeminiInlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

impl GeminiResponse {
    fn parts(&self) -> impl Iterator<Item = &GeminiResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter())
            .into_iter()
            .flatten()
    }

    fn text(&self) -> String {
        self.parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    fn inline_data(&self) -> Option<&str> {
        self.parts()
            .find_map(|p| p.inline_data.as_ref().map(|d| d.data.as_str()))
    }
}
