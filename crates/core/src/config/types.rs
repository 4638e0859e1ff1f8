use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::services::{MeshQuality, ModelFormat};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub services: ServicesConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Where job and batch artifacts are written
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Single jobs are created directly under this directory.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Each batch gets `<batch_dir>/<batch_id>/`.
    #[serde(default = "default_batch_dir")]
    pub batch_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            batch_dir: default_batch_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output")
}

fn default_batch_dir() -> PathBuf {
    PathBuf::from("./output/batch")
}

/// Per-job pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineSettings {
    /// Upper bound on waiting for the 3D task (default: 900)
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,
    /// Spacing between 3D task status queries (default: 15)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub mesh_quality: MeshQuality,
    #[serde(default)]
    pub model_format: ModelFormat,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            model_timeout_secs: default_model_timeout(),
            poll_interval_secs: default_poll_interval(),
            mesh_quality: MeshQuality::default(),
            model_format: ModelFormat::default(),
        }
    }
}

fn default_model_timeout() -> u64 {
    900
}

fn default_poll_interval() -> u64 {
    15
}

/// Batch execution settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchSettings {
    /// Items run concurrently (default: 3)
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Accepted for compatibility. Items are never retried.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Accepted for compatibility. Items are never retried.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
    #[serde(default = "default_naming_pattern")]
    pub naming_pattern: String,
    #[serde(default = "default_true")]
    pub create_index: bool,
    /// Queue size for batch progress events (default: 64)
    #[serde(default = "default_progress_capacity")]
    pub progress_queue_capacity: usize,
    /// Longest a worker waits on a full progress queue (default: 250)
    #[serde(default = "default_progress_max_block")]
    pub progress_max_block_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            retry_count: default_retry_count(),
            retry_delay_secs: default_retry_delay(),
            naming_pattern: default_naming_pattern(),
            create_index: true,
            progress_queue_capacity: default_progress_capacity(),
            progress_max_block_ms: default_progress_max_block(),
        }
    }
}

fn default_max_parallel() -> usize {
    3
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_delay() -> f64 {
    5.0
}

pub(crate) fn default_naming_pattern() -> String {
    "{category}_{name}_{id}".to_string()
}

fn default_true() -> bool {
    true
}

fn default_progress_capacity() -> usize {
    64
}

fn default_progress_max_block() -> u64 {
    250
}

/// External generation services. A missing section leaves that service
/// unconfigured.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub gemini: Option<GeminiConfig>,
    #[serde(default)]
    pub ark: Option<ArkConfig>,
}

/// Gemini prompt and image generation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_base")]
    pub api_base: String,
    #[serde(default = "default_prompt_model")]
    pub prompt_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    /// Request timeout in seconds (default: 120)
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_gemini_base(),
            prompt_model: default_prompt_model(),
            image_model: default_image_model(),
            timeout_secs: default_gemini_timeout(),
        }
    }
}

fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_prompt_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_image_model() -> String {
    "gemini-2.0-flash-exp-image-generation".to_string()
}

fn default_gemini_timeout() -> u64 {
    120
}

/// Ark image-to-3D task API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArkConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_ark_base")]
    pub api_base: String,
    #[serde(default = "default_ark_model")]
    pub model: String,
    /// Submit and status request timeout in seconds (default: 60)
    #[serde(default = "default_ark_timeout")]
    pub timeout_secs: u64,
    /// Archive download timeout in seconds (default: 120)
    #[serde(default = "default_ark_download_timeout")]
    pub download_timeout_secs: u64,
}

impl Default for ArkConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_ark_base(),
            model: default_ark_model(),
            timeout_secs: default_ark_timeout(),
            download_timeout_secs: default_ark_download_timeout(),
        }
    }
}

fn default_ark_base() -> String {
    "https://ark.cn-beijing.volces.com/api/v3".to_string()
}

fn default_ark_model() -> String {
    "doubao-seed3d-1-0-250928".to_string()
}

fn default_ark_timeout() -> u64 {
    60
}

fn default_ark_download_timeout() -> u64 {
    120
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub output: OutputConfig,
    pub pipeline: PipelineSettings,
    pub batch: BatchSettings,
    pub services: SanitizedServicesConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServicesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini: Option<SanitizedGeminiConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ark: Option<SanitizedArkConfig>,
}

/// Sanitized Gemini config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGeminiConfig {
    pub api_base: String,
    pub prompt_model: String,
    pub image_model: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

/// Sanitized Ark config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedArkConfig {
    pub api_base: String,
    pub model: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
    pub download_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            output: config.output.clone(),
            pipeline: config.pipeline.clone(),
            batch: config.batch.clone(),
            services: SanitizedServicesConfig {
                gemini: config.services.gemini.as_ref().map(|g| SanitizedGeminiConfig {
                    api_base: g.api_base.clone(),
                    prompt_model: g.prompt_model.clone(),
                    image_model: g.image_model.clone(),
                    api_key_configured: !g.api_key.is_empty(),
                    timeout_secs: g.timeout_secs,
                }),
                ark: config.services.ark.as_ref().map(|a| SanitizedArkConfig {
                    api_base: a.api_base.clone(),
                    model: a.model.clone(),
                    api_key_configured: !a.api_key.is_empty(),
                    timeout_secs: a.timeout_secs,
                    download_timeout_secs: a.download_timeout_secs,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.output.dir, PathBuf::from("./output"));
        assert_eq!(config.pipeline.model_timeout_secs, 900);
        assert_eq!(config.pipeline.poll_interval_secs, 15);
        assert_eq!(config.batch.max_parallel, 3);
        assert_eq!(config.batch.naming_pattern, "{category}_{name}_{id}");
        assert!(config.batch.create_index);
        assert!(config.services.gemini.is_none());
    }

    #[test]
    fn test_deserialize_services() {
        let toml = r#"
[pipeline]
mesh_quality = "high"
model_format = "obj"

[services.gemini]
api_key = "g-key"

[services.ark]
api_key = "a-key"
model = "seed3d-test"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.pipeline.mesh_quality, MeshQuality::High);
        assert_eq!(config.pipeline.model_format, ModelFormat::Obj);

        let gemini = config.services.gemini.unwrap();
        assert_eq!(gemini.api_key, "g-key");
        assert_eq!(gemini.prompt_model, "gemini-2.5-flash");

        let ark = config.services.ark.unwrap();
        assert_eq!(ark.model, "seed3d-test");
        assert_eq!(ark.download_timeout_secs, 120);
    }

    #[test]
    fn test_sanitized_config_hides_api_keys() {
        let mut config = Config::default();
        config.services.gemini = Some(GeminiConfig {
            api_key: "secret-gemini".to_string(),
            ..Default::default()
        });
        config.services.ark = Some(ArkConfig::default());

        let sanitized = SanitizedConfig::from(&config);
        let gemini = sanitized.services.gemini.as_ref().unwrap();
        assert!(gemini.api_key_configured);
        assert!(!sanitized.services.ark.as_ref().unwrap().api_key_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-gemini"));
    }
}
