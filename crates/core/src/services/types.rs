//! Types shared by the generation service contracts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Negative prompt used when the caller supplies its own prompt.
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "cartoon, anime, stylized, fantasy, damaged, rusty, low quality, blurry";

/// Industry domain a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndustryDomain {
    PowerGrid,
    Manufacturing,
    Architecture,
    Automotive,
    Aerospace,
    Medical,
    Robotics,
    Furniture,
    Electronics,
    General,
}

impl IndustryDomain {
    pub const ALL: [IndustryDomain; 10] = [
        IndustryDomain::PowerGrid,
        IndustryDomain::Manufacturing,
        IndustryDomain::Architecture,
        IndustryDomain::Automotive,
        IndustryDomain::Aerospace,
        IndustryDomain::Medical,
        IndustryDomain::Robotics,
        IndustryDomain::Furniture,
        IndustryDomain::Electronics,
        IndustryDomain::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndustryDomain::PowerGrid => "power_grid",
            IndustryDomain::Manufacturing => "manufacturing",
            IndustryDomain::Architecture => "architecture",
            IndustryDomain::Automotive => "automotive",
            IndustryDomain::Aerospace => "aerospace",
            IndustryDomain::Medical => "medical",
            IndustryDomain::Robotics => "robotics",
            IndustryDomain::Furniture => "furniture",
            IndustryDomain::Electronics => "electronics",
            IndustryDomain::General => "general",
        }
    }

    /// Keywords used for domain detection.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            IndustryDomain::PowerGrid => &[
                "transformer",
                "circuit breaker",
                "insulator",
                "busbar",
                "switchgear",
                "substation",
                "变压器",
                "断路器",
                "绝缘子",
                "电网",
            ],
            IndustryDomain::Manufacturing => &[
                "cnc machine",
                "assembly line",
                "conveyor",
                "press machine",
                "机床",
                "生产线",
            ],
            IndustryDomain::Architecture => &["building", "facade", "interior", "structure", "建筑"],
            IndustryDomain::Automotive => &["car", "vehicle", "engine", "chassis", "suspension", "汽车"],
            IndustryDomain::Aerospace => &["aircraft", "satellite", "rocket", "drone", "飞机", "卫星"],
            IndustryDomain::Medical => &[
                "mri",
                "surgical robot",
                "prosthetic",
                "diagnostic",
                "implant",
                "医疗",
            ],
            IndustryDomain::Robotics => &["robot", "actuator", "gripper", "机器人", "机械臂"],
            IndustryDomain::Furniture => &[
                "chair", "table", "sofa", "cabinet", "shelf", "椅子", "桌子", "沙发",
            ],
            IndustryDomain::Electronics => &["device", "circuit", "display", "module", "电子", "电路"],
            IndustryDomain::General => &[],
        }
    }

    /// Detects the most likely domain by keyword score.
    ///
    /// Ties resolve to the domain listed first; no match yields `General`.
    pub fn detect(description: &str) -> IndustryDomain {
        let lower = description.to_lowercase();
        let mut best = (IndustryDomain::General, 0usize);

        for domain in Self::ALL {
            let score = domain
                .keywords()
                .iter()
                .filter(|kw| lower.contains(*kw))
                .count();
            if score > best.1 {
                best = (domain, score);
            }
        }

        best.0
    }
}

impl fmt::Display for IndustryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndustryDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown domain: {}", s))
    }
}

/// Rendering style requested for the generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStyle {
    #[default]
    Photorealistic,
    Industrial,
    Product,
    Technical,
    Artistic,
    Minimal,
}

impl RenderStyle {
    pub const ALL: [RenderStyle; 6] = [
        RenderStyle::Photorealistic,
        RenderStyle::Industrial,
        RenderStyle::Product,
        RenderStyle::Technical,
        RenderStyle::Artistic,
        RenderStyle::Minimal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStyle::Photorealistic => "photorealistic",
            RenderStyle::Industrial => "industrial",
            RenderStyle::Product => "product",
            RenderStyle::Technical => "technical",
            RenderStyle::Artistic => "artistic",
            RenderStyle::Minimal => "minimal",
        }
    }

    /// Short rendering hint passed to the prompt service.
    pub fn hint(&self) -> &'static str {
        match self {
            RenderStyle::Photorealistic => "photorealistic, studio lighting, 8k detail",
            RenderStyle::Industrial => "industrial photography, harsh lighting, metallic surfaces",
            RenderStyle::Product => "clean product shot, white background, soft shadows",
            RenderStyle::Technical => "technical illustration, orthographic view, precise edges",
            RenderStyle::Artistic => "artistic render, dramatic lighting, expressive materials",
            RenderStyle::Minimal => "minimal composition, neutral palette, simple shapes",
        }
    }
}

impl fmt::Display for RenderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown style: {}", s))
    }
}

/// Mesh density requested from the 3D service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl MeshQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshQuality::Low => "low",
            MeshQuality::Medium => "medium",
            MeshQuality::High => "high",
        }
    }
}

/// Output file format requested from the 3D service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    #[default]
    Glb,
    Obj,
    Fbx,
    Usd,
    Usdz,
}

impl ModelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Glb => "glb",
            ModelFormat::Obj => "obj",
            ModelFormat::Fbx => "fbx",
            ModelFormat::Usd => "usd",
            ModelFormat::Usdz => "usdz",
        }
    }
}

/// Input to the prompt service.
#[derive(Debug, Clone, Default)]
pub struct PromptRequest {
    /// Free-form description of the object.
    pub description: String,
    /// Equipment or object type hint.
    pub equipment_type: Option<String>,
    /// Voltage level hint (power grid equipment only).
    pub voltage_level: Option<String>,
    /// Domain hint; detected from the description when absent.
    pub domain: Option<IndustryDomain>,
    /// Style hint.
    pub style: Option<RenderStyle>,
}

impl PromptRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    /// Domain hint, falling back to keyword detection.
    pub fn effective_domain(&self) -> IndustryDomain {
        self.domain
            .unwrap_or_else(|| IndustryDomain::detect(&self.description))
    }
}

/// Parsed reply of the prompt service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPrompt {
    pub prompt: String,
    pub negative_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    pub detected_domain: String,
    pub style: String,
    /// Semantic handle for the job's working location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_identifier: Option<String>,
}

/// Status of an external asynchronous task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Maps a provider status string. Unknown values count as pending.
    pub fn from_api(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "running" | "processing" | "in_progress" => TaskStatus::Running,
            "succeeded" | "success" | "completed" => TaskStatus::Succeeded,
            "failed" | "error" => TaskStatus::Failed,
            "cancelled" | "canceled" => TaskStatus::Cancelled,
            _ => TaskStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of an external task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    /// Raw provider payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn new(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            payload: serde_json::Value::Null,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
