//! Category association: one category in, many concrete variants out.
//!
//! A language model is asked for a JSON array of distinct objects belonging
//! to a category (e.g. "chair" yields office chair, dining chair, gaming
//! chair). Each variant carries its own image prompt so it can seed a batch
//! item directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ServiceError;

/// Smallest number of variants a request may ask for.
pub const MIN_ASSOCIATION_COUNT: usize = 5;
/// Largest number of variants a request may ask for.
pub const MAX_ASSOCIATION_COUNT: usize = 100;
/// Variants requested when the caller does not say.
pub const DEFAULT_ASSOCIATION_COUNT: usize = 20;

const UNNAMED: &str = "Unnamed";

/// Axis along which variants should differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMode {
    Style,
    #[serde(rename = "spec")]
    Specification,
    Purpose,
    Material,
    Era,
    Region,
    #[default]
    Comprehensive,
}

impl AssociationMode {
    pub const ALL: [AssociationMode; 7] = [
        AssociationMode::Style,
        AssociationMode::Specification,
        AssociationMode::Purpose,
        AssociationMode::Material,
        AssociationMode::Era,
        AssociationMode::Region,
        AssociationMode::Comprehensive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationMode::Style => "style",
            AssociationMode::Specification => "spec",
            AssociationMode::Purpose => "purpose",
            AssociationMode::Material => "material",
            AssociationMode::Era => "era",
            AssociationMode::Region => "region",
            AssociationMode::Comprehensive => "comprehensive",
        }
    }

    /// Instruction sent to the model for this mode.
    pub fn instruction(&self) -> &'static str {
        match self {
            AssociationMode::Style => {
                "Vary the design style: modern, classical, industrial, minimalist, retro, futuristic, ethnic."
            }
            AssociationMode::Specification => {
                "Vary the specifications: size, power rating, capacity, precision."
            }
            AssociationMode::Purpose => {
                "Vary the use case: household, commercial, industrial, outdoor, medical, educational."
            }
            AssociationMode::Material => {
                "Vary the material: wood, metal, plastic, glass, ceramic, fabric, leather."
            }
            AssociationMode::Era => "Vary the era: ancient, early modern, contemporary, science fiction.",
            AssociationMode::Region => {
                "Vary the regional style: Chinese, Japanese, European, American, Nordic, Mediterranean."
            }
            AssociationMode::Comprehensive => {
                "Vary style, specification, purpose and material together for the widest coverage."
            }
        }
    }
}

impl fmt::Display for AssociationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssociationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown association mode: {}", s))
    }
}

/// Request for variants of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRequest {
    pub category: String,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub mode: AssociationMode,
    /// Free-form extra instructions appended to the mode instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_requirements: Option<String>,
}

fn default_count() -> usize {
    DEFAULT_ASSOCIATION_COUNT
}

impl AssociationRequest {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            count: DEFAULT_ASSOCIATION_COUNT,
            mode: AssociationMode::default(),
            custom_requirements: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_mode(mut self, mode: AssociationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Checks the category and the count bounds.
    pub fn validate(&self) -> Result<(), String> {
        if self.category.trim().is_empty() {
            return Err("category must not be empty".to_string());
        }
        if !(MIN_ASSOCIATION_COUNT..=MAX_ASSOCIATION_COUNT).contains(&self.count) {
            return Err(format!(
                "count must be between {} and {}, got {}",
                MIN_ASSOCIATION_COUNT, MAX_ASSOCIATION_COUNT, self.count
            ));
        }
        Ok(())
    }

    /// Prompt asking a language model for a JSON array of variants.
    pub fn to_prompt(&self) -> String {
        let mut instruction = self.mode.instruction().to_string();
        if let Some(extra) = self
            .custom_requirements
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            instruction.push_str("\n\nAdditional requirements: ");
            instruction.push_str(extra);
        }

        format!(
            "You are a 3D asset designer and product expert.\n\n\
             ## Task\nList {count} distinct, concrete objects of the category \"{category}\".\n\n\
             ## Variation\n{instruction}\n\n\
             ## Rules\n\
             1. Every object is a concrete instance of the category, not an abstract idea.\n\
             2. Objects differ clearly in shape, size, purpose or style.\n\
             3. Descriptions are specific enough to model in 3D.\n\n\
             ## Output\n\
             Answer with a JSON array only. Each element has the fields:\n\
             name, subcategory, description (one or two sentences of visual detail), \
             specifications (object of dimension, material, color and other parameters), \
             tags (array of strings) and prompt (an English image prompt describing \
             shape, material and viewing angle).\n",
            count = self.count,
            category = self.category.trim(),
            instruction = instruction,
        )
    }
}

/// One variant produced by association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociatedItem {
    pub name: String,
    #[serde(default)]
    pub subcategory: String,
    #[serde(default)]
    pub description: String,
    /// Image prompt for this variant. Empty if the model gave none.
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub specifications: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Loose shape of one array element as models actually write it.
#[derive(Deserialize)]
struct RawItem {
    name: Option<String>,
    subcategory: Option<String>,
    description: Option<String>,
    prompt: Option<String>,
    #[serde(default)]
    specifications: serde_json::Value,
    #[serde(default)]
    tags: serde_json::Value,
}

impl From<RawItem> for AssociatedItem {
    fn from(raw: RawItem) -> Self {
        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNNAMED.to_string());
        let specifications = match raw.specifications {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let tags = match raw.tags {
            serde_json::Value::Array(values) => values
                .into_iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        };
        Self {
            name,
            subcategory: raw.subcategory.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            prompt: raw.prompt.unwrap_or_default(),
            specifications,
            tags,
        }
    }
}

/// Extracts variants from a model reply.
///
/// The reply should be a bare JSON array, but a fenced or prefixed array is
/// accepted too. Elements that are not objects are skipped. A reply without
/// any array is [`ServiceError::InvalidResponse`].
pub fn parse_association_reply(text: &str) -> Result<Vec<AssociatedItem>, ServiceError> {
    let values: Vec<serde_json::Value> = match serde_json::from_str(text.trim()) {
        Ok(values) => values,
        Err(_) => {
            let start = text.find('[');
            let end = text.rfind(']');
            match (start, end) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str(&text[start..=end]).map_err(|e| {
                        ServiceError::invalid(format!("association reply is not a JSON array: {}", e))
                    })?
                }
                _ => {
                    return Err(ServiceError::invalid(
                        "association reply contains no JSON array",
                    ))
                }
            }
        }
    };

    Ok(values
        .into_iter()
        .filter(|v| v.is_object())
        .filter_map(|v| serde_json::from_value::<RawItem>(v).ok())
        .map(AssociatedItem::from)
        .collect())
}
