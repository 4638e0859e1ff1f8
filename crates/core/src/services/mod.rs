//! External generation services.
//!
//! The pipeline depends only on the [`PromptService`], [`ImageService`] and
//! [`Model3DService`] traits. Batches can be seeded through an
//! [`AssociationService`]. Concrete HTTP clients:
//! - [`GeminiClient`]: prompt, image and association generation
//! - [`ArkModelClient`]: image-to-3D tasks

mod ark;
mod association;
mod error;
mod gemini;
mod prompt_parser;
mod traits;
mod types;

pub use ark::{archive_url, ArkModelClient};
pub use association::{
    parse_association_reply, AssociatedItem, AssociationMode, AssociationRequest,
    DEFAULT_ASSOCIATION_COUNT, MAX_ASSOCIATION_COUNT, MIN_ASSOCIATION_COUNT,
};
pub use error::ServiceError;
pub use gemini::GeminiClient;
pub use prompt_parser::{parse_prompt_reply, FALLBACK_NEGATIVE_PROMPT};
pub use traits::{AssociationService, ImageService, Model3DService, PromptService};
pub use types::{
    GeneratedPrompt, IndustryDomain, MeshQuality, ModelFormat, PromptRequest, RenderStyle,
    TaskSnapshot, TaskStatus, DEFAULT_NEGATIVE_PROMPT,
};
