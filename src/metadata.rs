//! SEO metadata generation for a single image.
//!
//! [`generate_metadata`] renders the instruction prompt from a
//! [`GenerationConfig`] snapshot, runs one JSON call through the rotation
//! executor and validates the answer into a [`GenerationResult`]. An answer
//! that does not validate is a hard failure and is not retried with another
//! key.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::contract::{ItemProcessor, ModelCall, ModelFactory};
use crate::error::{ModelError, RotationError};
use crate::payload::ImagePayload;
use crate::prompts;
use crate::queue::QueuedFile;
use crate::rotation::execute_with_rotation;

pub const DEFAULT_MODEL: &str = "googleai/gemini-2.5-flash";

/// How adventurous the wording should be. Maps onto sampling temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Creativity {
    Precise,
    #[default]
    Balanced,
    Creative,
}

impl Creativity {
    pub fn temperature(self) -> f32 {
        match self {
            Creativity::Precise => 0.2,
            Creativity::Balanced => 0.7,
            Creativity::Creative => 1.0,
        }
    }
}

impl FromStr for Creativity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "precise" | "low" => Ok(Creativity::Precise),
            "balanced" | "medium" => Ok(Creativity::Balanced),
            "creative" | "high" => Ok(Creativity::Creative),
            other => Err(format!(
                "unknown creativity level '{other}' (expected precise, balanced or creative)"
            )),
        }
    }
}

/// Immutable settings snapshot captured when an operation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub use_auto_metadata: bool,
    pub title_length: u32,
    pub description_length: u32,
    pub keyword_count: u32,
    pub creativity: Creativity,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            use_auto_metadata: false,
            title_length: 15,
            description_length: 100,
            keyword_count: 25,
            creativity: Creativity::Balanced,
        }
    }
}

/// Keywords as the model returned them: one comma-joined string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Keywords {
    Joined(String),
    List(Vec<String>),
}

impl Keywords {
    /// Individual keywords, trimmed, empties dropped.
    pub fn terms(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Keywords::Joined(s) => s.split(',').collect(),
            Keywords::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn joined(&self) -> String {
        self.terms().join(", ")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field '{0}' is empty")]
    EmptyField(&'static str),
    #[error("rating {0} is outside 1-5")]
    RatingOutOfRange(f64),
}

/// Unvalidated shape of a metadata answer.
#[derive(Debug, Deserialize)]
pub struct RawGenerationResult {
    title: String,
    description: String,
    keywords: Keywords,
    rating: f64,
}

/// Validated metadata for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGenerationResult")]
pub struct GenerationResult {
    pub title: String,
    pub description: String,
    pub keywords: Keywords,
    pub rating: u8,
}

impl TryFrom<RawGenerationResult> for GenerationResult {
    type Error = MetadataError;

    fn try_from(raw: RawGenerationResult) -> Result<Self, Self::Error> {
        if raw.title.trim().is_empty() {
            return Err(MetadataError::EmptyField("title"));
        }
        if raw.description.trim().is_empty() {
            return Err(MetadataError::EmptyField("description"));
        }
        if raw.keywords.terms().is_empty() {
            return Err(MetadataError::EmptyField("keywords"));
        }
        let rounded = raw.rating.round();
        if !(1.0..=5.0).contains(&rounded) {
            return Err(MetadataError::RatingOutOfRange(raw.rating));
        }
        Ok(Self {
            title: raw.title,
            description: raw.description,
            keywords: raw.keywords,
            rating: rounded as u8,
        })
    }
}

impl GenerationResult {
    /// Parses and validates a model answer.
    pub fn parse(raw: &str) -> Result<Self, MetadataError> {
        let raw: RawGenerationResult = serde_json::from_str(strip_code_fence(raw))?;
        Self::try_from(raw)
    }
}

/// Removes a surrounding Markdown code fence, if the model added one.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_suffix("```").unwrap_or(body).trim();
    // Drop an info string such as `json`, on its own line or glued to the payload.
    let info_len = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    let rest = body[info_len..].trim();
    if info_len > 0 && rest.starts_with(['{', '[']) {
        return rest;
    }
    match body.split_once('\n') {
        Some((info, rest)) if !info.trim_start().starts_with(['{', '[']) => rest.trim(),
        _ => body.trim(),
    }
}

pub fn build_metadata_prompt(config: &GenerationConfig) -> String {
    let title = config.title_length.to_string();
    let description = config.description_length.to_string();
    let keywords = config.keyword_count.to_string();
    let length_rules = if config.use_auto_metadata {
        prompts::METADATA_LENGTH_AUTO.to_string()
    } else {
        prompts::fill(
            prompts::METADATA_LENGTH_FIXED,
            &[
                ("title_length", &title),
                ("description_length", &description),
                ("keyword_count", &keywords),
            ],
        )
    };
    prompts::fill(prompts::METADATA, &[("length_rules", &length_rules)])
}

/// Generates metadata for one image, rotating through `candidates`.
pub async fn generate_metadata(
    image: &ImagePayload,
    config: &GenerationConfig,
    candidates: &[String],
    factory: &dyn ModelFactory,
) -> Result<GenerationResult, RotationError> {
    let prompt = build_metadata_prompt(config);
    let temperature = config.creativity.temperature();

    execute_with_rotation(candidates, &config.model, factory, |client| {
        let call = ModelCall::json(prompt.clone(), temperature).with_image(image.clone());
        async move {
            let raw = client.generate(call).await?;
            GenerationResult::parse(&raw).map_err(|e| {
                warn!(error = %e, "[METADATA] Model answer failed validation");
                ModelError::invalid_response(format!("The AI returned unusable metadata: {e}"))
            })
        }
    })
    .await
}

/// Queue processor that loads each file and generates its metadata with a
/// fixed configuration snapshot and candidate list.
pub struct MetadataGenerator {
    config: GenerationConfig,
    candidates: Vec<String>,
    factory: Arc<dyn ModelFactory>,
}

impl MetadataGenerator {
    pub fn new(
        config: GenerationConfig,
        candidates: Vec<String>,
        factory: Arc<dyn ModelFactory>,
    ) -> Self {
        Self {
            config,
            candidates,
            factory,
        }
    }
}

#[async_trait]
impl ItemProcessor for MetadataGenerator {
    async fn process(&self, file: QueuedFile) -> Result<GenerationResult, String> {
        let image = ImagePayload::load(&file.path)
            .await
            .map_err(|e| format!("Could not read image {}: {e}", file.name))?;
        let result = generate_metadata(&image, &self.config, &self.candidates, self.factory.as_ref())
            .await
            .map_err(|e| e.user_message())?;
        info!(file = %file.name, rating = result.rating, "[METADATA] Generated metadata");
        Ok(result)
    }
}
