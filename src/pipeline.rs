//! Staged prompt pipeline: research → creative direction → refinement.
//! [`generate_bulk_prompts`] is the single-call alternative.
//!
//! Each stage is one remote call (through the rotation executor) whose output
//! is interpolated verbatim into the next stage's prompt. The stages run
//! strictly in order and never loop back.
//!
//! # Error Handling
//! - A remote failure in any stage aborts the remaining stages.
//! - Malformed JSON from stage 2 becomes an empty concept list; malformed
//!   JSON from stage 3 becomes an empty prompt list. Both are logged.
//! - Well-formed JSON of the wrong shape from stage 3 is a hard error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::contract::{ModelCall, ModelFactory};
use crate::error::RotationError;
use crate::metadata::strip_code_fence;
use crate::prompts;
use crate::rotation::execute_with_rotation;

pub const RESEARCH_TEMPERATURE: f32 = 0.5;
pub const CREATIVE_TEMPERATURE: f32 = 0.8;
pub const REFINE_TEMPERATURE: f32 = 0.4;
pub const BULK_TEMPERATURE: f32 = 0.9;
pub const MAX_PROMPTS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    #[default]
    Photorealistic,
    Vector,
}

impl ImageStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageStyle::Photorealistic => "photorealistic",
            ImageStyle::Vector => "vector",
        }
    }
}

impl fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "photorealistic" | "photo" => Ok(ImageStyle::Photorealistic),
            "vector" => Ok(ImageStyle::Vector),
            other => Err(format!(
                "unknown image style '{other}' (expected photorealistic or vector)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub idea: String,
    pub count: u32,
    pub style: ImageStyle,
    pub negative_prompts: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPrompt {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub prompts: Vec<GeneratedPrompt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Research,
    Creation,
    Refinement,
    /// The one call made by [`generate_bulk_prompts`].
    Bulk,
}

impl PipelineStage {
    /// Tag reported to progress listeners once the stage has completed.
    pub fn tag(self) -> &'static str {
        match self {
            PipelineStage::Research => "research-complete",
            PipelineStage::Creation => "creation-complete",
            PipelineStage::Refinement => "refinement-complete",
            PipelineStage::Bulk => "bulk-complete",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Research => "research",
            PipelineStage::Creation => "creative direction",
            PipelineStage::Refinement => "refinement",
            PipelineStage::Bulk => "bulk generation",
        };
        f.write_str(name)
    }
}

/// Notification sent after each stage. `prompts` is only populated after refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineProgress {
    pub stage: PipelineStage,
    pub prompts: Vec<GeneratedPrompt>,
}

/// One-way progress listener.
pub type ProgressCallback<'a> = &'a (dyn Fn(&PipelineProgress) + Send + Sync);

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{stage} stage failed: {source}")]
    Remote {
        stage: PipelineStage,
        #[source]
        source: RotationError,
    },
    #[error("generated prompts have an unexpected shape: {0}")]
    InvalidOutput(String),
}

impl PipelineError {
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Remote { source, .. } => {
                format!("Failed to generate prompts: {}", source.user_message())
            }
            other => other.to_string(),
        }
    }
}

impl PipelineRequest {
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_idea_and_count(&self.idea, self.count)
    }
}

fn validate_idea_and_count(idea: &str, count: u32) -> Result<(), PipelineError> {
    if idea.trim().is_empty() {
        return Err(PipelineError::InvalidRequest("Idea is missing.".to_string()));
    }
    if count == 0 {
        return Err(PipelineError::InvalidRequest(
            "Number of prompts must be greater than zero.".to_string(),
        ));
    }
    if count > MAX_PROMPTS {
        return Err(PipelineError::InvalidRequest(format!(
            "Number of prompts must be at most {MAX_PROMPTS}."
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkPromptRequest {
    pub idea: String,
    pub count: u32,
}

impl BulkPromptRequest {
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_idea_and_count(&self.idea, self.count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BulkPromptOutput {
    pub prompts: Vec<String>,
}

/// Runs the three stages for `request` and returns the refined prompts.
pub async fn run_pipeline(
    request: &PipelineRequest,
    model_id: &str,
    candidates: &[String],
    factory: &dyn ModelFactory,
    progress: Option<ProgressCallback<'_>>,
) -> Result<PipelineOutput, PipelineError> {
    request.validate()?;
    let notify = |stage: PipelineStage, prompts: Vec<GeneratedPrompt>| {
        if let Some(callback) = progress {
            callback(&PipelineProgress { stage, prompts });
        }
    };
    info!(count = request.count, style = %request.style, "[PIPELINE] Starting prompt pipeline");

    // --- Stage 1: research ---
    let research_prompt = prompts::fill(
        prompts::RESEARCH,
        &[("idea", request.idea.trim()), ("style", request.style.as_str())],
    );
    let research = run_stage(
        PipelineStage::Research,
        ModelCall::text(research_prompt, RESEARCH_TEMPERATURE),
        model_id,
        candidates,
        factory,
    )
    .await?;
    info!(chars = research.len(), "[PIPELINE] Research complete");
    notify(PipelineStage::Research, Vec::new());

    // --- Stage 2: creative direction ---
    let count = request.count.to_string();
    let creative_prompt = prompts::fill(
        prompts::CREATIVE,
        &[("count", &count), ("research", research.trim())],
    );
    let raw_concepts = run_stage(
        PipelineStage::Creation,
        ModelCall::json(creative_prompt, CREATIVE_TEMPERATURE),
        model_id,
        candidates,
        factory,
    )
    .await?;
    let concepts = parse_concepts(&raw_concepts);
    info!(concepts = concepts.len(), "[PIPELINE] Creative direction complete");
    notify(PipelineStage::Creation, Vec::new());

    // --- Stage 3: refinement ---
    let concepts_json = serde_json::to_string(&concepts).unwrap_or_else(|_| "[]".to_string());
    let negative = request.negative_prompts.to_string();
    let refine_prompt = prompts::fill(
        prompts::REFINE,
        &[
            ("concepts", &concepts_json),
            ("idea", request.idea.trim()),
            ("style", request.style.as_str()),
            ("negative", &negative),
        ],
    );
    let raw_refined = run_stage(
        PipelineStage::Refinement,
        ModelCall::json(refine_prompt, REFINE_TEMPERATURE),
        model_id,
        candidates,
        factory,
    )
    .await?;
    let output = parse_refined(&raw_refined)?;
    info!(prompts = output.prompts.len(), "[PIPELINE] Refinement complete");
    notify(PipelineStage::Refinement, output.prompts.clone());

    Ok(output)
}

/// Generates `count` policy-compliant prompts for `request.idea` in one call.
///
/// An empty or unparseable answer yields no prompts; JSON of the wrong
/// shape is an error.
pub async fn generate_bulk_prompts(
    request: &BulkPromptRequest,
    model_id: &str,
    candidates: &[String],
    factory: &dyn ModelFactory,
) -> Result<BulkPromptOutput, PipelineError> {
    request.validate()?;
    info!(count = request.count, "[PIPELINE] Generating prompts in bulk");
    let count = request.count.to_string();
    let prompt = prompts::fill(
        prompts::BULK,
        &[("count", &count), ("idea", request.idea.trim())],
    );
    let raw = run_stage(
        PipelineStage::Bulk,
        ModelCall::json(prompt, BULK_TEMPERATURE),
        model_id,
        candidates,
        factory,
    )
    .await?;
    let output = parse_bulk(&raw)?;
    info!(prompts = output.prompts.len(), "[PIPELINE] Bulk generation complete");
    Ok(output)
}

async fn run_stage(
    stage: PipelineStage,
    call: ModelCall,
    model_id: &str,
    candidates: &[String],
    factory: &dyn ModelFactory,
) -> Result<String, PipelineError> {
    execute_with_rotation(candidates, model_id, factory, |client| {
        let call = call.clone();
        async move { client.generate(call).await }
    })
    .await
    .map_err(|source| {
        error!(stage = %stage, error = %source, "[PIPELINE][ERROR] Stage failed, aborting");
        PipelineError::Remote { stage, source }
    })
}

/// Stage 2 output: a JSON array of concept strings. Anything else yields no concepts.
pub fn parse_concepts(raw: &str) -> Vec<String> {
    match serde_json::from_str::<serde_json::Value>(strip_code_fence(raw)) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect(),
        Ok(other) => {
            warn!(kind = %json_kind(&other), "[PIPELINE] Creative concepts were not a JSON array; continuing with none");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, raw = %raw, "[PIPELINE] Failed to parse creative concepts; continuing with none");
            Vec::new()
        }
    }
}

/// Stage 3 output. Malformed JSON yields no prompts; valid JSON of the wrong shape is an error.
pub fn parse_refined(raw: &str) -> Result<PipelineOutput, PipelineError> {
    let value = match serde_json::from_str::<serde_json::Value>(strip_code_fence(raw)) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, raw = %raw, "[PIPELINE] Failed to parse refined prompts; returning none");
            return Ok(PipelineOutput::default());
        }
    };
    serde_json::from_value::<PipelineOutput>(value).map_err(|e| {
        error!(error = %e, "[PIPELINE][ERROR] Refined prompts failed validation");
        PipelineError::InvalidOutput(e.to_string())
    })
}

/// Bulk output: `{"prompts": [string]}`. Blank entries are dropped.
pub fn parse_bulk(raw: &str) -> Result<BulkPromptOutput, PipelineError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        warn!("[PIPELINE] Model returned no bulk prompts");
        return Ok(BulkPromptOutput::default());
    }
    let value = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Null) => return Ok(BulkPromptOutput::default()),
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, raw = %raw, "[PIPELINE] Failed to parse bulk prompts; returning none");
            return Ok(BulkPromptOutput::default());
        }
    };
    let mut output = serde_json::from_value::<BulkPromptOutput>(value).map_err(|e| {
        error!(error = %e, "[PIPELINE][ERROR] Bulk prompts failed validation");
        PipelineError::InvalidOutput(e.to_string())
    })?;
    output.prompts.retain(|p| !p.trim().is_empty());
    Ok(output)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
