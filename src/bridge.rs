//! Boundary call for saving generated metadata into a file on disk.
//!
//! Mirrors the shape a desktop host expects: never an `Err`, always an
//! outcome with a success flag and an optional message.

use std::path::Path;

use serde::Serialize;
use tracing::{error, info};

use crate::contract::MetadataWriter;
use crate::exif::MetadataTags;
use crate::metadata::GenerationResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

pub async fn save_metadata(
    writer: &dyn MetadataWriter,
    file_path: &str,
    metadata: &GenerationResult,
) -> SaveOutcome {
    if file_path.trim().is_empty() {
        return SaveOutcome::failed("File path is missing.");
    }
    let tags = MetadataTags::from_result(metadata);
    match writer.write_tags(Path::new(file_path), &tags).await {
        Ok(()) => {
            info!(path = file_path, "[BRIDGE] Metadata saved");
            SaveOutcome::ok()
        }
        Err(e) => {
            error!(path = file_path, error = %e, "[BRIDGE][ERROR] Failed to save metadata");
            SaveOutcome::failed(format!("Failed to write metadata: {e}"))
        }
    }
}
