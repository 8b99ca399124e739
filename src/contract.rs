#![allow(unused)]

//! # contract: seams between the core and its external collaborators
//!
//! Every remote or side-effecting collaborator sits behind one of the traits
//! below so that orchestration code (rotation, pipeline, queue) can be driven
//! by real adapters in production and by `mockall` mocks in tests.
//!
//! - [`GenerativeModel`]: one client bound to one credential and one model.
//! - [`ModelFactory`]: builds a fresh [`GenerativeModel`] per credential.
//! - [`ItemProcessor`]: turns one queued file into metadata (used by the queue worker).
//! - [`MetadataWriter`]: writes IPTC/XMP tags into an image file.
//!
//! Mocks are exported under the `test-export-mocks` feature so integration
//! tests in `tests/` can use them.

use std::path::Path;

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::error::ModelError;
use crate::exif::{ExifError, MetadataTags};
use crate::metadata::GenerationResult;
use crate::payload::ImagePayload;
use crate::queue::QueuedFile;

/// Response format hint passed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// A single request to the generative endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCall {
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Optional image attached to the prompt.
    pub image: Option<ImagePayload>,
    pub temperature: f32,
    pub format: ResponseFormat,
}

impl ModelCall {
    pub fn text(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            temperature,
            format: ResponseFormat::Text,
        }
    }

    pub fn json(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            temperature,
            format: ResponseFormat::Json,
        }
    }

    pub fn with_image(mut self, image: ImagePayload) -> Self {
        self.image = Some(image);
        self
    }
}

/// A client scoped to exactly one credential and one model.
///
/// Implementations classify failures into [`crate::error::ModelErrorKind`]
/// before returning them; callers never look at message text.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Runs one generation and returns the raw text of the response.
    async fn generate(&self, call: ModelCall) -> Result<String, ModelError>;
}

/// Constructs per-credential clients. No credential is shared between the
/// clients it hands out.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ModelFactory: Send + Sync {
    fn connect(
        &self,
        credential: &str,
        model: &str,
    ) -> Result<Box<dyn GenerativeModel>, ModelError>;
}

/// Processes one queued file into metadata.
///
/// Errors are already rewritten into the message shown next to the item.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, file: QueuedFile) -> Result<GenerationResult, String>;
}

/// Writes metadata tags into an image file in place.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MetadataWriter: Send + Sync {
    async fn write_tags(&self, path: &Path, tags: &MetadataTags) -> Result<(), ExifError>;
}
