#![doc = "stockmeta: core library for stock-image SEO metadata and prompt generation."]

//! All domain logic lives here; the `stockmeta` binary in `stockmeta-cli`
//! only parses commands and wires adapters together.
//!
//! # Layout
//! - [`rotation`]: runs one unit of work across an ordered list of API keys.
//! - [`metadata`] and [`pipeline`]: the two kinds of work (image metadata,
//!   staged prompt generation).
//! - [`queue`]: sequential processing of a batch of uploaded files.
//! - [`export`], [`exif`], [`bridge`]: getting results out (CSV, tags in files).
//! - [`gemini`]: HTTP adapter behind the [`contract`] traits.
//! - [`settings`], [`config`]: persisted user settings and environment.

pub mod bridge;
pub mod config;
pub mod contract;
pub mod credentials;
pub mod error;
pub mod exif;
pub mod export;
pub mod gemini;
pub mod metadata;
pub mod payload;
pub mod pipeline;
pub mod prompts;
pub mod queue;
pub mod rotation;
pub mod settings;
