/// `load_config` module: loads a YAML batch job and turns it into the inputs for a metadata run.
///
/// This is the only place where user-supplied YAML is parsed.
///
/// # Responsibilities
/// - Parse the batch job file into typed structs
/// - Resolve relative paths against the directory holding the job file
/// - Expand an input directory into the image files it contains
/// - Apply per-job overrides on top of the saved settings snapshot
///
/// # Errors
/// All errors use `anyhow::Error` with context and surface at the CLI boundary.
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use stockmeta::metadata::{Creativity, GenerationConfig};
use stockmeta::queue::QueuePolicy;
use tracing::{error, info};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

#[derive(Debug, Deserialize)]
pub struct BatchJob {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Every image directly inside this directory is added after `files`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub policy: QueuePolicy,
    #[serde(default)]
    pub csv_output: Option<PathBuf>,
    #[serde(default)]
    pub write_tags: bool,
    #[serde(default)]
    pub overrides: Overrides,
}

/// Settings that replace the saved ones for this job only.
#[derive(Debug, Default, Deserialize)]
pub struct Overrides {
    pub model: Option<String>,
    pub creativity: Option<Creativity>,
    pub use_auto_metadata: Option<bool>,
    pub title_length: Option<u32>,
    pub description_length: Option<u32>,
    pub keyword_count: Option<u32>,
}

impl Overrides {
    pub fn apply(&self, mut config: GenerationConfig) -> GenerationConfig {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(creativity) = self.creativity {
            config.creativity = creativity;
        }
        if let Some(auto) = self.use_auto_metadata {
            config.use_auto_metadata = auto;
        }
        if let Some(n) = self.title_length {
            config.title_length = n;
        }
        if let Some(n) = self.description_length {
            config.description_length = n;
        }
        if let Some(n) = self.keyword_count {
            config.keyword_count = n;
        }
        config
    }
}

impl BatchJob {
    pub fn trace_loaded(&self) {
        info!(
            files = self.files.len(),
            directory = ?self.directory,
            policy = ?self.policy,
            csv_output = ?self.csv_output,
            write_tags = self.write_tags,
            "Loaded BatchJob"
        );
    }

    /// Input images in queue order: listed files first, then the directory's
    /// images sorted by name. Fails when the job ends up with no inputs.
    pub fn resolve_inputs(&self) -> Result<Vec<PathBuf>> {
        let mut inputs = self.files.clone();
        if let Some(dir) = &self.directory {
            let entries = fs::read_dir(dir)
                .with_context(|| format!("Failed to read input directory {}", dir.display()))?;
            let mut found = Vec::new();
            for entry in entries {
                let path = entry
                    .with_context(|| format!("Failed to list input directory {}", dir.display()))?
                    .path();
                if path.is_file() && is_image(&path) {
                    found.push(path);
                }
            }
            found.sort();
            for path in found {
                if !inputs.contains(&path) {
                    inputs.push(path);
                }
            }
        }
        if inputs.is_empty() {
            bail!("Batch job lists no input images");
        }
        Ok(inputs)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Loads a batch job file. Relative paths inside it are taken relative to the file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<BatchJob> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading batch job from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let job: BatchJob = match serde_yaml::from_str(&content) {
        Ok(job) => job,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let base = path_ref
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let job = BatchJob {
        files: job.files.into_iter().map(|f| resolve(&base, f)).collect(),
        directory: job.directory.map(|d| resolve(&base, d)),
        csv_output: job.csv_output.map(|c| resolve(&base, c)),
        ..job
    };
    job.trace_loaded();
    Ok(job)
}
