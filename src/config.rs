use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::exif::DEFAULT_TASK_TIMEOUT;
use crate::gemini::DEFAULT_ENDPOINT;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Deployment-level configuration read from the process environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Key tried after every user key. Never logged in clear.
    pub fallback_credential: Option<String>,
    pub endpoint: String,
    pub request_timeout: Duration,
    pub exiftool_path: PathBuf,
    pub exif_task_timeout: Duration,
    pub settings_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error("no config directory available; set STOCKMETA_CONFIG_DIR")]
    NoConfigDir,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn number_var(name: &'static str) -> Result<Option<u64>, ConfigError> {
    var(name)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var: name, value })
        })
        .transpose()
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings_dir = match var("STOCKMETA_CONFIG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join("stockmeta"),
        };
        Ok(Self {
            fallback_credential: var("STOCKMETA_FALLBACK_API_KEY").or_else(|| var("GEMINI_API_KEY")),
            endpoint: var("STOCKMETA_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            request_timeout: number_var("STOCKMETA_REQUEST_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            exiftool_path: var("STOCKMETA_EXIFTOOL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("exiftool")),
            exif_task_timeout: number_var("STOCKMETA_EXIF_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TASK_TIMEOUT),
            settings_dir,
        })
    }

    pub fn trace_loaded(&self) {
        info!(
            endpoint = %self.endpoint,
            request_timeout = ?self.request_timeout,
            exiftool = %self.exiftool_path.display(),
            exif_task_timeout = ?self.exif_task_timeout,
            settings_dir = %self.settings_dir.display(),
            fallback_key = self.fallback_credential.is_some(),
            "Loaded RuntimeConfig"
        );
        debug!(
            fallback_key_len = self.fallback_credential.as_deref().map(str::len),
            "RuntimeConfig loaded (fallback key length only)"
        );
    }
}
