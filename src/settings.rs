//! Persistent user settings.
//!
//! Stored as one JSON document in the config directory under a versioned
//! name. Files written under older names are ignored and left in place.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::credentials::{candidate_keys, mask_key, Credential};
use crate::metadata::{Creativity, GenerationConfig, DEFAULT_MODEL};

pub const SETTINGS_KEY: &str = "stockmeta_settings_v2";

/// Models offered for selection, as `(id, display name)`.
pub const SUPPORTED_MODELS: &[(&str, &str)] = &[
    ("googleai/gemini-2.5-flash", "Gemini 2.5 Flash"),
    ("googleai/gemini-1.5-flash-latest", "Gemini 1.5 Flash (latest)"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub api_keys: Vec<Credential>,
    pub model: String,
    pub use_auto_metadata: bool,
    pub title_length: u32,
    pub description_length: u32,
    pub keyword_count: u32,
    pub creativity_level: Creativity,
}

impl Default for AppSettings {
    fn default() -> Self {
        let defaults = GenerationConfig::default();
        Self {
            api_keys: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            use_auto_metadata: defaults.use_auto_metadata,
            title_length: defaults.title_length,
            description_length: defaults.description_length,
            keyword_count: defaults.keyword_count,
            creativity_level: defaults.creativity,
        }
    }
}

impl AppSettings {
    /// Snapshot handed to a generation run.
    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            model: self.model.clone(),
            use_auto_metadata: self.use_auto_metadata,
            title_length: self.title_length,
            description_length: self.description_length,
            keyword_count: self.keyword_count,
            creativity: self.creativity_level,
        }
    }

    pub fn candidate_keys(&self, fallback: Option<&str>) -> Vec<String> {
        candidate_keys(&self.api_keys, fallback)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("API key is empty")]
    EmptyKey,
    #[error("API key {0} is already configured")]
    DuplicateKey(String),
    #[error("API key {0} is not configured")]
    UnknownKey(String),
    #[error("failed to serialise settings: {0}")]
    Serialise(#[from] serde_json::Error),
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{SETTINGS_KEY}.json"))
    }

    /// Reads the settings. A missing or unreadable file yields defaults.
    pub fn load(&self) -> AppSettings {
        let path = self.path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "[SETTINGS] No settings file, using defaults");
                return AppSettings::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "[SETTINGS] Could not read settings, using defaults");
                return AppSettings::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "[SETTINGS] Corrupt settings file, using defaults");
                AppSettings::default()
            }
        }
    }

    /// Writes atomically: a temp file in the same directory is persisted over the old file.
    pub fn save(&self, settings: &AppSettings) -> Result<(), SettingsError> {
        let path = self.path();
        let write_err = |source: std::io::Error| SettingsError::Write {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(write_err)?;
        let body = serde_json::to_vec_pretty(settings)?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;
        info!(path = %path.display(), keys = settings.api_keys.len(), "[SETTINGS] Saved settings");
        Ok(())
    }

    /// Loads, applies `change`, saves and returns the new settings.
    pub fn update<F>(&self, change: F) -> Result<AppSettings, SettingsError>
    where
        F: FnOnce(&mut AppSettings),
    {
        let mut settings = self.load();
        change(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }

    /// Appends a key at the lowest priority.
    pub fn add_credential(
        &self,
        key: &str,
        label: Option<String>,
    ) -> Result<AppSettings, SettingsError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SettingsError::EmptyKey);
        }
        let mut settings = self.load();
        if settings.api_keys.iter().any(|c| c.key == key) {
            return Err(SettingsError::DuplicateKey(mask_key(key)));
        }
        settings.api_keys.push(Credential {
            key: key.to_string(),
            label: label.filter(|l| !l.trim().is_empty()),
        });
        self.save(&settings)?;
        Ok(settings)
    }

    pub fn remove_credential(&self, key: &str) -> Result<AppSettings, SettingsError> {
        let key = key.trim();
        let mut settings = self.load();
        let before = settings.api_keys.len();
        settings.api_keys.retain(|c| c.key != key);
        if settings.api_keys.len() == before {
            return Err(SettingsError::UnknownKey(mask_key(key)));
        }
        self.save(&settings)?;
        Ok(settings)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
