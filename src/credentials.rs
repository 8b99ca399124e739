//! API credentials: the user's ordered key list, candidate-list building and
//! single-key probing.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contract::{ModelCall, ModelFactory};
use crate::error::ModelErrorKind;
use crate::prompts;

/// One user-managed API key with an optional human label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
        }
    }

    pub fn labelled(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: Some(label.into()),
        }
    }

    /// Label if set, otherwise the masked key.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) if !label.trim().is_empty() => label.clone(),
            _ => mask_key(&self.key),
        }
    }
}

/// Builds the ordered list of keys to try: user keys first (in priority
/// order, deduplicated, blanks dropped), then the deployment fallback if it
/// is not already present.
pub fn candidate_keys(user: &[Credential], fallback: Option<&str>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(user.len() + 1);
    for credential in user {
        let key = credential.key.trim();
        if key.is_empty() || keys.iter().any(|k| k == key) {
            continue;
        }
        keys.push(key.to_string());
    }
    if let Some(fallback) = fallback.map(str::trim).filter(|k| !k.is_empty()) {
        if keys.iter().any(|k| k == fallback) {
            debug!("[KEYS] Fallback key already present in user list");
        } else {
            keys.push(fallback.to_string());
        }
    }
    keys
}

/// Renders a key for logs and listings: first and last four characters.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStatus {
    Valid,
    Invalid,
    RateLimited,
}

/// Result of probing a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyProbe {
    pub status: KeyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Sends one minimal request with `key` alone; no rotation.
pub async fn probe_credential(factory: &dyn ModelFactory, model: &str, key: &str) -> KeyProbe {
    if key.trim().is_empty() {
        return KeyProbe {
            status: KeyStatus::Invalid,
            message: Some("API key is empty.".to_string()),
        };
    }
    let masked = mask_key(key);
    info!(key = %masked, model, "[KEYS] Probing key");

    let outcome = match factory.connect(key.trim(), model) {
        Ok(client) => client.generate(ModelCall::text(prompts::PROBE, 0.0)).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(_) => {
            info!(key = %masked, "[KEYS] Key is valid");
            KeyProbe {
                status: KeyStatus::Valid,
                message: None,
            }
        }
        Err(e) => {
            warn!(key = %masked, error = %e, kind = ?e.kind, "[KEYS] Key probe failed");
            match e.kind {
                ModelErrorKind::InvalidCredential => KeyProbe {
                    status: KeyStatus::Invalid,
                    message: Some(
                        "The provided API key is not valid. Please check the key and try again."
                            .to_string(),
                    ),
                },
                ModelErrorKind::QuotaExceeded { .. } => KeyProbe {
                    status: KeyStatus::RateLimited,
                    message: Some(
                        "The key is valid but has run out of its quota or hit a rate limit."
                            .to_string(),
                    ),
                },
                _ => KeyProbe {
                    status: KeyStatus::Invalid,
                    message: Some(e.message),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_keep_order_and_drop_duplicates_and_blanks() {
        let user = vec![
            Credential::new("k2"),
            Credential::new("  "),
            Credential::labelled("k1", "backup"),
            Credential::new("k2"),
        ];
        assert_eq!(candidate_keys(&user, None), vec!["k2", "k1"]);
    }

    #[test]
    fn fallback_is_appended_last_unless_present() {
        let user = vec![Credential::new("a"), Credential::new("b")];
        assert_eq!(candidate_keys(&user, Some("env")), vec!["a", "b", "env"]);
        assert_eq!(candidate_keys(&user, Some("a")), vec!["a", "b"]);
        assert_eq!(candidate_keys(&[], Some("env")), vec!["env"]);
        assert!(candidate_keys(&[], Some("   ")).is_empty());
    }

    #[test]
    fn masks_keys() {
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key("AIzaSyABCDEFGH1234"), "AIza...1234");
        assert_eq!(Credential::labelled("AIzaSyABCDEFGH1234", "work").display_name(), "work");
        assert_eq!(Credential::new("AIzaSyABCDEFGH1234").display_name(), "AIza...1234");
    }
}
