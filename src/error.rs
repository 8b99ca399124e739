//! Error types shared across the crate.
//!
//! Remote failures are classified once, at the adapter boundary, into a
//! closed set of [`ModelErrorKind`]s. Everything downstream (rotation,
//! pipeline, queue) branches on the kind and only keeps the original
//! message around for display.

use std::time::Duration;

use regex::Regex;
use std::sync::OnceLock;

/// Classification of a failed call to the generative model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelErrorKind {
    /// Key rejected (unknown, revoked, lacking permission).
    InvalidCredential,
    /// Rate limited or out of quota. `retry_after` is set when upstream says how long to wait.
    QuotaExceeded { retry_after: Option<Duration> },
    /// Network, timeout or unexpected HTTP failure.
    Transport,
    /// The call succeeded but the payload could not be used.
    InvalidResponse,
    Other,
}

impl ModelErrorKind {
    /// Maps a human-readable upstream message onto a kind.
    ///
    /// Only used at the boundary, for errors that carry no usable status
    /// code. Matching is case-insensitive.
    pub fn classify_message(message: &str) -> ModelErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("api key not valid")
            || lower.contains("permission denied")
            || lower.contains("403")
        {
            return ModelErrorKind::InvalidCredential;
        }
        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("quota")
            || lower.contains("resource has been exhausted")
        {
            return ModelErrorKind::QuotaExceeded {
                retry_after: parse_retry_after(message),
            };
        }
        ModelErrorKind::Other
    }

    /// Whether the rotation executor should move on to the next credential.
    pub fn is_rotatable(&self) -> bool {
        matches!(
            self,
            ModelErrorKind::InvalidCredential | ModelErrorKind::QuotaExceeded { .. }
        )
    }
}

/// Extracts a "retry in N s" hint from an upstream message.
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    static RETRY_IN: OnceLock<Regex> = OnceLock::new();
    let re = RETRY_IN.get_or_init(|| {
        Regex::new(r"(?i)retry in\s+(\d+(?:\.\d+)?)\s*s").expect("static regex is valid")
    });
    re.captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(Duration::from_secs_f64)
}

/// A failed model call: typed kind plus the original message for display.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Builds an error whose kind is derived from its message.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ModelErrorKind::classify_message(&message),
            message,
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ModelErrorKind::InvalidResponse, message)
    }
}

/// Outcome of running one unit of work across a credential list.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RotationError {
    #[error("No API key configured. Add a key in settings or set STOCKMETA_FALLBACK_API_KEY.")]
    NoCredential,
    #[error("All API keys failed: every key was rejected as invalid ({attempts} tried). Last error: {last}")]
    AllInvalid { attempts: usize, last: ModelError },
    #[error("All API keys failed: quota exceeded ({attempts} tried). Last error: {last}")]
    AllQuotaExceeded {
        attempts: usize,
        last: ModelError,
        retry_after: Option<Duration>,
    },
    #[error(transparent)]
    Fatal(ModelError),
}

impl RotationError {
    /// One friendly sentence for the person looking at the failed item.
    pub fn user_message(&self) -> String {
        match self {
            RotationError::NoCredential => {
                "No API key is configured. Please add one in settings.".to_string()
            }
            RotationError::AllInvalid { .. } => {
                "None of your API keys were accepted. Please check them in settings.".to_string()
            }
            RotationError::AllQuotaExceeded { retry_after, .. } => match retry_after {
                Some(wait) => format!(
                    "All API keys have hit their rate limit or quota. Please retry in {} seconds.",
                    wait.as_secs_f64().ceil() as u64
                ),
                None => "All API keys have hit their rate limit or quota. Please try again later."
                    .to_string(),
            },
            RotationError::Fatal(e) => e.message.clone(),
        }
    }

    /// The underlying model error, if any call was made.
    pub fn model_error(&self) -> Option<&ModelError> {
        match self {
            RotationError::NoCredential => None,
            RotationError::AllInvalid { last, .. } => Some(last),
            RotationError::AllQuotaExceeded { last, .. } => Some(last),
            RotationError::Fatal(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_invalid_markers() {
        for msg in [
            "[400 Bad Request] API key not valid. Please pass a valid API key.",
            "PERMISSION DENIED for project",
            "HTTP 403 Forbidden",
        ] {
            assert_eq!(
                ModelErrorKind::classify_message(msg),
                ModelErrorKind::InvalidCredential,
                "{msg}"
            );
        }
    }

    #[test]
    fn classifies_quota_markers_with_retry_hint() {
        let kind = ModelErrorKind::classify_message(
            "[429 Too Many Requests] You exceeded your current quota. Please retry in 37.5s.",
        );
        assert_eq!(
            kind,
            ModelErrorKind::QuotaExceeded {
                retry_after: Some(Duration::from_secs_f64(37.5))
            }
        );
        assert!(matches!(
            ModelErrorKind::classify_message("Resource has been exhausted (e.g. check quota)."),
            ModelErrorKind::QuotaExceeded { retry_after: None }
        ));
    }

    #[test]
    fn unknown_messages_are_not_rotatable() {
        let kind = ModelErrorKind::classify_message("connection reset by peer");
        assert_eq!(kind, ModelErrorKind::Other);
        assert!(!kind.is_rotatable());
    }

    #[test]
    fn quota_user_message_includes_retry_hint() {
        let err = RotationError::AllQuotaExceeded {
            attempts: 2,
            last: ModelError::from_message("quota"),
            retry_after: Some(Duration::from_millis(12_300)),
        };
        assert!(err.user_message().contains("retry in 13 seconds"));
        let invalid = RotationError::AllInvalid {
            attempts: 2,
            last: ModelError::from_message("API key not valid"),
        };
        assert_ne!(err.user_message(), invalid.user_message());
    }
}
