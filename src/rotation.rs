//! Key rotation executor.
//!
//! Runs one logical operation against an ordered list of credentials. Each
//! credential gets its own freshly constructed client and exactly one
//! attempt; the first success wins. Invalid-credential and quota failures
//! move on to the next key, anything else aborts the whole operation.
//!
//! The executor is stateless: nothing is remembered between invocations,
//! so a key that failed on one call is tried again on the next.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::contract::{GenerativeModel, ModelFactory};
use crate::credentials::mask_key;
use crate::error::{ModelError, ModelErrorKind, RotationError};

/// Tries `operation` with each candidate in order until one succeeds.
///
/// `operation` receives a client bound to the current credential and
/// `model_id`. Blank candidates are skipped and do not count as attempts.
pub async fn execute_with_rotation<T, F, Fut>(
    candidates: &[String],
    model_id: &str,
    factory: &dyn ModelFactory,
    operation: F,
) -> Result<T, RotationError>
where
    F: Fn(Box<dyn GenerativeModel>) -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut attempts = 0usize;
    let mut last_failure: Option<ModelError> = None;
    let mut saw_quota = false;
    let mut retry_after: Option<Duration> = None;

    for credential in candidates {
        let credential = credential.trim();
        if credential.is_empty() {
            debug!("[ROTATE] Skipping blank credential");
            continue;
        }
        attempts += 1;
        let masked = mask_key(credential);
        info!(attempt = attempts, key = %masked, model = model_id, "[ROTATE] Trying credential");

        let outcome = match factory.connect(credential, model_id) {
            Ok(client) => operation(client).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                info!(attempt = attempts, key = %masked, "[ROTATE] Call succeeded");
                return Ok(value);
            }
            Err(e) if e.kind.is_rotatable() => {
                if let ModelErrorKind::QuotaExceeded { retry_after: hint } = &e.kind {
                    saw_quota = true;
                    if hint.is_some() {
                        retry_after = *hint;
                    }
                }
                warn!(
                    attempt = attempts,
                    key = %masked,
                    kind = ?e.kind,
                    error = %e,
                    "[ROTATE] Credential rejected, trying next"
                );
                last_failure = Some(e);
            }
            Err(e) => {
                error!(
                    attempt = attempts,
                    key = %masked,
                    kind = ?e.kind,
                    error = %e,
                    "[ROTATE][ERROR] Fatal failure, not trying remaining credentials"
                );
                return Err(RotationError::Fatal(e));
            }
        }
    }

    match last_failure {
        None => {
            error!("[ROTATE][ERROR] No credential configured");
            Err(RotationError::NoCredential)
        }
        Some(last) if saw_quota => {
            error!(attempts, retry_after = ?retry_after, "[ROTATE][ERROR] All credentials exhausted by quota");
            Err(RotationError::AllQuotaExceeded {
                attempts,
                last,
                retry_after,
            })
        }
        Some(last) => {
            error!(attempts, "[ROTATE][ERROR] All credentials invalid");
            Err(RotationError::AllInvalid { attempts, last })
        }
    }
}
