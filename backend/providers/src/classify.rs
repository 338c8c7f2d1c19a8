//! Boundary classification of provider HTTP failures into the engine's
//! error taxonomy. Classification happens exactly once, here; the
//! orchestrator never re-classifies.

use callbridge_core::CallError;
use callbridge_logging::redact_text;

/// Map a non-success HTTP status to a classified error.
pub fn classify_http(provider: &str, status: u16, body: &str) -> CallError {
    let detail = summarize(provider, status, body);
    match status {
        401 | 403 => CallError::ProviderAuth(detail),
        429 => CallError::ProviderQuota {
            quota: quota_indicator(body),
            message: detail,
        },
        400..=499 => CallError::ProviderValidation(detail),
        _ => CallError::ProviderUnavailable(detail),
    }
}

/// Map a transport-level failure (connect error, reset, client-side
/// timeout) to a classified error. All of these are transient.
pub fn classify_transport(provider: &str, err: &reqwest::Error) -> CallError {
    CallError::ProviderUnavailable(format!("{provider}: {}", redact_text(&err.to_string())))
}

fn summarize(provider: &str, status: u16, body: &str) -> String {
    let snippet: String = redact_text(body).chars().take(200).collect();
    format!("{provider} returned {status}: {snippet}")
}

/// Best-effort extraction of what quota was exhausted, for the
/// machine-readable indicator on quota failures.
fn quota_indicator(body: &str) -> String {
    if body.contains("character") {
        "characters".into()
    } else if body.contains("concurren") {
        "concurrency".into()
    } else {
        "requests".into()
    }
}
