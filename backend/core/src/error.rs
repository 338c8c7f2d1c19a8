use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::CallId;

pub type Result<T> = std::result::Result<T, CallError>;

/// Classified error taxonomy for the call engine.
///
/// Errors are classified once, at the boundary where they occur (adapter,
/// gateway, or validation); nothing downstream re-classifies them.
#[derive(Debug, Error)]
pub enum CallError {
    /// Malformed request. Never retried; no provider work is started.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid or expired provider credentials. Permanent.
    #[error("provider auth error: {0}")]
    ProviderAuth(String),

    /// Provider quota exhausted. Permanent within the call's lifetime;
    /// `quota` names the exhausted resource so callers can back off.
    #[error("provider quota exceeded ({quota}): {message}")]
    ProviderQuota { quota: String, message: String },

    /// Transient network or 5xx failure. The only class the retry
    /// policy will retry.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider rejected the request as invalid. Permanent.
    #[error("provider rejected request: {0}")]
    ProviderValidation(String),

    /// Permanent telephony placement failure (e.g. destination rejected
    /// by the gateway).
    #[error("telephony failure: {0}")]
    Telephony(String),

    /// Workflow exceeded its deadline.
    #[error("deadline exceeded: {0}")]
    Timeout(String),

    /// Invariant violation. Surfaced opaquely; details go to the log.
    #[error("internal error: {0}")]
    Internal(String),

    /// No call with the given id in the registry.
    #[error("call not found: {0}")]
    NotFound(CallId),

    /// Operation not permitted in the call's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl CallError {
    /// Transient errors are eligible for retry; every other class is
    /// permanent within the lifetime of one call request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::ProviderAuth(_) => FailureKind::ProviderAuth,
            Self::ProviderQuota { .. } => FailureKind::ProviderQuota,
            Self::ProviderUnavailable(_) => FailureKind::ProviderUnavailable,
            Self::ProviderValidation(_) => FailureKind::ProviderValidation,
            Self::Telephony(_) => FailureKind::Telephony,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Internal(_) | Self::NotFound(_) | Self::InvalidState(_) => FailureKind::Internal,
        }
    }

    /// The record attached to a terminal `CallState`. Internal errors are
    /// deliberately stripped to an opaque message.
    pub fn to_failure(&self) -> Failure {
        match self {
            Self::ProviderQuota { quota, message } => Failure {
                kind: FailureKind::ProviderQuota,
                message: message.clone(),
                quota: Some(quota.clone()),
            },
            Self::Internal(msg) => {
                tracing::error!(detail = %msg, "internal error surfaced as opaque failure");
                Failure {
                    kind: FailureKind::Internal,
                    message: "internal error".into(),
                    quota: None,
                }
            }
            other => Failure {
                kind: other.kind(),
                message: other.to_string(),
                quota: None,
            },
        }
    }
}

/// Machine-readable failure class exposed through `get_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    ProviderAuth,
    ProviderQuota,
    ProviderUnavailable,
    ProviderValidation,
    Telephony,
    Timeout,
    Internal,
}

/// Classified failure reason stored on a terminal `CallState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<String>,
}
