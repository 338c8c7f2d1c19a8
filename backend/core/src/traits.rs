use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ProviderKind, ProviderPayload, SessionRef};

/// Uniform capability surface over one AI backend.
///
/// Implementations must be safe for concurrent invocation across distinct
/// calls; any connection pooling is internal to the implementation.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Backend name for logging (e.g. "ultravox").
    fn name(&self) -> &str;

    /// Which request variant this adapter serves.
    fn kind(&self) -> ProviderKind;

    /// Open a provider-side session for one call attempt and return the
    /// artifact the telephony leg needs.
    async fn open_session(&self, payload: &ProviderPayload) -> Result<SessionRef>;

    /// Release the session. Best-effort: the orchestrator logs failures
    /// and never escalates them to the caller.
    async fn close_session(&self, session: &SessionRef) -> Result<()>;
}

/// Outcome of a telephony-leg cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Canceled,
    /// The leg was already answered; cancellation is rejected and the
    /// call proceeds.
    AlreadyConnected,
}

/// Places and cancels telephony legs. Status progress arrives through a
/// separate push/poll channel, outside this trait.
#[async_trait]
pub trait TelephonyGateway: Send + Sync {
    /// Gateway name for logging (e.g. "twilio").
    fn name(&self) -> &str;

    /// Place a call to `destination` carrying the provider artifact.
    /// Returns the gateway-assigned call identifier.
    async fn place_call(&self, destination: &str, session: &SessionRef) -> Result<String>;

    /// Best-effort cancellation of a previously placed leg.
    async fn cancel_call(&self, telephony_ref: &str) -> Result<CancelOutcome>;
}
