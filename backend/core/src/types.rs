use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Failure;

/// Identifier assigned to an accepted call request.
pub type CallId = String;

/// Generate a fresh call identifier.
pub fn new_call_id() -> CallId {
    format!("call-{}", Uuid::new_v4())
}

/// Which backend establishes the media side of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Live conversational agent bridged into the call.
    Agent,
    /// Pre-synthesized audio played into the call.
    Synthesis,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// Payload for the conversational-agent backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPayload {
    /// Agent to run the conversation.
    pub agent_id: String,
    /// Variables substituted into the agent's prompt template.
    #[serde(default)]
    pub template_context: serde_json::Map<String, serde_json::Value>,
}

/// Knobs for the synthesis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub speed: f32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            speed: 1.0,
        }
    }
}

/// Payload for the voice-synthesis backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisPayload {
    /// Text spoken to the callee.
    pub text: String,
    /// Voice to synthesize with.
    pub voice_id: String,
    #[serde(default)]
    pub settings: SynthesisSettings,
}

/// Backend selection plus its payload. The tag is mandatory: the engine
/// never infers the backend from payload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderPayload {
    Agent(AgentPayload),
    Synthesis(SynthesisPayload),
}

impl ProviderPayload {
    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Agent(_) => ProviderKind::Agent,
            Self::Synthesis(_) => ProviderKind::Synthesis,
        }
    }
}

/// Immutable input to the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// E.164 destination, e.g. "+15551234567".
    pub destination_number: String,
    #[serde(flatten)]
    pub payload: ProviderPayload,
    /// Caller-supplied token collapsing duplicate submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Opaque handle for a provider-side session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionRef {
    /// Live session the telephony leg bridges into. `session_id` is the
    /// provider's call identifier, kept so the session can be torn down.
    Join { session_id: String, join_url: String },
    /// Generated audio parked for playback.
    Audio { audio_id: String, playback_url: String },
}

impl SessionRef {
    /// Short identifier for logging.
    pub fn id(&self) -> &str {
        match self {
            Self::Join { session_id, .. } => session_id,
            Self::Audio { audio_id, .. } => audio_id,
        }
    }
}

/// Lifecycle of one call. Terminal states are final: once reached, no
/// further adapter or gateway calls are made apart from session cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Initiated,
    SessionCreated,
    TelephonyRequested,
    Connected,
    Completed,
    SessionFailed,
    TelephonyFailed,
    Canceled,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::SessionFailed | Self::TelephonyFailed | Self::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::SessionCreated => "session_created",
            Self::TelephonyRequested => "telephony_requested",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::SessionFailed => "session_failed",
            Self::TelephonyFailed => "telephony_failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Telephony-leg progress vocabulary, as reported by the gateway's
/// status channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LegStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

/// One status report for a telephony leg. `seq` is assigned by the
/// reporting collaborator and increases monotonically; the registry
/// discards updates whose `seq` does not advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub seq: u64,
    pub status: LegStatus,
}

/// Returned synchronously by the router; completion is asynchronous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHandle {
    pub call_id: CallId,
}

/// Mutable record for one call, owned by the orchestrator and mutated
/// only under the registry's per-entry lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallState {
    pub call_id: CallId,
    pub provider: ProviderKind,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ref: Option<SessionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephony_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_transition_at: DateTime<Utc>,
    /// Highest status-update sequence number applied so far.
    pub last_seq: u64,
    /// Set once the session has been claimed for cleanup. Guards the
    /// exactly-once `close_session` compensation.
    pub session_closed: bool,
    /// Cooperative cancellation flag, read at workflow suspension points.
    pub cancel_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// A failed compensation is recorded here, never over the primary
    /// failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_failure: Option<String>,
}

impl CallState {
    pub fn new(call_id: CallId, request: &CallRequest) -> Self {
        let now = Utc::now();
        Self {
            call_id,
            provider: request.payload.provider(),
            status: CallStatus::Initiated,
            session_ref: None,
            telephony_ref: None,
            idempotency_key: request.idempotency_key.clone(),
            created_at: now,
            last_transition_at: now,
            last_seq: 0,
            session_closed: false,
            cancel_requested: false,
            failure: None,
            compensation_failure: None,
        }
    }

    /// Move to `status` and stamp the transition time.
    pub fn transition(&mut self, status: CallStatus) {
        self.status = status;
        self.last_transition_at = Utc::now();
    }
}
