pub mod error;
pub mod traits;
pub mod types;
pub mod validate;

pub use error::{CallError, Failure, FailureKind, Result};
pub use traits::{CancelOutcome, ProviderAdapter, TelephonyGateway};
pub use types::{
    new_call_id, AgentPayload, CallHandle, CallId, CallRequest, CallState, CallStatus,
    LegStatus, ProviderKind, ProviderPayload, SessionRef, StatusUpdate, SynthesisPayload,
    SynthesisSettings,
};
pub use validate::{validate_destination, validate_request};
