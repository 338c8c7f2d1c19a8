//! Request validation. Runs before any call id is assigned; a failure
//! here means no provider work was started.

use crate::error::{CallError, Result};
use crate::types::{CallRequest, ProviderPayload};

/// Maximum synthesis text length, in characters.
pub const MAX_SYNTHESIS_TEXT_LEN: usize = 5_000;

/// Maximum number of template-context variables on an agent request.
pub const MAX_TEMPLATE_CONTEXT_KEYS: usize = 50;

const MIN_NUMBER_LEN: usize = 8;
const MAX_NUMBER_LEN: usize = 18;

/// Validate the destination number and the declared payload.
pub fn validate_request(request: &CallRequest) -> Result<()> {
    validate_destination(&request.destination_number)?;
    match &request.payload {
        ProviderPayload::Agent(payload) => {
            if payload.agent_id.is_empty() {
                return Err(CallError::Validation("agentId must not be empty".into()));
            }
            if !payload
                .agent_id
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
            {
                return Err(CallError::Validation(
                    "agentId may only contain letters, digits, hyphens, and underscores".into(),
                ));
            }
            if payload.template_context.len() > MAX_TEMPLATE_CONTEXT_KEYS {
                return Err(CallError::Validation(format!(
                    "templateContext may not exceed {MAX_TEMPLATE_CONTEXT_KEYS} variables"
                )));
            }
        }
        ProviderPayload::Synthesis(payload) => {
            if payload.text.trim().is_empty() {
                return Err(CallError::Validation("text must not be empty".into()));
            }
            let len = payload.text.chars().count();
            if len > MAX_SYNTHESIS_TEXT_LEN {
                return Err(CallError::Validation(format!(
                    "text length {len} exceeds the maximum of {MAX_SYNTHESIS_TEXT_LEN} characters"
                )));
            }
            if payload.voice_id.is_empty() {
                return Err(CallError::Validation("voiceId must not be empty".into()));
            }
        }
    }
    Ok(())
}

/// E.164: leading `+`, 8-18 characters total, digits only after the
/// sign, nonzero first digit.
pub fn validate_destination(number: &str) -> Result<()> {
    let Some(digits) = number.strip_prefix('+') else {
        return Err(CallError::Validation(
            "destination number must start with '+' (E.164)".into(),
        ));
    };
    if number.len() < MIN_NUMBER_LEN || number.len() > MAX_NUMBER_LEN {
        return Err(CallError::Validation(format!(
            "destination number must be {MIN_NUMBER_LEN}-{MAX_NUMBER_LEN} characters including '+'"
        )));
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CallError::Validation(
            "destination number may only contain digits after '+'".into(),
        ));
    }
    if digits.starts_with('0') {
        return Err(CallError::Validation(
            "destination country code must not start with 0".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentPayload, SynthesisPayload, SynthesisSettings};

    fn agent_request(number: &str, agent_id: &str) -> CallRequest {
        CallRequest {
            destination_number: number.into(),
            payload: ProviderPayload::Agent(AgentPayload {
                agent_id: agent_id.into(),
                template_context: Default::default(),
            }),
            idempotency_key: None,
        }
    }

    fn synthesis_request(text: &str, voice_id: &str) -> CallRequest {
        CallRequest {
            destination_number: "+15551234567".into(),
            payload: ProviderPayload::Synthesis(SynthesisPayload {
                text: text.into(),
                voice_id: voice_id.into(),
                settings: SynthesisSettings::default(),
            }),
            idempotency_key: None,
        }
    }

    #[test]
    fn accepts_valid_e164() {
        for number in ["+15551234567", "+4420794601", "+919876543210"] {
            assert!(validate_destination(number).is_ok(), "{number}");
        }
    }

    #[test]
    fn rejects_missing_plus() {
        // Scenario C shape: digits only, no leading '+'.
        let err = validate_request(&agent_request("1234567890", "agent_1")).unwrap_err();
        assert!(matches!(err, CallError::Validation(_)));
    }

    #[test]
    fn rejects_bad_numbers() {
        for number in ["+1555", "+1555123456789012345", "+1555abc4567", "+0155512345", "15551234567"] {
            assert!(validate_destination(number).is_err(), "{number}");
        }
    }

    #[test]
    fn rejects_incomplete_agent_payload() {
        assert!(validate_request(&agent_request("+15551234567", "")).is_err());
        assert!(validate_request(&agent_request("+15551234567", "agent one")).is_err());
        assert!(validate_request(&agent_request("+15551234567", "agent_1")).is_ok());
    }

    #[test]
    fn rejects_oversized_template_context() {
        let mut request = agent_request("+15551234567", "agent_1");
        if let ProviderPayload::Agent(payload) = &mut request.payload {
            for i in 0..=MAX_TEMPLATE_CONTEXT_KEYS {
                payload
                    .template_context
                    .insert(format!("key_{i}"), serde_json::Value::Null);
            }
        }
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn rejects_incomplete_synthesis_payload() {
        assert!(validate_request(&synthesis_request("", "voice_1")).is_err());
        assert!(validate_request(&synthesis_request("   ", "voice_1")).is_err());
        assert!(validate_request(&synthesis_request("hello", "")).is_err());
        let long = "a".repeat(MAX_SYNTHESIS_TEXT_LEN + 1);
        assert!(validate_request(&synthesis_request(&long, "voice_1")).is_err());
        assert!(validate_request(&synthesis_request("hello", "voice_1")).is_ok());
    }
}
