//! Parsing of gateway status callbacks into engine status updates.

use std::collections::HashMap;

use callbridge_core::{CallError, LegStatus, Result, StatusUpdate};

/// Parse the form parameters of a Twilio status callback into the
/// telephony ref and a sequence-ordered status update.
pub fn parse_status_callback(params: &HashMap<String, String>) -> Result<(String, StatusUpdate)> {
    let sid = params
        .get("CallSid")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CallError::Validation("status callback missing CallSid".into()))?;
    let raw_status = params
        .get("CallStatus")
        .ok_or_else(|| CallError::Validation("status callback missing CallStatus".into()))?;
    let status = parse_leg_status(raw_status)?;
    let seq = params
        .get("SequenceNumber")
        .ok_or_else(|| CallError::Validation("status callback missing SequenceNumber".into()))?
        .parse::<u64>()
        .map_err(|_| CallError::Validation("SequenceNumber is not an integer".into()))?;
    Ok((sid.clone(), StatusUpdate { seq, status }))
}

fn parse_leg_status(raw: &str) -> Result<LegStatus> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| CallError::Validation(format!("unknown call status '{raw}'")))
}
