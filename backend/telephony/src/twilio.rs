//! Twilio call placement and cancellation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use callbridge_config::TwilioConfig;
use callbridge_core::{CallError, CancelOutcome, Result, SessionRef, TelephonyGateway};
use callbridge_logging::{mask_destination, redact_text};

use crate::twiml::bridge_twiml;

// Twilio error code for "call is not in a cancelable state".
const ERR_NOT_CANCELABLE: i64 = 21220;

pub struct TwilioGateway {
    config: TwilioConfig,
    client: Client,
}

#[derive(Deserialize)]
struct CallResource {
    sid: String,
    status: String,
}

#[derive(Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl TwilioGateway {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.base_url, self.config.account_sid
        )
    }

    fn call_url(&self, sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls/{sid}.json",
            self.config.base_url, self.config.account_sid
        )
    }
}

/// Placement failures: auth and rate limits keep their provider
/// classes, other 4xx responses are permanent placement failures
/// (invalid destination, unreachable number), 5xx is transient.
fn classify_placement(status: u16, body: &str) -> CallError {
    let message = parse_error_message(body).unwrap_or_else(|| redact_text(body).chars().take(200).collect());
    match status {
        401 | 403 => CallError::ProviderAuth(format!("twilio returned {status}: {message}")),
        429 => CallError::ProviderUnavailable(format!("twilio rate limited: {message}")),
        400..=499 => CallError::Telephony(format!("twilio rejected placement ({status}): {message}")),
        _ => CallError::ProviderUnavailable(format!("twilio returned {status}: {message}")),
    }
}

fn parse_error_message(body: &str) -> Option<String> {
    let parsed: TwilioErrorBody = serde_json::from_str(body).ok()?;
    parsed.message.map(|m| redact_text(&m))
}

fn parse_error_code(body: &str) -> Option<i64> {
    let parsed: TwilioErrorBody = serde_json::from_str(body).ok()?;
    parsed.code
}

#[async_trait]
impl TelephonyGateway for TwilioGateway {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn place_call(&self, destination: &str, session: &SessionRef) -> Result<String> {
        let twiml = bridge_twiml(session);
        let params = [
            ("To", destination),
            ("From", self.config.service_number.as_str()),
            ("Twiml", twiml.as_str()),
        ];
        let resp = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| CallError::ProviderUnavailable(format!("twilio: {}", redact_text(&e.to_string()))))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_placement(status.as_u16(), &body));
        }
        let call: CallResource = resp
            .json()
            .await
            .map_err(|e| CallError::ProviderUnavailable(format!("twilio: malformed call resource: {e}")))?;
        info!(
            telephony_ref = %call.sid,
            destination = %mask_destination(destination),
            leg_status = %call.status,
            "telephony leg placed"
        );
        Ok(call.sid)
    }

    async fn cancel_call(&self, telephony_ref: &str) -> Result<CancelOutcome> {
        let resp = self
            .client
            .post(self.call_url(telephony_ref))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("Status", "canceled")])
            .send()
            .await
            .map_err(|e| CallError::ProviderUnavailable(format!("twilio: {}", redact_text(&e.to_string()))))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if parse_error_code(&body) == Some(ERR_NOT_CANCELABLE) {
                return Ok(CancelOutcome::AlreadyConnected);
            }
            warn!(telephony_ref = %telephony_ref, status = status.as_u16(), "leg cancel failed");
            return Err(classify_placement(status.as_u16(), &body));
        }
        let call: CallResource = resp
            .json()
            .await
            .map_err(|e| CallError::ProviderUnavailable(format!("twilio: malformed call resource: {e}")))?;
        match call.status.as_str() {
            "in-progress" | "completed" => Ok(CancelOutcome::AlreadyConnected),
            _ => {
                info!(telephony_ref = %telephony_ref, "telephony leg canceled");
                Ok(CancelOutcome::Canceled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_classification() {
        assert!(matches!(
            classify_placement(401, "{}"),
            CallError::ProviderAuth(_)
        ));
        assert!(matches!(
            classify_placement(429, "{}"),
            CallError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            classify_placement(
                400,
                r#"{"code": 21211, "message": "Invalid 'To' phone number"}"#
            ),
            CallError::Telephony(_)
        ));
        assert!(classify_placement(503, "").is_transient());
        assert!(!classify_placement(400, "{}").is_transient());
    }

    #[test]
    fn error_body_parsing() {
        let body = r#"{"code": 21220, "message": "Call is not in a cancelable state"}"#;
        assert_eq!(parse_error_code(body), Some(ERR_NOT_CANCELABLE));
        assert_eq!(
            parse_error_message(body).as_deref(),
            Some("Call is not in a cancelable state")
        );
        assert_eq!(parse_error_code("not json"), None);
    }

    #[test]
    fn urls_include_account() {
        let gateway = TwilioGateway::new(TwilioConfig {
            account_sid: "AC123".into(),
            auth_token: "tok".into(),
            service_number: "+15550001111".into(),
            base_url: "https://api.twilio.com".into(),
        });
        assert_eq!(
            gateway.calls_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json"
        );
        assert_eq!(
            gateway.call_url("CA9"),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls/CA9.json"
        );
    }
}
