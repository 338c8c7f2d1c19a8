//! Settings validation with field-path error messages.

use thiserror::Error;

use callbridge_core::validate_destination;

use crate::schema::CallbridgeConfig;

/// A single finding, located by field path.
#[derive(Debug, Error)]
#[error("config error at '{path}': {message}")]
pub struct ConfigIssue {
    pub path: String,
    pub message: String,
}

/// All findings from one validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<ConfigIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigIssue {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate the full settings object and collect every finding.
pub fn validate(config: &CallbridgeConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.ultravox.api_key.trim().is_empty() {
        report.error("ultravox.apiKey", "API key must not be empty");
    }
    if !config.ultravox.base_url.starts_with("http") {
        report.error("ultravox.baseUrl", "must be an http(s) URL");
    }

    if config.elevenlabs.api_key.trim().is_empty() {
        report.error("elevenlabs.apiKey", "API key must not be empty");
    }
    if config.elevenlabs.playback_base_url.trim().is_empty() {
        report.error(
            "elevenlabs.playbackBaseUrl",
            "required so the gateway can fetch parked audio",
        );
    }

    if config.twilio.account_sid.trim().is_empty() {
        report.error("twilio.accountSid", "account SID must not be empty");
    } else if !config.twilio.account_sid.starts_with("AC") {
        report.warn("twilio.accountSid", "account SIDs normally start with 'AC'");
    }
    if config.twilio.auth_token.trim().is_empty() {
        report.error("twilio.authToken", "auth token must not be empty");
    }
    if let Err(e) = validate_destination(&config.twilio.service_number) {
        report.error("twilio.serviceNumber", e.to_string());
    }

    let engine = &config.engine;
    if engine.max_concurrency == 0 {
        report.error("engine.maxConcurrency", "must be at least 1");
    }
    if engine.step_timeout_ms == 0 {
        report.error("engine.stepTimeoutMs", "must be nonzero");
    }
    if engine.workflow_deadline_ms <= engine.step_timeout_ms {
        report.warn(
            "engine.workflowDeadlineMs",
            "deadline should exceed the per-step timeout",
        );
    }
    if engine.retry.max_attempts == 0 {
        report.error("engine.retry.maxAttempts", "must be at least 1");
    }
    if engine.retry.backoff_factor < 1.0 {
        report.error("engine.retry.backoffFactor", "must be >= 1.0");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ElevenLabsConfig, EngineSettings, LoggingSettings, TwilioConfig, UltravoxConfig};

    fn valid_config() -> CallbridgeConfig {
        CallbridgeConfig {
            ultravox: UltravoxConfig {
                api_key: "uv".into(),
                base_url: "https://api.ultravox.ai".into(),
                agent_cache_ttl_secs: 300,
            },
            elevenlabs: ElevenLabsConfig {
                api_key: "el".into(),
                base_url: "https://api.elevenlabs.io".into(),
                model_id: "eleven_turbo_v2".into(),
                playback_base_url: "https://calls.example.com".into(),
                voice_cache_ttl_secs: 300,
            },
            twilio: TwilioConfig {
                account_sid: "AC123".into(),
                auth_token: "tok".into(),
                service_number: "+15550001111".into(),
                base_url: "https://api.twilio.com".into(),
            },
            engine: EngineSettings::default(),
            logging: LoggingSettings::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        let report = validate(&valid_config());
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn empty_credentials_fail() {
        let mut config = valid_config();
        config.ultravox.api_key = " ".into();
        config.twilio.auth_token = String::new();
        let report = validate(&config);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().any(|e| e.path == "ultravox.apiKey"));
    }

    #[test]
    fn bad_service_number_fails() {
        let mut config = valid_config();
        config.twilio.service_number = "5550001111".into();
        assert!(!validate(&config).is_valid());
    }

    #[test]
    fn zero_concurrency_fails() {
        let mut config = valid_config();
        config.engine.max_concurrency = 0;
        assert!(!validate(&config).is_valid());
    }
}
