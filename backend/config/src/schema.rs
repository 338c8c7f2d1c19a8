//! Typed settings for providers, telephony, and the engine.
//!
//! Serde camelCase throughout so the same document can be shipped as
//! YAML or JSON.

use serde::{Deserialize, Serialize};

/// Root settings object handed to the service at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbridgeConfig {
    pub ultravox: UltravoxConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl CallbridgeConfig {
    /// Parse a YAML settings document.
    pub fn from_yaml(doc: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(doc)
    }
}

/// Conversational-agent backend (Ultravox).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UltravoxConfig {
    pub api_key: String,
    #[serde(default = "default_ultravox_base_url")]
    pub base_url: String,
    /// TTL for the cached agent directory.
    #[serde(default = "default_cache_ttl_secs")]
    pub agent_cache_ttl_secs: u64,
}

fn default_ultravox_base_url() -> String {
    "https://api.ultravox.ai".into()
}

/// Voice-synthesis backend (ElevenLabs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElevenLabsConfig {
    pub api_key: String,
    #[serde(default = "default_elevenlabs_base_url")]
    pub base_url: String,
    #[serde(default = "default_elevenlabs_model")]
    pub model_id: String,
    /// Public base URL under which parked synthesis audio is served to
    /// the telephony provider.
    pub playback_base_url: String,
    /// TTL for the cached voice directory.
    #[serde(default = "default_cache_ttl_secs")]
    pub voice_cache_ttl_secs: u64,
}

fn default_elevenlabs_base_url() -> String {
    "https://api.elevenlabs.io".into()
}

fn default_elevenlabs_model() -> String {
    "eleven_turbo_v2".into()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Telephony gateway (Twilio).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// E.164 caller id for outbound legs; also the number live agent
    /// sessions are bridged through.
    pub service_number: String,
    #[serde(default = "default_twilio_base_url")]
    pub base_url: String,
}

fn default_twilio_base_url() -> String {
    "https://api.twilio.com".into()
}

/// Orchestration limits and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// Concurrent workflows allowed past the provider gate; requests
    /// beyond this queue rather than fail.
    pub max_concurrency: usize,
    /// Per adapter/gateway call timeout. Shorter than the workflow
    /// deadline.
    pub step_timeout_ms: u64,
    /// Overall deadline from validation through telephony placement.
    pub workflow_deadline_ms: u64,
    /// How long terminal call state stays queryable before eviction.
    pub retention_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            step_timeout_ms: 10_000,
            workflow_deadline_ms: 45_000,
            retention_secs: 900,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff parameters for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Attempts in total, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
    /// Add ±25% random jitter to computed delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff_factor: 2.0,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    pub level: String,
    pub log_dir: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            log_dir: "logs".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_yaml() {
        let doc = r#"
ultravox:
  apiKey: uv-key
elevenlabs:
  apiKey: el-key
  playbackBaseUrl: https://calls.example.com
twilio:
  accountSid: AC123
  authToken: tok
  serviceNumber: "+15550001111"
"#;
        let config = CallbridgeConfig::from_yaml(doc).unwrap();
        assert_eq!(config.ultravox.base_url, "https://api.ultravox.ai");
        assert_eq!(config.engine.retry.max_attempts, 3);
        assert_eq!(config.engine.max_concurrency, 10);
        assert_eq!(config.twilio.service_number, "+15550001111");
    }

    #[test]
    fn engine_overrides_apply() {
        let doc = r#"
ultravox: { apiKey: uv }
elevenlabs: { apiKey: el, playbackBaseUrl: "https://x" }
twilio: { accountSid: AC, authToken: t, serviceNumber: "+15550001111" }
engine:
  maxConcurrency: 2
  stepTimeoutMs: 500
  workflowDeadlineMs: 2000
  retentionSecs: 60
  retry: { maxAttempts: 5, baseDelayMs: 10, backoffFactor: 3.0, maxDelayMs: 100, jitter: false }
"#;
        let config = CallbridgeConfig::from_yaml(doc).unwrap();
        assert_eq!(config.engine.max_concurrency, 2);
        assert_eq!(config.engine.retry.max_attempts, 5);
        assert!(!config.engine.retry.jitter);
    }
}
