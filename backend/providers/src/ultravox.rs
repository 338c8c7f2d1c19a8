//! Conversational-agent adapter (Ultravox).
//!
//! `open_session` resolves an agent id plus template context into a live
//! join URL suitable for immediate telephony bridging; `close_session`
//! tears the provider-side call down.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use callbridge_config::UltravoxConfig;
use callbridge_core::{CallError, ProviderAdapter, ProviderKind, ProviderPayload, Result, SessionRef};

use crate::cache::TtlCache;
use crate::classify::{classify_http, classify_transport};

const API_KEY_HEADER: &str = "X-API-Key";

/// Cached agent directory entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub agent_id: String,
    #[serde(default)]
    pub name: String,
}

pub struct UltravoxAdapter {
    config: UltravoxConfig,
    /// Caller-id number the telephony medium bridges through.
    service_number: String,
    client: Client,
    agents: TtlCache<String, AgentInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallBody {
    medium: Medium,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    template_context: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct Medium {
    twilio: TwilioMedium,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TwilioMedium {
    phone_number: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallResponse {
    call_id: Option<String>,
    join_url: Option<String>,
}

impl UltravoxAdapter {
    pub fn new(config: UltravoxConfig, service_number: String) -> Self {
        let ttl = std::time::Duration::from_secs(config.agent_cache_ttl_secs);
        Self {
            config,
            service_number,
            client: Client::new(),
            agents: TtlCache::new(ttl),
        }
    }

    /// Look an agent up, serving from the TTL cache when possible. An
    /// unknown agent is a permanent rejection of this request.
    async fn resolve_agent(&self, agent_id: &str) -> Result<AgentInfo> {
        if let Some(agent) = self.agents.get(agent_id) {
            debug!(agent_id, "agent served from cache");
            return Ok(agent);
        }
        let url = format!("{}/api/agents/{agent_id}", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| classify_transport("ultravox", &e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                return Err(CallError::ProviderValidation(format!(
                    "agent '{agent_id}' not found"
                )));
            }
            return Err(classify_http("ultravox", status.as_u16(), &body));
        }
        let agent: AgentInfo = resp
            .json()
            .await
            .map_err(|e| CallError::ProviderUnavailable(format!("ultravox: malformed agent response: {e}")))?;
        self.agents.insert(agent_id.to_string(), agent.clone());
        Ok(agent)
    }
}

#[async_trait]
impl ProviderAdapter for UltravoxAdapter {
    fn name(&self) -> &str {
        "ultravox"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Agent
    }

    async fn open_session(&self, payload: &ProviderPayload) -> Result<SessionRef> {
        let ProviderPayload::Agent(agent) = payload else {
            return Err(CallError::Internal(
                "agent adapter received a synthesis payload".into(),
            ));
        };
        self.resolve_agent(&agent.agent_id).await?;

        let url = format!("{}/api/agents/{}/calls", self.config.base_url, agent.agent_id);
        let body = CreateCallBody {
            medium: Medium {
                twilio: TwilioMedium {
                    phone_number: self.service_number.clone(),
                },
            },
            template_context: agent.template_context.clone(),
        };
        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("ultravox", &e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_http("ultravox", status.as_u16(), &text));
        }
        let call: CreateCallResponse = resp
            .json()
            .await
            .map_err(|e| CallError::ProviderUnavailable(format!("ultravox: malformed call response: {e}")))?;
        match (call.call_id, call.join_url) {
            (Some(session_id), Some(join_url)) => {
                info!(agent_id = %agent.agent_id, session_id = %session_id, "agent session opened");
                Ok(SessionRef::Join {
                    session_id,
                    join_url,
                })
            }
            _ => Err(CallError::ProviderUnavailable(
                "ultravox: call response missing callId or joinUrl".into(),
            )),
        }
    }

    async fn close_session(&self, session: &SessionRef) -> Result<()> {
        let SessionRef::Join { session_id, .. } = session else {
            return Err(CallError::Internal(
                "agent adapter asked to close a non-agent session".into(),
            ));
        };
        let url = format!("{}/api/calls/{session_id}", self.config.base_url);
        let resp = self
            .client
            .delete(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| classify_transport("ultravox", &e))?;
        let status = resp.status();
        // Already-gone sessions count as closed.
        if status.is_success() || status.as_u16() == 404 {
            info!(session_id = %session_id, "agent session closed");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            warn!(session_id = %session_id, status = status.as_u16(), "agent session close failed");
            Err(classify_http("ultravox", status.as_u16(), &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_core::SynthesisPayload;

    fn adapter() -> UltravoxAdapter {
        UltravoxAdapter::new(
            UltravoxConfig {
                api_key: "uv".into(),
                base_url: "https://api.ultravox.ai".into(),
                agent_cache_ttl_secs: 300,
            },
            "+15550001111".into(),
        )
    }

    #[tokio::test]
    async fn rejects_mismatched_payload() {
        let payload = ProviderPayload::Synthesis(SynthesisPayload {
            text: "hi".into(),
            voice_id: "v".into(),
            settings: Default::default(),
        });
        let err = adapter().open_session(&payload).await.unwrap_err();
        assert!(matches!(err, CallError::Internal(_)));
    }

    #[test]
    fn call_body_omits_empty_template_context() {
        let body = CreateCallBody {
            medium: Medium {
                twilio: TwilioMedium {
                    phone_number: "+15550001111".into(),
                },
            },
            template_context: Default::default(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("templateContext").is_none());
        assert_eq!(json["medium"]["twilio"]["phoneNumber"], "+15550001111");
    }
}
