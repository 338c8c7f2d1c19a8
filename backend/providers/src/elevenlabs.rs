//! Voice-synthesis adapter (ElevenLabs).
//!
//! `open_session` synthesizes the request text and parks the audio in an
//! in-process store, returning a playback reference for the telephony
//! leg. There is no live aspect: `close_session` just releases the
//! parked audio.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use callbridge_config::ElevenLabsConfig;
use callbridge_core::{
    CallError, ProviderAdapter, ProviderKind, ProviderPayload, Result, SessionRef,
    SynthesisSettings,
};

use crate::cache::TtlCache;
use crate::classify::{classify_http, classify_transport};

const API_KEY_HEADER: &str = "xi-api-key";

/// Cached voice directory entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VoiceInfo {
    pub voice_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceInfo>,
}

#[derive(Serialize)]
struct SynthesizeBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettingsBody,
}

#[derive(Serialize)]
struct VoiceSettingsBody {
    stability: f32,
    similarity_boost: f32,
    speed: f32,
}

impl From<&SynthesisSettings> for VoiceSettingsBody {
    fn from(settings: &SynthesisSettings) -> Self {
        Self {
            stability: settings.stability,
            similarity_boost: settings.similarity_boost,
            speed: settings.speed,
        }
    }
}

/// Parked synthesis output awaiting playback. Entries live from
/// `open_session` until the matching `close_session`.
struct AudioStore {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl AudioStore {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn put(&self, audio_id: String, audio: Bytes) {
        self.lock().insert(audio_id, audio);
    }

    fn remove(&self, audio_id: &str) -> bool {
        self.lock().remove(audio_id).is_some()
    }

    fn get(&self, audio_id: &str) -> Option<Bytes> {
        self.lock().get(audio_id).cloned()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bytes>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

pub struct ElevenLabsAdapter {
    config: ElevenLabsConfig,
    client: Client,
    voices: TtlCache<String, VoiceInfo>,
    store: AudioStore,
}

impl ElevenLabsAdapter {
    pub fn new(config: ElevenLabsConfig) -> Self {
        let ttl = std::time::Duration::from_secs(config.voice_cache_ttl_secs);
        Self {
            config,
            client: Client::new(),
            voices: TtlCache::new(ttl),
            store: AudioStore::new(),
        }
    }

    /// Parked audio for a session, for whatever layer serves playback
    /// URLs to the telephony provider.
    pub fn audio(&self, audio_id: &str) -> Option<Bytes> {
        self.store.get(audio_id)
    }

    /// Number of parked audio entries (housekeeping metric).
    pub fn parked_audio_count(&self) -> usize {
        self.store.len()
    }

    /// Resolve a voice against the TTL-cached directory. An unknown
    /// voice is a permanent rejection of this request.
    async fn resolve_voice(&self, voice_id: &str) -> Result<VoiceInfo> {
        if let Some(voice) = self.voices.get(voice_id) {
            debug!(voice_id, "voice served from cache");
            return Ok(voice);
        }
        let url = format!("{}/v1/voices", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| classify_transport("elevenlabs", &e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_http("elevenlabs", status.as_u16(), &body));
        }
        let listing: VoicesResponse = resp
            .json()
            .await
            .map_err(|e| CallError::ProviderUnavailable(format!("elevenlabs: malformed voices response: {e}")))?;
        let mut found = None;
        for voice in listing.voices {
            if voice.voice_id == voice_id {
                found = Some(voice.clone());
            }
            self.voices.insert(voice.voice_id.clone(), voice);
        }
        found.ok_or_else(|| CallError::ProviderValidation(format!("voice '{voice_id}' not found")))
    }
}

#[async_trait]
impl ProviderAdapter for ElevenLabsAdapter {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Synthesis
    }

    async fn open_session(&self, payload: &ProviderPayload) -> Result<SessionRef> {
        let ProviderPayload::Synthesis(synthesis) = payload else {
            return Err(CallError::Internal(
                "synthesis adapter received an agent payload".into(),
            ));
        };
        self.resolve_voice(&synthesis.voice_id).await?;

        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.config.base_url, synthesis.voice_id
        );
        let body = SynthesizeBody {
            text: &synthesis.text,
            model_id: &self.config.model_id,
            voice_settings: (&synthesis.settings).into(),
        };
        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport("elevenlabs", &e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_http("elevenlabs", status.as_u16(), &text));
        }
        let audio = resp
            .bytes()
            .await
            .map_err(|e| classify_transport("elevenlabs", &e))?;

        let audio_id = format!("aud-{}", Uuid::new_v4());
        let playback_url = format!(
            "{}/audio/{audio_id}",
            self.config.playback_base_url.trim_end_matches('/')
        );
        info!(
            voice_id = %synthesis.voice_id,
            audio_id = %audio_id,
            bytes = audio.len(),
            "synthesis session opened"
        );
        self.store.put(audio_id.clone(), audio);
        Ok(SessionRef::Audio {
            audio_id,
            playback_url,
        })
    }

    async fn close_session(&self, session: &SessionRef) -> Result<()> {
        let SessionRef::Audio { audio_id, .. } = session else {
            return Err(CallError::Internal(
                "synthesis adapter asked to close a non-synthesis session".into(),
            ));
        };
        // Releasing already-released audio is fine; close is idempotent.
        let released = self.store.remove(audio_id);
        debug!(audio_id = %audio_id, released, "synthesis session closed");
        Ok(())
    }
}
