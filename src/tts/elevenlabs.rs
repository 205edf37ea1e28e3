//! ElevenLabs neural TTS adapter (premium cascade tier).

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::ElevenLabsConfig;
use crate::persona::VoiceProfile;
use crate::tts::{AttemptError, AudioFormat, SynthesizedClip, TtsProvider, classify_status};

pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_url: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsTts {
    #[must_use]
    pub fn new(config: &ElevenLabsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
        }
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsTts {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceProfile,
        api_key: &str,
    ) -> std::result::Result<SynthesizedClip, AttemptError> {
        let url = format!("{}/v1/text-to-speech/{}", self.api_url, self.voice_id);
        let body = json!({
            "text": text,
            "model_id": self.model_id,
            "output_format": "mp3_44100_128",
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AttemptError::Network(e.to_string()))?;
            debug!("elevenlabs synthesized {} bytes", bytes.len());
            return Ok(SynthesizedClip {
                bytes: bytes.to_vec(),
                format: AudioFormat::Mp3,
            });
        }

        // ElevenLabs reports an exhausted quota under a 401 with a
        // "quota_exceeded" detail, so inspect the body before classifying.
        if status.as_u16() == 401 {
            let body = response.text().await.unwrap_or_default();
            if body.contains("quota") {
                return Err(AttemptError::QuotaExceeded);
            }
            return Err(AttemptError::AuthFailed);
        }

        Err(classify_status(status))
    }
}
