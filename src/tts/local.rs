//! Local neural TTS server adapter (keyless third tier).
//!
//! Talks to a Kokoro-style synthesis server on localhost. No credentials:
//! a connection failure just moves the cascade along, and the server being
//! down is the common case on kiosks without the optional model installed.

use async_trait::async_trait;
use serde_json::json;

use crate::config::LocalTtsConfig;
use crate::persona::VoiceProfile;
use crate::tts::{AttemptError, AudioFormat, SynthesizedClip, TtsProvider};

pub struct LocalNeuralTts {
    client: reqwest::Client,
    url: String,
    voice: String,
}

impl LocalNeuralTts {
    #[must_use]
    pub fn new(config: &LocalTtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            voice: config.voice.clone(),
        }
    }
}

#[async_trait]
impl TtsProvider for LocalNeuralTts {
    fn name(&self) -> &str {
        "local-neural"
    }

    fn requires_key(&self) -> bool {
        false
    }

    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceProfile,
        _api_key: &str,
    ) -> std::result::Result<SynthesizedClip, AttemptError> {
        let body = json!({
            "input": text,
            "voice": self.voice,
            "response_format": "wav",
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(AttemptError::NotFound);
        }
        if !status.is_success() {
            return Err(AttemptError::Network(format!("local server status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;
        Ok(SynthesizedClip {
            bytes: bytes.to_vec(),
            format: AudioFormat::Wav,
        })
    }
}
