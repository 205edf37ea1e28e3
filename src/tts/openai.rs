//! OpenAI speech endpoint adapter (secondary neural tier).

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::OpenAiTtsConfig;
use crate::persona::VoiceProfile;
use crate::tts::{AttemptError, AudioFormat, SynthesizedClip, TtsProvider, classify_status};

pub struct OpenAiTts {
    client: reqwest::Client,
    api_url: String,
    model: String,
    voice: String,
}

impl OpenAiTts {
    #[must_use]
    pub fn new(config: &OpenAiTtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            voice: config.voice.clone(),
        }
    }
}

#[async_trait]
impl TtsProvider for OpenAiTts {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        api_key: &str,
    ) -> std::result::Result<SynthesizedClip, AttemptError> {
        // Map the profile's words-per-minute onto the endpoint's speed
        // multiplier, where 1.0 is the provider's natural pace (~175 wpm).
        let speed = (f64::from(voice.speed) / 175.0).clamp(0.25, 4.0);

        let body = json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "mp3",
            "speed": speed,
        });

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.api_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;
        debug!("openai synthesized {} bytes at speed {speed:.2}", bytes.len());
        Ok(SynthesizedClip {
            bytes: bytes.to_vec(),
            format: AudioFormat::Mp3,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OpenAiTtsConfig {
        OpenAiTtsConfig {
            api_keys: Vec::new(),
            api_url: server.uri(),
            model: "tts-1".to_owned(),
            voice: "alloy".to_owned(),
        }
    }

    #[tokio::test]
    async fn posts_model_and_voice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/speech"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "tts-1", "voice": "alloy"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1, 2]))
            .mount(&server)
            .await;

        let provider = OpenAiTts::new(&config(&server));
        let clip = provider
            .synthesize("Welcome.", &VoiceProfile::default(), "sk-test")
            .await
            .unwrap();
        assert_eq!(clip.format, AudioFormat::Mp3);
    }

    #[tokio::test]
    async fn rate_limit_maps_to_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let provider = OpenAiTts::new(&config(&server));
        let err = provider
            .synthesize("hi", &VoiceProfile::default(), "sk")
            .await
            .unwrap_err();
        assert_eq!(err, AttemptError::QuotaExceeded);
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let provider = OpenAiTts::new(&OpenAiTtsConfig {
            api_url: "http://127.0.0.1:9".to_owned(),
            ..OpenAiTtsConfig::default()
        });
        let err = provider
            .synthesize("hi", &VoiceProfile::default(), "sk")
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::Network(_)));
    }
}
