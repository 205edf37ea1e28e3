//! Basic cloud TTS via the translate speech endpoint (keyless last tier).
//!
//! The lowest-quality cascade tier, kept because it needs no credentials
//! at all. The voice accent is picked through the host TLD, which is how
//! this endpoint has always varied its voices.

use async_trait::async_trait;

use crate::config::TranslateTtsConfig;
use crate::persona::VoiceProfile;
use crate::tts::{AttemptError, AudioFormat, SynthesizedClip, TtsProvider};

pub struct TranslateTts {
    client: reqwest::Client,
    override_url: String,
    lang: String,
}

impl TranslateTts {
    #[must_use]
    pub fn new(config: &TranslateTtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            override_url: config.url.clone(),
            lang: config.lang.clone(),
        }
    }

    fn endpoint(&self, accent: &str) -> String {
        if self.override_url.is_empty() {
            format!("https://translate.google.{accent}/translate_tts")
        } else {
            format!("{}/translate_tts", self.override_url.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl TtsProvider for TranslateTts {
    fn name(&self) -> &str {
        "translate"
    }

    fn requires_key(&self) -> bool {
        false
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        _api_key: &str,
    ) -> std::result::Result<SynthesizedClip, AttemptError> {
        let url = format!(
            "{}?ie=UTF-8&client=tw-ob&tl={}&q={}",
            self.endpoint(&voice.accent),
            self.lang,
            urlencoding::encode(text),
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Network(format!("translate status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;
        Ok(SynthesizedClip {
            bytes: bytes.to_vec(),
            format: AudioFormat::Mp3,
        })
    }
}
