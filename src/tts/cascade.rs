//! Provider failover cascade with per-provider key rotation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::SynthesisConfig;
use crate::error::{Result, VoiceError};
use crate::persona::VoiceProfile;
use crate::tts::{ApiKeyPool, AttemptError, SynthesizedClip, TtsProvider};
use crate::tts::{
    elevenlabs::ElevenLabsTts, local::LocalNeuralTts, openai::OpenAiTts, translate::TranslateTts,
};

struct Tier {
    provider: Arc<dyn TtsProvider>,
    keys: ApiKeyPool,
}

/// Ordered fallback chain of TTS providers.
///
/// Every attempt runs under its own deadline so a hung connection on one
/// tier cannot stall the whole chain. Quota/auth failures rotate that
/// tier's key pool; anything else abandons the tier. Exhaustion is the
/// caller's cue to use the offline voice.
pub struct ProviderCascade {
    tiers: Vec<Tier>,
    attempt_timeout: Duration,
}

impl ProviderCascade {
    /// Empty cascade; add tiers with [`push`](Self::push).
    #[must_use]
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            tiers: Vec::new(),
            attempt_timeout,
        }
    }

    /// The standard kiosk chain: premium neural, secondary neural, local
    /// neural server, basic cloud.
    #[must_use]
    pub fn from_config(config: &SynthesisConfig) -> Self {
        let providers = &config.providers;
        let mut cascade = Self::new(Duration::from_secs(config.attempt_timeout_s));
        cascade.push(
            Arc::new(ElevenLabsTts::new(&providers.elevenlabs)),
            providers.elevenlabs.api_keys.clone(),
        );
        cascade.push(
            Arc::new(OpenAiTts::new(&providers.openai)),
            providers.openai.api_keys.clone(),
        );
        cascade.push(Arc::new(LocalNeuralTts::new(&providers.local)), Vec::new());
        cascade.push(Arc::new(TranslateTts::new(&providers.translate)), Vec::new());
        cascade
    }

    /// Append a tier at the lowest priority.
    pub fn push(&mut self, provider: Arc<dyn TtsProvider>, keys: Vec<String>) {
        self.tiers.push(Tier {
            provider,
            keys: ApiKeyPool::new(keys),
        });
    }

    /// Key cursor position for a tier, by provider name.
    #[must_use]
    pub fn key_cursor(&self, provider_name: &str) -> Option<usize> {
        self.tiers
            .iter()
            .find(|t| t.provider.name() == provider_name)
            .map(|t| t.keys.cursor())
    }

    /// Synthesize one text unit, walking the chain until a tier succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error only when every tier is exhausted; the caller must
    /// then fall back to the offline voice.
    pub async fn synthesize(&self, text: &str, voice: &VoiceProfile) -> Result<SynthesizedClip> {
        for tier in &self.tiers {
            let name = tier.provider.name();

            let attempts = if tier.provider.requires_key() {
                if tier.keys.is_empty() {
                    debug!("skipping {name}: no API keys configured");
                    continue;
                }
                tier.keys.len()
            } else {
                1
            };

            for attempt in 0..attempts {
                let key = if tier.provider.requires_key() {
                    match tier.keys.current() {
                        Some(k) => k.to_owned(),
                        None => break,
                    }
                } else {
                    String::new()
                };

                let outcome = tokio::time::timeout(
                    self.attempt_timeout,
                    tier.provider.synthesize(text, voice, &key),
                )
                .await;

                let err = match outcome {
                    Ok(Ok(clip)) => {
                        debug!("{name} synthesized {} chars", text.chars().count());
                        return Ok(clip);
                    }
                    Ok(Err(e)) => e,
                    Err(_) => AttemptError::Network("attempt deadline expired".into()),
                };

                if err.rotates_key() && tier.provider.requires_key() {
                    warn!("{name} key #{} failed: {err}", tier.keys.cursor() + 1);
                    if attempt + 1 < attempts {
                        tier.keys.advance();
                    }
                } else {
                    warn!("{name} unavailable ({err}), trying next provider");
                    break;
                }
            }
        }

        Err(VoiceError::Tts("all synthesis providers failed".into()))
    }
}
