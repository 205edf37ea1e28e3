//! Text-to-speech providers and the failover cascade.
//!
//! Each provider adapter classifies its own failures into [`AttemptError`];
//! the cascade only looks at the variant, never at error strings. Quota and
//! auth failures rotate the provider's key pool, everything else moves on
//! to the next provider.

pub mod cascade;
pub mod elevenlabs;
pub mod keypool;
pub mod local;
pub mod offline;
pub mod openai;
pub mod translate;

pub use cascade::ProviderCascade;
pub use keypool::ApiKeyPool;
pub use offline::EspeakVoice;

use async_trait::async_trait;

use crate::persona::VoiceProfile;

/// Container format of a synthesized clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Wav,
}

/// One synthesized utterance, still encoded.
#[derive(Debug, Clone)]
pub struct SynthesizedClip {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
}

/// Why a single provider attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    /// The key's quota is exhausted; try the next key.
    #[error("quota exceeded")]
    QuotaExceeded,
    /// The key was rejected; try the next key.
    #[error("authentication failed")]
    AuthFailed,
    /// Voice or model unavailable on this provider; the key is fine.
    #[error("voice or model not found")]
    NotFound,
    /// Transport failure or deadline expiry; the key is fine.
    #[error("network error: {0}")]
    Network(String),
}

impl AttemptError {
    /// Whether this failure should rotate to the provider's next key
    /// (as opposed to abandoning the provider outright).
    #[must_use]
    pub fn rotates_key(&self) -> bool {
        matches!(self, Self::QuotaExceeded | Self::AuthFailed)
    }
}

/// A single text-to-speech backend.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Whether attempts consume a key from the provider's pool.
    /// Keyless providers get a single attempt with an empty key.
    fn requires_key(&self) -> bool {
        true
    }

    /// Synthesize `text` into an encoded clip.
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        api_key: &str,
    ) -> std::result::Result<SynthesizedClip, AttemptError>;
}

/// Map an HTTP status onto the attempt taxonomy shared by the cloud
/// adapters. Quota-flavored 401 bodies are handled by the adapters that
/// need it (ElevenLabs reports exhausted quota under a 401).
pub(crate) fn classify_status(status: reqwest::StatusCode) -> AttemptError {
    match status.as_u16() {
        401 | 403 => AttemptError::AuthFailed,
        429 => AttemptError::QuotaExceeded,
        404 => AttemptError::NotFound,
        other => AttemptError::Network(format!("unexpected status {other}")),
    }
}
