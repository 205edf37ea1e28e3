//! Speech-to-text seam and the shipped HTTP implementation.
//!
//! The recognition loop only depends on the [`SpeechToText`] trait; the
//! shipped implementation posts captured audio as WAV to a
//! Whisper-compatible transcription endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SttConfig;

/// One captured utterance, mono f32 samples.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub captured_at: Instant,
}

impl AudioClip {
    /// Clip length in seconds.
    #[must_use]
    pub fn duration_s(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Why a transcription attempt produced no text.
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    /// The clip contained no recognizable speech.
    #[error("no speech recognized")]
    NoSpeech,
    /// The service did not answer within the deadline.
    #[error("transcription timed out")]
    Timeout,
    /// The service failed; the loop logs it and retries next cycle.
    #[error("transcription service error: {0}")]
    Service(String),
}

/// A speech recognizer.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one clip to text.
    async fn transcribe(&self, clip: &AudioClip) -> std::result::Result<String, TranscribeError>;
}

/// Whisper-compatible HTTP transcription.
pub struct WhisperApi {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperApi {
    #[must_use]
    pub fn new(config: &SttConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_s),
        }
    }

    async fn request(&self, clip: &AudioClip) -> std::result::Result<String, TranscribeError> {
        let wav = encode_wav(&clip.samples, clip.sample_rate)
            .map_err(|e| TranscribeError::Service(format!("WAV encode failed: {e}")))?;

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscribeError::Service(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.api_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscribeError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Service(format!("status {status}: {body}")));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::Service(format!("bad response: {e}")))?;
        Ok(parsed.text)
    }
}

#[async_trait]
impl SpeechToText for WhisperApi {
    async fn transcribe(&self, clip: &AudioClip) -> std::result::Result<String, TranscribeError> {
        let started = Instant::now();
        debug!("transcribing {:.1}s clip", clip.duration_s());

        let text = tokio::time::timeout(self.timeout, self.request(clip))
            .await
            .map_err(|_| TranscribeError::Timeout)??;

        let text = text.trim().to_owned();
        if text.is_empty() {
            return Err(TranscribeError::NoSpeech);
        }

        info!(
            "transcribed in {:.0}ms: \"{text}\"",
            started.elapsed().as_millis()
        );
        Ok(text)
    }
}

/// Encode mono f32 samples as 16-bit PCM WAV bytes.
fn encode_wav(samples: &[f32], sample_rate: u32) -> crate::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| crate::VoiceError::Stt(format!("cannot create WAV writer: {e}")))?;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16;
            writer
                .write_sample(v)
                .map_err(|e| crate::VoiceError::Stt(format!("WAV write error: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| crate::VoiceError::Stt(format!("WAV finalize error: {e}")))?;
    }
    Ok(cursor.into_inner())
}
