//! Configuration types for the kiosk voice subsystem.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VoiceError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Audio capture/playback settings.
    pub audio: AudioConfig,
    /// Phrase capture settings (timeouts, energy gating).
    pub listen: ListenConfig,
    /// Conversation settings (wake words, strikes, echo guard).
    pub conversation: ConversationConfig,
    /// Speak pipeline settings (segmentation, fast path, deadlines).
    pub synthesis: SynthesisConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Chat backend settings.
    pub chat: ChatConfig,
}

/// Audio I/O configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Target sample rate for captured audio in Hz.
    pub input_sample_rate: u32,
    /// Input device name (None = try every device until one calibrates).
    pub input_device: Option<String>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
    /// Sample rates to try when opening a microphone, in preference order.
    pub capture_rates: Vec<u32>,
    /// Backoff between microphone acquisition attempts, in seconds.
    pub acquire_retry_s: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16_000,
            input_device: None,
            output_device: None,
            capture_rates: vec![16_000, 44_100, 48_000],
            acquire_retry_s: 2,
        }
    }
}

/// Phrase capture configuration.
///
/// The energy threshold is seeded by ambient calibration: the microphone
/// samples room noise for `calibration_ms`, multiplies the measured RMS by
/// `energy_ratio`, and clamps the result between `energy_floor` and
/// `energy_cap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// How long to wait for speech to start before giving up, in seconds.
    pub start_timeout_s: u64,
    /// Maximum length of a single captured phrase, in seconds.
    pub phrase_limit_s: u64,
    /// Trailing silence that ends a phrase, in milliseconds.
    pub pause_ms: u64,
    /// Ambient noise sampling window, in milliseconds.
    pub calibration_ms: u64,
    /// Multiplier applied to the ambient RMS to get the speech threshold.
    pub energy_ratio: f32,
    /// Lower bound on the energy threshold.
    pub energy_floor: f32,
    /// Upper bound on the energy threshold (very noisy rooms).
    pub energy_cap: f32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            start_timeout_s: 5,
            phrase_limit_s: 15,
            pause_ms: 1000,
            calibration_ms: 1000,
            energy_ratio: 1.5,
            energy_floor: 0.01,
            energy_cap: 0.12,
        }
    }
}

/// Conversation state machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Wake word spellings, including tolerant mishearings.
    ///
    /// Overridable at startup with the `WAKE_WORDS` env var (comma list).
    pub wake_words: Vec<String>,
    /// Consecutive listen timeouts before dropping out of conversation mode.
    pub max_timeout_strikes: u32,
    /// Delay after the speaker goes quiet before reopening the microphone,
    /// in milliseconds. Absorbs buffered echo of our own voice.
    pub echo_guard_ms: u64,
    /// Minimum query length (chars) worth answering.
    pub min_query_chars: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            wake_words: vec![
                "omnis".to_owned(),
                "hello".to_owned(),
                "hey".to_owned(),
                "amaze".to_owned(),
                "thomas".to_owned(),
                "promise".to_owned(),
                "homeless".to_owned(),
                "harness".to_owned(),
                "almonds".to_owned(),
                "omni".to_owned(),
            ],
            max_timeout_strikes: 3,
            echo_guard_ms: 600,
            min_query_chars: 3,
        }
    }
}

/// Speak pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Replies longer than this (chars) are split into sentence units so
    /// playback can start before the whole reply is generated.
    pub split_threshold: usize,
    /// Texts at or under this length (chars) skip the provider cascade and
    /// go straight to the offline voice.
    pub fast_path_max_chars: usize,
    /// Stock phrases that always take the offline fast path.
    pub stock_phrases: Vec<String>,
    /// Deadline per provider attempt, in seconds.
    pub attempt_timeout_s: u64,
    /// How often the player checks for cancellation, in milliseconds.
    pub stop_poll_ms: u64,
    /// Provider credentials and endpoints.
    pub providers: ProvidersConfig,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            split_threshold: 120,
            fast_path_max_chars: 25,
            stock_phrases: vec![
                "yes?".to_owned(),
                "ok.".to_owned(),
                "hello!".to_owned(),
                "hi.".to_owned(),
                "welcome.".to_owned(),
            ],
            attempt_timeout_s: 10,
            stop_poll_ms: 50,
            providers: ProvidersConfig::default(),
        }
    }
}

/// TTS provider endpoints and credentials, in cascade priority order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub elevenlabs: ElevenLabsConfig,
    pub openai: OpenAiTtsConfig,
    pub local: LocalTtsConfig,
    pub translate: TranslateTtsConfig,
}

/// ElevenLabs neural TTS (premium tier of the cascade).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevenLabsConfig {
    /// API keys, rotated on quota/auth failures.
    ///
    /// `ELEVENLABS_API_KEY` is appended at startup if set.
    pub api_keys: Vec<String>,
    pub api_url: String,
    pub voice_id: String,
    pub model_id: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            api_url: "https://api.elevenlabs.io".to_owned(),
            voice_id: "9BWtsMINqrJLrRacOk9x".to_owned(),
            model_id: "eleven_turbo_v2".to_owned(),
        }
    }
}

/// OpenAI speech endpoint (secondary neural tier).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiTtsConfig {
    /// API keys, rotated on quota/auth failures.
    pub api_keys: Vec<String>,
    pub api_url: String,
    pub model: String,
    pub voice: String,
}

impl Default for OpenAiTtsConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            api_url: "https://api.openai.com".to_owned(),
            model: "tts-1".to_owned(),
            voice: "alloy".to_owned(),
        }
    }
}

/// Local neural TTS server (keyless, e.g. a Kokoro server on localhost).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTtsConfig {
    pub url: String,
    pub voice: String,
}

impl Default for LocalTtsConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8880/v1/audio/speech".to_owned(),
            voice: "af_heart".to_owned(),
        }
    }
}

/// Basic cloud TTS via the translate endpoint (keyless, last cascade tier).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateTtsConfig {
    /// Override endpoint. Empty = derive the host from the voice accent TLD.
    pub url: String,
    pub lang: String,
}

impl Default for TranslateTtsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            lang: "en".to_owned(),
        }
    }
}

/// Speech-to-text configuration (Whisper-compatible HTTP endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    pub api_url: String,
    /// `OPENAI_API_KEY` is used at startup if empty.
    pub api_key: String,
    pub model: String,
    /// Deadline for one transcription call, in seconds.
    pub timeout_s: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com".to_owned(),
            api_key: String::new(),
            model: "whisper-1".to_owned(),
            timeout_s: 10,
        }
    }
}

/// Chat backend configuration (OpenAI-compatible streaming completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_url: String,
    /// `OPENAI_API_KEY` is used at startup if empty.
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com".to_owned(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_owned(),
            max_tokens: 300,
            temperature: 0.7,
        }
    }
}

impl VoiceConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    ///
    /// A missing file yields the defaults so a bare kiosk still boots.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                VoiceError::Config(format!("cannot read config {}: {e}", path.display()))
            })?;
            toml::from_str(&raw).map_err(|e| {
                VoiceError::Config(format!("invalid config {}: {e}", path.display()))
            })?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Returns the default config file path (`<config dir>/omnis/voice.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("omnis")
            .join("voice.toml")
    }

    /// Apply environment variable overrides.
    ///
    /// - `WAKE_WORDS`: comma-separated replacement wake word list.
    /// - `ELEVENLABS_API_KEY`: appended to the ElevenLabs key pool.
    /// - `OPENAI_API_KEY`: fills empty STT/chat/OpenAI-TTS credentials.
    pub fn apply_env(&mut self) {
        if let Ok(raw) = std::env::var("WAKE_WORDS") {
            let words: Vec<String> = raw
                .split(',')
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect();
            if !words.is_empty() {
                self.conversation.wake_words = words;
            }
        }

        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY")
            && !key.trim().is_empty()
            && !self
                .synthesis
                .providers
                .elevenlabs
                .api_keys
                .contains(&key)
        {
            self.synthesis.providers.elevenlabs.api_keys.push(key);
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY")
            && !key.trim().is_empty()
        {
            if self.stt.api_key.is_empty() {
                self.stt.api_key = key.clone();
            }
            if self.chat.api_key.is_empty() {
                self.chat.api_key = key.clone();
            }
            if self.synthesis.providers.openai.api_keys.is_empty() {
                self.synthesis.providers.openai.api_keys.push(key);
            }
        }
    }
}
