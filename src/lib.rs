//! Voice interaction subsystem for the OMNIS kiosk robot.
//!
//! The kiosk hears a wake word, holds a short multi-turn conversation,
//! and speaks replies through a cascade of text-to-speech providers —
//! while staying interruptible mid-sentence.
//!
//! # Architecture
//!
//! Three supervised tasks cooperate:
//! - **Recognition loop** ([`listen`]): microphone lifecycle, ambient
//!   calibration and the wake-word/conversation state machine.
//! - **Generator** and **Player** ([`speech`]): a two-stage pipeline that
//!   synthesizes sentence units through the provider cascade ([`tts`])
//!   while earlier units are still playing.
//!
//! Cross-cutting state (persona, mood, last texts, pending face
//! registration) lives in [`state::SharedState`] with one writer per
//! field. The rest of the robot plugs in through the seams in [`hooks`].

pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod hooks;
pub mod listen;
pub mod persona;
pub mod segment;
pub mod speech;
pub mod state;
pub mod stt;
pub mod tts;

pub use config::VoiceConfig;
pub use error::{Result, VoiceError};
pub use listen::{ListenState, LoopDeps, RecognitionLoop};
pub use speech::SpeechPipeline;
pub use state::SharedState;
