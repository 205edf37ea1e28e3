//! Process-wide coordination state shared between the recognition loop,
//! the speak pipeline and the kiosk's other subsystems.
//!
//! Every field has exactly one writer category (noted on its setter); all
//! other parties only read. Readers tolerate slightly stale values, so
//! plain mutex-per-field access is enough and no two locks are ever held
//! at once.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::persona::{Persona, VoiceProfile};

/// Predicted mood of the active user, written by the vision subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mood {
    Happy,
    #[default]
    Neutral,
}

impl Mood {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Happy => "Happy",
            Self::Neutral => "Neutral",
        }
    }
}

/// Face data captured for an unknown person awaiting a spoken name.
#[derive(Debug, Clone)]
pub struct PendingRegistration {
    /// Face embedding from the vision subsystem.
    pub encoding: Vec<f32>,
    /// Cropped face image, PNG bytes, ready to persist.
    pub image_png: Vec<u8>,
}

/// Shared coordination fields.
#[derive(Debug, Default)]
pub struct SharedState {
    persona: Mutex<Persona>,
    voice: Mutex<VoiceProfile>,
    mood: Mutex<Mood>,
    last_user_text: Mutex<String>,
    last_reply_text: Mutex<String>,
    detected_people: Mutex<Vec<String>>,
    active_user: Mutex<Option<String>>,
    pending_registration: Mutex<Option<PendingRegistration>>,
    listening: AtomicBool,
    thinking: AtomicBool,
}

// A poisoned lock here means a panicking reader/writer mid-copy of a small
// value; the value itself is still usable, so recover it.
fn read<T: Clone>(slot: &Mutex<T>) -> T {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write<T>(slot: &Mutex<T>, value: T) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = value;
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn persona(&self) -> Persona {
        read(&self.persona)
    }

    /// Writer: recognition loop (persona voice commands).
    pub fn set_persona(&self, persona: Persona) {
        write(&self.persona, persona);
    }

    #[must_use]
    pub fn voice_profile(&self) -> VoiceProfile {
        read(&self.voice)
    }

    /// Writer: recognition loop (persona voice commands).
    pub fn set_voice_profile(&self, voice: VoiceProfile) {
        write(&self.voice, voice);
    }

    #[must_use]
    pub fn mood(&self) -> Mood {
        read(&self.mood)
    }

    /// Writer: vision subsystem.
    pub fn set_mood(&self, mood: Mood) {
        write(&self.mood, mood);
    }

    #[must_use]
    pub fn last_user_text(&self) -> String {
        read(&self.last_user_text)
    }

    /// Writer: recognition loop.
    pub fn set_last_user_text(&self, text: &str) {
        write(&self.last_user_text, text.to_owned());
    }

    #[must_use]
    pub fn last_reply_text(&self) -> String {
        read(&self.last_reply_text)
    }

    /// Writer: recognition loop.
    pub fn set_last_reply_text(&self, text: &str) {
        write(&self.last_reply_text, text.to_owned());
    }

    #[must_use]
    pub fn detected_people(&self) -> Vec<String> {
        read(&self.detected_people)
    }

    /// Writer: vision subsystem (live list of people in frame).
    pub fn set_detected_people(&self, people: Vec<String>) {
        write(&self.detected_people, people);
    }

    #[must_use]
    pub fn active_user(&self) -> Option<String> {
        read(&self.active_user)
    }

    /// Writer: vision subsystem (the primary person being interacted with).
    pub fn set_active_user(&self, user: Option<String>) {
        write(&self.active_user, user);
    }

    /// Whether an unknown face is waiting for a spoken name.
    #[must_use]
    pub fn registration_armed(&self) -> bool {
        self.pending_registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Writer: vision subsystem. Arms name capture for an unknown face; the
    /// next utterance the recognition loop hears is treated as a name.
    pub fn arm_registration(&self, pending: PendingRegistration) {
        write(&self.pending_registration, Some(pending));
    }

    /// Consumes the pending registration, if any. Called exactly once per
    /// armed capture by the recognition loop.
    pub fn take_registration(&self) -> Option<PendingRegistration> {
        self.pending_registration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    /// Writer: recognition loop (UI hook).
    pub fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_thinking(&self) -> bool {
        self.thinking.load(Ordering::Relaxed)
    }

    /// Writer: recognition loop (UI hook).
    pub fn set_thinking(&self, thinking: bool) {
        self.thinking.store(thinking, Ordering::Relaxed);
    }
}
