//! Persona presets and the voice modulation that goes with them.
//!
//! The kiosk can be asked to "act like Shakespeare" or "be a robot"; each
//! preset carries a flavor line for the chat backend and a [`VoiceProfile`]
//! so the spoken voice shifts with the character.

use serde::{Deserialize, Serialize};

/// Voice modulation parameters.
///
/// `pitch` and `speed` drive the offline espeak voice directly; cloud
/// providers map what they can (the accent TLD selects the basic cloud
/// voice flavor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Pitch, 0-99.
    pub pitch: u8,
    /// Speed in words per minute.
    pub speed: u16,
    /// Accent TLD for the basic cloud voice ("com", "co.uk", "com.au").
    pub accent: String,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            pitch: 50,
            speed: 175,
            accent: "com".to_owned(),
        }
    }
}

/// Built-in kiosk personas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Default,
    Shakespeare,
    Scientist,
    Giant,
    Robot,
    Child,
}

impl Persona {
    /// Name spoken back to the user when the persona activates.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Shakespeare => "William Shakespeare",
            Self::Scientist => "NASA Scientist",
            Self::Giant => "a friendly Giant",
            Self::Robot => "a hyper-logical robot",
            Self::Child => "a playful child",
        }
    }

    /// Voice modulation for this persona.
    #[must_use]
    pub fn voice_profile(self) -> VoiceProfile {
        match self {
            Self::Default => VoiceProfile::default(),
            Self::Shakespeare => VoiceProfile {
                pitch: 45,
                speed: 150,
                accent: "co.uk".to_owned(),
            },
            Self::Scientist => VoiceProfile {
                pitch: 55,
                speed: 180,
                accent: "com".to_owned(),
            },
            Self::Giant => VoiceProfile {
                pitch: 25,
                speed: 130,
                accent: "com.au".to_owned(),
            },
            Self::Robot => VoiceProfile {
                pitch: 50,
                speed: 220,
                accent: "com".to_owned(),
            },
            Self::Child => VoiceProfile {
                pitch: 80,
                speed: 200,
                accent: "com".to_owned(),
            },
        }
    }

    /// Extra system-prompt line for the chat backend, if any.
    #[must_use]
    pub fn prompt_flavor(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Shakespeare => {
                Some("Current persona: William Shakespeare. Answer in his tone and vocabulary.")
            }
            Self::Scientist => {
                Some("Current persona: NASA Scientist. Answer precisely, with enthusiasm for data.")
            }
            Self::Giant => Some("Current persona: a friendly Giant. Slow, warm, booming sentences."),
            Self::Robot => Some("Current persona: a hyper-logical robot. Terse and literal."),
            Self::Child => Some("Current persona: a playful child. Simple words, lots of wonder."),
        }
    }

    /// Thinking fillers spoken while a slow answer is being fetched.
    #[must_use]
    pub fn thinking_fillers(self) -> &'static [&'static str] {
        match self {
            Self::Shakespeare => &[
                "Let me consult the stars...",
                "A wondrous inquiry...",
                "Hark, let me ponder upon this...",
            ],
            Self::Scientist => &[
                "Let me process that through my calculations...",
                "Running data analysis...",
                "Analyzing trajectory...",
            ],
            _ => &[
                "Hmm, let me think about that...",
                "Checking my memory banks...",
                "That's an interesting question. Let me see...",
                "One moment, I am searching for an answer.",
                "Umm, interesting...",
            ],
        }
    }
}

/// Detect which persona a "act like ..." request names, if any.
#[must_use]
pub fn match_persona_request(question: &str) -> Option<Persona> {
    if question.contains("shakespeare") {
        Some(Persona::Shakespeare)
    } else if question.contains("scientist") || question.contains("nasa") {
        Some(Persona::Scientist)
    } else if question.contains("giant") || question.contains("deep") {
        Some(Persona::Giant)
    } else if question.contains("robot") || question.contains("monotone") {
        Some(Persona::Robot)
    } else if question.contains("child") || question.contains("baby") {
        Some(Persona::Child)
    } else {
        None
    }
}
