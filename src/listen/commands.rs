//! Built-in voice commands.
//!
//! These short-circuit the FAQ and chat backends entirely: a silence
//! request must not wait on a network round trip.

use crate::persona::{Persona, match_persona_request};

/// A command recognized directly from the stripped question text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    /// Stop talking immediately and leave conversation mode.
    Silence,
    /// Report who the vision subsystem currently sees.
    WhoIsHere,
    /// Re-enter conversation mode.
    Resume,
    /// Switch to a named persona.
    SetPersona(Persona),
    /// Back to the default persona and voice.
    ResetPersona,
}

const SILENCE: [&str; 5] = ["silence", "silent", "stop talking", "shut up", "hush"];
const WHO_IS_HERE: [&str; 5] = [
    "who is here",
    "who are inside",
    "detect people",
    "guess me",
    "who am i",
];
const RESUME: [&str; 3] = ["continue", "speak again", "resume"];
const PERSONA: [&str; 4] = ["act like", "be a", "expert mode", "become a"];
const PERSONA_RESET: [&str; 3] = ["be yourself", "reset personality", "normal mode"];

/// Classify a (lowercased, wake-stripped) question as a built-in command.
#[must_use]
pub fn classify(question: &str) -> Option<BuiltinCommand> {
    let hit = |phrases: &[&str]| phrases.iter().any(|p| question.contains(p));

    if hit(&SILENCE) {
        return Some(BuiltinCommand::Silence);
    }
    if hit(&WHO_IS_HERE) {
        return Some(BuiltinCommand::WhoIsHere);
    }
    if hit(&RESUME) {
        return Some(BuiltinCommand::Resume);
    }
    if hit(&PERSONA_RESET) {
        return Some(BuiltinCommand::ResetPersona);
    }
    if hit(&PERSONA)
        && let Some(persona) = match_persona_request(question)
    {
        return Some(BuiltinCommand::SetPersona(persona));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_variants() {
        for q in ["silence", "please be silent", "stop talking now", "hush"] {
            assert_eq!(classify(q), Some(BuiltinCommand::Silence), "{q}");
        }
    }

    #[test]
    fn presence_queries() {
        assert_eq!(classify("who is here"), Some(BuiltinCommand::WhoIsHere));
        assert_eq!(classify("guess me"), Some(BuiltinCommand::WhoIsHere));
    }

    #[test]
    fn resume_reenters_conversation() {
        assert_eq!(classify("resume"), Some(BuiltinCommand::Resume));
        assert_eq!(classify("speak again"), Some(BuiltinCommand::Resume));
    }

    #[test]
    fn persona_switch_needs_a_known_persona() {
        assert_eq!(
            classify("act like shakespeare"),
            Some(BuiltinCommand::SetPersona(Persona::Shakespeare))
        );
        assert_eq!(
            classify("become a robot"),
            Some(BuiltinCommand::SetPersona(Persona::Robot))
        );
        // Trigger phrase with no recognizable persona falls through to
        // the normal answer path.
        assert_eq!(classify("act like my uncle"), None);
    }

    #[test]
    fn persona_reset() {
        assert_eq!(classify("be yourself"), Some(BuiltinCommand::ResetPersona));
        assert_eq!(classify("normal mode"), Some(BuiltinCommand::ResetPersona));
    }

    #[test]
    fn ordinary_questions_are_not_commands() {
        assert_eq!(classify("what time is it"), None);
        assert_eq!(classify("how old is the school"), None);
    }
}
