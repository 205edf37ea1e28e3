//! Wake word matching and registration-name validation.
//!
//! Cloud transcription mangles the kiosk's name often enough that the
//! wake list carries tolerant spellings, and a token-level fixup table
//! maps the most common mishearings back to the canonical word before
//! matching.

/// Token fixups for frequent mishearings of the primary wake word.
const MISHEARD: [(&str, &str); 4] = [
    ("omni's", "omnis"),
    ("omni", "omnis"),
    ("omens", "omnis"),
    ("honest", "omnis"),
];

/// Names that are really greetings or thanks, not names.
const NAME_BLACKLIST: [&str; 5] = ["hello", "hi", "hey", "thanks", "thank you"];

/// Matches utterances against the configured wake word set.
pub struct WakeMatcher {
    words: Vec<String>,
}

impl WakeMatcher {
    #[must_use]
    pub fn new(words: &[String]) -> Self {
        Self {
            words: words.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    /// Lowercase, strip token punctuation and undo known mishearings.
    #[must_use]
    pub fn normalize(text: &str) -> String {
        text.to_lowercase()
            .split_whitespace()
            .map(|token| {
                let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
                MISHEARD
                    .iter()
                    .find(|(heard, _)| *heard == token)
                    .map_or(token, |(_, fixed)| *fixed)
            })
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether any token of the normalized text is a wake word.
    #[must_use]
    pub fn contains(&self, normalized: &str) -> bool {
        normalized
            .split_whitespace()
            .any(|token| self.words.iter().any(|w| w == token))
    }

    /// The normalized text with all wake word tokens removed.
    #[must_use]
    pub fn strip(&self, normalized: &str) -> String {
        normalized
            .split_whitespace()
            .filter(|token| !self.words.iter().any(|w| w == token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whether a candidate utterance can be accepted as a person's name:
/// not a greeting, and at least two alphabetic characters.
#[must_use]
pub fn is_valid_name(candidate: &str) -> bool {
    let normalized = candidate.trim().to_lowercase();
    if normalized.is_empty() || NAME_BLACKLIST.contains(&normalized.as_str()) {
        return false;
    }
    normalized.chars().filter(|c| c.is_alphabetic()).count() >= 2
}
