//! Sentence segmentation for streaming speech.
//!
//! Long replies are split at sentence boundaries so the speak pipeline can
//! start playing sentence *n* while sentence *n+1* is still being
//! synthesized.

/// Characters that end a sentence.
const TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Split `text` into sentence units on `.`, `!`, `?` and newline
/// boundaries. Terminators stay attached to their sentence; runs of
/// terminators ("...", "?!") are kept together. Whitespace-only units are
/// dropped.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            flush(&mut current, &mut units);
            continue;
        }
        current.push(c);
        if TERMINATORS.contains(&c) {
            // Absorb the rest of a terminator run before splitting.
            while let Some(&next) = chars.peek() {
                if TERMINATORS.contains(&next) {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            flush(&mut current, &mut units);
        }
    }
    flush(&mut current, &mut units);
    units
}

/// Pull complete sentences off the front of a streaming accumulator,
/// leaving any unterminated tail in place. Used by the chat backend to
/// emit sentences as soon as the stream completes them.
pub fn drain_sentences(acc: &mut String) -> Vec<String> {
    let Some(cut) = last_boundary(acc) else {
        return Vec::new();
    };
    let tail = acc.split_off(cut);
    let complete = std::mem::replace(acc, tail.trim_start().to_owned());
    split_sentences(&complete)
}

/// Byte index just past the last sentence boundary, if any.
fn last_boundary(text: &str) -> Option<usize> {
    let mut boundary = None;
    let mut prev_terminated = false;
    for (i, c) in text.char_indices() {
        if c == '\n' {
            boundary = Some(i + c.len_utf8());
            prev_terminated = false;
        } else if TERMINATORS.contains(&c) {
            prev_terminated = true;
        } else {
            if prev_terminated {
                boundary = Some(i);
            }
            prev_terminated = false;
        }
    }
    if prev_terminated {
        boundary = Some(text.len());
    }
    boundary
}

fn flush(current: &mut String, units: &mut Vec<String>) {
    let unit = current.trim();
    if !unit.is_empty() {
        units.push(unit.to_owned());
    }
    current.clear();
}
