//! Deterministic response enrichment
//!
//! Applied in a fixed order: sentence capitalization, an optional
//! formality prefix, an optional emoji suffix, an optional filler
//! variation. Enrichment never alters semantic content; every transform
//! is additive or cosmetic.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Personality knobs from the behavior profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Personality {
    /// Probability of appending an emoji, in [0, 1]
    pub emoji_usage: f64,
    /// Formality in [0, 1]; high values pick formal prefixes
    pub formality: f64,
    /// Probability of inserting a prefix phrase, in [0, 1]
    pub prefix_probability: f64,
    /// Probability of a filler variation, in [0, 1]
    pub filler_probability: f64,
}

const FORMAL_PREFIXES: &[&str] = &["Certainly. ", "Of course. ", "Understood. "];
const CASUAL_PREFIXES: &[&str] = &["Sure, ", "Okay, ", "Got it, "];
const EMOJI: &[&str] = &[" 🙂", " 👍", " ✨"];
const FILLERS: &[&str] = &["Let me check... ", "One moment... "];

/// Capitalize the first letter of each sentence.
pub fn capitalize_sentences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_sentence_start = true;
    for ch in text.chars() {
        if at_sentence_start && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
            at_sentence_start = false;
        } else {
            out.push(ch);
            if matches!(ch, '.' | '!' | '?') {
                at_sentence_start = true;
            }
        }
    }
    out
}

/// Run the full enrichment pipeline over a response body.
pub fn enrich<R: Rng>(content: &str, personality: &Personality, rng: &mut R) -> String {
    let mut text = capitalize_sentences(content);

    if rng.gen_bool(personality.prefix_probability.clamp(0.0, 1.0)) {
        let prefixes = if personality.formality >= 0.5 {
            FORMAL_PREFIXES
        } else {
            CASUAL_PREFIXES
        };
        let prefix = prefixes[rng.gen_range(0..prefixes.len())];
        // Casual prefixes keep the original flow lowercase after the comma.
        if prefix.ends_with(", ") {
            let mut chars = text.chars();
            if let Some(first) = chars.next() {
                text = format!("{}{}{}", prefix, first.to_lowercase(), chars.as_str());
            }
        } else {
            text = format!("{}{}", prefix, text);
        }
    }

    if rng.gen_bool(personality.emoji_usage.clamp(0.0, 1.0)) {
        let emoji = EMOJI[rng.gen_range(0..EMOJI.len())];
        text.push_str(emoji);
    }

    if rng.gen_bool(personality.filler_probability.clamp(0.0, 1.0)) {
        let filler = FILLERS[rng.gen_range(0..FILLERS.len())];
        text = format!("{}{}", filler, text);
    }

    text
}
