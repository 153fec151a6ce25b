//! Emotion scoring.
//!
//! `LexiconEmotionScorer` counts emotion keywords (English and Italian, with a
//! stemming fallback) and reports the strongest label with its share of hits
//! as the confidence.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;
use tomo_core::Result;

use crate::stemmer::simple_stem;

/// One classification: a label and the confidence used as its weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionScore {
    pub label: String,
    pub score: f64,
}

/// Emotion classifier for a span of text.
pub trait EmotionScorer: Send + Sync {
    fn score_emotion(&self, text: &str) -> Result<EmotionScore>;
}

/// Labels in tie-break order.
pub const EMOTIONS: &[&str] = &["joy", "sadness", "anger", "fear", "surprise", "disgust"];

/// Label for spans with no emotional keywords.
pub const NEUTRAL: &str = "neutral";

const NEUTRAL_CONFIDENCE: f64 = 0.3;

/// Keyword → emotion mapping.
static KEYWORD_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    // Joy
    for kw in &[
        "happy", "happiness", "joy", "joyful", "glad", "delight", "delighted", "smile",
        "smiled", "laugh", "laughed", "cheerful", "love", "loved", "hope", "celebrate",
        "felice", "felicità", "gioia", "allegro", "allegra", "sorriso", "sorrise", "rise",
        "ridere", "amore", "speranza", "contento", "contenta",
    ] {
        m.insert(*kw, "joy");
    }
    // Sadness
    for kw in &[
        "sad", "sadness", "sorrow", "grief", "cry", "cried", "tears", "weep", "wept",
        "lonely", "mourn", "despair", "despaired", "melancholy", "triste", "tristezza",
        "dolore", "pianse", "piangere", "lacrime", "lutto", "malinconia", "disperazione",
        "solo", "sola",
    ] {
        m.insert(*kw, "sadness");
    }
    // Anger
    for kw in &[
        "angry", "anger", "rage", "furious", "fury", "hate", "hated", "shout", "shouted",
        "curse", "cursed", "resent", "rabbia", "arrabbiato", "arrabbiata", "furioso",
        "furiosa", "furia", "odio", "odiava", "gridò", "collera", "ira",
    ] {
        m.insert(*kw, "anger");
    }
    // Fear
    for kw in &[
        "afraid", "fear", "feared", "terror", "terrified", "scared", "dread", "panic",
        "tremble", "trembled", "anxious", "danger", "paura", "terrore", "spaventato",
        "spaventata", "tremava", "tremare", "pericolo", "ansia", "timore", "angoscia",
    ] {
        m.insert(*kw, "fear");
    }
    // Surprise
    for kw in &[
        "surprise", "surprised", "astonished", "amazed", "sudden", "suddenly", "shock",
        "shocked", "unexpected", "sorpresa", "sorpreso", "stupore", "stupito", "stupita",
        "improvvisamente", "meraviglia", "inaspettato",
    ] {
        m.insert(*kw, "surprise");
    }
    // Disgust
    for kw in &[
        "disgust", "disgusted", "revolting", "vile", "nausea", "loathe", "repulsed",
        "disgusto", "schifo", "ribrezzo", "ripugnante",
    ] {
        m.insert(*kw, "disgust");
    }
    m
});

/// Stem of every keyword → emotion. No stem is shared across emotions.
static STEMMED_MAP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    KEYWORD_MAP
        .iter()
        .map(|(&keyword, &emotion)| (simple_stem(keyword), emotion))
        .collect()
});

/// Keyword lexicon scorer.
#[derive(Debug, Default)]
pub struct LexiconEmotionScorer;

impl LexiconEmotionScorer {
    pub fn new() -> Self {
        Self
    }

    /// Keyword hits per emotion label.
    pub fn counts(&self, text: &str) -> HashMap<&'static str, usize> {
        let text_lower = text.to_lowercase();
        let mut counts: HashMap<&'static str, usize> = HashMap::new();

        for word in text_lower.split(|c: char| !c.is_alphanumeric()) {
            if word.chars().count() < 2 {
                continue;
            }
            let emotion = KEYWORD_MAP.get(word).copied().or_else(|| {
                let stemmed = simple_stem(word);
                STEMMED_MAP.get(stemmed.as_str()).copied()
            });
            if let Some(e) = emotion {
                *counts.entry(e).or_insert(0) += 1;
            }
        }
        counts
    }
}

impl EmotionScorer for LexiconEmotionScorer {
    fn score_emotion(&self, text: &str) -> Result<EmotionScore> {
        let counts = self.counts(text);
        let total: usize = counts.values().sum();
        if total == 0 {
            return Ok(EmotionScore {
                label: NEUTRAL.to_string(),
                score: NEUTRAL_CONFIDENCE,
            });
        }

        let mut best = (EMOTIONS[0], 0usize);
        for &emotion in EMOTIONS {
            let hits = counts.get(emotion).copied().unwrap_or(0);
            if hits > best.1 {
                best = (emotion, hits);
            }
        }
        Ok(EmotionScore {
            label: best.0.to_string(),
            score: best.1 as f64 / total as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(text: &str) -> EmotionScore {
        LexiconEmotionScorer::new().score_emotion(text).unwrap()
    }

    #[test]
    fn test_score_joy() {
        let result = score("She laughed and smiled, happy at last.");
        assert_eq!(result.label, "joy");
        assert!((result.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_italian_fear() {
        let result = score("Don Abbondio tremava dalla paura: sentiva il pericolo.");
        assert_eq!(result.label, "fear");
    }

    #[test]
    fn test_stemmed_match() {
        // "laughing" is not in the lexicon; its stem matches "laugh".
        assert_eq!(score("They kept laughing.").label, "joy");
    }

    #[test]
    fn test_mixed_confidence_is_share_of_hits() {
        let result = score("He was afraid, terrified, but also glad.");
        assert_eq!(result.label, "fear");
        assert!((result.score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_tie_prefers_label_order() {
        assert_eq!(score("sad but happy").label, "joy");
    }

    #[test]
    fn test_neutral_text() {
        let result = score("The cart rolled along the road.");
        assert_eq!(result.label, NEUTRAL);
        assert!((result.score - NEUTRAL_CONFIDENCE).abs() < 1e-9);
    }
}
