//! Extractive narrative summary.
//!
//! Sentences are scored by the summed frequency of their content words,
//! normalized by length, with a small bonus for the opening sentences. The
//! best `max_sentences` are returned in document order.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use tomo_core::floor_char_boundary;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}[\p{L}'’]*").unwrap());

/// Function words in English and Italian that carry no narrative signal.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // en
        "the", "a", "an", "and", "or", "but", "of", "to", "in", "on", "at", "for", "with", "as",
        "by", "from", "was", "were", "is", "are", "be", "been", "had", "has", "have", "it", "its",
        "he", "she", "they", "them", "his", "her", "their", "i", "you", "we", "me", "my", "that",
        "this", "these", "those", "not", "no", "so", "then", "there", "when", "which", "who",
        "what", "would", "could", "did", "do", "said", "into", "out", "up", "him", "all",
        // it
        "il", "lo", "la", "i", "gli", "le", "un", "una", "uno", "di", "da", "del", "della",
        "dei", "delle", "nel", "nella", "al", "alla", "e", "ed", "o", "ma", "che", "non", "per",
        "con", "su", "si", "era", "erano", "è", "sono", "ha", "aveva", "come", "più", "anche",
        "lui", "lei", "loro", "suo", "sua", "mi", "ti", "ci", "vi", "se", "quando", "poi",
    ]
    .into_iter()
    .collect()
});

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if (b == b'.' || b == b'!' || b == b'?')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_whitespace()
        {
            let s = text[start..=i].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = i + 1;
        }
    }
    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }
    sentences
}

fn content_words(sentence: &str) -> impl Iterator<Item = String> + '_ {
    WORD_RE
        .find_iter(sentence)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(w.as_str()))
}

/// Pick the key sentences of `text`, in the order they appear.
///
/// Returns an empty vec for empty input or `max_sentences == 0`. Text with no
/// sentence of useful length yields its first 500 bytes.
pub fn extract_key_sentences(text: &str, max_sentences: usize) -> Vec<String> {
    if max_sentences == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    let sentences: Vec<&str> = split_sentences(text)
        .into_iter()
        .filter(|s| s.len() > 20)
        .collect();

    if sentences.is_empty() {
        let end = floor_char_boundary(text, 500);
        return vec![text[..end].trim().to_string()];
    }

    let mut frequency: HashMap<String, usize> = HashMap::new();
    for sentence in &sentences {
        for word in content_words(sentence) {
            *frequency.entry(word).or_insert(0) += 1;
        }
    }
    let peak = frequency.values().copied().max().unwrap_or(1) as f64;

    let mut scored: Vec<(f64, usize)> = sentences
        .iter()
        .enumerate()
        .map(|(i, sentence)| {
            let words: Vec<String> = content_words(sentence).collect();
            let mut score = if words.is_empty() {
                0.0
            } else {
                let total: f64 = words
                    .iter()
                    .map(|w| frequency.get(w).copied().unwrap_or(0) as f64 / peak)
                    .sum();
                total / (words.len() as f64).sqrt()
            };
            // Opening sentences usually set the scene.
            if i < 2 {
                score += 0.25 * (2 - i) as f64;
            }
            (score, i)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    let mut picked: Vec<usize> = scored.iter().take(max_sentences).map(|&(_, i)| i).collect();
    picked.sort_unstable();
    picked.into_iter().map(|i| sentences[i].to_string()).collect()
}

/// Key sentences joined into one line, or `None` when there is nothing to say.
pub fn summarize(text: &str, max_sentences: usize) -> Option<String> {
    let sentences = extract_key_sentences(text, max_sentences);
    if sentences.is_empty() {
        None
    } else {
        Some(sentences.join(" ").split_whitespace().collect::<Vec<_>>().join(" "))
    }
}
