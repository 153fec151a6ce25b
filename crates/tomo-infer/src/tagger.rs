//! Entity tagging.
//!
//! `HeuristicTagger` finds runs of capitalized words and guesses a category
//! from the surrounding words: honorifics and speech verbs suggest a person,
//! locative prepositions a place, company suffixes an organization.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tomo_core::{EntityCount, Result};

pub const PERSON: &str = "PER";
pub const LOCATION: &str = "LOC";
pub const ORGANIZATION: &str = "ORG";
pub const MISC: &str = "MISC";

/// Named-entity recognizer: entity counts for a span of text.
pub trait EntityTagger: Send + Sync {
    /// Entities in `text` with their mention counts, most frequent first.
    fn analyze_entities(&self, text: &str) -> Result<Vec<EntityCount>>;
}

/// Runs of capitalized words, e.g. `Don Abbondio`, `Lago di Como` is two runs.
static NAME_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\p{Lu}[\p{Ll}'’]+(?:[ \t]+\p{Lu}[\p{Ll}'’]+)*").unwrap());

static ORG_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t,]*(?:Inc\.|Corp\.|LLC|Ltd\.|Co\.|S\.p\.A\.|S\.r\.l\.|& Co)").unwrap()
});

/// Trailing words that make a run an organization name.
static ORG_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["Inc", "Corp", "Ltd", "Co", "Company", "Group", "Bank", "Banca", "Società"]
        .into_iter()
        .collect()
});

/// Honorifics; a run starting with one, or following one, is a person.
static TITLES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "mr", "mrs", "ms", "miss", "dr", "prof", "sir", "lady", "lord", "captain", "don",
        "donna", "padre", "fra", "frate", "signor", "signore", "signora", "signorina", "sig",
        "dottor", "dottore", "conte", "contessa", "marchese",
    ]
    .into_iter()
    .collect()
});

static SPEECH_VERBS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "said", "asked", "replied", "answered", "cried", "whispered", "shouted", "disse",
        "chiese", "rispose", "gridò", "esclamò", "sussurrò", "domandò",
    ]
    .into_iter()
    .collect()
});

static PLACE_PREPOSITIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "in", "at", "near", "from", "towards", "toward", "through", "a", "verso", "presso",
        "nel", "nella", "per", "sul", "sulla", "dal", "dalla",
    ]
    .into_iter()
    .collect()
});

/// Capitalized words that open sentences without naming anything.
static NOT_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "chapter", "capitolo", "the", "a", "an", "he", "she", "it", "they", "we", "i", "you",
        "but", "and", "then", "when", "if", "there", "this", "that", "il", "lo", "la", "gli",
        "le", "un", "una", "egli", "ella", "lui", "lei", "ma", "e", "poi", "quando", "se",
    ]
    .into_iter()
    .collect()
});

/// Rule-based tagger for English and Italian prose.
#[derive(Debug, Default)]
pub struct HeuristicTagger;

#[derive(Default)]
struct Votes {
    per: usize,
    loc: usize,
    org: usize,
}

impl Votes {
    fn category(&self) -> &'static str {
        let best = self.per.max(self.loc).max(self.org);
        if best == 0 {
            MISC
        } else if self.per == best {
            PERSON
        } else if self.loc == best {
            LOCATION
        } else {
            ORGANIZATION
        }
    }
}

struct Mention<'a> {
    name: &'a str,
    start: usize,
    end: usize,
    at_sentence_start: bool,
}

impl HeuristicTagger {
    pub fn new() -> Self {
        Self
    }

    fn mentions<'a>(&self, text: &'a str) -> Vec<Mention<'a>> {
        let mut mentions = Vec::new();
        for m in NAME_RUN_RE.find_iter(text) {
            let mut name = m.as_str();
            let mut start = m.start();
            let mut at_sentence_start = is_sentence_start(text, start);

            if at_sentence_start {
                if let Some((first, rest)) = name.split_once([' ', '\t']) {
                    // "Yesterday Renzo": the opener is not part of the name,
                    // unless it is an honorific ("Don Abbondio").
                    if !TITLES.contains(first.to_lowercase().as_str()) {
                        let rest = rest.trim_start();
                        start = m.end() - rest.len();
                        name = rest;
                    }
                    at_sentence_start = false;
                }
            }

            let lower = name.to_lowercase();
            if NOT_NAMES.contains(lower.as_str()) || TITLES.contains(lower.as_str()) {
                continue;
            }
            mentions.push(Mention {
                name,
                start,
                end: m.end(),
                at_sentence_start,
            });
        }
        mentions
    }

    fn vote(&self, text: &str, mention: &Mention<'_>, votes: &mut Votes) {
        let first_word = mention
            .name
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase();
        let before = previous_word(text, mention.start).map(|w| w.to_lowercase());
        let after = next_word(text, mention.end).map(|w| w.to_lowercase());

        if TITLES.contains(first_word.as_str())
            || before.as_deref().is_some_and(|w| TITLES.contains(w))
            || after.as_deref().is_some_and(|w| SPEECH_VERBS.contains(w))
            || before.as_deref().is_some_and(|w| SPEECH_VERBS.contains(w))
        {
            votes.per += 1;
        }
        let last_word = mention.name.split_whitespace().last().unwrap_or("");
        if ORG_WORDS.contains(last_word) || ORG_SUFFIX_RE.is_match(&text[mention.end..]) {
            votes.org += 1;
        }
        if before
            .as_deref()
            .is_some_and(|w| PLACE_PREPOSITIONS.contains(w))
        {
            votes.loc += 1;
        }
    }
}

impl EntityTagger for HeuristicTagger {
    fn analyze_entities(&self, text: &str) -> Result<Vec<EntityCount>> {
        let mentions = self.mentions(text);

        // Names seen mid-sentence; a lone capitalized word opening a sentence
        // only counts when it is one of these.
        let known: HashSet<&str> = mentions
            .iter()
            .filter(|m| !m.at_sentence_start)
            .map(|m| m.name)
            .collect();

        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, (usize, Votes)> = HashMap::new();
        for mention in &mentions {
            if mention.at_sentence_start && !known.contains(mention.name) {
                continue;
            }
            let entry = counts.entry(mention.name).or_insert_with(|| {
                order.push(mention.name);
                (0, Votes::default())
            });
            entry.0 += 1;
            self.vote(text, mention, &mut entry.1);
        }

        let mut entities: Vec<EntityCount> = order
            .into_iter()
            .filter_map(|name| {
                counts.get(name).map(|(count, votes)| EntityCount {
                    name: name.to_string(),
                    category: votes.category().to_string(),
                    count: *count,
                })
            })
            .collect();
        // Stable: equal counts keep first-appearance order.
        entities.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(entities)
    }
}

/// Whether the byte offset begins a sentence (or the text).
fn is_sentence_start(text: &str, start: usize) -> bool {
    let before = text[..start].trim_end_matches(|c: char| {
        c.is_whitespace() || matches!(c, '"' | '“' | '«' | '\'' | '‘' | '(' | '—' | '-')
    });
    match before.chars().last() {
        None => true,
        Some('.') => {
            // "Mr. Darcy" is not a sentence break.
            let word = before[..before.len() - 1]
                .rsplit(|c: char| !c.is_alphabetic())
                .next()
                .unwrap_or("");
            !TITLES.contains(word.to_lowercase().as_str())
        }
        Some(c) => matches!(c, '!' | '?' | ':' | ';' | '…'),
    }
}

fn previous_word(text: &str, start: usize) -> Option<&str> {
    text[..start]
        .split(|c: char| !c.is_alphabetic())
        .rev()
        .find(|w| !w.is_empty())
}

fn next_word(text: &str, end: usize) -> Option<&str> {
    text[end..]
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(text: &str) -> Vec<EntityCount> {
        HeuristicTagger::new().analyze_entities(text).unwrap()
    }

    fn find<'a>(entities: &'a [EntityCount], name: &str) -> Option<&'a EntityCount> {
        entities.iter().find(|e| e.name == name)
    }

    #[test]
    fn test_counts_and_ranking() {
        let text = "Renzo left early. Then Renzo met Lucia. Lucia smiled at Renzo.";
        let entities = tag(text);
        assert_eq!(entities[0].name, "Renzo");
        assert_eq!(entities[0].count, 3);
        assert_eq!(find(&entities, "Lucia").unwrap().count, 2);
    }

    #[test]
    fn test_sentence_opener_is_stripped_from_run() {
        let entities = tag("Yesterday Renzo met Lucia near the lake.");
        assert_eq!(find(&entities, "Renzo").unwrap().count, 1);
        assert!(find(&entities, "Yesterday Renzo").is_none());
    }

    #[test]
    fn test_unknown_sentence_opener_is_ignored() {
        let entities = tag("Suddenly the door opened. Nobody was there.");
        assert!(entities.is_empty());
    }

    #[test]
    fn test_person_cues() {
        let entities = tag("The priest, Don Abbondio, was afraid. \"No,\" said Perpetua.");
        assert_eq!(find(&entities, "Don Abbondio").unwrap().category, PERSON);
        assert_eq!(find(&entities, "Perpetua").unwrap().category, PERSON);
    }

    #[test]
    fn test_title_abbreviation_is_not_sentence_break() {
        let entities = tag("It was then that Mr. Darcy arrived.");
        assert_eq!(find(&entities, "Darcy").unwrap().category, PERSON);
    }

    #[test]
    fn test_location_and_organization_cues() {
        let entities = tag("They travelled towards Milano. Later they joined Acme Corp. for work.");
        assert_eq!(find(&entities, "Milano").unwrap().category, LOCATION);
        assert_eq!(find(&entities, "Acme Corp").unwrap().category, ORGANIZATION);

        let entities = tag("The shares of Fiat S.p.A. fell.");
        assert_eq!(find(&entities, "Fiat").unwrap().category, ORGANIZATION);
    }

    #[test]
    fn test_italian_text() {
        let entities = tag("Quel ramo del lago di Como volge a mezzogiorno. Renzo andò a Lecco.");
        assert!(find(&entities, "Como").is_some());
        assert_eq!(find(&entities, "Lecco").unwrap().category, LOCATION);
        assert!(find(&entities, "Renzo").is_none()); // only seen opening a sentence
    }
}
