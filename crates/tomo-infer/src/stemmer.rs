//! Suffix-stripping stemmer for lexicon lookups.
//!
//! Keywords and text words go through the same function, so stems only need
//! to be consistent, not linguistic.

/// Italian adverb, superlative and -zione endings. Checked first.
const ITALIAN_SUFFIXES: &[(&str, &str)] = &[
    ("issimamente", ""),
    ("amente", ""),
    ("emente", ""),
    ("issimo", ""),
    ("issima", ""),
    ("issimi", ""),
    ("issime", ""),
    ("zione", "z"),
    ("zioni", "z"),
];

/// English endings, longest of each family first.
const ENGLISH_SUFFIXES: &[(&str, &str)] = &[
    ("iness", "y"),
    ("ness", ""),
    ("ment", ""),
    ("fully", ""),
    ("ful", ""),
    ("less", ""),
    ("ily", "y"),
    ("ly", ""),
    ("ied", "y"),
    ("ies", "y"),
    ("ing", ""),
    ("ed", ""),
    ("ches", "ch"),
    ("shes", "sh"),
    ("sses", "ss"),
    ("xes", "x"),
    // Guards: these endings are kept as they are.
    ("ss", "ss"),
    ("us", "us"),
    ("is", "is"),
    ("s", ""),
];

/// Doubled consonants that survive -ing/-ed removal ("falling" → "fall").
const KEEP_DOUBLED: &[u8] = b"lsz";

/// Stem a word by removing one known suffix.
pub fn simple_stem(word: &str) -> String {
    if word.chars().count() <= 3 {
        return word.to_string();
    }

    for &(suffix, replacement) in ITALIAN_SUFFIXES.iter().chain(ENGLISH_SUFFIXES) {
        let Some(stem) = word.strip_suffix(suffix).filter(|s| s.len() >= 2) else {
            continue;
        };
        let mut stem = stem.to_string();
        if suffix == "ing" || suffix == "ed" {
            undouble(&mut stem);
        }
        stem.push_str(replacement);
        return stem;
    }

    word.to_string()
}

/// "runn" → "run", "shopp" → "shop".
fn undouble(stem: &mut String) {
    let bytes = stem.as_bytes();
    let [.., a, b] = bytes else {
        return;
    };
    if a == b && b.is_ascii_alphabetic() && !b"aeiou".contains(b) && !KEEP_DOUBLED.contains(b) {
        stem.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_stems() {
        assert_eq!(simple_stem("programming"), "program");
        assert_eq!(simple_stem("exercising"), "exercis");
        assert_eq!(simple_stem("studied"), "study");
        assert_eq!(simple_stem("running"), "run");
        assert_eq!(simple_stem("shopping"), "shop");
        assert_eq!(simple_stem("falling"), "fall");
        assert_eq!(simple_stem("happiness"), "happy");
        assert_eq!(simple_stem("laughed"), simple_stem("laughing"));
    }

    #[test]
    fn test_short_and_guarded_words() {
        assert_eq!(simple_stem("sad"), "sad");
        assert_eq!(simple_stem("glass"), "glass");
        assert_eq!(simple_stem("chorus"), "chorus");
    }

    #[test]
    fn test_italian_suffixes() {
        assert_eq!(simple_stem("tristissimo"), simple_stem("tristissima"));
        assert_eq!(simple_stem("felicemente"), "felic");
        assert_eq!(simple_stem("disperazione"), simple_stem("disperazioni"));
        assert_eq!(simple_stem("improvvisamente"), "improvvis");
    }
}
