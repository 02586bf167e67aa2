//! Text and street-name normalization.
//!
//! Transcribed speech and registry rows go through the same pipeline so that
//! "Port Richmond Ave." and "port richmond avenue" compare equal.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tenantline_core::config::RegistryConfig;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid normalization regex"));

/// Street-type words dropped from the end of a street name.
pub const STREET_SUFFIXES: &[&str] = &[
    "street", "st", "avenue", "ave", "av", "road", "rd", "boulevard", "blvd", "place", "pl",
    "drive", "dr", "lane", "ln", "court", "ct", "way", "terrace", "ter", "parkway", "pkwy",
    "highway", "hwy", "circle", "cir",
];

/// Words that introduce a unit designator.
pub const UNIT_MARKERS: &[&str] = &["apt", "apartment", "unit", "suite", "ste"];

pub fn is_street_suffix(token: &str) -> bool {
    STREET_SUFFIXES.contains(&token)
}

/// Canonical unit designator: "Apt 3-B" and "#3b" both become "3b".
pub fn normalize_unit(unit: &str) -> String {
    tokenize(unit)
        .into_iter()
        .skip_while(|t| UNIT_MARKERS.contains(&t.as_str()))
        .collect::<String>()
}

/// Lowercase, drop apostrophes, turn `#` into a unit marker, replace any other
/// punctuation with spaces and collapse whitespace.
pub fn normalize_text(input: &str) -> String {
    let lowered = input
        .to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .replace('#', " unit ");
    NON_ALNUM
        .replace_all(&lowered, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn tokenize(input: &str) -> Vec<String> {
    normalize_text(input)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Join runs of two or more single letters into one word ("c a r y" -> "cary").
pub fn join_spelled_letters(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut run = String::new();

    for token in tokens {
        let is_letter = token.len() == 1 && token.chars().all(|c| c.is_ascii_alphabetic());
        if is_letter {
            run.push_str(token);
        } else {
            if !run.is_empty() {
                out.push(std::mem::take(&mut run));
            }
            out.push(token.clone());
        }
    }
    if !run.is_empty() {
        out.push(run);
    }
    out
}

/// Drop repeated tokens and stuttered fragments ("richmond richmond",
/// "rich richmond").
pub fn collapse_repeats(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if out.last() == Some(token) {
            continue;
        }
        if let Some(next) = tokens.get(i + 1) {
            let stutter = token.len() >= 3
                && next.len() > token.len()
                && token.chars().all(|c| c.is_ascii_alphabetic())
                && next.starts_with(token.as_str());
            if stutter {
                continue;
            }
        }
        out.push(token.clone());
    }
    out
}

/// Strip one trailing street suffix, never leaving the name empty.
///
/// Returns the remaining tokens and whether a suffix was removed.
pub fn strip_suffix(tokens: &[String]) -> (Vec<String>, bool) {
    match tokens.split_last() {
        Some((last, rest)) if !rest.is_empty() && is_street_suffix(last) => (rest.to_vec(), true),
        _ => (tokens.to_vec(), false),
    }
}

/// Canonical form of a street name used as the registry key.
pub fn normalize_street(name: &str) -> String {
    let tokens = collapse_repeats(&join_spelled_letters(&tokenize(name)));
    let (stripped, _) = strip_suffix(&tokens);
    stripped.join(" ")
}

/// Applies configured speech-recognition corrections at token boundaries.
///
/// Longer phrases are tried first and replaced text is not re-scanned.
#[derive(Debug, Clone)]
pub struct Normalizer {
    corrections: Vec<(Vec<String>, Vec<String>)>,
}

impl Normalizer {
    pub fn new(corrections: &BTreeMap<String, String>) -> Self {
        let mut corrections: Vec<(Vec<String>, Vec<String>)> = corrections
            .iter()
            .map(|(from, to)| (tokenize(from), tokenize(to)))
            .filter(|(from, _)| !from.is_empty())
            .collect();
        corrections.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { corrections }
    }

    pub fn correct(&self, tokens: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        'outer: while i < tokens.len() {
            for (from, to) in &self.corrections {
                if tokens[i..].starts_with(from) {
                    out.extend(to.iter().cloned());
                    i += from.len();
                    continue 'outer;
                }
            }
            out.push(tokens[i].clone());
            i += 1;
        }
        out
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&RegistryConfig::default().corrections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    // ---- normalize_text ----

    #[test]
    fn test_normalize_text_strips_punctuation_and_case() {
        assert_eq!(normalize_text("  29, Port-Richmond  Ave. "), "29 port richmond ave");
        assert_eq!(normalize_text("It's 122 Targee St!"), "its 122 targee st");
    }

    #[test]
    fn test_normalize_text_hash_becomes_unit() {
        assert_eq!(normalize_text("28 Alaska St #3B"), "28 alaska st unit 3b");
    }

    #[test]
    fn test_normalize_unit() {
        assert_eq!(normalize_unit("Apt 3-B"), "3b");
        assert_eq!(normalize_unit("#12"), "12");
        assert_eq!(normalize_unit("Suite 200"), "200");
        assert_eq!(normalize_unit("unit"), "");
    }

    // ---- street names ----

    #[test]
    fn test_normalize_street_drops_single_suffix() {
        assert_eq!(normalize_street("Port Richmond Avenue"), "port richmond");
        assert_eq!(normalize_street("Alaska St."), "alaska");
        assert_eq!(normalize_street("Cary"), "cary");
    }

    #[test]
    fn test_normalize_street_keeps_bare_suffix_word() {
        assert_eq!(normalize_street("Court"), "court");
        assert_eq!(normalize_street("Court Street Richmond"), "court street richmond");
    }

    #[test]
    fn test_normalize_street_joins_spelling_and_repeats() {
        assert_eq!(normalize_street("c a r y avenue"), "cary");
        assert_eq!(normalize_street("port port richmond avenue"), "port richmond");
        assert_eq!(normalize_street("rich richmond ave"), "richmond");
    }

    #[test]
    fn test_join_spelled_letters_leaves_single_letter() {
        assert_eq!(join_spelled_letters(&toks("unit b")), toks("unit b"));
        assert_eq!(join_spelled_letters(&toks("t a r g e e st")), toks("targee st"));
    }

    // ---- corrections ----

    #[test]
    fn test_default_corrections() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.correct(&toks("29 poor richmond ave")),
            toks("29 port richmond ave")
        );
        assert_eq!(normalizer.correct(&toks("122 target street")), toks("122 targee street"));
    }

    #[test]
    fn test_corrections_respect_token_boundaries() {
        let normalizer = Normalizer::default();
        // "port rich" must not fire inside "port richmond"
        assert_eq!(
            normalizer.correct(&toks("31 port richmond")),
            toks("31 port richmond")
        );
        assert_eq!(
            normalizer.correct(&toks("31 port richman")),
            toks("31 port richmond")
        );
    }
}
