//! Interpretation of short caller replies: yes/no, refusals, names, phone numbers.

use std::sync::LazyLock;

use regex::Regex;
use tenantline_registry::normalize::tokenize;
use tenantline_registry::numbers::collapse_number_words;

/// A caller's answer to a yes/no question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Unclear,
}

const YES_WORDS: &[&str] = &[
    "yes", "yeah", "yep", "yup", "correct", "right", "sure", "exactly", "affirmative", "ok",
    "okay", "absolutely", "definitely",
];

const NO_WORDS: &[&str] = &["no", "nope", "nah", "wrong", "incorrect", "negative"];

const YES_PHRASES: &[&str] = &["that's it", "that is it", "uh huh", "it is", "that's the one"];

const NO_PHRASES: &[&str] = &["not right", "not correct", "not it", "that's not", "not that one"];

/// Words that can never be a caller's name on their own.
const NOT_NAMES: &[&str] = &[
    "yes", "yeah", "no", "nope", "okay", "ok", "sure", "hello", "hi", "um", "uh", "the", "a",
    "calling", "about", "here", "fine", "good", "sorry", "what", "why", "thanks", "thank", "you",
    "not", "dont", "rather", "skip", "pass", "freezing", "cold", "urgent", "still", "waiting",
    "my", "is", "it", "its", "this", "name", "number", "phone", "address", "street", "avenue",
    "hmm", "huh", "er", "wait", "hold", "hang", "one", "just", "sec", "second", "again",
];

static STRONG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:my\s+name\s+is|my\s+name's|name\s+is|name's)\s+([a-z][a-z'\-]*(?:\s+[a-z][a-z'\-]*){0,2})")
        .expect("Invalid name regex")
});

static INTRO_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:hi|hello|yes|yeah|sure|okay|ok)[,.]?\s+)?(?:this\s+is|it's|it\s+is|i'm|i\s+am)\s+([a-z][a-z'\-]*(?:\s+[a-z][a-z'\-]*)?)\s*[.!]?\s*$")
        .expect("Invalid name regex")
});

static DECLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(rather\s+not|prefer\s+not|don'?t\s+(want|wanna|have|give)|do\s+not\s+(want|have)|no\s+thanks|not\s+comfortable|skip|pass|none|no\s+phone|won'?t)\b")
        .expect("Invalid decline regex")
});

fn normalized_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\'', "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn padded(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Read a yes/no answer. Mixed signals are unclear.
pub fn yes_no(text: &str) -> Answer {
    let words = normalized_words(text);
    let spaced = padded(text);
    if spaced.contains(" not sure ") {
        return Answer::Unclear;
    }

    let no = NO_PHRASES.iter().any(|p| spaced.contains(&format!(" {} ", p)))
        || words.iter().any(|w| NO_WORDS.contains(&w.as_str()));
    let yes = YES_PHRASES.iter().any(|p| spaced.contains(&format!(" {} ", p)))
        || words.iter().any(|w| YES_WORDS.contains(&w.as_str()));

    match (yes, no) {
        // "not right" contains "right"
        (_, true) if NO_PHRASES.iter().any(|p| spaced.contains(&format!(" {} ", p))) => Answer::No,
        (true, false) => Answer::Yes,
        (false, true) => Answer::No,
        _ => Answer::Unclear,
    }
}

/// An explicit refusal ("I'd rather not"), as opposed to a bare "no".
pub fn refuses(text: &str) -> bool {
    DECLINE.is_match(text)
}

/// Whether the caller is refusing to give something.
pub fn is_decline(text: &str) -> bool {
    refuses(text) || yes_no(text) == Answer::No
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn clean_name(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();
    let words: Vec<&str> = words
        .into_iter()
        .take_while(|w| {
            let lower = w.to_lowercase().replace('\'', "");
            !matches!(lower.as_str(), "and" | "my" | "i" | "im" | "the" | "from" | "at" | "on")
        })
        .collect();
    if words.is_empty() || words.iter().any(|w| w.chars().any(|c| c.is_ascii_digit())) {
        return None;
    }
    let lower_first = words[0].to_lowercase().replace('\'', "");
    if NOT_NAMES.contains(&lower_first.as_str()) {
        return None;
    }
    Some(words.iter().map(|w| title_case(w)).collect::<Vec<_>>().join(" "))
}

/// A name stated with an unmistakable marker ("my name is Maria Lopez").
///
/// Safe to run on any turn.
pub fn explicit_name(text: &str) -> Option<String> {
    STRONG_NAME
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| clean_name(m.as_str()))
}

/// Interpret a reply to "what is your name?".
///
/// Accepts introductions ("it's Maria", "this is Sam Ortiz") and bare names
/// of up to three words.
pub fn name_answer(text: &str) -> Option<String> {
    if let Some(name) = explicit_name(text) {
        return Some(name);
    }
    if let Some(name) = INTRO_NAME
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| clean_name(m.as_str()))
    {
        return Some(name);
    }
    if is_decline(text) {
        return None;
    }
    let words = normalized_words(text);
    if words.is_empty() || words.len() > 3 {
        return None;
    }
    if words.iter().any(|w| w.chars().any(|c| !c.is_alphabetic())) {
        return None;
    }
    clean_name(text)
}

/// Ten-digit phone number in `text`, spoken or typed, as bare digits.
///
/// A leading country code 1 is dropped.
pub fn extract_phone(text: &str) -> Option<String> {
    let tokens = collapse_number_words(&tokenize(text));
    tokens.iter().find_map(|token| {
        if !token.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match token.len() {
            10 => Some(token.clone()),
            11 if token.starts_with('1') => Some(token[1..].to_string()),
            _ => None,
        }
    })
}

/// Spoken grouping of a ten-digit number ("718-555-0142").
pub fn format_phone(digits: &str) -> String {
    if digits.len() == 10 && digits.chars().all(|c| c.is_ascii_digit()) {
        format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..])
    } else {
        digits.to_string()
    }
}

/// Whether `text` names the house number `number`, spoken or as digits.
pub fn mentions_number(text: &str, number: u32) -> bool {
    let wanted = number.to_string();
    collapse_number_words(&tokenize(text))
        .iter()
        .any(|token| *token == wanted)
}
