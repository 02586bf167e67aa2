//! Per-call guard against repeating a system utterance word for word.

use std::collections::HashSet;

use crate::error::DialogueError;

/// Acknowledgements tried in order when a line has already been spoken.
const ACK_PREFIXES: &[&str] = &[
    "I understand. ",
    "Got it. ",
    "Right. ",
    "Okay. ",
    "Thanks. ",
    "Alright. ",
];

/// Last-resort lines, used in order and then numbered.
const FALLBACK_LINES: &[&str] = &[
    "Sorry, let's try that once more. Could you tell me again?",
    "Let me take another run at this. What would you like to add?",
    "I'm still here. Please go ahead.",
];

/// Comparison form: lowercase, no punctuation, single spaces.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn lower_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        // Keep "I" and proper nouns after it intact.
        Some('I') if text.starts_with("I ") || text.starts_with("I'") => text.to_string(),
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Structural rewrites of `candidate`, tried after every prefix is used up.
fn paraphrases(candidate: &str) -> Vec<String> {
    let mut out = Vec::new();
    let swaps = [
        ("Could you ", "Can you "),
        ("Can you ", "Could you "),
        ("What is ", "What's "),
        ("What's ", "What is "),
        ("Is that ", "Would that be "),
    ];
    for (from, to) in swaps {
        if let Some(rest) = candidate.strip_prefix(from) {
            out.push(format!("{}{}", to, rest));
        }
    }
    let body = lower_first(candidate);
    out.push(format!("Let me ask again: {}", body));
    out.push(format!("Just to check, {}", body));
    out.push(format!("One more time: {}", body));
    out.push(format!("Sorry to repeat myself, but {}", body));
    out
}

/// Remembers every line spoken on one call.
#[derive(Debug, Clone, Default)]
pub struct ResponseTracker {
    spoken: HashSet<String>,
    history: Vec<String>,
    used_prefixes: HashSet<usize>,
    fallbacks: usize,
}

impl ResponseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an equivalent line was already spoken.
    pub fn has_spoken(&self, text: &str) -> bool {
        self.spoken.contains(&normalize(text))
    }

    /// Return `candidate`, or a deterministic variant of it when it was
    /// already spoken. The returned text is recorded before returning.
    ///
    /// Fails when no variant is novel; the caller decides what to say instead.
    pub fn propose(&mut self, candidate: &str) -> Result<String, DialogueError> {
        let candidate = candidate.trim();
        if !self.has_spoken(candidate) {
            return Ok(self.remember(candidate.to_string()));
        }

        // Second pass runs after the rotation resets.
        for _ in 0..2 {
            for (i, prefix) in ACK_PREFIXES.iter().enumerate() {
                if self.used_prefixes.contains(&i) {
                    continue;
                }
                let text = format!("{}{}", prefix, candidate);
                if !self.has_spoken(&text) {
                    self.used_prefixes.insert(i);
                    return Ok(self.remember(text));
                }
            }
            self.used_prefixes.clear();
        }

        for text in paraphrases(candidate) {
            if !self.has_spoken(&text) {
                return Ok(self.remember(text));
            }
        }

        Err(DialogueError::Repetition(candidate.to_string()))
    }

    /// A generic line that has never been spoken on this call.
    pub fn fallback(&mut self) -> String {
        loop {
            let text = match FALLBACK_LINES.get(self.fallbacks) {
                Some(line) => line.to_string(),
                None => format!(
                    "Sorry, I'm having trouble with this. Could you say that again? That's attempt {}.",
                    self.fallbacks + 1
                ),
            };
            self.fallbacks += 1;
            if !self.has_spoken(&text) {
                return self.remember(text);
            }
        }
    }

    /// Every line spoken so far, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn remember(&mut self, text: String) -> String {
        self.spoken.insert(normalize(&text));
        self.history.push(text.clone());
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_novel_line_passes_through() {
        let mut tracker = ResponseTracker::new();
        let text = tracker.propose("What is your name?").unwrap();
        assert_eq!(text, "What is your name?");
        assert!(tracker.has_spoken("what is your name"));
    }

    #[test]
    fn test_repeat_gets_prefix() {
        let mut tracker = ResponseTracker::new();
        tracker.propose("What is your name?").unwrap();
        let second = tracker.propose("What is your name?").unwrap();
        assert_eq!(second, "I understand. What is your name?");
        let third = tracker.propose("What is your name?").unwrap();
        assert_eq!(third, "Got it. What is your name?");
    }

    #[test]
    fn test_rotation_is_shared_across_lines() {
        let mut tracker = ResponseTracker::new();
        tracker.propose("First question?").unwrap();
        tracker.propose("Second question?").unwrap();
        assert_eq!(
            tracker.propose("First question?").unwrap(),
            "I understand. First question?"
        );
        assert_eq!(
            tracker.propose("Second question?").unwrap(),
            "Got it. Second question?"
        );
    }

    #[test]
    fn test_rotation_resets_when_exhausted() {
        let mut tracker = ResponseTracker::new();
        tracker.propose("Line A.").unwrap();
        for _ in 0..ACK_PREFIXES.len() {
            tracker.propose("Line A.").unwrap();
        }
        tracker.propose("Line B.").unwrap();
        // every prefix is used, so the rotation restarts for a new line
        assert_eq!(tracker.propose("Line B.").unwrap(), "I understand. Line B.");
    }

    #[test]
    fn test_paraphrase_after_prefixes() {
        let mut tracker = ResponseTracker::new();
        for _ in 0..=ACK_PREFIXES.len() {
            tracker.propose("Could you spell the street?").unwrap();
        }
        let next = tracker.propose("Could you spell the street?").unwrap();
        assert_eq!(next, "Can you spell the street?");
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut tracker = ResponseTracker::new();
        let mut outcomes = Vec::new();
        for _ in 0..20 {
            outcomes.push(tracker.propose("Hello."));
        }
        assert!(outcomes.iter().any(|o| o.is_err()));
        let err = outcomes.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(err, DialogueError::Repetition(_)));
    }

    #[test]
    fn test_fallback_is_always_novel() {
        let mut tracker = ResponseTracker::new();
        let mut seen = HashSet::new();
        for _ in 0..10 {
            let line = tracker.fallback();
            assert!(seen.insert(line));
        }
    }

    #[test]
    fn test_no_identical_lines_in_history() {
        let mut tracker = ResponseTracker::new();
        for _ in 0..8 {
            let _ = tracker.propose("What is the address?");
            let _ = tracker.propose("What is your name?");
        }
        let unique: HashSet<&String> = tracker.history().iter().collect();
        assert_eq!(unique.len(), tracker.history().len());
    }

    #[test]
    fn test_normalized_comparison() {
        let mut tracker = ResponseTracker::new();
        tracker.propose("What is your name?").unwrap();
        assert!(tracker.has_spoken("what is your NAME"));
        let next = tracker.propose("What is your name").unwrap();
        assert_ne!(normalize(&next), normalize("What is your name?"));
    }
}
