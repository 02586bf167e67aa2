//! Spoken-address parsing and three-way resolution.
//!
//! A transcript is turned into a [`CandidateAddress`] (house number, street,
//! unit) and checked against a registry snapshot:
//!
//! - `exact`: the number and street exist, uniquely for the given unit
//! - `ambiguous`: a nearby number scores at least 4.0; the caller must confirm
//! - `unverified`: nothing close enough; the caller is told it was not found
//!
//! Only an exact match or an explicitly confirmed [`SuggestedAddress`]
//! produces a [`ResolvedAddress`].

use serde::Serialize;
use tenantline_core::config::RegistryConfig;
use tenantline_core::types::AddressStatus;
use tracing::{debug, warn};

use crate::index::PropertyIndex;
use crate::normalize::{
    collapse_repeats, is_street_suffix, join_spelled_letters, normalize_unit, strip_suffix,
    tokenize, Normalizer, UNIT_MARKERS,
};
use crate::numbers::collapse_number_words;
use crate::property::PropertyRecord;

/// Minimum score for a nearby number to be offered at all.
const SUGGESTION_FLOOR: f64 = 4.0;

/// Score gap above which the top suggestion is read back alone.
const CLEAR_LEADER_MARGIN: f64 = 2.0;

/// Longest house number accepted; longer digit runs are phone numbers.
const MAX_HOUSE_NUMBER_DIGITS: usize = 5;

const MAX_STREET_TOKENS: usize = 5;

/// Words that end a street phrase.
const STOP_WORDS: &[&str] = &[
    "and", "i", "im", "ive", "my", "is", "it", "its", "the", "a", "on", "at", "in", "live",
    "lives", "living", "near", "by", "please", "name", "phone", "number", "thank", "thanks",
    "yes", "no", "yeah", "um", "uh", "so", "but", "there", "theres", "we", "have", "has", "been",
    "with", "of", "for", "to", "from", "address", "called", "this", "that", "was",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

fn is_digits(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Candidate
// =============================================================================

/// What the caller appears to have said, possibly partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateAddress {
    pub number: Option<u32>,
    /// Normalized street name.
    pub street: Option<String>,
    pub unit: Option<String>,
    /// The street phrase ended in a street-type word ("avenue", "st").
    pub has_street_suffix: bool,
    pub raw: String,
}

impl CandidateAddress {
    pub fn is_complete(&self) -> bool {
        self.number.is_some() && self.street.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.number.is_none() && self.street.is_none()
    }

    /// Fill parts missing here from an earlier partial candidate.
    pub fn merged_with(&self, earlier: &CandidateAddress) -> CandidateAddress {
        let (street, has_street_suffix) = match &self.street {
            Some(street) => (Some(street.clone()), self.has_street_suffix),
            None => (earlier.street.clone(), earlier.has_street_suffix),
        };
        CandidateAddress {
            number: self.number.or(earlier.number),
            street,
            unit: self.unit.clone().or_else(|| earlier.unit.clone()),
            has_street_suffix,
            raw: format!("{} {}", earlier.raw, self.raw).trim().to_string(),
        }
    }

    /// Spoken form of whatever was understood ("628 Cary").
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(number) = self.number {
            parts.push(number.to_string());
        }
        if let Some(street) = &self.street {
            parts.push(title_case(street));
        }
        if let Some(unit) = &self.unit {
            parts.push(format!("unit {}", unit.to_uppercase()));
        }
        parts.join(" ")
    }
}

// =============================================================================
// Resolution outcome
// =============================================================================

/// A registry address the caller may use for a ticket.
///
/// Only produced by an exact match or by [`SuggestedAddress::confirm`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAddress {
    record: PropertyRecord,
    confirmed_by_caller: bool,
}

impl ResolvedAddress {
    pub fn record(&self) -> &PropertyRecord {
        &self.record
    }

    pub fn full_address(&self) -> &str {
        &self.record.full_address
    }

    /// True when the address came from a confirmed suggestion rather than an exact match.
    pub fn confirmed_by_caller(&self) -> bool {
        self.confirmed_by_caller
    }
}

/// A nearby registry address that has not been confirmed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestedAddress {
    pub record: PropertyRecord,
    pub score: f64,
    pub distance: u32,
}

impl SuggestedAddress {
    /// The caller affirmed this suggestion.
    pub fn confirm(self) -> ResolvedAddress {
        ResolvedAddress {
            record: self.record,
            confirmed_by_caller: true,
        }
    }
}

/// Outcome of resolving one spoken address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressResolution {
    status: AddressStatus,
    matched: Option<ResolvedAddress>,
    suggestions: Vec<SuggestedAddress>,
    raw_input: String,
    candidate: CandidateAddress,
}

impl AddressResolution {
    fn exact(record: PropertyRecord, candidate: CandidateAddress) -> Self {
        Self {
            status: AddressStatus::Exact,
            matched: Some(ResolvedAddress {
                record,
                confirmed_by_caller: false,
            }),
            suggestions: Vec::new(),
            raw_input: candidate.raw.clone(),
            candidate,
        }
    }

    fn ambiguous(suggestions: Vec<SuggestedAddress>, candidate: CandidateAddress) -> Self {
        Self {
            status: AddressStatus::Ambiguous,
            matched: None,
            suggestions,
            raw_input: candidate.raw.clone(),
            candidate,
        }
    }

    /// Nothing close enough. Carries no suggestions so nothing can be guessed.
    pub fn unverified(candidate: CandidateAddress) -> Self {
        Self {
            status: AddressStatus::Unverified,
            matched: None,
            suggestions: Vec::new(),
            raw_input: candidate.raw.clone(),
            candidate,
        }
    }

    pub fn status(&self) -> AddressStatus {
        self.status
    }

    pub fn matched(&self) -> Option<&ResolvedAddress> {
        self.matched.as_ref()
    }

    pub fn suggestions(&self) -> &[SuggestedAddress] {
        &self.suggestions
    }

    pub fn top_suggestion(&self) -> Option<&SuggestedAddress> {
        self.suggestions.first()
    }

    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn candidate(&self) -> &CandidateAddress {
        &self.candidate
    }

    /// The top suggestion leads the runner-up by at least 2.0.
    pub fn has_clear_leader(&self) -> bool {
        match self.suggestions.as_slice() {
            [] | [_] => true,
            [first, second, ..] => first.score - second.score >= CLEAR_LEADER_MARGIN,
        }
    }

    /// Promote the suggestion at `position` after the caller affirmed it.
    ///
    /// Returns `None` unless this resolution is ambiguous and the position exists.
    pub fn confirm_suggestion(&self, position: usize) -> Option<AddressResolution> {
        if self.status != AddressStatus::Ambiguous {
            return None;
        }
        let suggestion = self.suggestions.get(position)?.clone();
        Some(AddressResolution {
            status: AddressStatus::Exact,
            matched: Some(suggestion.confirm()),
            suggestions: Vec::new(),
            raw_input: self.raw_input.clone(),
            candidate: self.candidate.clone(),
        })
    }

    /// Address text for a ticket: the registry form when resolved, otherwise
    /// what the caller said.
    pub fn ticket_address(&self) -> String {
        match &self.matched {
            Some(resolved) => resolved.full_address().to_string(),
            None => {
                let described = self.candidate.describe();
                if described.is_empty() {
                    self.raw_input.clone()
                } else {
                    described
                }
            }
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Parses transcripts into candidate addresses and classifies them.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    normalizer: Normalizer,
    max_suggestions: usize,
}

impl Default for AddressResolver {
    fn default() -> Self {
        Self::new(Normalizer::default(), 3)
    }
}

impl AddressResolver {
    pub fn new(normalizer: Normalizer, max_suggestions: usize) -> Self {
        Self {
            normalizer,
            max_suggestions: max_suggestions.max(1),
        }
    }

    pub fn from_config(config: &RegistryConfig, max_suggestions: usize) -> Self {
        Self::new(Normalizer::new(&config.corrections), max_suggestions)
    }

    /// Pull a house number, street and unit out of free text.
    pub fn parse_candidate(&self, text: &str) -> CandidateAddress {
        let raw_tokens = collapse_number_words(&self.normalizer.correct(&tokenize(text)));
        let spelled = longest_spelled_run(&raw_tokens);
        let mut tokens = collapse_repeats(&join_spelled_letters(&raw_tokens));
        let unit = take_unit(&mut tokens);

        let mut candidate = CandidateAddress {
            unit,
            raw: text.trim().to_string(),
            ..CandidateAddress::default()
        };

        let numbered: Vec<(usize, u32)> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| is_digits(t) && t.len() <= MAX_HOUSE_NUMBER_DIGITS)
            .filter_map(|(i, t)| t.parse::<u32>().ok().map(|n| (i, n)))
            .collect();

        let phrases: Vec<(u32, Vec<String>, bool)> = numbered
            .iter()
            .map(|&(i, n)| {
                let (street, suffix) = street_after(&tokens, i + 1);
                (n, street, suffix)
            })
            .collect();

        let chosen = phrases
            .iter()
            .find(|(_, street, suffix)| *suffix && !street.is_empty())
            .or_else(|| phrases.iter().find(|(_, street, _)| !street.is_empty()));

        match chosen {
            Some((number, street, _)) => {
                let (stripped, suffix) = strip_suffix(street);
                candidate.number = Some(*number);
                candidate.street = Some(stripped.join(" "));
                candidate.has_street_suffix = suffix;
            }
            None => {
                candidate.number = phrases.first().map(|(n, _, _)| *n);
                if let Some(street) = street_before_suffix(&tokens) {
                    let (stripped, _) = strip_suffix(&street);
                    candidate.street = Some(stripped.join(" "));
                    candidate.has_street_suffix = true;
                } else if let Some(spelled) = spelled {
                    candidate.street = Some(spelled);
                }
            }
        }

        candidate
    }

    /// Parse and resolve in one step.
    pub fn resolve(&self, text: &str, index: &PropertyIndex) -> AddressResolution {
        let candidate = self.parse_candidate(text);
        self.resolve_candidate(&candidate, index, &[])
    }

    /// Classify a candidate, never offering a record in `rejected`.
    pub fn resolve_candidate(
        &self,
        candidate: &CandidateAddress,
        index: &PropertyIndex,
        rejected: &[PropertyRecord],
    ) -> AddressResolution {
        let (number, street) = match (candidate.number, candidate.street.as_deref()) {
            (Some(number), Some(street)) if !street.is_empty() => (number, street),
            _ => return AddressResolution::unverified(candidate.clone()),
        };

        let snapshot = match index.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Registry unavailable, address left unverified");
                return AddressResolution::unverified(candidate.clone());
            }
        };

        let at_address = snapshot.records_at(number, street);
        let exact = match candidate.unit.as_deref() {
            Some(unit) => snapshot.find_exact(number, street, Some(unit)),
            None => snapshot
                .find_exact(number, street, None)
                .or_else(|| match at_address.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                }),
        };
        if let Some(record) = exact {
            debug!(address = %record.full_address, "Exact address match");
            return AddressResolution::exact(record.clone(), candidate.clone());
        }

        let suggestions: Vec<SuggestedAddress> = snapshot
            .find_nearest(number, street, usize::MAX, index.similarity_threshold())
            .into_iter()
            .filter(|m| !rejected.contains(&m.record))
            .take(self.max_suggestions)
            .map(|m| SuggestedAddress {
                record: m.record,
                score: m.score,
                distance: m.distance,
            })
            .collect();

        match suggestions.first() {
            Some(best) if best.score >= SUGGESTION_FLOOR => {
                debug!(
                    top = %best.record.full_address,
                    score = best.score,
                    count = suggestions.len(),
                    "Ambiguous address"
                );
                AddressResolution::ambiguous(suggestions, candidate.clone())
            }
            _ => {
                debug!(input = %candidate.raw, "Address not found");
                AddressResolution::unverified(candidate.clone())
            }
        }
    }
}

/// Street tokens following a house number, and whether they ended on a suffix.
fn street_after(tokens: &[String], start: usize) -> (Vec<String>, bool) {
    let mut street = Vec::new();
    for token in tokens.iter().skip(start) {
        if is_stop_word(token) || is_digits(token) {
            break;
        }
        street.push(token.clone());
        if street.len() > 1 && is_street_suffix(token) {
            return (street, true);
        }
        if street.len() == MAX_STREET_TOKENS {
            break;
        }
    }
    (street, false)
}

/// Street named without a number: the words before the first suffix.
fn street_before_suffix(tokens: &[String]) -> Option<Vec<String>> {
    let position = tokens
        .iter()
        .enumerate()
        .skip(1)
        .find(|(i, t)| is_street_suffix(t) && !is_stop_word(&tokens[i - 1]))
        .map(|(i, _)| i)?;

    let mut start = position;
    while start > 0 && position - start < 3 {
        let previous = &tokens[start - 1];
        if is_stop_word(previous) || is_digits(previous) {
            break;
        }
        start -= 1;
    }
    (start < position).then(|| tokens[start..=position].to_vec())
}

/// A street spelled letter by letter, at least three letters long.
fn longest_spelled_run(tokens: &[String]) -> Option<String> {
    let mut best: Option<String> = None;
    let mut run = String::new();
    for token in tokens.iter().map(String::as_str).chain(std::iter::once("")) {
        if token.len() == 1 && token.chars().all(|c| c.is_ascii_alphabetic()) {
            run.push_str(token);
            continue;
        }
        if run.len() >= 3 && best.as_ref().map_or(true, |b| run.len() > b.len()) {
            best = Some(run.clone());
        }
        run.clear();
    }
    best
}

/// Remove a unit marker and its designator from the token stream.
///
/// Only a designator holding a digit or a single letter counts; "my
/// apartment is 28 alaska street" keeps every token.
fn take_unit(tokens: &mut Vec<String>) -> Option<String> {
    let position = tokens.iter().enumerate().position(|(i, t)| {
        UNIT_MARKERS.contains(&t.as_str())
            && tokens.get(i + 1).is_some_and(|d| is_unit_designator(d))
    })?;
    let mut unit = tokens[position + 1].clone();
    let mut end = position + 2;
    if let Some(letter) = tokens.get(end) {
        if is_digits(&unit) && is_single_letter(letter) {
            unit.push_str(letter);
            end += 1;
        }
    }
    tokens.drain(position..end);
    let unit = normalize_unit(&unit);
    (!unit.is_empty()).then_some(unit)
}

fn is_unit_designator(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit()) || is_single_letter(token)
}

fn is_single_letter(token: &str) -> bool {
    token.len() == 1 && token.chars().all(|c| c.is_ascii_alphabetic())
}
