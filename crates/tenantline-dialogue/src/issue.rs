//! Issue classification from caller speech.
//!
//! The taxonomy is an ordered table of (pattern, category) rules evaluated in
//! priority order; the first category with a matching rule wins. Severity is
//! decided independently from emergency and urgency markers.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tenantline_core::types::{IssueType, Severity};

struct Rule<T> {
    regex: Regex,
    value: T,
}

fn compile<T: Copy>(value: T, patterns: &[&str]) -> Vec<Rule<T>> {
    patterns
        .iter()
        .map(|p| Rule {
            regex: Regex::new(p).expect("Invalid issue regex"),
            value,
        })
        .collect()
}

/// Category rules, highest priority first.
static ISSUE_RULES: LazyLock<Vec<Rule<IssueType>>> = LazyLock::new(|| {
    let mut rules = Vec::new();
    rules.extend(compile(
        IssueType::Heating,
        &[
            r"(?i)\bheat(ing|er|ers)?\b",
            r"(?i)\bradiators?\b",
            r"(?i)\bboiler\b",
            r"(?i)\bfurnace\b",
            r"(?i)\bthermostat\b",
            r"(?i)\bhot\s+water\b",
            r"(?i)\b(freezing|cold\s+(apartment|in\s+here|inside))\b",
        ],
    ));
    rules.extend(compile(
        IssueType::Electrical,
        &[
            r"(?i)\bpower\b",
            r"(?i)\belectric(al|ity)?\b",
            r"(?i)\boutlets?\b",
            r"(?i)\blights?\b",
            r"(?i)\bbreakers?\b",
            r"(?i)\bfuses?\b",
            r"(?i)\bwiring\b",
            r"(?i)\bspark(s|ing)?\b",
        ],
    ));
    rules.extend(compile(
        IssueType::Plumbing,
        &[
            r"(?i)\bleak(s|ing|y)?\b",
            r"(?i)\bwater\b",
            r"(?i)\bpipes?\b",
            r"(?i)\btoilets?\b",
            r"(?i)\bsinks?\b",
            r"(?i)\bdrains?\b",
            r"(?i)\bfaucets?\b",
            r"(?i)\bflood(ed|ing|s)?\b",
            r"(?i)\bclog(s|ged)?\b",
            r"(?i)\bsew(er|age)\b",
            r"(?i)\bshowers?\b",
        ],
    ));
    rules.extend(compile(
        IssueType::Pest,
        &[
            r"(?i)\b(cock)?roach(es)?\b",
            r"(?i)\b(mice|mouse|rats?)\b",
            r"(?i)\bbed\s*bugs?\b",
            r"(?i)\bbugs?\b",
            r"(?i)\bpests?\b",
            r"(?i)\bexterminator\b",
            r"(?i)\btermites?\b",
        ],
    ));
    rules.extend(compile(
        IssueType::Noise,
        &[
            r"(?i)\bnois(e|y)\b",
            r"(?i)\bloud\b",
            r"(?i)\bneighbou?rs?\b",
            r"(?i)\bmusic\b",
            r"(?i)\bbanging\b",
            r"(?i)\bparty\b",
        ],
    ));
    rules.extend(compile(
        IssueType::Other,
        &[
            r"(?i)\bbroken\b",
            r"(?i)\brepairs?\b",
            r"(?i)\bdamaged?\b",
            r"(?i)\bnot\s+working\b",
            r"(?i)\bdoes\s*n'?t\s+work\b",
            r"(?i)\b(door|window|lock|elevator|ceiling|stove|fridge|refrigerator|mold)s?\b",
        ],
    ));
    rules
});

static EMERGENCY_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bno\s+heat(ing)?\b",
        r"(?i)\bheat(ing)?\s+(is\s+)?(not\s+working|out|off|broken)\b",
        r"(?i)\bflood(ed|ing|s)?\b",
        r"(?i)\bwater\s+(is\s+)?(pouring|everywhere|gushing)\b",
        r"(?i)\bgas\s+(smell|leak)\b",
        r"(?i)\bsmell(s|ing)?\s+(of\s+|like\s+)?gas\b",
        r"(?i)\bsew(er|age)\s+(is\s+)?(backup|back(ed|ing)?\s+up|blocked|overflowing)\b",
        r"(?i)\b(toilet\s+(is\s+)?clogged|clogged\s+toilet)\b",
        r"(?i)\blife[\s-]threatening\b",
        r"(?i)\bfire\b",
        r"(?i)\bsmoke\b",
        r"(?i)\bcarbon\s+monoxide\b",
        r"(?i)\bsparking\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid emergency regex"))
    .collect()
});

static URGENCY_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\burgent(ly)?\b",
        r"(?i)\bemergency\b",
        r"(?i)\bimmediate(ly)?\b",
        r"(?i)\basap\b",
        r"(?i)\bright\s+away\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid urgency regex"))
    .collect()
});

/// Result of classifying one utterance, merged with what was already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IssueClassification {
    pub issue_type: Option<IssueType>,
    pub severity: Severity,
}

/// Stateless rule-table classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueExtractor;

impl IssueExtractor {
    /// Classify `text` without prior context.
    pub fn detect(&self, text: &str) -> IssueClassification {
        let severity = if EMERGENCY_MARKERS.iter().any(|r| r.is_match(text)) {
            Severity::Emergency
        } else if URGENCY_MARKERS.iter().any(|r| r.is_match(text)) {
            Severity::Urgent
        } else {
            Severity::Standard
        };

        let issue_type = ISSUE_RULES
            .iter()
            .find(|rule| rule.regex.is_match(text))
            .map(|rule| rule.value)
            .or((severity == Severity::Emergency).then_some(IssueType::Other));

        IssueClassification {
            issue_type,
            severity,
        }
    }

    /// Classify `text` in the context of prior facts.
    ///
    /// A known issue type is kept and severity only ever rises.
    pub fn classify(&self, text: &str, prior: Option<IssueClassification>) -> IssueClassification {
        let detected = self.detect(text);
        match prior {
            Some(prior) => IssueClassification {
                issue_type: prior.issue_type.or(detected.issue_type),
                severity: prior.severity.max(detected.severity),
            },
            None => detected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(text: &str) -> Option<IssueType> {
        IssueExtractor.detect(text).issue_type
    }

    fn severity(text: &str) -> Severity {
        IssueExtractor.detect(text).severity
    }

    // ---- categories ----

    #[test]
    fn test_categories() {
        assert_eq!(issue("I have no heat"), Some(IssueType::Heating));
        assert_eq!(issue("the radiator is cold"), Some(IssueType::Heating));
        assert_eq!(issue("the power went out"), Some(IssueType::Electrical));
        assert_eq!(issue("my sink is leaking"), Some(IssueType::Plumbing));
        assert_eq!(issue("there are roaches everywhere"), Some(IssueType::Pest));
        assert_eq!(issue("my upstairs neighbors are so loud"), Some(IssueType::Noise));
        assert_eq!(issue("the front door lock is broken"), Some(IssueType::Other));
        assert_eq!(issue("hello, good morning"), None);
    }

    #[test]
    fn test_priority_order_first_match_wins() {
        // heating outranks plumbing
        assert_eq!(issue("no hot water and the pipe leaks"), Some(IssueType::Heating));
        // plumbing outranks noise
        assert_eq!(issue("my neighbor's pipe is leaking"), Some(IssueType::Plumbing));
        // electrical outranks other
        assert_eq!(issue("the lights are broken"), Some(IssueType::Electrical));
    }

    // ---- severity ----

    #[test]
    fn test_emergency_markers() {
        assert_eq!(severity("I have no heat"), Severity::Emergency);
        assert_eq!(severity("the basement is flooding"), Severity::Emergency);
        assert_eq!(severity("I smell gas in the kitchen"), Severity::Emergency);
        assert_eq!(severity("there's a sewage backup"), Severity::Emergency);
        assert_eq!(severity("this is life-threatening"), Severity::Emergency);
        assert_eq!(severity("the toilet is clogged"), Severity::Emergency);
    }

    #[test]
    fn test_urgent_and_standard() {
        assert_eq!(severity("please fix my sink urgently"), Severity::Urgent);
        assert_eq!(severity("my sink drips a little"), Severity::Standard);
    }

    #[test]
    fn test_emergency_without_category_is_other() {
        let result = IssueExtractor.detect("there's smoke coming from the hallway");
        assert_eq!(result.issue_type, Some(IssueType::Other));
        assert_eq!(result.severity, Severity::Emergency);
    }

    // ---- context ----

    #[test]
    fn test_classify_never_downgrades() {
        let prior = IssueExtractor.detect("I have no heat");
        let next = IssueExtractor.classify("also the sink drips", Some(prior));
        assert_eq!(next.issue_type, Some(IssueType::Heating));
        assert_eq!(next.severity, Severity::Emergency);
    }

    #[test]
    fn test_classify_upgrades_severity() {
        let prior = IssueExtractor.detect("my sink is leaking");
        assert_eq!(prior.severity, Severity::Standard);
        let next = IssueExtractor.classify("now the kitchen is flooding", Some(prior));
        assert_eq!(next.issue_type, Some(IssueType::Plumbing));
        assert_eq!(next.severity, Severity::Emergency);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let once = IssueExtractor.classify("the heater is broken, it's urgent", None);
        let twice = IssueExtractor.classify("the heater is broken, it's urgent", Some(once));
        assert_eq!(once, twice);
    }
}
