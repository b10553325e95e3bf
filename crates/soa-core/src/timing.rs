//! Detection of timing tokens embedded in visit and timepoint names.
//!
//! Recognized forms (case-insensitive):
//! - `Week -2`, `Day 1`, `Wk 4`, optionally a range: `Day 1 to 3`, `Week 2 - Week 4`
//! - a tolerance window, alone or as a tail: `± 3 days`, `Day 8 ±1 day`
//! - any of the above wrapped in parentheses: `(Week 0)`

use std::sync::LazyLock;

use regex::Regex;

use crate::text::{collapse_whitespace, has_alphanumeric};

const SEPARATORS: &[char] = &['-', '–', '—', ',', ':', ';', '/', '|'];

static TIMING_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    let unit = r"(?:week|wk|day)s?";
    let tolerance = r"(?:±|\+/-)\s*\d+\s*(?:days?|weeks?|d|w)\b";
    let core = format!(
        r"\b{unit}\s*[-+]?\s*\d+(?:\s*(?:to|through|–|—|-)\s*(?:{unit}\s*)?[-+]?\s*\d+)?(?:\s*{tolerance})?"
    );
    Regex::new(&format!(
        r"(?i)\(\s*(?P<inner>{core}|{tolerance})\s*\)|(?P<bare>{core}|{tolerance})"
    ))
    .expect("Invalid timing token regex")
});

static TIMING_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?P<unit>week|wk|day)s?\s*(?P<sign>[-+])?\s*(?P<value>\d+)")
        .expect("Invalid timing anchor regex")
});

static EMPTY_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\)|\[\s*\]").expect("Invalid bracket regex"));

static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s*[-–—,:;/|]\s*){2,}").expect("Invalid separator regex"));

/// A name with its timing tokens removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingSplit {
    /// The name after stripping; may be empty when the name was only timing.
    pub remainder: String,
    /// Tokens in the order they appeared.
    pub tokens: Vec<String>,
}

impl TimingSplit {
    /// All tokens joined into one timing description.
    pub fn timing(&self) -> String {
        self.tokens.join(" ")
    }

    /// Whether anything meaningful is left of the name.
    pub fn has_remainder(&self) -> bool {
        has_alphanumeric(&self.remainder)
    }
}

/// Whether a label contains a timing token.
pub fn contains_timing(label: &str) -> bool {
    TIMING_TOKEN.is_match(label)
}

/// The first timing token in a label, whitespace-collapsed.
pub fn first_timing_token(label: &str) -> Option<String> {
    TIMING_TOKEN.captures(label).map(|caps| token_text(&caps))
}

/// The leading offset of a timing label in canonical form, e.g. `day 1`
/// or `week -2`.
///
/// Tolerances and range ends are ignored, so `Day 1 ± 1` and `(Day 1)`
/// share an anchor.
pub fn timing_anchor(label: &str) -> Option<String> {
    let caps = TIMING_ANCHOR.captures(label)?;
    let unit = if caps.name("unit")?.as_str().eq_ignore_ascii_case("day") {
        "day"
    } else {
        "week"
    };
    let value: u64 = caps.name("value")?.as_str().parse().ok()?;
    let sign = match caps.name("sign").map(|m| m.as_str()) {
        Some("-") if value > 0 => "-",
        _ => "",
    };
    Some(format!("{unit} {sign}{value}"))
}

/// Strip every timing token out of a label.
///
/// Returns `None` when the label contains no timing token.
pub fn split_timing(label: &str) -> Option<TimingSplit> {
    if !contains_timing(label) {
        return None;
    }

    let mut tokens = Vec::new();
    let mut stripped = String::with_capacity(label.len());
    let mut last = 0;
    for caps in TIMING_TOKEN.captures_iter(label) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        tokens.push(token_text(&caps));
        stripped.push_str(&label[last..whole.start()]);
        stripped.push(' ');
        last = whole.end();
    }
    stripped.push_str(&label[last..]);

    Some(TimingSplit {
        remainder: tidy_remainder(&stripped),
        tokens,
    })
}

fn token_text(caps: &regex::Captures<'_>) -> String {
    let matched = caps
        .name("inner")
        .or_else(|| caps.name("bare"))
        .map_or("", |m| m.as_str());
    collapse_whitespace(matched)
}

fn tidy_remainder(value: &str) -> String {
    let without_brackets = EMPTY_BRACKETS.replace_all(value, " ");
    let joined = SEPARATOR_RUN.replace_all(&without_brackets, " - ");
    let trimmed = joined.trim_matches(|c: char| c.is_whitespace() || SEPARATORS.contains(&c));
    collapse_whitespace(trimmed)
}
