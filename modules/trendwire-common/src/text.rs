//! Text normalization shared by the canonicalizer, aggregator, and auditor.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Normalize a raw entity mention into its alias-cache key.
///
/// Lowercase, trim, strip one leading `#`, turn `_` and `-` into spaces,
/// collapse runs of whitespace.
pub fn normalize_entity(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let stripped = lowered.strip_prefix('#').unwrap_or(&lowered);
    let spaced: String = stripped
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();
    collapse_whitespace(&spaced)
}

/// Aggregation key for a canonical topic: the entity normalization plus
/// punctuation removal, so "Senate passes border bill." and
/// "senate passes border bill" share a bucket.
pub fn topic_key(canonical: &str) -> String {
    let normalized = normalize_entity(canonical);
    let cleaned: String = normalized
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else if c == '\'' || c == '’' || c == '.' {
                // "u.s." -> "us", "biden's" -> "bidens"
                '\u{0}'
            } else {
                ' '
            }
        })
        .filter(|c| *c != '\u{0}')
        .collect();
    collapse_whitespace(&cleaned)
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word count by whitespace.
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// Lowercased alphanumeric words, punctuation trimmed from both ends.
pub fn words_lower(s: &str) -> Vec<String> {
    s.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Digits with optional separators: "2024", "1,000", "3.5%".
pub fn is_numeral(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
        && s.chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | ' ' | '%' | '$'))
}

/// Truncate a timestamp to the start of its UTC hour.
pub fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::hours(1)).unwrap_or(ts)
}
