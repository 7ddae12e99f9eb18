//! Fixed word lists used by candidate validation and entity resolution.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

pub const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "in", "on", "at", "to", "for", "from", "by",
    "with", "about", "as", "into", "over", "after", "before", "is", "are", "was", "were", "be",
    "been", "it", "its", "this", "that", "these", "those", "he", "she", "they", "we", "you", "i",
    "his", "her", "their", "our", "your", "not", "no", "new", "more", "most", "very", "just",
    "all", "any", "some", "up", "down", "out", "off", "than", "then", "there", "here", "what",
    "who", "how", "why", "when", "where", "will", "would", "could", "should", "can", "may",
    "has", "have", "had", "does", "did", "do", "says", "said",
];

/// Publishers and news sources. A candidate naming one is about the outlet,
/// not the event.
pub const PUBLISHERS: &[&str] = &[
    "reuters", "associated press", "ap news", "bloomberg", "cnn", "fox news", "msnbc", "nbc news",
    "abc news", "cbs news", "bbc", "npr", "new york times", "nytimes", "washington post",
    "wall street journal", "wsj", "the guardian", "politico", "axios", "the hill", "usa today",
    "los angeles times", "financial times", "the atlantic", "newsweek", "time magazine",
    "huffpost", "breitbart", "daily mail", "al jazeera", "vox", "buzzfeed", "yahoo news",
    "google news", "substack",
];

/// Category words that make a phrase a subject area instead of an event.
pub const GENERIC_CATEGORIES: &[&str] = &[
    "policy", "policies", "debate", "administration", "politics", "economy", "issue", "issues",
    "situation", "news", "update", "updates", "agenda", "controversy", "discussion", "crisis",
    "concerns", "landscape", "relations", "affairs", "matters", "developments", "coverage",
    "opinion", "analysis", "commentary",
];

/// Verbs and event nouns that mark a phrase as describing something that
/// happened.
pub const ACTION_WORDS: &[&str] = &[
    // verbs
    "pass", "passes", "passed", "sign", "signs", "signed", "veto", "vetoes", "vetoed", "fire",
    "fires", "fired", "win", "wins", "won", "lose", "loses", "lost", "ban", "bans", "banned",
    "block", "blocks", "blocked", "sue", "sues", "sued", "strike", "strikes", "struck", "launch",
    "launches", "launched", "announce", "announces", "announced", "approve", "approves",
    "approved", "reject", "rejects", "rejected", "resign", "resigns", "resigned", "arrest",
    "arrests", "arrested", "indict", "indicts", "indicted", "charge", "charges", "charged",
    "kill", "kills", "killed", "attack", "attacks", "attacked", "raise", "raises", "raised",
    "cut", "cuts", "hit", "hits", "meet", "meets", "met", "visit", "visits", "visited", "halt",
    "halts", "halted", "rule", "rules", "ruled", "overturn", "overturns", "overturned",
    "collapse", "collapses", "collapsed", "surge", "surges", "surged", "plunge", "plunges",
    "plunged", "crash", "crashes", "crashed", "quit", "quits", "join", "joins", "joined",
    "leave", "leaves", "left", "end", "ends", "ended", "open", "opens", "opened", "close",
    "closes", "closed", "elect", "elects", "elected", "confirm", "confirms", "confirmed",
    "nominate", "nominates", "nominated", "acquire", "acquires", "acquired", "merge", "merges",
    "merged", "recall", "recalls", "recalled", "impose", "imposes", "imposed", "lift", "lifts",
    "lifted", "seize", "seizes", "seized", "release", "releases", "released", "unveil",
    "unveils", "unveiled", "deport", "deports", "deported", "pardon", "pardons", "pardoned",
    // event nouns
    "election", "vote", "hearing", "trial", "verdict", "ruling", "summit", "shooting",
    "earthquake", "hurricane", "wildfire", "flood", "outage", "shutdown", "strike", "protest",
    "rally", "scandal", "indictment", "impeachment", "merger", "acquisition", "layoffs",
    "bankruptcy", "ceasefire", "invasion", "explosion", "recall", "lawsuit", "settlement",
    "resignation", "arrest", "raid", "boycott", "walkout", "debut", "launch", "crash",
];

/// Strings that never resolve to an entity: calendar words and news filler.
pub const INVALID_ENTITIES: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "january",
    "february", "march", "april", "may", "june", "july", "august", "september", "october",
    "november", "december", "today", "yesterday", "tomorrow", "week", "month", "year", "news",
    "report", "reports", "breaking", "update", "live", "video", "photos", "watch", "opinion",
    "analysis", "editorial", "exclusive", "article", "story", "headline", "people", "thing",
    "things", "everyone", "someone",
];

pub static STOPWORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOPWORDS.iter().copied().collect());

pub static ACTION_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ACTION_WORDS.iter().copied().collect());

pub static INVALID_ENTITY_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| INVALID_ENTITIES.iter().copied().collect());

/// Whole-word, case-insensitive match on any generic category.
pub static GENERIC_CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternation = GENERIC_CATEGORIES
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("valid generic category regex")
});

pub fn is_stopword(word: &str) -> bool {
    STOPWORD_SET.contains(word)
}

pub fn is_action_word(word: &str) -> bool {
    ACTION_SET.contains(word)
}

/// Publisher named in a lowercased phrase, if any. Multi-word publishers
/// match as substrings; single-word ones must be a whole word.
pub fn publisher_in(phrase_lower: &str) -> Option<&'static str> {
    let words: Vec<&str> = phrase_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    PUBLISHERS.iter().copied().find(|p| {
        if p.contains(' ') {
            phrase_lower.contains(p)
        } else {
            words.contains(p)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_category_matches_whole_words_only() {
        assert!(GENERIC_CATEGORY_RE.is_match("The Administration"));
        assert!(GENERIC_CATEGORY_RE.is_match("Immigration Policy Shift"));
        assert!(!GENERIC_CATEGORY_RE.is_match("Police Chief Resigns"));
        assert!(!GENERIC_CATEGORY_RE.is_match("Newsom Signs Bill"));
    }

    #[test]
    fn publisher_detection() {
        assert_eq!(publisher_in("reuters reports strike"), Some("reuters"));
        assert_eq!(publisher_in("new york times layoffs"), Some("new york times"));
        assert_eq!(publisher_in("voxel startup raises"), None);
    }
}
