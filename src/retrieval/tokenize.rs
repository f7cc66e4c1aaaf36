use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Common English stop words; they add noise and don't help with retrieval.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with",
    "by", "from", "as", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "do", "does", "did", "will", "would", "should", "could", "what",
    "which", "who", "where", "when", "why", "how", "this", "that", "these", "those",
];

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("Invalid regex pattern"))
}

fn stop_words() -> &'static HashSet<&'static str> {
    static STOP: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOP.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Split text into lowercase alphanumeric tokens, dropping stop words and
/// tokens shorter than 2 characters. Order and duplicates are preserved.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| t.len() >= 2 && !stop_words().contains(t))
        .map(str::to_string)
        .collect()
}

/// Distinct tokens of `text`.
pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}
