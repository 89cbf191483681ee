//! Stage 2: assign exactly one [`Class`] to a sanitised body.
//!
//! Priority order (first match wins), per spec:
//! search-patterns → JSON-dominant → table-present → code-dominant →
//! schedule-terms → error-patterns → list (≥4 items) → multiple types →
//! conversational default.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Conversational,
    DataTable,
    Code,
    SearchResults,
    NewsResults,
    ImageResults,
    LocalResults,
    List,
    Schedule,
    Error,
    Mixed,
    LongRunningAck,
    Proactive,
}

const SEARCH_NEEDLES: &[&str] = &["search results", "web_search", "top results for"];
const NEWS_NEEDLES: &[&str] = &["breaking:", "published", "according to reuters", "news results"];
const LOCAL_NEEDLES: &[&str] = &["nearby", "miles away", "opening hours", "directions to"];
const IMAGE_NEEDLES: &[&str] = &["image results", ".png", ".jpg", ".jpeg", ".webp"];
const SCHEDULE_NEEDLES: &[&str] = &["next run", "scheduled for", "cron", "every day at"];
const ERROR_NEEDLES: &[&str] = &["error:", "failed to", "exception", "traceback"];
const LONG_RUNNING_NEEDLES: &[&str] = &["still working on", "this may take a while", "i'll follow up"];
const PROACTIVE_NEEDLES: &[&str] = &["reminder:", "heads up:", "just a heads-up"];

fn contains_any(lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| lower.contains(n))
}

fn has_fenced_code(text: &str) -> bool {
    text.matches("```").count() >= 2
}

fn has_pipe_table(text: &str) -> bool {
    text.lines()
        .filter(|l| l.trim_start().starts_with('|') && l.matches('|').count() >= 2)
        .count()
        >= 2
}

fn json_dominant(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }
    let looks_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    looks_json && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

fn list_item_count(text: &str) -> usize {
    text.lines()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with("- ") || t.starts_with("* ") || starts_with_numbered(t)
        })
        .count()
}

fn starts_with_numbered(t: &str) -> bool {
    let mut chars = t.chars();
    let mut saw_digit = false;
    for c in chars.by_ref() {
        if c.is_ascii_digit() {
            saw_digit = true;
            continue;
        }
        return saw_digit && (c == '.' || c == ')');
    }
    false
}

pub fn classify(text: &str) -> Class {
    let lower = text.to_lowercase();

    if contains_any(&lower, SEARCH_NEEDLES) {
        return Class::SearchResults;
    }
    if contains_any(&lower, NEWS_NEEDLES) {
        return Class::NewsResults;
    }
    if contains_any(&lower, LOCAL_NEEDLES) {
        return Class::LocalResults;
    }
    if contains_any(&lower, IMAGE_NEEDLES) {
        return Class::ImageResults;
    }
    if json_dominant(text) {
        return Class::DataTable;
    }
    if has_pipe_table(text) {
        return Class::DataTable;
    }
    if has_fenced_code(text) {
        return Class::Code;
    }
    if contains_any(&lower, SCHEDULE_NEEDLES) {
        return Class::Schedule;
    }
    if contains_any(&lower, ERROR_NEEDLES) {
        return Class::Error;
    }
    if list_item_count(text) >= 4 {
        return Class::List;
    }
    if contains_any(&lower, LONG_RUNNING_NEEDLES) {
        return Class::LongRunningAck;
    }
    if contains_any(&lower, PROACTIVE_NEEDLES) {
        return Class::Proactive;
    }

    let signal_count = [has_fenced_code(text), has_pipe_table(text), list_item_count(text) >= 4]
        .iter()
        .filter(|b| **b)
        .count();
    if signal_count >= 2 {
        return Class::Mixed;
    }

    Class::Conversational
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prose_is_conversational() {
        assert_eq!(classify("Your meeting is at 3pm today."), Class::Conversational);
    }

    #[test]
    fn pipe_table_classifies_as_data_table() {
        let input = "| a | b |\n| - | - |\n| 1 | 2 |";
        assert_eq!(classify(input), Class::DataTable);
    }

    #[test]
    fn fenced_code_classifies_as_code() {
        let input = "Here:\n```rust\nfn main() {}\n```";
        assert_eq!(classify(input), Class::Code);
    }

    #[test]
    fn search_needle_takes_priority_over_table() {
        let input = "Search results for cats:\n| a | b |\n| - | - |";
        assert_eq!(classify(input), Class::SearchResults);
    }

    #[test]
    fn four_or_more_bullets_is_list() {
        let input = "- one\n- two\n- three\n- four";
        assert_eq!(classify(input), Class::List);
    }

    #[test]
    fn error_needle_detected() {
        assert_eq!(classify("Error: failed to fetch calendar"), Class::Error);
    }
}
