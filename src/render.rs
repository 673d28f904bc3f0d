//! Message clean-up for terminal display
//!
//! Model replies carry tool chatter, table pipes and stray escapes. Before a
//! reply is printed it is cut down to the part worth reading and flattened
//! into short paragraphs.

use regex::Regex;
use std::sync::LazyLock;

/// Phrases that open the part of a reply worth showing, checked in order.
const RELEVANT_MARKERS: [&str; 4] = [
    "Based on my research",
    "The chart shows",
    "Successfully created",
    "FINAL ANSWER",
];

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\d+\.\s").expect("numbered item pattern"));

static DASH_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-\s").expect("dash item pattern"));

/// Strip a reply down to its relevant, printable text.
///
/// Starts at the first marker found (markers tried in order), drops non-ASCII
/// characters, table pipes and `undefined`, unescapes literal `\n`, then
/// collapses all whitespace runs into single spaces.
pub fn clean_content(text: &str) -> String {
    let text = RELEVANT_MARKERS
        .iter()
        .find_map(|marker| text.find(marker).map(|index| &text[index..]))
        .unwrap_or(text);

    let text: String = text.chars().filter(char::is_ascii).collect();
    let text = text
        .replace("\\n", "\n")
        .replace('|', "")
        .replace("undefined", "");

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean a reply and lay it out as bullet-friendly paragraphs.
pub fn format_message(content: &str) -> String {
    let content = clean_content(content);
    let content = NUMBERED_ITEM.replace_all(&content, "• ");
    let content = DASH_ITEM.replace_all(&content, "• ");

    content
        .split('\n')
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
