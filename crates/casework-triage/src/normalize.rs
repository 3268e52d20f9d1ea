//! Subject normalisation and the shared tokenizer.
//!
//! [`normalize`] strips a single leading reply/forward marker, trims, and
//! lower-cases. It is a single pass: `"Re: Re: Foo"` becomes `"re: foo"`, so
//! multiply-forwarded threads keep their inner markers.

use std::sync::LazyLock;

use regex::Regex;

static REPLY_MARKER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)^(re|fwd|fw):\s*").expect("reply marker regex")
});

static MARKUP_TAG: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"<[^>]*>").expect("markup tag regex"));

/// Words too common to say anything about what a message is about.
const STOP_WORDS: &[&str] = &[
  "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at",
  "be", "been", "but", "by", "can", "could", "dear", "do", "for", "from", "had",
  "has", "have", "he", "her", "his", "how", "if", "in", "into", "is", "it",
  "its", "me", "my", "no", "not", "of", "on", "or", "our", "please", "re",
  "regards", "she", "so", "than", "that", "the", "their", "them", "there",
  "they", "this", "to", "up", "us", "was", "we", "were", "what", "when",
  "which", "who", "will", "with", "would", "you", "your", "fw", "fwd",
];

/// Canonicalise a subject line for comparison.
///
/// `None` and `""` both normalise to `""`.
pub fn normalize(subject: Option<&str>) -> String {
  let Some(subject) = subject.filter(|s| !s.is_empty()) else {
    return String::new();
  };
  REPLY_MARKER.replace(subject, "").trim().to_lowercase()
}

/// Replace every `<...>` tag with a space. Bodies handed to the engine are
/// plain text or already sanitised HTML; this only makes markup invisible to
/// the tokenizer.
pub fn strip_markup(text: &str) -> String {
  MARKUP_TAG
    .replace_all(text, " ")
    .replace("&nbsp;", " ")
    .replace("&amp;", "&")
}

/// Collapse runs of whitespace to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
  text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cased alphanumeric runs of `text`, in order, including duplicates.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .map(str::to_lowercase)
}

/// Content-bearing tokens: [`words`] of at least two characters that are not
/// stop words.
pub fn tokenize(text: &str) -> Vec<String> {
  words(text)
    .filter(|w| w.chars().count() >= 2 && !STOP_WORDS.contains(&w.as_str()))
    .collect()
}
