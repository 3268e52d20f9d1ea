//! Contact fields scraped from a message's headers and body.
//!
//! The result pre-fills the "create constituent" form when no existing
//! constituent matches, and supplies the address signal for fuzzy matching.

use std::sync::LazyLock;

use casework_core::message::Message;
use regex::Regex;
use serde::Serialize;

use crate::normalize::collapse_whitespace;

static POSTCODE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)\b([A-Z]{1,2}[0-9][A-Z0-9]?)\s*([0-9][A-Z]{2})\b")
    .expect("postcode regex")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?:\+\d{1,3}[\s-]?)?\(?\d[\d\s()-]{7,}\d").expect("phone regex")
});

static LINE_BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>").expect("line break regex")
});

static ANY_TAG: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// How many lines above a postcode-only line are taken as the address.
const ADDRESS_LOOKBACK: usize = 3;

/// Whatever contact details could be recovered from a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedContact {
  pub name:     Option<String>,
  pub email:    Option<String>,
  pub postcode: Option<String>,
  pub address:  Option<String>,
  pub phone:    Option<String>,
}

impl ExtractedContact {
  pub fn is_empty(&self) -> bool { self == &Self::default() }
}

/// Scrape contact fields from `message`.
pub fn extract_contact_fields(message: &Message) -> ExtractedContact {
  let email = Some(message.sender_email.trim().to_lowercase())
    .filter(|e| !e.is_empty());
  let name = message
    .sender_name
    .as_deref()
    .map(|n| collapse_whitespace(n.trim_matches(|c: char| c == '"' || c == '\'')))
    .filter(|n| !n.is_empty() && !n.contains('@'))
    .or_else(|| email.as_deref().and_then(name_from_email));

  let lines = message.body.as_deref().map(body_lines).unwrap_or_default();
  let (postcode, address) = find_address(&lines);
  let phone = lines.iter().find_map(|line| find_phone(line));

  ExtractedContact { name, email, postcode, address, phone }
}

/// Canonical postcode form: upper-case, one space before the inward code.
/// Returns `None` if `text` contains no postcode.
pub fn normalize_postcode(text: &str) -> Option<String> {
  let caps = POSTCODE.captures(text)?;
  Some(format!(
    "{} {}",
    caps[1].to_uppercase(),
    caps[2].to_uppercase()
  ))
}

/// `jane.smith@example.com` → `Jane Smith`. Needs at least two name parts so
/// role mailboxes like `info@` do not become names.
fn name_from_email(email: &str) -> Option<String> {
  let local = email.split('@').next()?;
  let parts: Vec<String> = local
    .split(['.', '_', '-'])
    .filter(|p| p.len() >= 2 && p.chars().all(char::is_alphabetic))
    .map(capitalise)
    .collect();
  (parts.len() >= 2).then(|| parts.join(" "))
}

fn capitalise(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => {
      first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
    }
    None => String::new(),
  }
}

/// Markup-free, whitespace-collapsed, non-empty body lines.
fn body_lines(body: &str) -> Vec<String> {
  let text = LINE_BREAK_TAG.replace_all(body, "\n");
  let text = ANY_TAG.replace_all(&text, " ").replace("&nbsp;", " ");
  text
    .lines()
    .map(collapse_whitespace)
    .filter(|l| !l.is_empty())
    .collect()
}

fn find_address(lines: &[String]) -> (Option<String>, Option<String>) {
  let Some((index, postcode)) = lines
    .iter()
    .enumerate()
    .find_map(|(i, line)| normalize_postcode(line).map(|pc| (i, pc)))
  else {
    return (None, None);
  };

  let line = lines[index].trim_end_matches([',', '.']).to_string();
  let postcode_only = normalize_postcode(&line)
    .is_some_and(|pc| pc.replace(' ', "") == line.replace(' ', "").to_uppercase());

  let address = if postcode_only {
    let start = index.saturating_sub(ADDRESS_LOOKBACK);
    lines[start..=index]
      .iter()
      .map(|l| l.trim_end_matches(',').to_string())
      .collect::<Vec<_>>()
      .join(", ")
  } else {
    line
  };

  (Some(postcode), Some(address))
}

fn find_phone(line: &str) -> Option<String> {
  PHONE.find_iter(line).find_map(|m| {
    let digits = m.as_str().chars().filter(char::is_ascii_digit).count();
    (10..=13).contains(&digits).then(|| collapse_whitespace(m.as_str()))
  })
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;

  fn message(name: Option<&str>, email: &str, body: &str) -> Message {
    let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut m = Message::new(Some("Help"), email, ts);
    m.sender_name = name.map(str::to_owned);
    m.body = Some(body.to_owned());
    m
  }

  #[test]
  fn postcode_is_canonicalised() {
    assert_eq!(normalize_postcode("sw1a1aa").as_deref(), Some("SW1A 1AA"));
    assert_eq!(normalize_postcode("at M1  4BT!").as_deref(), Some("M1 4BT"));
    assert_eq!(normalize_postcode("no postcode here"), None);
  }

  #[test]
  fn inline_address_line_is_taken_whole() {
    let m = message(
      Some("Jane Smith"),
      "Jane@Example.com",
      "Dear MP,\nI live at 12 Elm Road, Leeds LS6 2AB.\nThanks",
    );
    let got = extract_contact_fields(&m);
    assert_eq!(got.name.as_deref(), Some("Jane Smith"));
    assert_eq!(got.email.as_deref(), Some("jane@example.com"));
    assert_eq!(got.postcode.as_deref(), Some("LS6 2AB"));
    assert_eq!(got.address.as_deref(), Some("I live at 12 Elm Road, Leeds LS6 2AB"));
  }

  #[test]
  fn signature_block_address_spans_lines() {
    let m = message(
      None,
      "resident@example.com",
      "<p>Please help.</p><p>Jo Bloggs<br>4 Mill Lane<br>Otley<br>LS21 1AA</p>",
    );
    let got = extract_contact_fields(&m);
    assert_eq!(got.postcode.as_deref(), Some("LS21 1AA"));
    assert_eq!(
      got.address.as_deref(),
      Some("Jo Bloggs, 4 Mill Lane, Otley, LS21 1AA")
    );
  }

  #[test]
  fn name_falls_back_to_email_local_part() {
    let m = message(None, "jane.smith@example.com", "");
    assert_eq!(extract_contact_fields(&m).name.as_deref(), Some("Jane Smith"));

    let m = message(None, "info@example.com", "");
    assert_eq!(extract_contact_fields(&m).name, None);
  }

  #[test]
  fn quoted_display_name_is_unwrapped() {
    let m = message(Some("\"Ann  Lee\""), "a@example.com", "");
    assert_eq!(extract_contact_fields(&m).name.as_deref(), Some("Ann Lee"));
  }

  #[test]
  fn phone_number_is_found() {
    let m = message(None, "a@example.com", "Call me on 0113 496 0000 any time");
    assert_eq!(
      extract_contact_fields(&m).phone.as_deref(),
      Some("0113 496 0000")
    );
  }

  #[test]
  fn empty_message_yields_only_email() {
    let m = message(None, "x@example.com", "");
    let got = extract_contact_fields(&m);
    assert_eq!(got.email.as_deref(), Some("x@example.com"));
    assert!(got.postcode.is_none() && got.address.is_none() && got.phone.is_none());
  }
}
