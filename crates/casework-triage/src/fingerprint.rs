//! Campaign detection: message fingerprints and sibling lookup.
//!
//! A campaign is a mass-mail action. Its submissions arrive as many messages
//! with the same subject (modulo a reply marker) and usually the same body.

use std::{cmp::Reverse, collections::BTreeMap};

use casework_core::message::{Campaign, Message};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::normalize::{collapse_whitespace, normalize, strip_markup};

// ─── Fingerprint ─────────────────────────────────────────────────────────────

/// A stable hex SHA-256 over the normalised subject and the canonical body.
///
/// The body is canonicalised by removing markup, collapsing whitespace and
/// lower-casing. Returns `None` when the message has neither subject nor body
/// text.
pub fn fingerprint(message: &Message) -> Option<String> {
  let subject = normalize(message.subject.as_deref());
  let body = message
    .body
    .as_deref()
    .map(|b| collapse_whitespace(&strip_markup(b)).to_lowercase())
    .unwrap_or_default();

  if subject.is_empty() && body.is_empty() {
    return None;
  }

  let mut hasher = Sha256::new();
  hasher.update(subject.as_bytes());
  hasher.update([0u8]);
  hasher.update(body.as_bytes());
  Some(hex::encode(hasher.finalize()))
}

/// The recorded fingerprint if ingestion stored one, otherwise a freshly
/// computed one.
pub fn effective_fingerprint(message: &Message) -> Option<String> {
  message
    .fingerprint_hash
    .clone()
    .filter(|h| !h.is_empty())
    .or_else(|| fingerprint(message))
}

// ─── Siblings ────────────────────────────────────────────────────────────────

/// Messages in `pool` that belong with `target` in the same campaign.
///
/// A candidate matches when it is a different message, is not already
/// assigned to `campaign_id` (when one is given), and its normalised subject
/// equals the target's. An empty normalised subject never matches anything.
/// Pool order is preserved.
pub fn find_siblings<'a>(
  target: &Message,
  pool: &'a [Message],
  campaign_id: Option<Uuid>,
) -> Vec<&'a Message> {
  let key = normalize(target.subject.as_deref());
  if key.is_empty() {
    return Vec::new();
  }

  pool
    .iter()
    .filter(|m| m.message_id != target.message_id)
    .filter(|m| campaign_id.is_none() || m.campaign_id != campaign_id)
    .filter(|m| normalize(m.subject.as_deref()) == key)
    .collect()
}

// ─── Existing campaigns ──────────────────────────────────────────────────────

/// The active campaign `message` most plausibly belongs to.
///
/// Fingerprint matches take precedence over subject-pattern matches. Within
/// each kind, the oldest campaign wins (ties by id).
pub fn match_campaign<'a>(
  message: &Message,
  campaigns: &'a [Campaign],
) -> Option<&'a Campaign> {
  let mut active: Vec<&Campaign> =
    campaigns.iter().filter(|c| c.is_active()).collect();
  active.sort_by_key(|c| (c.created_at, c.campaign_id));

  if let Some(hash) = effective_fingerprint(message)
    && let Some(hit) = active
      .iter()
      .find(|c| c.fingerprint_hash.as_deref() == Some(hash.as_str()))
  {
    return Some(*hit);
  }

  let key = normalize(message.subject.as_deref());
  if key.is_empty() {
    return None;
  }
  active
    .into_iter()
    .find(|c| normalize(c.subject_pattern.as_deref()) == key)
}

/// Unassigned messages sharing one normalised subject.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectGroup<'a> {
  pub normalized_subject: String,
  pub messages:           Vec<&'a Message>,
}

/// Group unassigned messages in `pool` by normalised subject, keeping only
/// groups of two or more. Largest groups come first; equal sizes are ordered
/// by subject. Members keep pool order.
pub fn group_campaign_candidates(pool: &[Message]) -> Vec<SubjectGroup<'_>> {
  let mut buckets: BTreeMap<String, Vec<&Message>> = BTreeMap::new();
  for message in pool.iter().filter(|m| m.campaign_id.is_none()) {
    let key = normalize(message.subject.as_deref());
    if !key.is_empty() {
      buckets.entry(key).or_default().push(message);
    }
  }

  let mut groups: Vec<SubjectGroup<'_>> = buckets
    .into_iter()
    .filter(|(_, members)| members.len() >= 2)
    .map(|(normalized_subject, messages)| SubjectGroup {
      normalized_subject,
      messages,
    })
    .collect();
  groups.sort_by_key(|g| Reverse(g.messages.len()));
  groups
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone, Utc};
  use casework_core::message::CampaignStatus;

  use super::*;

  fn msg(subject: Option<&str>) -> Message {
    let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    Message::new(subject, "someone@example.com", ts)
  }

  fn campaign(pattern: Option<&str>, hash: Option<String>) -> Campaign {
    Campaign {
      campaign_id:      Uuid::new_v4(),
      name:             "Library closures".into(),
      status:           CampaignStatus::Active,
      subject_pattern:  pattern.map(str::to_owned),
      fingerprint_hash: hash,
      created_at:       Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
    }
  }

  #[test]
  fn reply_of_same_subject_is_a_sibling() {
    let a = msg(Some("Save Our Library"));
    let b = msg(Some("RE: save our library"));
    let pool = vec![a.clone(), b.clone()];

    let siblings = find_siblings(&a, &pool, None);
    assert_eq!(siblings.len(), 1);
    assert_eq!(siblings[0].message_id, b.message_id);
  }

  #[test]
  fn different_subjects_are_not_siblings() {
    let a = msg(Some("A"));
    let b = msg(Some("B"));
    let pool = vec![a.clone(), b];
    assert!(find_siblings(&a, &pool, None).is_empty());
  }

  #[test]
  fn blank_subjects_never_cluster() {
    let a = msg(None);
    let b = msg(Some(""));
    let c = msg(Some("  "));
    let pool = vec![a.clone(), b, c];
    assert!(find_siblings(&a, &pool, None).is_empty());
  }

  #[test]
  fn already_grouped_messages_are_skipped() {
    let campaign_id = Uuid::new_v4();
    let target = msg(Some("Bus route 42"));
    let mut grouped = msg(Some("Bus route 42"));
    grouped.campaign_id = Some(campaign_id);
    let loose = msg(Some("bus route 42"));
    let pool = vec![grouped.clone(), target.clone(), loose.clone()];

    let ids: Vec<Uuid> = find_siblings(&target, &pool, Some(campaign_id))
      .iter()
      .map(|m| m.message_id)
      .collect();
    assert_eq!(ids, vec![loose.message_id]);

    // Without a target campaign, the grouped message still counts.
    assert_eq!(find_siblings(&target, &pool, None).len(), 2);
  }

  #[test]
  fn siblings_keep_pool_order() {
    let target = msg(Some("Speeding on Mill Lane"));
    let pool: Vec<Message> = (0..5)
      .map(|_| msg(Some("Re: speeding on mill lane")))
      .chain([target.clone()])
      .collect();

    let got: Vec<Uuid> = find_siblings(&target, &pool, None)
      .iter()
      .map(|m| m.message_id)
      .collect();
    let want: Vec<Uuid> = pool[..5].iter().map(|m| m.message_id).collect();
    assert_eq!(got, want);
  }

  #[test]
  fn fingerprint_ignores_markup_case_and_reply_marker() {
    let mut a = msg(Some("Save Our Library"));
    a.body = Some("<p>Please   keep it OPEN</p>".into());
    let mut b = msg(Some("Re: save our library"));
    b.body = Some("please keep it open".into());
    assert_eq!(fingerprint(&a), fingerprint(&b));
    assert_eq!(fingerprint(&a).unwrap().len(), 64);
  }

  #[test]
  fn fingerprint_absent_for_empty_message() {
    assert_eq!(fingerprint(&msg(None)), None);
  }

  #[test]
  fn stored_fingerprint_wins_over_computed() {
    let mut m = msg(Some("Anything"));
    m.fingerprint_hash = Some("abc123".into());
    assert_eq!(effective_fingerprint(&m).as_deref(), Some("abc123"));
  }

  #[test]
  fn match_campaign_prefers_fingerprint() {
    let mut m = msg(Some("Save Our Library"));
    m.body = Some("keep it open".into());
    let by_pattern = campaign(Some("save our library"), None);
    let mut by_hash = campaign(None, fingerprint(&m));
    by_hash.created_at = by_pattern.created_at + Duration::days(10);
    let campaigns = vec![by_pattern, by_hash.clone()];

    let hit = match_campaign(&m, &campaigns).unwrap();
    assert_eq!(hit.campaign_id, by_hash.campaign_id);
  }

  #[test]
  fn match_campaign_skips_inactive() {
    let m = msg(Some("Save Our Library"));
    let mut c = campaign(Some("Save our library"), None);
    c.status = CampaignStatus::Inactive;
    assert!(match_campaign(&m, &[c]).is_none());
  }

  #[test]
  fn groups_are_sorted_by_size() {
    let pool = vec![
      msg(Some("Potholes")),
      msg(Some("Library")),
      msg(Some("Re: Library")),
      msg(Some("Potholes")),
      msg(Some("library")),
      msg(Some("Lonely")),
      msg(None),
      msg(None),
    ];
    let groups = group_campaign_candidates(&pool);
    let summary: Vec<(&str, usize)> = groups
      .iter()
      .map(|g| (g.normalized_subject.as_str(), g.messages.len()))
      .collect();
    assert_eq!(summary, vec![("library", 3), ("potholes", 2)]);
  }
}
