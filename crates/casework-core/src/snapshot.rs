//! An in-memory [`TriageReader`] + [`TriageWriter`] over a serialisable
//! [`Snapshot`].
//!
//! This is not a persistence layer. It backs the `casework` command-line tool,
//! which loads and saves snapshots as JSON, and gives tests a synthetic pool
//! to run the engine against.

use std::{
  collections::BTreeSet,
  sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicUsize, Ordering},
  },
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  case::{Case, CaseParty},
  constituent::{Constituent, Contact},
  message::{Campaign, CampaignStatus, Message, MessageUpdate, NewCampaign},
  store::{TriageReader, TriageWriter},
  tag::{EntityRef, Tag, TagAssignment},
};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Every entity list the engine reads, as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
  pub messages:        Vec<Message>,
  pub campaigns:       Vec<Campaign>,
  pub constituents:    Vec<Constituent>,
  pub contacts:        Vec<Contact>,
  pub cases:           Vec<Case>,
  pub case_parties:    Vec<CaseParty>,
  pub tags:            Vec<Tag>,
  pub tag_assignments: Vec<TagAssignment>,
}

impl Snapshot {
  pub fn from_json(raw: &str) -> Result<Self> { Ok(serde_json::from_str(raw)?) }

  pub fn to_json_pretty(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn message(&self, id: Uuid) -> Option<&Message> {
    self.messages.iter().find(|m| m.message_id == id)
  }

  /// Current tag ids attached to `entity`.
  pub fn tags_of(&self, entity: EntityRef) -> BTreeSet<Uuid> {
    self
      .tag_assignments
      .iter()
      .filter(|a| a.entity == entity)
      .map(|a| a.tag_id)
      .collect()
  }
}

// ─── MemoryStore ─────────────────────────────────────────────────────────────

/// A [`Snapshot`] behind a mutex, implementing both storage contracts.
#[derive(Debug, Default)]
pub struct MemoryStore {
  snapshot:    Mutex<Snapshot>,
  /// Message ids whose writes fail with [`Error::InjectedFailure`].
  failing:     BTreeSet<Uuid>,
  write_calls: AtomicUsize,
}

impl MemoryStore {
  pub fn new(snapshot: Snapshot) -> Self {
    Self {
      snapshot:    Mutex::new(snapshot),
      failing:     BTreeSet::new(),
      write_calls: AtomicUsize::new(0),
    }
  }

  /// Make every write touching one of `ids` fail. Useful for exercising
  /// partial batch failures.
  pub fn with_failures(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
    self.failing.extend(ids);
    self
  }

  /// A copy of the current state.
  pub fn snapshot(&self) -> Snapshot { self.lock().clone() }

  /// Number of write calls made so far, successful or not.
  pub fn write_calls(&self) -> usize { self.write_calls.load(Ordering::SeqCst) }

  fn lock(&self) -> MutexGuard<'_, Snapshot> {
    self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn check_failure(&self, id: Uuid) -> Result<()> {
    self.write_calls.fetch_add(1, Ordering::SeqCst);
    if self.failing.contains(&id) {
      return Err(Error::InjectedFailure(id));
    }
    Ok(())
  }
}

// ─── TriageReader impl ───────────────────────────────────────────────────────

impl TriageReader for MemoryStore {
  type Error = Error;

  async fn list_messages(&self) -> Result<Vec<Message>> {
    Ok(self.lock().messages.clone())
  }

  async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
    Ok(self.lock().campaigns.clone())
  }

  async fn list_constituents(&self) -> Result<Vec<Constituent>> {
    Ok(self.lock().constituents.clone())
  }

  async fn list_contacts(&self) -> Result<Vec<Contact>> {
    Ok(self.lock().contacts.clone())
  }

  async fn list_cases(&self) -> Result<Vec<Case>> {
    Ok(self.lock().cases.clone())
  }

  async fn list_case_parties(&self) -> Result<Vec<CaseParty>> {
    Ok(self.lock().case_parties.clone())
  }

  async fn list_tags(&self) -> Result<Vec<Tag>> { Ok(self.lock().tags.clone()) }

  async fn list_tag_assignments(&self) -> Result<Vec<TagAssignment>> {
    Ok(self.lock().tag_assignments.clone())
  }
}

// ─── TriageWriter impl ───────────────────────────────────────────────────────

impl TriageWriter for MemoryStore {
  type Error = Error;

  async fn update_message(
    &self,
    id: Uuid,
    update: MessageUpdate,
  ) -> Result<Message> {
    self.check_failure(id)?;
    let mut snap = self.lock();

    if let Some(campaign_id) = update.campaign_id
      && !snap.campaigns.iter().any(|c| c.campaign_id == campaign_id)
    {
      return Err(Error::CampaignNotFound(campaign_id));
    }
    if let Some(case_id) = update.case_id
      && !snap.cases.iter().any(|c| c.case_id == case_id)
    {
      return Err(Error::CaseNotFound(case_id));
    }

    let message = snap
      .messages
      .iter_mut()
      .find(|m| m.message_id == id)
      .ok_or(Error::MessageNotFound(id))?;
    if update.campaign_id.is_some() {
      message.campaign_id = update.campaign_id;
    }
    if update.case_id.is_some() {
      message.case_id = update.case_id;
    }
    Ok(message.clone())
  }

  async fn create_campaign(&self, input: NewCampaign) -> Result<Campaign> {
    self.write_calls.fetch_add(1, Ordering::SeqCst);
    let mut snap = self.lock();

    // Retrying a create returns the campaign made by the first attempt.
    if let Some(existing) = snap.campaigns.iter().find(|c| {
      c.name == input.name && c.subject_pattern == input.subject_pattern
    }) {
      return Ok(existing.clone());
    }

    let campaign = Campaign {
      campaign_id:      Uuid::new_v4(),
      name:             input.name,
      status:           CampaignStatus::Active,
      subject_pattern:  input.subject_pattern,
      fingerprint_hash: input.fingerprint_hash,
      created_at:       Utc::now(),
    };
    snap.campaigns.push(campaign.clone());
    Ok(campaign)
  }

  async fn create_tag<'a>(&'a self, name: &'a str, color: &'a str) -> Result<Tag> {
    self.write_calls.fetch_add(1, Ordering::SeqCst);
    let name = name.trim();
    if name.is_empty() {
      return Err(Error::EmptyTagName);
    }

    let mut snap = self.lock();
    if let Some(existing) =
      snap.tags.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    {
      return Ok(existing.clone());
    }

    let tag = Tag {
      tag_id: Uuid::new_v4(),
      name:   name.to_owned(),
      color:  color.to_owned(),
    };
    snap.tags.push(tag.clone());
    Ok(tag)
  }

  async fn set_tag_membership(
    &self,
    entity: EntityRef,
    tag_ids: BTreeSet<Uuid>,
  ) -> Result<()> {
    self.check_failure(entity.id())?;
    let mut snap = self.lock();

    match entity {
      EntityRef::Message(id) => {
        if !snap.messages.iter().any(|m| m.message_id == id) {
          return Err(Error::MessageNotFound(id));
        }
      }
      EntityRef::Case(id) => {
        if !snap.cases.iter().any(|c| c.case_id == id) {
          return Err(Error::CaseNotFound(id));
        }
      }
    }
    if let Some(missing) = tag_ids
      .iter()
      .find(|id| !snap.tags.iter().any(|t| t.tag_id == **id))
    {
      return Err(Error::TagNotFound(*missing));
    }

    snap.tag_assignments.retain(|a| a.entity != entity);
    snap
      .tag_assignments
      .extend(tag_ids.into_iter().map(|tag_id| TagAssignment { entity, tag_id }));
    Ok(())
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;

  fn message(subject: &str) -> Message {
    let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    Message::new(Some(subject), "alice@example.com", ts)
  }

  fn case() -> Case {
    Case {
      case_id:     Uuid::new_v4(),
      title:       "Housing repairs".into(),
      description: None,
      reference:   "CW-0001".into(),
      status:      Default::default(),
      priority:    Default::default(),
      assignee_id: None,
      created_at:  Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
      updated_at:  None,
      closed_at:   None,
    }
  }

  #[tokio::test]
  async fn update_message_sets_only_given_pointers() {
    let m = message("Hello");
    let c = case();
    let store = MemoryStore::new(Snapshot {
      messages: vec![m.clone()],
      cases: vec![c.clone()],
      ..Default::default()
    });

    let updated = store
      .update_message(m.message_id, MessageUpdate::case(c.case_id))
      .await
      .unwrap();
    assert_eq!(updated.case_id, Some(c.case_id));
    assert_eq!(updated.campaign_id, None);
  }

  #[tokio::test]
  async fn update_message_unknown_case_errors() {
    let m = message("Hello");
    let store = MemoryStore::new(Snapshot {
      messages: vec![m.clone()],
      ..Default::default()
    });

    let err = store
      .update_message(m.message_id, MessageUpdate::case(Uuid::new_v4()))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::CaseNotFound(_)));
  }

  #[tokio::test]
  async fn injected_failure_is_reported_and_counted() {
    let m = message("Hello");
    let store = MemoryStore::new(Snapshot {
      messages: vec![m.clone()],
      ..Default::default()
    })
    .with_failures([m.message_id]);

    let err = store
      .set_tag_membership(EntityRef::Message(m.message_id), BTreeSet::new())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::InjectedFailure(id) if id == m.message_id));
    assert_eq!(store.write_calls(), 1);
  }

  #[tokio::test]
  async fn create_tag_is_retriable() {
    let store = MemoryStore::default();
    let first = store.create_tag("Housing", "#0969da").await.unwrap();
    let second = store.create_tag("housing", "#ff0000").await.unwrap();
    assert_eq!(first.tag_id, second.tag_id);
    assert_eq!(store.list_tags().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn create_tag_rejects_blank_name() {
    let store = MemoryStore::default();
    let err = store.create_tag("   ", "#000").await.unwrap_err();
    assert!(matches!(err, Error::EmptyTagName));
  }

  #[tokio::test]
  async fn set_tag_membership_replaces_previous_set() {
    let m = message("Hello");
    let store = MemoryStore::new(Snapshot {
      messages: vec![m.clone()],
      ..Default::default()
    });
    let a = store.create_tag("a", "#111").await.unwrap();
    let b = store.create_tag("b", "#222").await.unwrap();
    let entity = EntityRef::Message(m.message_id);

    store
      .set_tag_membership(entity, [a.tag_id, b.tag_id].into())
      .await
      .unwrap();
    store.set_tag_membership(entity, [b.tag_id].into()).await.unwrap();

    assert_eq!(store.snapshot().tags_of(entity), [b.tag_id].into());
  }

  #[test]
  fn snapshot_json_roundtrip_defaults_missing_lists() {
    let snap = Snapshot::from_json(r#"{ "tags": [] }"#).unwrap();
    assert!(snap.messages.is_empty());
    assert!(snap.case_parties.is_empty());
  }
}
