//! The storage collaborator contracts: [`TriageReader`] and [`TriageWriter`].
//!
//! The surrounding application implements these against its own data client.
//! The triage engine depends on this abstraction only; it never opens a
//! connection of its own.

use std::{collections::BTreeSet, future::Future};

use uuid::Uuid;

use crate::{
  case::{Case, CaseParty},
  constituent::{Constituent, Contact},
  message::{Campaign, Message, MessageUpdate, NewCampaign},
  tag::{EntityRef, Tag, TagAssignment},
};

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Read access to the entity lists a triage decision is computed over.
///
/// Implementations need only return snapshots that are recent enough for a
/// single decision; no transactional isolation across calls is expected.
pub trait TriageReader: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn list_messages(
    &self,
  ) -> impl Future<Output = Result<Vec<Message>, Self::Error>> + Send + '_;

  fn list_campaigns(
    &self,
  ) -> impl Future<Output = Result<Vec<Campaign>, Self::Error>> + Send + '_;

  fn list_constituents(
    &self,
  ) -> impl Future<Output = Result<Vec<Constituent>, Self::Error>> + Send + '_;

  fn list_contacts(
    &self,
  ) -> impl Future<Output = Result<Vec<Contact>, Self::Error>> + Send + '_;

  fn list_cases(
    &self,
  ) -> impl Future<Output = Result<Vec<Case>, Self::Error>> + Send + '_;

  fn list_case_parties(
    &self,
  ) -> impl Future<Output = Result<Vec<CaseParty>, Self::Error>> + Send + '_;

  fn list_tags(
    &self,
  ) -> impl Future<Output = Result<Vec<Tag>, Self::Error>> + Send + '_;

  fn list_tag_assignments(
    &self,
  ) -> impl Future<Output = Result<Vec<TagAssignment>, Self::Error>> + Send + '_;
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// Write access used when a confirmed decision is committed.
///
/// Every method must be independently retriable: calling it twice with the
/// same arguments leaves storage in the same state as calling it once. The
/// bulk commit coordinator relies on this to make re-running a partially
/// failed batch safe.
pub trait TriageWriter: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Set the non-`None` pointers in `update` on message `id` and return the
  /// updated row.
  fn update_message(
    &self,
    id: Uuid,
    update: MessageUpdate,
  ) -> impl Future<Output = Result<Message, Self::Error>> + Send + '_;

  /// Create and persist a campaign.
  fn create_campaign(
    &self,
    input: NewCampaign,
  ) -> impl Future<Output = Result<Campaign, Self::Error>> + Send + '_;

  /// Create and persist a tag.
  fn create_tag<'a>(
    &'a self,
    name: &'a str,
    color: &'a str,
  ) -> impl Future<Output = Result<Tag, Self::Error>> + Send + 'a;

  /// Replace the tag membership of `entity` with exactly `tag_ids`.
  fn set_tag_membership(
    &self,
    entity: EntityRef,
    tag_ids: BTreeSet<Uuid>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
