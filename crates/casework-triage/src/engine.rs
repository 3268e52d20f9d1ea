//! The engine facade: configured components plus a loaded entity pool.

use std::{collections::BTreeSet, sync::Arc};

use casework_core::{
  case::{Case, CaseParty},
  constituent::{Constituent, Contact},
  message::{Campaign, Message},
  snapshot::Snapshot,
  store::{TriageReader, TriageWriter},
  tag::{EntityRef, Tag, TagAssignment},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  bulk::BulkCommit,
  commit::{self, Decision, DecisionOutcome},
  config::{BulkConfig, TriageConfig},
  extract::{ExtractedContact, extract_contact_fields},
  fingerprint::{effective_fingerprint, find_siblings, match_campaign},
  normalize::normalize,
  resolve::{ConstituentMatch, ConstituentResolver, Sender},
  suggest::{CaseLinkSuggester, CaseSuggestion},
};

// ─── Context ─────────────────────────────────────────────────────────────────

/// Every entity list a decision is computed over, read once up front.
#[derive(Debug, Clone, Default)]
pub struct TriageContext {
  pub messages:        Vec<Message>,
  pub campaigns:       Vec<Campaign>,
  pub constituents:    Vec<Constituent>,
  pub contacts:        Vec<Contact>,
  pub cases:           Vec<Case>,
  pub case_parties:    Vec<CaseParty>,
  pub tags:            Vec<Tag>,
  pub tag_assignments: Vec<TagAssignment>,
}

impl TriageContext {
  pub async fn load<R: TriageReader>(reader: &R) -> Result<Self> {
    Ok(Self {
      messages:        reader.list_messages().await.map_err(Error::store)?,
      campaigns:       reader.list_campaigns().await.map_err(Error::store)?,
      constituents:    reader.list_constituents().await.map_err(Error::store)?,
      contacts:        reader.list_contacts().await.map_err(Error::store)?,
      cases:           reader.list_cases().await.map_err(Error::store)?,
      case_parties:    reader.list_case_parties().await.map_err(Error::store)?,
      tags:            reader.list_tags().await.map_err(Error::store)?,
      tag_assignments: reader
        .list_tag_assignments()
        .await
        .map_err(Error::store)?,
    })
  }

  pub fn message(&self, id: Uuid) -> Result<&Message> {
    self
      .messages
      .iter()
      .find(|m| m.message_id == id)
      .ok_or(Error::MessageNotFound(id))
  }

  pub fn constituent(&self, id: Uuid) -> Option<&Constituent> {
    self.constituents.iter().find(|c| c.constituent_id == id)
  }

  pub fn tags_of(&self, entity: EntityRef) -> BTreeSet<Uuid> {
    self
      .tag_assignments
      .iter()
      .filter(|a| a.entity == entity)
      .map(|a| a.tag_id)
      .collect()
  }
}

impl From<Snapshot> for TriageContext {
  fn from(s: Snapshot) -> Self {
    Self {
      messages:        s.messages,
      campaigns:       s.campaigns,
      constituents:    s.constituents,
      contacts:        s.contacts,
      cases:           s.cases,
      case_parties:    s.case_parties,
      tags:            s.tags,
      tag_assignments: s.tag_assignments,
    }
  }
}

// ─── Preview ─────────────────────────────────────────────────────────────────

/// Everything the triage screen shows for one message before anything is
/// committed.
#[derive(Debug, Clone, Serialize)]
pub struct TriagePreview<'a> {
  pub message_id:         Uuid,
  pub normalized_subject: String,
  pub fingerprint:        Option<String>,
  pub campaign:           Option<&'a Campaign>,
  pub siblings:           Vec<&'a Message>,
  pub extracted:          ExtractedContact,
  pub constituent:        ConstituentMatch,
  pub cases:              CaseSuggestion,
  pub tags:               BTreeSet<Uuid>,
}

impl TriagePreview<'_> {
  /// The message followed by its siblings.
  pub fn targets(&self) -> Vec<Uuid> {
    commit::decision_targets(self.message_id, self.siblings.iter().copied())
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TriageEngine {
  resolver:  ConstituentResolver,
  suggester: CaseLinkSuggester,
  bulk:      BulkConfig,
}

impl TriageEngine {
  pub fn new(config: TriageConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      resolver:  ConstituentResolver::new(config.resolver)?,
      suggester: CaseLinkSuggester::new(config.suggester)?,
      bulk:      config.bulk,
    })
  }

  pub fn resolver(&self) -> &ConstituentResolver { &self.resolver }

  pub fn suggester(&self) -> &CaseLinkSuggester { &self.suggester }

  /// Resolve the sender of message `id`.
  pub fn resolve(
    &self,
    ctx: &TriageContext,
    id: Uuid,
  ) -> Result<(ExtractedContact, ConstituentMatch)> {
    let message = ctx.message(id)?;
    let extracted = extract_contact_fields(message);
    let resolved = self.resolver.resolve(
      &Sender::of(message),
      &extracted,
      &ctx.constituents,
      &ctx.contacts,
    )?;
    Ok((extracted, resolved))
  }

  /// Suggest cases for message `id`, restricted to `constituent`'s cases
  /// when given.
  pub fn suggest(
    &self,
    ctx: &TriageContext,
    id: Uuid,
    constituent: Option<Uuid>,
    now: DateTime<Utc>,
  ) -> Result<CaseSuggestion> {
    let message = ctx.message(id)?;
    let constituent = constituent.and_then(|c| ctx.constituent(c));
    Ok(self.suggester.suggest(
      constituent,
      message,
      &ctx.cases,
      &ctx.case_parties,
      now,
    ))
  }

  /// Compute the full triage preview for message `id`.
  ///
  /// Case suggestions are narrowed to the sender's cases only when the
  /// sender resolved exactly.
  pub fn preview<'a>(
    &self,
    ctx: &'a TriageContext,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<TriagePreview<'a>> {
    let message = ctx.message(id)?;
    let campaign = match_campaign(message, &ctx.campaigns);
    let siblings = find_siblings(
      message,
      &ctx.messages,
      campaign.map(|c| c.campaign_id).or(message.campaign_id),
    );
    let (extracted, constituent) = self.resolve(ctx, id)?;
    let cases = self.suggest(ctx, id, constituent.confirmed(), now)?;

    debug!(
      message_id = %id,
      siblings = siblings.len(),
      campaign = ?campaign.map(|c| c.campaign_id),
      constituent = %constituent.status(),
      primary_case = ?cases.primary.as_ref().map(|c| c.case_id),
      "triage preview"
    );

    Ok(TriagePreview {
      message_id: id,
      normalized_subject: normalize(message.subject.as_deref()),
      fingerprint: effective_fingerprint(message),
      campaign,
      siblings,
      extracted,
      constituent,
      cases,
      tags: ctx.tags_of(EntityRef::Message(id)),
    })
  }

  /// Commit `decision` across `targets` with the configured concurrency.
  pub async fn commit<W>(
    &self,
    writer: &Arc<W>,
    targets: &[Uuid],
    decision: &Decision,
    bulk: &BulkCommit,
  ) -> Result<DecisionOutcome<W::Error>>
  where
    W: TriageWriter + 'static,
  {
    commit::commit_decision(writer, targets, decision, &self.bulk, bulk).await
  }

  /// Create a campaign from message `representative` and assign `targets`.
  pub async fn create_campaign<W>(
    &self,
    writer: &Arc<W>,
    ctx: &TriageContext,
    representative: Uuid,
    name: &str,
    targets: &[Uuid],
    bulk: &BulkCommit,
  ) -> Result<(Campaign, DecisionOutcome<W::Error>)>
  where
    W: TriageWriter + 'static,
  {
    let message = ctx.message(representative)?;
    commit::create_campaign_and_assign(
      writer, message, name, targets, &self.bulk, bulk,
    )
    .await
  }
}
