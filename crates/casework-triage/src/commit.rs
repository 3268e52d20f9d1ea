//! Committing a confirmed triage decision through a [`TriageWriter`].
//!
//! A decision is split into [`Mutation`]s and each one is applied across the
//! target messages by the bulk coordinator. Every mutation is a set operation
//! (assign, link, replace membership), so re-running a decision is safe.

use std::{collections::BTreeSet, sync::Arc};

use casework_core::{
  message::{Campaign, Message, MessageUpdate, NewCampaign},
  store::TriageWriter,
  tag::EntityRef,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  bulk::{BatchResult, BulkCommit},
  config::BulkConfig,
  fingerprint::effective_fingerprint,
  normalize::normalize,
};

/// One write applied to every target message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Mutation {
  AssignCampaign(Uuid),
  LinkCase(Uuid),
  /// Replace the message's tags with exactly this set.
  SetTags(BTreeSet<Uuid>),
}

/// What the caseworker confirmed for a message and its siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Decision {
  pub campaign_id: Option<Uuid>,
  pub case_id:     Option<Uuid>,
  pub tags:        Option<BTreeSet<Uuid>>,
}

impl Decision {
  pub fn mutations(&self) -> Vec<Mutation> {
    let mut out = Vec::new();
    if let Some(id) = self.campaign_id {
      out.push(Mutation::AssignCampaign(id));
    }
    if let Some(id) = self.case_id {
      out.push(Mutation::LinkCase(id));
    }
    if let Some(tags) = &self.tags {
      out.push(Mutation::SetTags(tags.clone()));
    }
    out
  }
}

/// The primary message followed by its siblings, without duplicates.
pub fn decision_targets<'a>(
  primary: Uuid,
  siblings: impl IntoIterator<Item = &'a Message>,
) -> Vec<Uuid> {
  let mut seen = BTreeSet::from([primary]);
  let mut targets = vec![primary];
  for sibling in siblings {
    if seen.insert(sibling.message_id) {
      targets.push(sibling.message_id);
    }
  }
  targets
}

/// Apply a single mutation to message `id`.
pub async fn apply_mutation<W: TriageWriter>(
  writer: &W,
  id: Uuid,
  mutation: &Mutation,
) -> Result<(), W::Error> {
  match mutation {
    Mutation::AssignCampaign(campaign_id) => {
      writer
        .update_message(id, MessageUpdate::campaign(*campaign_id))
        .await?;
    }
    Mutation::LinkCase(case_id) => {
      writer.update_message(id, MessageUpdate::case(*case_id)).await?;
    }
    Mutation::SetTags(tags) => {
      writer
        .set_tag_membership(EntityRef::Message(id), tags.clone())
        .await?;
    }
  }
  Ok(())
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationOutcome<E> {
  pub mutation: Mutation,
  pub result:   BatchResult<Uuid, E>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionOutcome<E> {
  pub targets:  Vec<Uuid>,
  pub outcomes: Vec<MutationOutcome<E>>,
}

impl<E> DecisionOutcome<E> {
  pub fn is_success(&self) -> bool {
    self.outcomes.iter().all(|o| o.result.is_success())
  }

  /// Targets that need another attempt for at least one mutation, in target
  /// order.
  pub fn retry_ids(&self) -> Vec<Uuid> {
    let pending: BTreeSet<Uuid> = self
      .outcomes
      .iter()
      .flat_map(|o| o.result.retry_ids())
      .collect();
    self
      .targets
      .iter()
      .copied()
      .filter(|id| pending.contains(id))
      .collect()
  }

  /// Render errors as strings, for reporting.
  pub fn reported(self) -> DecisionOutcome<String>
  where
    E: std::fmt::Display,
  {
    DecisionOutcome {
      targets:  self.targets,
      outcomes: self
        .outcomes
        .into_iter()
        .map(|o| MutationOutcome {
          mutation: o.mutation,
          result:   o.result.map_err(|e| e.to_string()),
        })
        .collect(),
    }
  }
}

// ─── Commit ──────────────────────────────────────────────────────────────────

/// Apply every mutation of `decision` across `targets`.
///
/// Mutations run one after another; within a mutation up to
/// `config.concurrency` writes are in flight. A failing target never stops
/// the others.
pub async fn commit_decision<W>(
  writer: &Arc<W>,
  targets: &[Uuid],
  decision: &Decision,
  config: &BulkConfig,
  bulk: &BulkCommit,
) -> Result<DecisionOutcome<W::Error>>
where
  W: TriageWriter + 'static,
{
  config.validate()?;
  if targets.is_empty() {
    return Err(Error::NoTargets);
  }
  let mutations = decision.mutations();
  if mutations.is_empty() {
    return Err(Error::EmptyDecision);
  }

  let mut outcomes = Vec::with_capacity(mutations.len());
  for mutation in mutations {
    debug!(?mutation, targets = targets.len(), "applying mutation");
    let result = if config.concurrency <= 1 {
      let w = writer.as_ref();
      bulk
        .apply_to_all_async(targets, &mutation, |id, m| async move {
          apply_mutation(w, id, &m).await
        })
        .await
    } else {
      let w = Arc::clone(writer);
      bulk
        .apply_to_all_concurrent(
          targets,
          &mutation,
          config.concurrency,
          move |id, m| {
            let w = Arc::clone(&w);
            async move { apply_mutation(w.as_ref(), id, &m).await }
          },
        )
        .await
    };
    outcomes.push(MutationOutcome { mutation, result });
  }

  Ok(DecisionOutcome { targets: targets.to_vec(), outcomes })
}

/// Create a campaign from `representative`, then assign every target to it.
///
/// The campaign's subject pattern and fingerprint come from the
/// representative message. Creation failing aborts before any assignment.
pub async fn create_campaign_and_assign<W>(
  writer: &Arc<W>,
  representative: &Message,
  name: &str,
  targets: &[Uuid],
  config: &BulkConfig,
  bulk: &BulkCommit,
) -> Result<(Campaign, DecisionOutcome<W::Error>)>
where
  W: TriageWriter + 'static,
{
  if targets.is_empty() {
    return Err(Error::NoTargets);
  }

  let pattern = normalize(representative.subject.as_deref());
  let input = NewCampaign {
    name:             name.trim().to_string(),
    subject_pattern:  (!pattern.is_empty()).then_some(pattern),
    fingerprint_hash: effective_fingerprint(representative),
  };
  let campaign = writer.create_campaign(input).await.map_err(Error::store)?;
  info!(campaign_id = %campaign.campaign_id, name = %campaign.name, "campaign created");

  let decision =
    Decision { campaign_id: Some(campaign.campaign_id), ..Default::default() };
  let outcome = commit_decision(writer, targets, &decision, config, bulk).await?;
  Ok((campaign, outcome))
}
