//! Suggest an existing case for a message to be linked to.
//!
//! Cases are scored on three signals, each in `[0, 1]`, combined as a
//! weighted mean:
//!
//! - **status**: open 1.0, pending 0.8, closed 0.2, archived 0.0;
//! - **recency**: `0.5 ^ (age_days / half_life_days)` of the last activity;
//! - **keywords**: the share of the case's title/description tokens that
//!   also appear in the message subject or body.
//!
//! A top candidate only becomes `primary` when its score strictly exceeds the
//! configured minimum. Otherwise the default action is to open a new case.

use std::{
  cmp::Ordering,
  collections::{BTreeMap, BTreeSet},
};

use casework_core::{
  case::{Case, CaseParty, CaseStatus},
  constituent::Constituent,
  message::Message,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  config::SuggesterConfig,
  normalize::{normalize, strip_markup, tokenize},
};

const SECONDS_PER_DAY: f64 = 86_400.0;

// ─── Types ───────────────────────────────────────────────────────────────────

/// The per-signal scores behind a candidate's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
  pub status:   f64,
  pub recency:  f64,
  pub keywords: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseCandidate {
  pub case_id:    Uuid,
  pub reference:  String,
  pub title:      String,
  pub status:     CaseStatus,
  pub confidence: f64,
  pub breakdown:  ScoreBreakdown,
}

/// What the triage UI should pre-select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "case_id", rename_all = "snake_case")]
pub enum CaseAction {
  LinkExisting(Uuid),
  CreateNew,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseSuggestion {
  pub primary:      Option<CaseCandidate>,
  pub alternatives: Vec<CaseCandidate>,
}

impl CaseSuggestion {
  pub fn default_action(&self) -> CaseAction {
    match &self.primary {
      Some(c) => CaseAction::LinkExisting(c.case_id),
      None => CaseAction::CreateNew,
    }
  }

  /// Every candidate offered, primary first.
  pub fn all(&self) -> impl Iterator<Item = &CaseCandidate> {
    self.primary.iter().chain(self.alternatives.iter())
  }
}

// ─── Suggester ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CaseLinkSuggester {
  config: SuggesterConfig,
}

impl CaseLinkSuggester {
  pub fn new(config: SuggesterConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &SuggesterConfig { &self.config }

  /// Rank `cases` as link targets for `message`.
  ///
  /// When `constituent` is known, only cases linked to them through
  /// `parties` are considered. `now` anchors the recency signal.
  pub fn suggest(
    &self,
    constituent: Option<&Constituent>,
    message: &Message,
    cases: &[Case],
    parties: &[CaseParty],
    now: DateTime<Utc>,
  ) -> CaseSuggestion {
    let linked: Option<BTreeSet<Uuid>> = constituent.map(|c| {
      parties
        .iter()
        .filter(|p| p.constituent_id == c.constituent_id)
        .map(|p| p.case_id)
        .collect()
    });

    let message_tokens = message_tokens(message);

    // One entry per case id, keeping the best score if a case is repeated.
    let mut best: BTreeMap<Uuid, CaseCandidate> = BTreeMap::new();
    for case in cases {
      if linked.as_ref().is_some_and(|ids| !ids.contains(&case.case_id)) {
        continue;
      }
      let candidate = self.score(case, &message_tokens, now);
      match best.get(&case.case_id) {
        Some(existing) if existing.confidence >= candidate.confidence => {}
        _ => {
          best.insert(case.case_id, candidate);
        }
      }
    }

    let mut ranked: Vec<CaseCandidate> = best.into_values().collect();
    ranked.sort_by(rank);

    let mut ranked = ranked.into_iter().peekable();
    let primary = ranked
      .next_if(|c| c.confidence > self.config.min_confidence);
    let alternatives: Vec<CaseCandidate> = ranked
      .filter(|c| c.confidence > self.config.alternative_floor)
      .take(self.config.max_alternatives)
      .collect();

    debug!(
      primary = ?primary.as_ref().map(|c| c.case_id),
      alternatives = alternatives.len(),
      "suggested case for message {}",
      message.message_id
    );
    CaseSuggestion { primary, alternatives }
  }

  fn score(
    &self,
    case: &Case,
    message_tokens: &BTreeSet<String>,
    now: DateTime<Utc>,
  ) -> CaseCandidate {
    let breakdown = ScoreBreakdown {
      status:   status_score(case.status),
      recency:  self.recency(case.last_activity(), now),
      keywords: keyword_overlap(case, message_tokens),
    };

    let cfg = &self.config;
    let total = cfg.status_weight + cfg.recency_weight + cfg.keyword_weight;
    let confidence = (cfg.status_weight * breakdown.status
      + cfg.recency_weight * breakdown.recency
      + cfg.keyword_weight * breakdown.keywords)
      / total;

    CaseCandidate {
      case_id: case.case_id,
      reference: case.reference.clone(),
      title: case.title.clone(),
      status: case.status,
      confidence: confidence.clamp(0.0, 1.0),
      breakdown,
    }
  }

  fn recency(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days =
      (now - last_activity).num_seconds().max(0) as f64 / SECONDS_PER_DAY;
    0.5_f64.powf(age_days / self.config.recency_half_life_days)
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn status_score(status: CaseStatus) -> f64 {
  match status {
    CaseStatus::Open => 1.0,
    CaseStatus::Pending => 0.8,
    CaseStatus::Closed => 0.2,
    CaseStatus::Archived => 0.0,
  }
}

fn message_tokens(message: &Message) -> BTreeSet<String> {
  let subject = normalize(message.subject.as_deref());
  let body = message.body.as_deref().map(strip_markup).unwrap_or_default();
  tokenize(&subject).into_iter().chain(tokenize(&body)).collect()
}

fn keyword_overlap(case: &Case, message_tokens: &BTreeSet<String>) -> f64 {
  let case_tokens: BTreeSet<String> = tokenize(&case.title)
    .into_iter()
    .chain(case.description.as_deref().map(tokenize).unwrap_or_default())
    .collect();
  if case_tokens.is_empty() {
    return 0.0;
  }
  case_tokens.intersection(message_tokens).count() as f64
    / case_tokens.len() as f64
}

/// Descending confidence, then ascending case id.
fn rank(a: &CaseCandidate, b: &CaseCandidate) -> Ordering {
  b.confidence
    .total_cmp(&a.confidence)
    .then_with(|| a.case_id.cmp(&b.case_id))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
