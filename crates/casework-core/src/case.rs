//! Cases and the case-party join.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Workflow status of a case.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
  Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CaseStatus {
  #[default]
  Open,
  Pending,
  Closed,
  Archived,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize,
  Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CasePriority {
  Low,
  #[default]
  Medium,
  High,
  Urgent,
}

/// A unit of casework, optionally linked to constituents through
/// [`CaseParty`] rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
  pub case_id:     Uuid,
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  /// Human-facing reference number, e.g. `"CW-2024-0117"`.
  pub reference:   String,
  #[serde(default)]
  pub status:      CaseStatus,
  #[serde(default)]
  pub priority:    CasePriority,
  #[serde(default)]
  pub assignee_id: Option<Uuid>,
  pub created_at:  DateTime<Utc>,
  #[serde(default)]
  pub updated_at:  Option<DateTime<Utc>>,
  #[serde(default)]
  pub closed_at:   Option<DateTime<Utc>>,
}

impl Case {
  /// The most recent timestamp at which anything happened on this case.
  pub fn last_activity(&self) -> DateTime<Utc> {
    [Some(self.created_at), self.updated_at, self.closed_at]
      .into_iter()
      .flatten()
      .max()
      .unwrap_or(self.created_at)
  }
}

/// Links a case to one constituent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaseParty {
  pub case_id:        Uuid,
  pub constituent_id: Uuid,
}
