//! Messages and campaigns.
//!
//! Messages are created by mail ingestion outside this workspace. Triage only
//! ever changes the `campaign_id` and `case_id` pointers on a message; it never
//! deletes one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

// ─── Message ─────────────────────────────────────────────────────────────────

/// A single piece of incoming correspondence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub message_id:       Uuid,
  pub subject:          Option<String>,
  pub sender_email:     String,
  pub sender_name:      Option<String>,
  pub received_at:      DateTime<Utc>,
  /// Plain text or already-sanitised HTML.
  #[serde(default)]
  pub body:             Option<String>,
  #[serde(default)]
  pub campaign_id:      Option<Uuid>,
  #[serde(default)]
  pub case_id:          Option<Uuid>,
  /// Fingerprint recorded at ingestion time, if any.
  #[serde(default)]
  pub fingerprint_hash: Option<String>,
}

impl Message {
  /// Convenience constructor with all optional fields unset.
  pub fn new(
    subject: Option<&str>,
    sender_email: &str,
    received_at: DateTime<Utc>,
  ) -> Self {
    Self {
      message_id: Uuid::new_v4(),
      subject: subject.map(str::to_owned),
      sender_email: sender_email.to_owned(),
      sender_name: None,
      received_at,
      body: None,
      campaign_id: None,
      case_id: None,
      fingerprint_hash: None,
    }
  }
}

/// Partial update applied by [`crate::store::TriageWriter::update_message`].
///
/// `None` leaves the field untouched. A pointer cannot be cleared through this
/// type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUpdate {
  pub campaign_id: Option<Uuid>,
  pub case_id:     Option<Uuid>,
}

impl MessageUpdate {
  pub fn campaign(campaign_id: Uuid) -> Self {
    Self { campaign_id: Some(campaign_id), case_id: None }
  }

  pub fn case(case_id: Uuid) -> Self {
    Self { campaign_id: None, case_id: Some(case_id) }
  }
}

// ─── Campaign ────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignStatus {
  #[default]
  Active,
  Inactive,
}

/// A named grouping of messages that share a normalised subject or
/// fingerprint, usually a mass-mail action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
  pub campaign_id:      Uuid,
  pub name:             String,
  #[serde(default)]
  pub status:           CampaignStatus,
  #[serde(default)]
  pub subject_pattern:  Option<String>,
  #[serde(default)]
  pub fingerprint_hash: Option<String>,
  pub created_at:       DateTime<Utc>,
}

impl Campaign {
  pub fn is_active(&self) -> bool {
    matches!(self.status, CampaignStatus::Active)
  }
}

/// Input to [`crate::store::TriageWriter::create_campaign`].
/// `campaign_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCampaign {
  pub name:             String,
  pub subject_pattern:  Option<String>,
  pub fingerprint_hash: Option<String>,
}
