//! Constituents and their contact records.
//!
//! A constituent has zero or more contacts. Nothing requires an email address
//! to belong to a single constituent; ambiguity is surfaced by the resolver
//! rather than prevented here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// A person record a message's sender may be linked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constituent {
  pub constituent_id: Uuid,
  pub full_name:      String,
  pub created_at:     DateTime<Utc>,
}

/// The channel a contact record describes.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContactKind {
  Email,
  Phone,
  Address,
}

/// One typed contact record belonging to a constituent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
  pub contact_id:     Uuid,
  pub constituent_id: Uuid,
  pub kind:           ContactKind,
  pub value:          String,
  #[serde(default)]
  pub is_primary:     bool,
}

impl Contact {
  pub fn new(constituent_id: Uuid, kind: ContactKind, value: &str) -> Self {
    Self {
      contact_id: Uuid::new_v4(),
      constituent_id,
      kind,
      value: value.to_owned(),
      is_primary: false,
    }
  }

  pub fn is_email(&self) -> bool { self.kind == ContactKind::Email }

  pub fn is_address(&self) -> bool { self.kind == ContactKind::Address }
}
