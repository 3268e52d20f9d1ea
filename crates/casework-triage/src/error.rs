//! Error types for `casework-triage`.
//!
//! Ambiguous resolutions are not errors. Only contract violations by the
//! caller and storage failures surface here.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("sender has neither an email address nor a display name")]
  InvalidSender,

  #[error("contact {0} has an empty value")]
  MalformedContact(Uuid),

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("message not found: {0}")]
  MessageNotFound(Uuid),

  #[error("decision has no target messages")]
  NoTargets,

  #[error("decision changes nothing")]
  EmptyDecision,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
