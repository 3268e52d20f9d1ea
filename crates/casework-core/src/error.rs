//! Error types for `casework-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("message not found: {0}")]
  MessageNotFound(Uuid),

  #[error("case not found: {0}")]
  CaseNotFound(Uuid),

  #[error("campaign not found: {0}")]
  CampaignNotFound(Uuid),

  #[error("tag not found: {0}")]
  TagNotFound(Uuid),

  #[error("tag name must not be empty")]
  EmptyTagName,

  /// A write was configured to fail by [`crate::snapshot::MemoryStore`].
  #[error("injected failure for {0}")]
  InjectedFailure(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
