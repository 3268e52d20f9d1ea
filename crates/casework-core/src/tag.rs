//! Tags and tag assignments.
//!
//! Only final membership is ever persisted. Whether a tag is "new" or
//! "removed" relative to an edit in progress is derived by the triage engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  pub tag_id: Uuid,
  pub name:   String,
  /// CSS colour string, e.g. `"#1f883d"`.
  pub color:  String,
}

/// The kind of entity a tag can be attached to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize,
)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
  Message(Uuid),
  Case(Uuid),
}

impl EntityRef {
  pub fn id(&self) -> Uuid {
    match self {
      Self::Message(id) | Self::Case(id) => *id,
    }
  }
}

/// A join row between an entity and a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagAssignment {
  pub entity: EntityRef,
  pub tag_id: Uuid,
}
