//! Tag selection reconciliation.
//!
//! An edit in progress holds a working selection; storage holds the last
//! persisted set. [`reconcile`] diffs the two so the UI can show which tags
//! are new, which stay, and which are about to be removed (kept visible,
//! struck through, until the edit is committed or discarded).
//!
//! Nothing here writes. On commit the persisted set becomes exactly the
//! selection; [`TagReconciliation::commit_set`] is that set.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use strum::Display;

/// A tag's membership relative to its last persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TagState {
  Unchanged,
  New,
  Removed,
}

/// Per-tag states for the union of a selection and its original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagReconciliation<T: Ord> {
  states: BTreeMap<T, TagState>,
}

/// Diff `selected` against `original`.
pub fn reconcile<T: Ord + Clone>(
  selected: &BTreeSet<T>,
  original: &BTreeSet<T>,
) -> TagReconciliation<T> {
  let states = selected
    .union(original)
    .map(|id| {
      let state = match (selected.contains(id), original.contains(id)) {
        (true, true) => TagState::Unchanged,
        (true, false) => TagState::New,
        (false, _) => TagState::Removed,
      };
      (id.clone(), state)
    })
    .collect();
  TagReconciliation { states }
}

impl<T: Ord + Clone> TagReconciliation<T> {
  pub fn state(&self, id: &T) -> Option<TagState> {
    self.states.get(id).copied()
  }

  pub fn states(&self) -> &BTreeMap<T, TagState> { &self.states }

  /// Everything the edit should still show, removed tags included.
  pub fn display_set(&self) -> BTreeSet<T> {
    self.states.keys().cloned().collect()
  }

  /// The set storage must hold after commit.
  pub fn commit_set(&self) -> BTreeSet<T> {
    self
      .with_state(|s| s != TagState::Removed)
      .cloned()
      .collect()
  }

  pub fn added(&self) -> impl Iterator<Item = &T> {
    self.with_state(|s| s == TagState::New)
  }

  pub fn removed(&self) -> impl Iterator<Item = &T> {
    self.with_state(|s| s == TagState::Removed)
  }

  pub fn unchanged(&self) -> impl Iterator<Item = &T> {
    self.with_state(|s| s == TagState::Unchanged)
  }

  /// `true` if committing would change storage.
  pub fn is_dirty(&self) -> bool {
    self.states.values().any(|s| *s != TagState::Unchanged)
  }

  fn with_state(
    &self,
    keep: impl Fn(TagState) -> bool,
  ) -> impl Iterator<Item = &T> {
    self
      .states
      .iter()
      .filter(move |(_, s)| keep(**s))
      .map(|(id, _)| id)
  }
}

// ─── Edit session ────────────────────────────────────────────────────────────

/// A tag edit in progress: preview freely, then commit or discard.
///
/// Nothing is applied speculatively; `commit` hands back the set to persist
/// and `discard` hands back the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEdit<T: Ord> {
  original: BTreeSet<T>,
  selected: BTreeSet<T>,
}

impl<T: Ord + Clone> TagEdit<T> {
  /// Start editing from the persisted set.
  pub fn new(original: BTreeSet<T>) -> Self {
    Self { selected: original.clone(), original }
  }

  pub fn original(&self) -> &BTreeSet<T> { &self.original }

  pub fn selected(&self) -> &BTreeSet<T> { &self.selected }

  /// Flip membership of `id`; returns whether it is now selected.
  pub fn toggle(&mut self, id: T) -> bool {
    if self.selected.remove(&id) {
      false
    } else {
      self.selected.insert(id);
      true
    }
  }

  pub fn select(&mut self, id: T) { self.selected.insert(id); }

  pub fn deselect(&mut self, id: &T) { self.selected.remove(id); }

  /// Replace the whole selection.
  pub fn set(&mut self, ids: impl IntoIterator<Item = T>) {
    self.selected = ids.into_iter().collect();
  }

  pub fn preview(&self) -> TagReconciliation<T> {
    reconcile(&self.selected, &self.original)
  }

  /// End the edit. Returns the set to persist, or `None` if nothing changed.
  pub fn commit(self) -> Option<BTreeSet<T>> {
    (self.selected != self.original).then_some(self.selected)
  }

  /// End the edit without writing. Returns the original set.
  pub fn discard(self) -> BTreeSet<T> { self.original }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
