//! Applying one mutation across many messages.
//!
//! A batch never aborts on the first failure. Every id ends up in exactly one
//! of `succeeded`, `failed`, or `skipped`, and retrying the failed and skipped
//! ids against an idempotent writer is always safe.

use std::{
  fmt::{Debug, Display},
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use serde::Serialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{error, info, warn};

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure<I, E> {
  pub id:    I,
  pub error: E,
}

/// Per-id outcome of a batch, each bucket in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult<I, E> {
  pub succeeded: Vec<I>,
  pub failed:    Vec<BatchFailure<I, E>>,
  /// Ids not attempted because the batch was cancelled, or whose concurrent
  /// task panicked.
  pub skipped:   Vec<I>,
}

impl<I, E> Default for BatchResult<I, E> {
  fn default() -> Self {
    Self { succeeded: Vec::new(), failed: Vec::new(), skipped: Vec::new() }
  }
}

impl<I: Clone, E> BatchResult<I, E> {
  pub fn total(&self) -> usize {
    self.succeeded.len() + self.failed.len() + self.skipped.len()
  }

  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && self.skipped.is_empty()
  }

  /// Failed ids followed by skipped ids: what to run again.
  pub fn retry_ids(&self) -> Vec<I> {
    self
      .failed
      .iter()
      .map(|f| f.id.clone())
      .chain(self.skipped.iter().cloned())
      .collect()
  }

  pub fn map_err<F>(self, f: impl Fn(E) -> F) -> BatchResult<I, F> {
    BatchResult {
      succeeded: self.succeeded,
      failed:    self
        .failed
        .into_iter()
        .map(|BatchFailure { id, error }| BatchFailure { id, error: f(error) })
        .collect(),
      skipped:   self.skipped,
    }
  }
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Shared flag that stops a batch from starting further items.
///
/// Items already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self { Self::default() }

  pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct BulkCommit {
  cancel: Option<CancelToken>,
}

enum Slot<S, E> {
  Done(Result<S, E>),
  Skipped,
}

impl BulkCommit {
  pub fn new() -> Self { Self::default() }

  pub fn with_cancel(mut self, token: CancelToken) -> Self {
    self.cancel = Some(token);
    self
  }

  fn cancelled(&self) -> bool {
    self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
  }

  /// Apply `mutation` to each id in order, collecting every outcome.
  pub fn apply_to_all<I, M, S, E>(
    &self,
    ids: &[I],
    mutation: &M,
    mut apply: impl FnMut(&I, &M) -> Result<S, E>,
  ) -> BatchResult<I, E>
  where
    I: Clone + Debug,
    E: Display,
  {
    let mut slots = Vec::with_capacity(ids.len());
    for id in ids {
      if self.cancelled() {
        slots.push(Slot::Skipped);
      } else {
        slots.push(Slot::Done(apply(id, mutation)));
      }
    }
    collect(ids, slots)
  }

  /// [`apply_to_all`](Self::apply_to_all) with an async `apply`, one write in
  /// flight at a time.
  pub async fn apply_to_all_async<I, M, S, E, F, Fut>(
    &self,
    ids: &[I],
    mutation: &M,
    mut apply: F,
  ) -> BatchResult<I, E>
  where
    I: Clone + Debug,
    M: Clone,
    E: Display,
    F: FnMut(I, M) -> Fut,
    Fut: Future<Output = Result<S, E>>,
  {
    let mut slots = Vec::with_capacity(ids.len());
    for id in ids {
      if self.cancelled() {
        slots.push(Slot::Skipped);
      } else {
        slots.push(Slot::Done(apply(id.clone(), mutation.clone()).await));
      }
    }
    collect(ids, slots)
  }

  /// Run up to `limit` applications at once. Buckets are still reported in
  /// input order regardless of completion order.
  ///
  /// An application that panics is logged and its id reported as skipped,
  /// since whether its write landed is unknown. The other ids keep their
  /// outcomes.
  pub async fn apply_to_all_concurrent<I, M, S, E, F, Fut>(
    &self,
    ids: &[I],
    mutation: &M,
    limit: usize,
    apply: F,
  ) -> BatchResult<I, E>
  where
    I: Clone + Debug + Send + 'static,
    M: Clone + Send + 'static,
    S: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(I, M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<S, E>> + Send + 'static,
  {
    let apply = Arc::new(apply);
    let permits = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks = JoinSet::new();

    for (index, id) in ids.iter().cloned().enumerate() {
      let apply = Arc::clone(&apply);
      let permits = Arc::clone(&permits);
      let mutation = mutation.clone();
      let cancel = self.cancel.clone();
      tasks.spawn(async move {
        let Ok(_permit) = permits.acquire_owned().await else {
          return (index, Slot::Skipped);
        };
        if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
          return (index, Slot::Skipped);
        }
        (index, Slot::Done(apply(id, mutation).await))
      });
    }

    let mut slots: Vec<Option<Slot<S, E>>> =
      std::iter::repeat_with(|| None).take(ids.len()).collect();
    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok((index, slot)) => slots[index] = Some(slot),
        // Panicked or aborted tasks leave their slot empty.
        Err(e) => error!(error = %e, "bulk item task did not complete"),
      }
    }

    let slots = slots
      .into_iter()
      .map(|s| s.unwrap_or(Slot::Skipped))
      .collect();
    collect(ids, slots)
  }
}

fn collect<I, S, E>(ids: &[I], slots: Vec<Slot<S, E>>) -> BatchResult<I, E>
where
  I: Clone + Debug,
  E: Display,
{
  let mut result = BatchResult::default();
  for (id, slot) in ids.iter().zip(slots) {
    match slot {
      Slot::Done(Ok(_)) => result.succeeded.push(id.clone()),
      Slot::Done(Err(error)) => {
        warn!(?id, %error, "bulk item failed");
        result.failed.push(BatchFailure { id: id.clone(), error });
      }
      Slot::Skipped => result.skipped.push(id.clone()),
    }
  }

  if !ids.is_empty() {
    info!(
      total = ids.len(),
      succeeded = result.succeeded.len(),
      failed = result.failed.len(),
      skipped = result.skipped.len(),
      "bulk commit finished"
    );
  }
  result
}

// ─── Tests ────────────────────────────────────────────────────────────────────
