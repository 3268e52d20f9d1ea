//! The casework triage resolution engine.
//!
//! Given an incoming message and the current pools of messages, campaigns,
//! constituents, cases and tags, the engine:
//!
//! - groups the message with its campaign siblings ([`fingerprint`]),
//! - resolves the sender to a constituent with graded confidence
//!   ([`resolve`]),
//! - suggests a case to link ([`suggest`]),
//! - diffs an edited tag selection against storage ([`tags`]),
//! - and commits the confirmed decision across every target message without
//!   aborting on partial failure ([`bulk`], [`commit`]).
//!
//! All reads and writes go through the [`casework_core::store`] traits.
//! Apart from committing, everything here is synchronous and deterministic
//! for a fixed pool.

pub mod bulk;
pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod normalize;
pub mod resolve;
pub mod suggest;
pub mod tags;


pub use self::{
  bulk::{BatchFailure, BatchResult, BulkCommit, CancelToken},
  commit::{Decision, DecisionOutcome, Mutation},
  config::TriageConfig,
  engine::{TriageContext, TriageEngine, TriagePreview},
  error::{Error, Result},
  resolve::{ConstituentMatch, MatchStatus},
  suggest::{CaseAction, CaseSuggestion},
  tags::{TagEdit, TagState, reconcile},
};
