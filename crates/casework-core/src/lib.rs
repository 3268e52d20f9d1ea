//! Core types and collaborator contracts for casework triage.
//!
//! Entities the triage engine reads (messages, campaigns, constituents,
//! cases, tags), the read/write traits the host application implements over
//! its own storage, and an in-memory snapshot store. No scoring or matching
//! lives here.

// Storage traits return `impl Future + Send`; the lint is advisory only.
#![allow(async_fn_in_trait)]

pub mod case;
pub mod constituent;
pub mod error;
pub mod message;
pub mod snapshot;
pub mod store;
pub mod tag;

pub use error::{Error, Result};
