//! # sync-core
//!
//! Pure logic for casesync (no I/O, instant tests).
//!
//! This crate holds the decisions of the sync engine without any network
//! or disk I/O:
//! - [`resolve`] / [`pick_winner`] - the conflict rule for one record
//! - [`plan_batch`] - turning dirty records into an atomic write batch
//! - [`PullTracker`] - pull pagination and its circuit breaker
//! - [`Backoff`] - retry delays for the scheduler
//! - [`retention`] - tombstone purge rules
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Timestamps are parameters, never clock reads.
//! The actual I/O is performed by `sync-client`, which interprets the
//! plans produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod cursor;
pub mod plan;
pub mod resolve;
pub mod retention;

pub use backoff::Backoff;
pub use cursor::{PageRequest, PullTracker, StopReason};
pub use plan::{plan_batch, BatchPlan, PlannedRecord, PushDecision};
pub use resolve::{pick_winner, resolve, Winner};
pub use retention::retention_cutoff;
