//! # sync-types
//!
//! Shared data types for casesync, the offline-first sync engine of the
//! case-management app.
//!
//! This crate provides the foundational types used across all casesync crates:
//! - [`RecordId`], [`EntityType`], [`Timestamp`], [`PullCursor`] - Identity and ordering types
//! - [`SyncedRecord`], [`RemoteDocument`] - The local and remote record shapes
//! - [`WriteOp`] - Operations of an atomic remote batch
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod ops;
mod record;

pub use error::SyncError;
pub use ids::{EntityType, PullCursor, RecordId, Timestamp};
pub use ops::{Precondition, RecordPatch, TombstoneWrite, WriteOp};
pub use record::{Fields, RemoteDocument, SyncedRecord};
