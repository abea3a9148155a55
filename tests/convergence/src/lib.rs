//! # casesync-convergence-tests
//!
//! Multi-device convergence harness for casesync.
//!
//! Simulates several devices, each with its own local store, syncing
//! through one shared in-memory remote under a controllable clock:
//! - Offline edits on several devices
//! - Conflicting writes to the same record
//! - Remote outages, rejected batches and poison records
//! - Tombstone retention across devices

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

pub mod scenarios;
