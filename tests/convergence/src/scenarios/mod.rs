//! Convergence scenarios.
//!
//! - `basic` - offline create, multi-device fan-out, paging
//! - `conflict` - concurrent edits and deletes of the same record
//! - `faults` - outages, rejected batches, poison records
//! - `retention` - tombstone purge across devices

pub mod basic;
pub mod conflict;
pub mod faults;
pub mod retention;
