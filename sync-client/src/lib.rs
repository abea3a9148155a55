//! # sync-client
//!
//! I/O side of casesync: the stores and the pipelines that move records
//! between them.
//!
//! This is the library an application embeds to replicate its records.
//!
//! ## Features
//!
//! - **Store Abstraction**: [`LocalStore`] and [`RemoteStore`] traits with
//!   SQLite, HTTP and in-memory implementations
//! - **Push Pipeline**: atomic, bounded batches with poison isolation
//! - **Pull Pipeline**: resumable paging that never overwrites winning local edits
//! - **Retention Cleaner**: remote-then-local tombstone purge
//! - **Pure Decisions**: conflict and planning logic comes from sync-core
//!
//! ## Example
//!
//! ```ignore
//! use casesync_client::{EngineConfig, HttpRemoteStore, SqliteLocalStore, SyncEngine, SystemClock};
//!
//! let engine = SyncEngine::new(
//!     Arc::new(SqliteLocalStore::new(path).await?),
//!     Arc::new(HttpRemoteStore::new(remote_config)?),
//!     Arc::new(SystemClock),
//!     EngineConfig::default(),
//! );
//!
//! engine.push(EntityType::CaseRecord, &StopSignal::new()).await?;
//! engine.pull(EntityType::CaseRecord, &StopSignal::new()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleaner;
pub mod clock;
pub mod engine;
pub mod error;
pub mod local;
pub mod pull;
pub mod push;
pub mod remote;
pub mod stop;

pub use cleaner::{CleanerConfig, CleanupReport, RetentionCleaner};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineConfig, SyncEngine, SyncReport};
pub use error::{LocalStoreError, PipelineError, RemoteError};
pub use local::{
    LocalStore, MemoryLocalStore, PushedRecord, QuarantinedRecord, RowState, SqliteLocalStore,
};
pub use pull::{PullConfig, PullPipeline, PullReport};
pub use push::{BatchOutcome, PushConfig, PushPipeline, PushReport};
pub use remote::{HttpRemoteConfig, HttpRemoteStore, MemoryRemoteStore, RemoteStore, DEFAULT_BATCH_CEILING};
pub use stop::StopSignal;
