//! Multi-device harness.
//!
//! A [`Fleet`] is a set of simulated devices sharing one
//! [`MemoryRemoteStore`] and one [`ManualClock`]. Each device owns a
//! [`MemoryLocalStore`] and a [`SyncEngine`] over it.

use std::sync::Arc;

use casesync_client::{
    Clock, EngineConfig, LocalStore, LocalStoreError, ManualClock, MemoryLocalStore, MemoryRemoteStore,
    PipelineError, StopSignal, SyncEngine, SyncReport,
};
use casesync_types::{EntityType, Fields, RecordId, RemoteDocument, SyncError, SyncedRecord, Timestamp};
use thiserror::Error;

use crate::assertions::DeviceState;

/// Errors that can occur while driving the fleet.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A pipeline run failed.
    #[error("pipeline error on {device}: {source}")]
    Pipeline {
        /// Device name.
        device: String,
        /// Underlying error.
        source: PipelineError,
    },

    /// Local store error outside a pipeline.
    #[error("local store error: {0}")]
    Local(#[from] LocalStoreError),

    /// Invalid test data.
    #[error("invalid data: {0}")]
    Data(#[from] SyncError),

    /// An edit targeted a record the device does not have.
    #[error("{device} has no record {id}")]
    MissingRecord {
        /// Device name.
        device: String,
        /// Record id.
        id: String,
    },

    /// The fleet kept changing after the allowed number of rounds.
    #[error("fleet did not settle within {rounds} rounds")]
    NotSettled {
        /// Rounds attempted.
        rounds: u32,
    },
}

/// Build a payload from `(key, value)` pairs.
pub fn fields<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Fields {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// One simulated device.
pub struct Device {
    name: String,
    local: MemoryLocalStore,
    engine: SyncEngine,
    clock: ManualClock,
}

impl Device {
    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device's local store.
    pub fn local(&self) -> &MemoryLocalStore {
        &self.local
    }

    /// The device's engine.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Create a record offline.
    pub async fn create(
        &self,
        entity: EntityType,
        id: &str,
        payload: Fields,
    ) -> Result<SyncedRecord, HarnessError> {
        let record = SyncedRecord::new_local(RecordId::new(id)?, payload, self.clock.now());
        self.local.upsert_one(entity, &record).await?;
        Ok(record)
    }

    /// Edit an existing record offline.
    pub async fn edit(
        &self,
        entity: EntityType,
        id: &str,
        changes: Fields,
    ) -> Result<SyncedRecord, HarnessError> {
        let mut record = self.require(entity, id).await?;
        record.edit(changes, self.clock.now());
        self.local.upsert_one(entity, &record).await?;
        Ok(record)
    }

    /// Soft-delete a record offline.
    pub async fn delete(&self, entity: EntityType, id: &str) -> Result<SyncedRecord, HarnessError> {
        let mut record = self.require(entity, id).await?;
        record.soft_delete(self.clock.now());
        self.local.upsert_one(entity, &record).await?;
        Ok(record)
    }

    /// Read one local record.
    pub async fn record(&self, entity: EntityType, id: &str) -> Result<Option<SyncedRecord>, HarnessError> {
        Ok(self.local.get(entity, &RecordId::new(id)?).await?)
    }

    /// Push then pull every entity type.
    pub async fn sync(&self) -> Result<SyncReport, HarnessError> {
        self.engine
            .sync_all(&StopSignal::new())
            .await
            .map_err(|source| HarnessError::Pipeline {
                device: self.name.clone(),
                source,
            })
    }

    /// Purge tombstones older than `retention_days`.
    pub async fn cleanup(&self, retention_days: u32) -> Result<(), HarnessError> {
        self.engine
            .cleanup(retention_days, &StopSignal::new())
            .await
            .map(|_| ())
            .map_err(|source| HarnessError::Pipeline {
                device: self.name.clone(),
                source,
            })
    }

    /// Dirty records across every entity type.
    pub async fn dirty_count(&self) -> Result<u64, HarnessError> {
        let mut total = 0;
        for entity in EntityType::ALL {
            total += self.local.count_dirty(entity).await?;
        }
        Ok(total)
    }

    async fn require(&self, entity: EntityType, id: &str) -> Result<SyncedRecord, HarnessError> {
        self.record(entity, id)
            .await?
            .ok_or_else(|| HarnessError::MissingRecord {
                device: self.name.clone(),
                id: id.to_string(),
            })
    }
}

/// Devices sharing one remote.
pub struct Fleet {
    remote: MemoryRemoteStore,
    clock: ManualClock,
    devices: Vec<Device>,
}

impl Fleet {
    /// Create a fleet with default pipeline settings.
    pub fn new(names: &[&str]) -> Self {
        Self::with_config(names, EngineConfig::default(), MemoryRemoteStore::new())
    }

    /// Create a fleet with custom settings and remote.
    pub fn with_config(names: &[&str], config: EngineConfig, remote: MemoryRemoteStore) -> Self {
        let clock = ManualClock::new(Timestamp::from_millis(1_700_000_000_000));
        let devices = names
            .iter()
            .map(|name| {
                let local = MemoryLocalStore::new();
                let engine = SyncEngine::new(
                    Arc::new(local.clone()),
                    Arc::new(remote.clone()),
                    Arc::new(clock.clone()),
                    config.clone(),
                );
                Device {
                    name: name.to_string(),
                    local,
                    engine,
                    clock: clock.clone(),
                }
            })
            .collect();

        Self {
            remote,
            clock,
            devices,
        }
    }

    /// The shared remote.
    pub fn remote(&self) -> &MemoryRemoteStore {
        &self.remote
    }

    /// The shared clock.
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Device by position.
    pub fn device(&self, index: usize) -> &Device {
        &self.devices[index]
    }

    /// Every device.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Let time pass between actions so timestamps are distinct.
    pub fn tick(&self) {
        self.clock.advance_millis(1_000);
    }

    /// Sync every device in order until a full round changes nothing and
    /// no device holds dirty records.
    ///
    /// Returns the number of rounds run.
    pub async fn settle(&self, max_rounds: u32) -> Result<u32, HarnessError> {
        for round in 1..=max_rounds {
            let before = self.remote_state();
            for device in &self.devices {
                device.sync().await?;
                self.tick();
            }
            let mut dirty = 0;
            for device in &self.devices {
                dirty += device.dirty_count().await?;
            }
            if dirty == 0 && self.remote_state() == before {
                tracing::debug!(rounds = round, "fleet settled");
                return Ok(round);
            }
        }
        Err(HarnessError::NotSettled { rounds: max_rounds })
    }

    /// Every device's local view of one entity type.
    pub fn states(&self, entity: EntityType) -> Vec<DeviceState> {
        self.devices
            .iter()
            .map(|device| DeviceState::capture(device.name(), &device.local.snapshot(entity)))
            .collect()
    }

    /// Remote documents of every entity type.
    pub fn remote_state(&self) -> Vec<(EntityType, Vec<RemoteDocument>)> {
        EntityType::ALL
            .into_iter()
            .map(|entity| (entity, self.remote.snapshot(entity)))
            .collect()
    }
}
