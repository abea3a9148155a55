//! Worker composition.
//!
//! `Worker` owns the engine, the durable queue and the scheduler, and wires
//! the background pieces together on [`Worker::run`].

use std::sync::Arc;
use std::time::Duration;

use casesync_client::{
    Clock, HttpRemoteStore, LocalStore, RemoteStore, SqliteLocalStore, SyncEngine, SystemClock,
};
use casesync_types::EntityType;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::metrics::WorkerMetrics;
use crate::network::{spawn_health_check, NetworkMonitor};
use crate::queue::{SqliteTaskQueue, TaskQueue};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::task::EngineRunner;

/// A running sync worker.
pub struct Worker {
    config: Config,
    engine: SyncEngine,
    queue: Arc<dyn TaskQueue>,
    coordinator: Coordinator,
    scheduler: Scheduler,
    network: NetworkMonitor,
    metrics: Arc<WorkerMetrics>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .field("online", &self.network.is_online())
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Assemble a worker from already opened stores.
    pub fn new(
        config: Config,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        queue: Arc<dyn TaskQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(WorkerMetrics::default());
        let network = NetworkMonitor::new(config.network.assume_online);
        let engine = SyncEngine::new(local, remote, clock.clone(), config.engine_config());

        let scheduler = Scheduler::new(
            queue.clone(),
            Arc::new(EngineRunner::new(engine.clone(), metrics.clone())),
            network.clone(),
            clock.clone(),
            metrics.clone(),
            SchedulerConfig {
                poll_interval: Duration::from_millis(config.schedule.poll_interval_ms),
                backoff: config.backoff(),
                max_attempts: config.schedule.max_attempts,
                ..SchedulerConfig::default()
            },
        );
        let coordinator = Coordinator::new(queue.clone(), clock)
            .with_notify(scheduler.notifier())
            .with_cleanup_interval(Duration::from_secs(config.cleanup.interval_secs));

        Self {
            config,
            engine,
            queue,
            coordinator,
            scheduler,
            network,
            metrics,
        }
    }

    /// Open the SQLite database and the HTTP remote named in `config`.
    ///
    /// Records and tasks share one database file through separate pools.
    pub async fn open(config: Config) -> Result<Self> {
        let path = config.storage.database.clone();
        let local = SqliteLocalStore::new(&path).await?;
        let queue = SqliteTaskQueue::new(&path).await?;
        let remote = HttpRemoteStore::new(config.remote_config())?;
        info!(
            database = %path.display(),
            remote = remote.base_url(),
            "worker storage opened"
        );

        Ok(Self::new(
            config,
            Arc::new(local),
            Arc::new(remote),
            Arc::new(queue),
            Arc::new(SystemClock),
        ))
    }

    /// Worker configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The sync engine.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// The durable task queue.
    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Enqueue API.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Connectivity state.
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Operational counters.
    pub fn metrics(&self) -> &WorkerMetrics {
        &self.metrics
    }

    /// Register the periodic tasks enabled in the configuration.
    ///
    /// Re-registration on every start keeps the stored next run time.
    pub async fn register_periodic(&self) -> Result<()> {
        if self.config.schedule.periodic_enabled {
            let every = Duration::from_secs(self.config.schedule.periodic_interval_secs);
            for entity in EntityType::ALL {
                self.coordinator.enqueue_periodic(entity, every).await?;
            }
        }
        if self.config.cleanup.enabled {
            self.coordinator
                .enqueue_cleaner_periodic(self.config.cleanup.retention_days)
                .await?;
        }
        Ok(())
    }

    /// Run until `shutdown` turns true.
    ///
    /// Requeues work interrupted by a previous crash, registers periodic
    /// tasks, starts the connectivity check and the HTTP endpoints, then
    /// drives the scheduler.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.scheduler.recover().await?;
        self.register_periodic().await?;

        let health_check = if self.config.network.assume_online {
            None
        } else {
            Some(spawn_health_check(
                self.network.clone(),
                self.engine.remote().clone(),
                Duration::from_secs(self.config.network.check_interval_secs),
            ))
        };

        let http = if self.config.http.enabled {
            let listener = tokio::net::TcpListener::bind(self.config.http.bind_address.as_str()).await?;
            info!("HTTP endpoints listening on {}", self.config.http.bind_address);
            crate::http::init_start_time();
            let router = crate::http::build_router(self.clone());
            let mut stop = shutdown.clone();
            Some(tokio::spawn(async move {
                let served = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        let _ = stop.wait_for(|stopped| *stopped).await;
                    })
                    .await;
                if let Err(e) = served {
                    warn!("HTTP server error: {}", e);
                }
            }))
        } else {
            None
        };

        self.scheduler.run(shutdown).await;

        if let Some(health_check) = health_check {
            health_check.abort();
        }
        if let Some(http) = http {
            let _ = http.await;
        }
        info!("worker stopped");
        Ok(())
    }
}
