//! Connectivity tracking.
//!
//! The scheduler only dispatches network-bound tasks while the monitor
//! reports online. The embedding application can set the state directly
//! (from OS connectivity callbacks); the daemon checks the remote store's
//! health endpoint instead.

use std::sync::Arc;
use std::time::Duration;

use casesync_client::RemoteStore;
use tokio::sync::watch;
use tokio::time::interval;

/// Publishes connectivity changes.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    /// Create a monitor with an initial state.
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Record the current connectivity. Subscribers are only woken on change.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
    }

    /// Current connectivity.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Receive connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Spawn a background task that checks the remote store's health.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_health_check(
    monitor: NetworkMonitor,
    remote: Arc<dyn RemoteStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Connectivity check started (interval: {}s)", every.as_secs());
        let mut timer = interval(every);

        loop {
            timer.tick().await;

            match remote.health().await {
                Ok(()) => monitor.set_online(true),
                Err(e) => {
                    tracing::debug!("Connectivity check failed: {}", e);
                    monitor.set_online(false);
                }
            }
        }
    })
}
