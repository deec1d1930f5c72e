//! Scheduled registry refresh
//!
//! Periodically reloads segment definitions into the [`SegmentRegistry`] on
//! its own task, independent of request handling. A failed cycle is logged and
//! the registry keeps serving its previous generation.

use crate::config::RegistryConfig;
use crate::registry::SegmentRegistry;
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Background task driving [`SegmentRegistry::refresh`].
#[derive(Debug)]
pub struct RegistryRefresher {
    registry: Arc<SegmentRegistry>,
    config: RegistryConfig,
    /// Timestamp of the last successful refresh
    last_refresh_at: RwLock<Option<DateTime<Utc>>>,
}

impl RegistryRefresher {
    pub fn new(registry: Arc<SegmentRegistry>, config: RegistryConfig) -> Self {
        Self { registry, config, last_refresh_at: RwLock::new(None) }
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh_at.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns [`RegistryRefresher::start`] on the current tokio runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.start())
    }

    /// Runs refresh cycles forever. The first cycle runs immediately.
    ///
    /// Returns at once when the scheduler is disabled.
    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Scheduled segment refresh is disabled, skipping");
            return;
        }

        info!(
            "Starting scheduled segment refresh with {}-second interval",
            self.config.refresh_interval_seconds
        );

        let mut ticker = interval(self.config.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.do_refresh().await;
        }
    }

    /// Executes one refresh cycle, recording the time on success.
    pub async fn do_refresh(&self) {
        if let Some(stats) = self.registry.refresh_or_keep().await {
            debug!(
                generation = stats.generation,
                segments = stats.segments,
                duration_ms = stats.duration_ms,
                "Scheduled segment refresh completed"
            );
            let mut last_refresh_at =
                self.last_refresh_at.write().unwrap_or_else(PoisonError::into_inner);
            *last_refresh_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition_store::InMemoryDefinitionStore;
    use audience_types::Segment;
    use std::time::Duration;

    fn segment(code: &str) -> Segment {
        Segment {
            id: 1,
            code: code.to_string(),
            name: code.to_string(),
            active: true,
            group: None,
            rules: vec![],
        }
    }

    #[tokio::test]
    async fn disabled_scheduler_returns_immediately() {
        let registry = Arc::new(SegmentRegistry::new(Arc::new(InMemoryDefinitionStore::default())));
        let refresher = Arc::new(RegistryRefresher::new(
            registry,
            RegistryConfig { enabled: false, refresh_interval_seconds: 1 },
        ));
        refresher.clone().start().await;
        assert!(refresher.last_refresh().is_none());
    }

    #[tokio::test]
    async fn do_refresh_records_success() {
        let store = Arc::new(InMemoryDefinitionStore::new(vec![segment("readers")]));
        let registry = Arc::new(SegmentRegistry::new(store));
        let refresher = RegistryRefresher::new(registry.clone(), RegistryConfig::default());

        refresher.do_refresh().await;
        assert!(refresher.last_refresh().is_some());
        assert!(registry.current().get("readers").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_refreshes_on_interval() {
        let store = Arc::new(InMemoryDefinitionStore::new(vec![segment("readers")]));
        let registry = Arc::new(SegmentRegistry::new(store.clone()));
        let refresher = Arc::new(RegistryRefresher::new(
            registry.clone(),
            RegistryConfig { enabled: true, refresh_interval_seconds: 60 },
        ));
        let handle = refresher.clone().spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.current().generation, 1);

        store.upsert(Segment { id: 2, ..segment("buyers") });
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(registry.current().generation, 2);
        assert!(registry.current().get("buyers").is_some());

        handle.abort();
    }
}
