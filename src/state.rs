use std::sync::Arc;
use std::time::Instant;

use chrono::FixedOffset;

use crate::backup::{BackupScheduler, Clock, DocumentChannel};
use crate::config::Config;
use crate::report::ReportRenderer;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    scheduler: Arc<BackupScheduler>,
    renderer: Arc<dyn ReportRenderer>,
    channel: Arc<dyn DocumentChannel>,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
    started_at: Instant,
}

/// Collaborators shared by the HTTP surface and the backup scheduler.
pub struct Services {
    pub renderer: Arc<dyn ReportRenderer>,
    pub channel: Arc<dyn DocumentChannel>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        scheduler: Arc<BackupScheduler>,
        services: Services,
        config: &Config,
    ) -> Self {
        Self {
            store,
            scheduler,
            renderer: services.renderer,
            channel: services.channel,
            clock: services.clock,
            config: Arc::new(config.clone()),
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<BackupScheduler> {
        &self.scheduler
    }

    pub fn renderer(&self) -> &Arc<dyn ReportRenderer> {
        &self.renderer
    }

    pub fn channel(&self) -> &dyn DocumentChannel {
        self.channel.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn utc_offset(&self) -> FixedOffset {
        self.config.report.utc_offset()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
