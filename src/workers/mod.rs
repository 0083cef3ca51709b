pub mod report_sweep;
pub mod store_flush;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::WorkerConfig;
use crate::store::Store;

/// Upper bound for a single housekeeping run.
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Grace period between the shutdown signal and stopping the cron scheduler.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    ReportSweep,
    StoreFlush,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReportSweep => "report_sweep",
            Self::StoreFlush => "store_flush",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

/// Set while a job body runs; a tick that finds it set is skipped.
#[derive(Clone, Default)]
struct RunFlag(Arc<AtomicBool>);

struct RunGuard(Arc<AtomicBool>);

impl RunFlag {
    fn try_acquire(&self) -> Option<RunGuard> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard(self.0.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Housekeeping around the report directory and the store. The backup itself
/// runs on its own poll loop in [`crate::backup::BackupScheduler`].
pub struct WorkerManager {
    store: Arc<Store>,
    report_dir: PathBuf,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        report_dir: PathBuf,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            report_dir,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Jobs this instance would schedule. Followers schedule nothing.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }
        vec![
            JobSpec {
                name: WorkerName::ReportSweep,
                cron: "0 15 * * * *",
                enabled: self.config.report_retention_hours > 0,
            },
            JobSpec {
                name: WorkerName::StoreFlush,
                cron: "0 */5 * * * *",
                enabled: true,
            },
        ]
    }

    /// Runs the cron scheduler until the shutdown signal arrives.
    pub async fn start(mut self) -> Result<(), JobSchedulerError> {
        if !self.config.is_leader {
            tracing::info!("Not the worker leader; housekeeping jobs disabled");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;
        for spec in self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Housekeeping job disabled");
                continue;
            }
            let job = self.build_job(&spec)?;
            scheduler.add(job).await?;
            tracing::info!(name = spec.name.as_str(), cron = spec.cron, "Housekeeping job scheduled");
        }
        scheduler.start().await?;
        tracing::info!("Worker manager started");

        let _ = self.shutdown_rx.recv().await;
        tracing::info!(drain_ms = DRAIN_TIMEOUT.as_millis() as u64, "Worker manager draining");
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        scheduler.shutdown().await
    }

    fn build_job(&self, spec: &JobSpec) -> Result<Job, JobSchedulerError> {
        let body: Arc<dyn Fn() -> JobFuture + Send + Sync> = match spec.name {
            WorkerName::ReportSweep => {
                let dir = self.report_dir.clone();
                let retention = Duration::from_secs(self.config.report_retention_hours * 3600);
                Arc::new(move || -> JobFuture {
                    let dir = dir.clone();
                    Box::pin(async move { report_sweep::run(&dir, retention).await })
                })
            }
            WorkerName::StoreFlush => {
                let store = self.store.clone();
                Arc::new(move || -> JobFuture {
                    let store = store.clone();
                    Box::pin(async move { store_flush::run(&store).await })
                })
            }
        };
        guarded_job(spec.cron, spec.name, body)
    }
}

/// Wraps `body` so overlapping ticks are skipped and a run cannot exceed
/// [`WORKER_TIMEOUT`].
fn guarded_job(
    cron: &str,
    name: WorkerName,
    body: Arc<dyn Fn() -> JobFuture + Send + Sync>,
) -> Result<Job, JobSchedulerError> {
    let flag = RunFlag::default();
    Job::new_async(cron, move |_uuid, _lock| {
        let Some(guard) = flag.try_acquire() else {
            tracing::warn!(worker = name.as_str(), "Previous run still in progress; tick skipped");
            return Box::pin(async {});
        };
        let run = body();
        Box::pin(async move {
            if tokio::time::timeout(WORKER_TIMEOUT, run).await.is_err() {
                tracing::error!(
                    worker = name.as_str(),
                    timeout_secs = WORKER_TIMEOUT.as_secs(),
                    "Housekeeping job timed out"
                );
            }
            drop(guard);
        })
    })
}
