use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, Offset, TimeZone, Utc};
use async_trait::async_trait;
use tempfile::TempDir;

use scale_logbook::backup::{
    BackupScheduler, Clock, DeliveryError, DocumentChannel, SchedulerOptions,
};
use scale_logbook::config::{
    BackupConfig, Config, ReportConfig, TelegramConfig, WorkerConfig,
};
use scale_logbook::report::spreadsheet::CsvReportRenderer;
use scale_logbook::report::ReportFormat;
use scale_logbook::routes::build_router;
use scale_logbook::state::{AppState, Services};
use scale_logbook::store::Store;

/// A document handed to the fake channel, with the file contents read at send time.
#[derive(Debug, Clone)]
pub struct SentDocument {
    pub recipient: String,
    pub caption: String,
    pub file_name: String,
    pub contents: String,
}

/// Records every document instead of talking to a bot API.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentDocument>>,
    failure: Mutex<Option<String>>,
    read_delay: Mutex<Option<Duration>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<SentDocument> {
        self.sent.lock().expect("sent lock").clone()
    }

    /// Makes every following send fail with an API rejection.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().expect("failure lock") = Some(message.to_string());
    }

    pub fn recover(&self) {
        *self.failure.lock().expect("failure lock") = None;
    }

    /// Waits `delay` before reading each document, like a slow upload.
    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().expect("delay lock") = Some(delay);
    }
}

#[async_trait]
impl DocumentChannel for RecordingChannel {
    async fn send_document(
        &self,
        recipient: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError> {
        let failure = self.failure.lock().expect("failure lock").clone();
        if let Some(message) = failure {
            return Err(DeliveryError::Api {
                status: 400,
                message,
            });
        }
        let delay = *self.read_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let contents = tokio::fs::read_to_string(path).await?;
        self.sent.lock().expect("sent lock").push(SentDocument {
            recipient: recipient.to_string(),
            caption: caption.to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            contents,
        });
        Ok(())
    }
}

/// Clock pinned to a settable instant.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub store: Arc<Store>,
    pub scheduler: Arc<BackupScheduler>,
    pub channel: Arc<RecordingChannel>,
    pub clock: Arc<ManualClock>,
    pub report_dir: PathBuf,
    _temp_dir: TempDir,
}

pub fn test_config(temp_dir: &Path) -> Config {
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: temp_dir
            .join("scale-logbook-test.sled")
            .to_string_lossy()
            .to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        report: ReportConfig {
            output_dir: temp_dir.join("reports").to_string_lossy().to_string(),
            format: ReportFormat::Csv,
            utc_offset_minutes: 0,
        },
        telegram: TelegramConfig {
            bot_token: String::new(),
            api_base: "http://127.0.0.1:9".to_string(),
            timeout_secs: 5,
        },
        backup: BackupConfig {
            scheduler_enabled: false,
            poll_interval_secs: 60,
            delivery_timeout_secs: 5,
        },
        worker: WorkerConfig {
            is_leader: false,
            report_retention_hours: 24,
        },
    }
}

/// 2024-09-02 12:00 UTC.
pub fn default_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 12, 0, 0).unwrap()
}

pub async fn spawn_test_app() -> TestApp {
    spawn_test_app_at(default_now()).await
}

pub async fn spawn_test_app_at(now: DateTime<Utc>) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp_dir.path());

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let report_dir = PathBuf::from(&config.report.output_dir);
    let channel = Arc::new(RecordingChannel::default());
    let clock = Arc::new(ManualClock::at(now));

    let services = Services {
        renderer: Arc::new(CsvReportRenderer::new(report_dir.clone(), Utc.fix())),
        channel: channel.clone(),
        clock: clock.clone(),
    };

    let scheduler = Arc::new(BackupScheduler::new(
        store.clone(),
        store.clone(),
        services.renderer.clone(),
        services.channel.clone(),
        services.clock.clone(),
        SchedulerOptions {
            poll_interval: Duration::from_secs(config.backup.poll_interval_secs),
            delivery_timeout: Duration::from_secs(config.backup.delivery_timeout_secs),
            utc_offset: Utc.fix(),
        },
    ));

    let state = AppState::new(store.clone(), scheduler.clone(), services, &config);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        store,
        scheduler,
        channel,
        clock,
        report_dir,
        _temp_dir: temp_dir,
    }
}
