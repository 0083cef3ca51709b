use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backup::{
    BackupError, CheckOutcome, Clock, DeliveryError, DocumentChannel, RecordSource,
    SettingsRepository,
};
use crate::constants::BACKUP_FILE_PREFIX;
use crate::report::{
    report_file_name, span_caption, timestamp_bounds, ReportArtifact, ReportRenderer,
};
use crate::store::operations::backup_settings::{BackupPeriod, BackupSettings};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// How often the loop wakes to check whether a backup is due.
    pub poll_interval: Duration,
    pub delivery_timeout: Duration,
    /// Offset used for file names and captions.
    pub utc_offset: FixedOffset,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            delivery_timeout: Duration::from_secs(60),
            utc_offset: Utc.fix(),
        }
    }
}

/// A user configuration change. The marker is not part of it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub enabled: bool,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub period: BackupPeriod,
}

struct PollLoop {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Periodically sends every weighing recorded since the last confirmed
/// delivery.
///
/// Retry policy: none beyond re-selection. A failed attempt leaves the marker
/// where it was, so the next due-check selects the same window again (plus
/// anything recorded since). Delivery is at-least-once: if the marker cannot
/// be persisted after a confirmed send, the same rows are sent again.
pub struct BackupScheduler {
    settings: Arc<dyn SettingsRepository>,
    records: Arc<dyn RecordSource>,
    renderer: Arc<dyn ReportRenderer>,
    channel: Arc<dyn DocumentChannel>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    /// Serializes due-checks and configuration saves.
    gate: Mutex<()>,
    poller: StdMutex<Option<PollLoop>>,
}

impl BackupScheduler {
    pub fn new(
        settings: Arc<dyn SettingsRepository>,
        records: Arc<dyn RecordSource>,
        renderer: Arc<dyn ReportRenderer>,
        channel: Arc<dyn DocumentChannel>,
        clock: Arc<dyn Clock>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            settings,
            records,
            renderer,
            channel,
            clock,
            options,
            gate: Mutex::new(()),
            poller: StdMutex::new(None),
        }
    }

    /// Starts the poll loop, replacing any loop already running.
    /// The first check runs one poll interval after the call.
    pub fn start(self: &Arc<Self>) {
        self.stop();

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let weak: Weak<Self> = Arc::downgrade(self);
        let poll = self.options.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + poll, poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let Some(scheduler) = weak.upgrade() else { break };
                        scheduler.check_now(false).await;
                    }
                }
            }
            tracing::debug!("Backup poll loop exited");
        });

        *self.lock_poller() = Some(PollLoop { stop_tx, task });
        tracing::info!(poll_secs = poll.as_secs_f64(), "Backup scheduler started");
    }

    /// Stops the poll loop. A due-check already running is left to finish.
    pub fn stop(&self) {
        if let Some(poll_loop) = self.lock_poller().take() {
            let _ = poll_loop.stop_tx.send(());
            tracing::info!("Backup scheduler stopped");
        }
    }

    /// Stops the loop and waits for an in-flight check to complete.
    pub async fn shutdown(&self) {
        let poll_loop = self.lock_poller().take();
        if let Some(poll_loop) = poll_loop {
            let _ = poll_loop.stop_tx.send(());
            if let Err(e) = poll_loop.task.await {
                tracing::warn!(error = %e, "Backup poll loop ended abnormally");
            }
            tracing::info!("Backup scheduler shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_poller()
            .as_ref()
            .is_some_and(|poll_loop| !poll_loop.task.is_finished())
    }

    /// One due-check outside the cadence. Failures are logged, never returned.
    pub async fn check_now(&self, force: bool) {
        match self.check_and_send(force).await {
            Ok(CheckOutcome::Delivered { records, marker }) => {
                tracing::info!(records, marker = %marker, "Backup delivered")
            }
            Ok(outcome) => tracing::debug!(?outcome, force, "Backup check finished"),
            Err(e) => tracing::error!(error = %e, force, "Backup check failed"),
        }
    }

    /// Runs the due-check and reports what happened.
    pub async fn check_and_send(&self, force: bool) -> Result<CheckOutcome, BackupError> {
        let _gate = self.gate.lock().await;
        self.run_check(force).await
    }

    pub fn current_settings(&self) -> Result<BackupSettings, BackupError> {
        Ok(self.settings.load()?)
    }

    /// Applies a configuration change without touching the marker.
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<BackupSettings, BackupError> {
        let _gate = self.gate.lock().await;
        let current = self.settings.load()?;
        let updated = BackupSettings {
            enabled: update.enabled,
            recipient: update.recipient.trim().to_string(),
            period: update.period,
            last_sent_marker: current.last_sent_marker,
        };
        self.settings.save(&updated)?;
        tracing::info!(
            enabled = updated.enabled,
            period = ?updated.period,
            "Backup settings updated"
        );
        Ok(updated)
    }

    async fn run_check(&self, force: bool) -> Result<CheckOutcome, BackupError> {
        let settings = self.settings.load()?;
        if !settings.enabled {
            return Ok(CheckOutcome::Disabled);
        }
        let recipient = settings.recipient.trim();
        if recipient.is_empty() {
            return Ok(CheckOutcome::NotConfigured);
        }

        let now = self.clock.now();
        let from = settings.last_sent_marker.unwrap_or_default();
        let due_at = from + settings.period.as_duration();
        if !force && now < due_at {
            return Ok(CheckOutcome::NotDue { due_at });
        }

        let entries = self.records.records_in_range(from, now)?;
        let Some((first, marker)) = timestamp_bounds(&entries) else {
            return Ok(CheckOutcome::NothingNew { from, to: now });
        };
        let count = entries.len();

        let offset = self.options.utc_offset;
        let caption = span_caption(BACKUP_FILE_PREFIX, first, marker, offset);
        let file_name = report_file_name(BACKUP_FILE_PREFIX, now, offset, self.renderer.format());
        let artifact = ReportArtifact::new(self.renderer.output_path(&file_name));

        let renderer = Arc::clone(&self.renderer);
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&entries, &file_name))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))??;
        let _rendered_elsewhere =
            (rendered != artifact.path()).then(|| ReportArtifact::new(rendered.clone()));

        tracing::info!(records = count, from = %from, to = %now, "Sending backup");
        let delivery = self
            .channel
            .send_document(recipient, &rendered, &caption);
        match tokio::time::timeout(self.options.delivery_timeout, delivery).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(DeliveryError::Timeout.into()),
        }

        let updated = BackupSettings {
            last_sent_marker: Some(marker),
            ..settings
        };
        if let Err(e) = self.settings.save(&updated) {
            tracing::error!(
                error = %e,
                records = count,
                "Backup delivered but marker not saved; these records will be sent again"
            );
            return Err(e.into());
        }

        Ok(CheckOutcome::Delivered {
            records: count,
            marker,
        })
    }

    fn lock_poller(&self) -> std::sync::MutexGuard<'_, Option<PollLoop>> {
        self.poller.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
    use async_trait::async_trait;

    use super::*;
    use crate::history::HistoryEntry;
    use crate::report::{ReportError, ReportFormat};
    use crate::store::StoreError;

    struct FakeSettings {
        inner: StdMutex<BackupSettings>,
        saves: AtomicUsize,
        fail_save: AtomicBool,
    }

    impl FakeSettings {
        fn new(settings: BackupSettings) -> Self {
            Self {
                inner: StdMutex::new(settings),
                saves: AtomicUsize::new(0),
                fail_save: AtomicBool::new(false),
            }
        }

        fn marker(&self) -> Option<DateTime<Utc>> {
            self.inner.lock().unwrap().last_sent_marker
        }
    }

    impl SettingsRepository for FakeSettings {
        fn load(&self) -> Result<BackupSettings, StoreError> {
            Ok(self.inner.lock().unwrap().clone())
        }

        fn save(&self, settings: &BackupSettings) -> Result<(), StoreError> {
            if self.fail_save.load(Ordering::SeqCst) {
                return Err(StoreError::Validation("disk full".into()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.inner.lock().unwrap() = settings.clone();
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRecords {
        rows: StdMutex<Vec<HistoryEntry>>,
        queries: AtomicUsize,
    }

    impl FakeRecords {
        fn push(&self, id: &str, timestamp: DateTime<Utc>) {
            self.rows.lock().unwrap().push(HistoryEntry {
                id: id.to_string(),
                timestamp,
                vehicle_name: "MAN".into(),
                cargo_display: "Wheat".into(),
                net_weight: 9_000.0,
                from_name: "Field #1".into(),
                to_name: "Storage".into(),
                source_name: String::new(),
                comment: String::new(),
            });
        }
    }

    impl RecordSource for FakeRecords {
        fn records_in_range(
            &self,
            from_exclusive: DateTime<Utc>,
            to_inclusive: DateTime<Utc>,
        ) -> Result<Vec<HistoryEntry>, StoreError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.timestamp > from_exclusive && e.timestamp <= to_inclusive)
                .cloned()
                .collect())
        }
    }

    struct FakeRenderer {
        dir: PathBuf,
        renders: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeRenderer {
        fn new(dir: &Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                renders: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }

        fn files_left(&self) -> usize {
            std::fs::read_dir(&self.dir).unwrap().count()
        }
    }

    impl ReportRenderer for FakeRenderer {
        fn format(&self) -> ReportFormat {
            ReportFormat::Csv
        }

        fn output_path(&self, file_name: &str) -> PathBuf {
            self.dir.join(file_name)
        }

        fn render(&self, entries: &[HistoryEntry], file_name: &str) -> Result<PathBuf, ReportError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            let path = self.output_path(file_name);
            std::fs::write(&path, format!("{} rows", entries.len()))?;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReportError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            Ok(path)
        }
    }

    #[derive(Debug, Clone)]
    struct Sent {
        recipient: String,
        caption: String,
        file_existed: bool,
    }

    #[derive(Default)]
    struct FakeChannel {
        sent: StdMutex<Vec<Sent>>,
        attempts: AtomicUsize,
        fail: AtomicBool,
        delay: StdMutex<Option<Duration>>,
    }

    impl FakeChannel {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DocumentChannel for FakeChannel {
        async fn send_document(
            &self,
            recipient: &str,
            path: &Path,
            caption: &str,
        ) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(DeliveryError::Api {
                    status: 400,
                    message: "chat not found".into(),
                });
            }
            self.sent.lock().unwrap().push(Sent {
                recipient: recipient.to_string(),
                caption: caption.to_string(),
                file_existed: path.exists(),
            });
            Ok(())
        }
    }

    struct FixedClock(StdMutex<DateTime<Utc>>);

    impl FixedClock {
        fn set(&self, now: DateTime<Utc>) {
            *self.0.lock().unwrap() = now;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    struct Harness {
        scheduler: Arc<BackupScheduler>,
        settings: Arc<FakeSettings>,
        records: Arc<FakeRecords>,
        renderer: Arc<FakeRenderer>,
        channel: Arc<FakeChannel>,
        clock: Arc<FixedClock>,
        _dir: tempfile::TempDir,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap()
    }

    fn enabled(period: BackupPeriod, marker: Option<DateTime<Utc>>) -> BackupSettings {
        BackupSettings {
            enabled: true,
            recipient: "-1001234567890".into(),
            period,
            last_sent_marker: marker,
        }
    }

    fn harness_with(settings: BackupSettings, options: SchedulerOptions) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(FakeSettings::new(settings));
        let records = Arc::new(FakeRecords::default());
        let renderer = Arc::new(FakeRenderer::new(dir.path()));
        let channel = Arc::new(FakeChannel::default());
        let clock = Arc::new(FixedClock(StdMutex::new(now())));
        let scheduler = Arc::new(BackupScheduler::new(
            settings.clone(),
            records.clone(),
            renderer.clone(),
            channel.clone(),
            clock.clone(),
            options,
        ));
        Harness {
            scheduler,
            settings,
            records,
            renderer,
            channel,
            clock,
            _dir: dir,
        }
    }

    fn harness(settings: BackupSettings) -> Harness {
        harness_with(settings, SchedulerOptions::default())
    }

    #[tokio::test]
    async fn first_delivery_sends_everything_and_sets_marker_to_newest_record() {
        let h = harness(enabled(BackupPeriod::Daily, None));
        let t1 = now() - ChronoDuration::hours(3);
        let t2 = now() - ChronoDuration::hours(2);
        let t3 = now() - ChronoDuration::hours(1);
        h.records.push("r2", t2);
        h.records.push("r3", t3);
        h.records.push("r1", t1);

        let outcome = h.scheduler.check_and_send(false).await.unwrap();

        assert_eq!(outcome, CheckOutcome::Delivered { records: 3, marker: t3 });
        assert_eq!(h.settings.marker(), Some(t3));
        let sent = h.channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "-1001234567890");
        assert_eq!(sent[0].caption, "Backup (01.09.2024 09:00 - 01.09.2024 11:00)");
        assert!(sent[0].file_existed);
        assert_eq!(h.renderer.files_left(), 0);
    }

    #[tokio::test]
    async fn immediate_repeat_is_throttled() {
        let h = harness(enabled(BackupPeriod::Daily, None));
        h.records.push("r1", now() - ChronoDuration::minutes(5));
        h.scheduler.check_and_send(false).await.unwrap();
        let marker = h.settings.marker();
        let queries = h.records.queries.load(Ordering::SeqCst);

        let outcome = h.scheduler.check_and_send(false).await.unwrap();

        assert!(matches!(outcome, CheckOutcome::NotDue { .. }));
        assert_eq!(h.channel.sent().len(), 1);
        assert_eq!(h.settings.marker(), marker);
        assert_eq!(h.records.queries.load(Ordering::SeqCst), queries);
    }

    #[tokio::test]
    async fn due_but_empty_window_keeps_marker() {
        let marker = now() - ChronoDuration::hours(2);
        let h = harness(enabled(BackupPeriod::Hourly, Some(marker)));
        h.records.push("old", marker - ChronoDuration::minutes(1));

        let outcome = h.scheduler.check_and_send(false).await.unwrap();

        assert_eq!(outcome, CheckOutcome::NothingNew { from: marker, to: now() });
        assert_eq!(h.settings.marker(), Some(marker));
        assert_eq!(h.settings.saves.load(Ordering::SeqCst), 0);
        assert_eq!(h.renderer.renders.load(Ordering::SeqCst), 0);
        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn disabled_backup_does_not_query() {
        let mut settings = enabled(BackupPeriod::Hourly, None);
        settings.enabled = false;
        let h = harness(settings);
        h.records.push("r1", now());

        let outcome = h.scheduler.check_and_send(true).await.unwrap();

        assert_eq!(outcome, CheckOutcome::Disabled);
        assert_eq!(h.records.queries.load(Ordering::SeqCst), 0);
        assert!(h.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn blank_recipient_is_not_configured() {
        let mut settings = enabled(BackupPeriod::Hourly, None);
        settings.recipient = "   ".into();
        let h = harness(settings);

        let outcome = h.scheduler.check_and_send(true).await.unwrap();
        assert_eq!(outcome, CheckOutcome::NotConfigured);
        assert_eq!(h.records.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_marker_and_retry_reselects_same_rows() {
        let marker = now() - ChronoDuration::days(2);
        let h = harness(enabled(BackupPeriod::Daily, Some(marker)));
        h.records.push("a", now() - ChronoDuration::hours(5));
        h.records.push("b", now() - ChronoDuration::hours(4));
        h.channel.fail.store(true, Ordering::SeqCst);

        let err = h.scheduler.check_and_send(false).await.unwrap_err();

        assert!(matches!(err, BackupError::Delivery(DeliveryError::Api { .. })));
        assert_eq!(h.settings.marker(), Some(marker));
        assert_eq!(h.renderer.files_left(), 0);

        h.channel.fail.store(false, Ordering::SeqCst);
        let outcome = h.scheduler.check_and_send(true).await.unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::Delivered {
                records: 2,
                marker: now() - ChronoDuration::hours(4)
            }
        );
        assert_eq!(h.channel.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_checks_deliver_once() {
        let h = harness(enabled(BackupPeriod::Daily, None));
        h.records.push("a", now() - ChronoDuration::minutes(30));
        h.records.push("b", now() - ChronoDuration::minutes(10));
        *h.channel.delay.lock().unwrap() = Some(Duration::from_millis(50));

        let (first, second) = tokio::join!(
            h.scheduler.check_and_send(true),
            h.scheduler.check_and_send(true)
        );
        let outcomes = [first.unwrap(), second.unwrap()];

        let delivered = outcomes
            .iter()
            .filter(|o| matches!(o, CheckOutcome::Delivered { .. }))
            .count();
        assert_eq!(delivered, 1);
        assert_eq!(h.channel.sent().len(), 1);
        assert_eq!(h.settings.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn marker_row_is_excluded_and_row_at_now_is_included() {
        let marker = now() - ChronoDuration::hours(30);
        let h = harness(enabled(BackupPeriod::Daily, Some(marker)));
        h.records.push("at-marker", marker);
        h.records.push("at-now", now());

        let outcome = h.scheduler.check_and_send(false).await.unwrap();

        assert_eq!(outcome, CheckOutcome::Delivered { records: 1, marker: now() });
    }

    #[tokio::test]
    async fn throttle_opens_exactly_at_period_boundary() {
        let marker = now() - ChronoDuration::hours(1);
        let h = harness(enabled(BackupPeriod::Hourly, Some(marker)));
        h.records.push("r", marker + ChronoDuration::minutes(30));

        h.clock.set(marker + ChronoDuration::hours(1) - ChronoDuration::seconds(1));
        let early = h.scheduler.check_and_send(false).await.unwrap();
        assert!(matches!(early, CheckOutcome::NotDue { .. }));
        assert_eq!(h.records.queries.load(Ordering::SeqCst), 0);

        h.clock.set(marker + ChronoDuration::hours(1) + ChronoDuration::seconds(1));
        let late = h.scheduler.check_and_send(false).await.unwrap();
        assert!(matches!(late, CheckOutcome::Delivered { records: 1, .. }));
    }

    #[tokio::test]
    async fn force_bypasses_throttle() {
        let marker = now() - ChronoDuration::minutes(10);
        let h = harness(enabled(BackupPeriod::Weekly, Some(marker)));
        h.records.push("r", now() - ChronoDuration::minutes(1));

        assert!(matches!(
            h.scheduler.check_and_send(false).await.unwrap(),
            CheckOutcome::NotDue { .. }
        ));
        assert!(matches!(
            h.scheduler.check_and_send(true).await.unwrap(),
            CheckOutcome::Delivered { records: 1, .. }
        ));
    }

    #[tokio::test]
    async fn render_failure_cleans_up_and_keeps_marker() {
        let h = harness(enabled(BackupPeriod::Daily, None));
        h.records.push("r", now() - ChronoDuration::minutes(1));
        h.renderer.fail.store(true, Ordering::SeqCst);

        let err = h.scheduler.check_and_send(true).await.unwrap_err();

        assert!(matches!(err, BackupError::Render(_)));
        assert_eq!(h.renderer.files_left(), 0);
        assert!(h.settings.marker().is_none());
        assert_eq!(h.channel.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_delivery_times_out() {
        let options = SchedulerOptions {
            delivery_timeout: Duration::from_millis(20),
            ..SchedulerOptions::default()
        };
        let h = harness_with(enabled(BackupPeriod::Daily, None), options);
        h.records.push("r", now() - ChronoDuration::minutes(1));
        *h.channel.delay.lock().unwrap() = Some(Duration::from_millis(500));

        let err = h.scheduler.check_and_send(true).await.unwrap_err();

        assert!(matches!(err, BackupError::Delivery(DeliveryError::Timeout)));
        assert!(h.settings.marker().is_none());
        assert_eq!(h.renderer.files_left(), 0);
    }

    #[tokio::test]
    async fn marker_save_failure_is_reported_after_delivery() {
        let h = harness(enabled(BackupPeriod::Daily, None));
        h.records.push("r", now() - ChronoDuration::minutes(1));
        h.settings.fail_save.store(true, Ordering::SeqCst);

        let err = h.scheduler.check_and_send(true).await.unwrap_err();

        assert!(matches!(err, BackupError::Store(_)));
        assert_eq!(h.channel.sent().len(), 1);
        assert!(h.settings.marker().is_none());
    }

    #[tokio::test]
    async fn update_settings_preserves_marker() {
        let marker = now() - ChronoDuration::hours(3);
        let h = harness(enabled(BackupPeriod::Daily, Some(marker)));

        let updated = h
            .scheduler
            .update_settings(SettingsUpdate {
                enabled: true,
                recipient: "  @dispatch_office ".into(),
                period: BackupPeriod::Hourly,
            })
            .await
            .unwrap();

        assert_eq!(updated.recipient, "@dispatch_office");
        assert_eq!(updated.period, BackupPeriod::Hourly);
        assert_eq!(updated.last_sent_marker, Some(marker));
        assert_eq!(h.settings.marker(), Some(marker));
    }

    #[tokio::test]
    async fn check_now_swallows_failures() {
        let h = harness(enabled(BackupPeriod::Daily, None));
        h.records.push("r", now() - ChronoDuration::minutes(1));
        h.channel.fail.store(true, Ordering::SeqCst);

        h.scheduler.check_now(true).await;

        assert_eq!(h.channel.attempts.load(Ordering::SeqCst), 1);
        assert!(h.settings.marker().is_none());
    }

    #[tokio::test]
    async fn poll_loop_delivers_and_stops() {
        let options = SchedulerOptions {
            poll_interval: Duration::from_millis(20),
            ..SchedulerOptions::default()
        };
        let h = harness_with(enabled(BackupPeriod::Daily, None), options);
        h.records.push("r", now() - ChronoDuration::minutes(1));

        h.scheduler.start();
        h.scheduler.start();
        assert!(h.scheduler.is_running());

        let deadline = Instant::now() + Duration::from_secs(2);
        while h.channel.sent().is_empty() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.channel.sent().len(), 1);

        h.scheduler.shutdown().await;
        assert!(!h.scheduler.is_running());

        // Further ticks would be throttled anyway; nothing else is sent.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(h.channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let h = harness(BackupSettings::default());
        h.scheduler.stop();
        h.scheduler.shutdown().await;
        assert!(!h.scheduler.is_running());
    }
}
