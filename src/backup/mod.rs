//! Scheduled backup of new weighings to a messaging recipient.
//!
//! The scheduler only sees its collaborators through the traits below, so the
//! store, the renderer, the transport and the clock are all swappable.

pub mod scheduler;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::history::HistoryEntry;
use crate::report::ReportError;
use crate::store::operations::backup_settings::BackupSettings;
use crate::store::{Store, StoreError};

pub use scheduler::{BackupScheduler, SchedulerOptions, SettingsUpdate};

pub trait SettingsRepository: Send + Sync {
    fn load(&self) -> Result<BackupSettings, StoreError>;
    fn save(&self, settings: &BackupSettings) -> Result<(), StoreError>;
}

pub trait RecordSource: Send + Sync {
    /// Rows with `from_exclusive < timestamp <= to_inclusive`, any order.
    fn records_in_range(
        &self,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[async_trait]
pub trait DocumentChannel: Send + Sync {
    async fn send_document(
        &self,
        recipient: &str,
        path: &Path,
        caption: &str,
    ) -> Result<(), DeliveryError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl SettingsRepository for Store {
    fn load(&self) -> Result<BackupSettings, StoreError> {
        self.get_backup_settings()
    }

    fn save(&self, settings: &BackupSettings) -> Result<(), StoreError> {
        self.save_backup_settings(settings)?;
        // The marker is the only record of what was already sent.
        self.flush()
    }
}

impl RecordSource for Store {
    fn records_in_range(
        &self,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let records = self.weighing_records_in_range(from_exclusive, to_inclusive)?;
        self.resolve_history(records)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery channel is not configured")]
    NotConfigured,
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("delivery timed out")]
    Timeout,
    #[error("delivery network error: {0}")]
    Network(String),
    #[error("delivery rejected: status={status}, message={message}")]
    Api { status: u16, message: String },
    #[error("delivery io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("report rendering failed: {0}")]
    Render(#[from] ReportError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("background task failed: {0}")]
    Task(String),
}

/// What a due-check did. Everything except `Delivered` left the marker alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CheckOutcome {
    Disabled,
    NotConfigured,
    #[serde(rename_all = "camelCase")]
    NotDue { due_at: DateTime<Utc> },
    NothingNew { from: DateTime<Utc>, to: DateTime<Utc> },
    Delivered { records: usize, marker: DateTime<Utc> },
}
