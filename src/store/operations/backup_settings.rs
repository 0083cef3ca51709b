use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::BACKUP_SETTINGS_KEY;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum BackupPeriod {
    Hourly,
    TwelveHours,
    #[default]
    Daily,
    Weekly,
}

impl BackupPeriod {
    pub const ALL: [BackupPeriod; 4] = [
        BackupPeriod::Hourly,
        BackupPeriod::TwelveHours,
        BackupPeriod::Daily,
        BackupPeriod::Weekly,
    ];

    pub fn as_duration(self) -> Duration {
        match self {
            BackupPeriod::Hourly => Duration::hours(1),
            BackupPeriod::TwelveHours => Duration::hours(12),
            BackupPeriod::Daily => Duration::days(1),
            BackupPeriod::Weekly => Duration::weeks(1),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BackupPeriod::Hourly => "Every hour",
            BackupPeriod::TwelveHours => "Every 12 hours",
            BackupPeriod::Daily => "Once a day",
            BackupPeriod::Weekly => "Once a week",
        }
    }
}

/// Persisted configuration of the scheduled backup.
///
/// `last_sent_marker` is the timestamp of the newest record in the last
/// report the channel confirmed. It only moves forward, and only the backup
/// scheduler writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub period: BackupPeriod,
    #[serde(default)]
    pub last_sent_marker: Option<DateTime<Utc>>,
}

impl Store {
    pub fn get_backup_settings(&self) -> Result<BackupSettings, StoreError> {
        match self.settings.get(BACKUP_SETTINGS_KEY.as_bytes())? {
            Some(raw) => match serde_json::from_slice::<BackupSettings>(&raw) {
                Ok(parsed) => Ok(parsed),
                Err(error) => {
                    tracing::error!(error = %error, "Failed to deserialize backup settings");
                    Err(StoreError::Serialization(error))
                }
            },
            None => Ok(BackupSettings::default()),
        }
    }

    pub fn save_backup_settings(&self, settings: &BackupSettings) -> Result<(), StoreError> {
        self.settings
            .insert(BACKUP_SETTINGS_KEY.as_bytes(), Self::serialize(settings)?)?;
        Ok(())
    }
}
