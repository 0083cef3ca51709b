use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};

use crate::report::ReportFormat;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub report: ReportConfig,
    pub telegram: TelegramConfig,
    pub backup: BackupConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub output_dir: String,
    pub format: ReportFormat,
    /// Offset applied to timestamps in rendered reports, captions and shift windows.
    pub utc_offset_minutes: i32,
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub scheduler_enabled: bool,
    pub poll_interval_secs: u64,
    pub delivery_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub report_retention_hours: u64,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"***REDACTED***")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/scale-logbook.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            report: ReportConfig {
                output_dir: env_or("REPORT_DIR", "./data/reports"),
                format: env_or_parse("REPORT_FORMAT", ReportFormat::Xlsx),
                utc_offset_minutes: env_or_parse("REPORT_UTC_OFFSET_MINUTES", 0_i32),
            },
            telegram: TelegramConfig {
                bot_token: env_or("TELEGRAM_BOT_TOKEN", ""),
                api_base: env_or("TELEGRAM_API_BASE", "https://api.telegram.org"),
                timeout_secs: env_or_parse("TELEGRAM_TIMEOUT_SECS", 60_u64),
            },
            backup: BackupConfig {
                scheduler_enabled: env_or_bool("BACKUP_SCHEDULER_ENABLED", true),
                poll_interval_secs: env_or_parse("BACKUP_POLL_INTERVAL_SECS", 60_u64),
                delivery_timeout_secs: env_or_parse("BACKUP_DELIVERY_TIMEOUT_SECS", 60_u64),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                report_retention_hours: env_or_parse("REPORT_RETENTION_HOURS", 24_u64),
            },
        }
    }
}

impl ReportConfig {
    /// Out-of-range offsets fall back to UTC.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
