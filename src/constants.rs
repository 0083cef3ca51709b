/// Settings key under which the backup configuration document is stored
pub const BACKUP_SETTINGS_KEY: &str = "backup_settings_v1";

/// Shift windows open at 06:00 local time
pub const SHIFT_START_HOUR: u32 = 6;

/// ...and close at 03:00 on the following day
pub const SHIFT_END_HOUR: u32 = 3;

/// Kilograms per tonne, for report totals
pub const KG_PER_TONNE: f64 = 1000.0;

/// Prefix of files produced by the scheduled backup
pub const BACKUP_FILE_PREFIX: &str = "Backup";

/// Prefix of files produced by a manual history export
pub const REPORT_FILE_PREFIX: &str = "Report";

/// Timestamp layout used in captions and report rows
pub const DISPLAY_DATETIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Timestamp layout embedded in report file names
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Recipient handles: `@` followed by this many word characters
pub const RECIPIENT_HANDLE_MIN_LEN: usize = 5;
pub const RECIPIENT_HANDLE_MAX_LEN: usize = 32;
