pub mod backup_settings;
pub mod records;
pub mod reference;
