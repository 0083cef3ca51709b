//! Forward-only schema steps, applied in order at startup.
//!
//! The applied version lives in the `settings` tree as a big-endian `u32`.
//! Every step is idempotent: a crash after a step but before its version is
//! recorded replays the step on the next start.

use crate::constants::BACKUP_SETTINGS_KEY;
use crate::store::keys;
use crate::store::operations::backup_settings::BackupSettings;
use crate::store::operations::records::WeighingRecord;
use crate::store::{Store, StoreError};

const SCHEMA_VERSION_KEY: &str = "_meta:schema_version";

struct Step {
    version: u32,
    name: &'static str,
    apply: fn(&Store) -> Result<(), StoreError>,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "seed_backup_settings",
        apply: seed_backup_settings,
    },
    Step {
        version: 2,
        name: "rebuild_records_by_time",
        apply: rebuild_records_by_time,
    },
];

pub fn run(store: &Store) -> Result<(), StoreError> {
    let applied = schema_version(store)?;
    let pending: Vec<&Step> = STEPS.iter().filter(|step| step.version > applied).collect();
    if pending.is_empty() {
        tracing::debug!(version = applied, "Store schema up to date");
        return Ok(());
    }

    for step in pending {
        tracing::info!(version = step.version, name = step.name, "Applying store migration");
        (step.apply)(store).map_err(|e| StoreError::Migration {
            version: step.version,
            message: e.to_string(),
        })?;
        record_version(store, step.version)?;
    }
    Ok(())
}

pub fn schema_version(store: &Store) -> Result<u32, StoreError> {
    let Some(raw) = store.settings.get(SCHEMA_VERSION_KEY.as_bytes())? else {
        return Ok(0);
    };
    let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
        version: 0,
        message: format!("schema version marker has {} bytes, expected 4", raw.len()),
    })?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn record_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = schema_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("store is at schema {current}; refusing to go back to {version}"),
        });
    }
    store
        .settings
        .insert(SCHEMA_VERSION_KEY.as_bytes(), version.to_be_bytes().to_vec())?;
    Ok(())
}

/// Writes the default (disabled) backup configuration when none exists.
fn seed_backup_settings(store: &Store) -> Result<(), StoreError> {
    if store.settings.contains_key(BACKUP_SETTINGS_KEY.as_bytes())? {
        return Ok(());
    }
    store.save_backup_settings(&BackupSettings::default())
}

/// Re-derives the time index from the primary weighing records.
fn rebuild_records_by_time(store: &Store) -> Result<(), StoreError> {
    let mut indexed = 0usize;
    for item in store.weighing_records.iter() {
        let (_, value) = item?;
        let record: WeighingRecord = Store::deserialize(&value)?;
        let key = keys::records_by_time_key(record.timestamp.timestamp_millis(), &record.id)?;
        store.records_by_time.insert(key.as_bytes(), &[])?;
        indexed += 1;
    }
    tracing::debug!(indexed, "records_by_time rebuilt");
    Ok(())
}
