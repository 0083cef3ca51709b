pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

/// One sled database, one tree per entity plus the time index over weighing
/// records.
#[derive(Debug)]
pub struct Store {
    db: Db,
    pub weighing_records: sled::Tree,
    pub settings: sled::Tree,
    pub vehicles: sled::Tree,
    pub cargo_types: sled::Tree,
    pub seasons: sled::Tree,
    pub destinations: sled::Tree,
    pub fields: sled::Tree,
    pub sources: sled::Tree,
    /// `{ts_ms:020}:{record_id}` keys with empty values.
    pub records_by_time: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let tree = |name: &str| db.open_tree(name);
        Ok(Self {
            weighing_records: tree(trees::WEIGHING_RECORDS)?,
            settings: tree(trees::SETTINGS)?,
            vehicles: tree(trees::VEHICLES)?,
            cargo_types: tree(trees::CARGO_TYPES)?,
            seasons: tree(trees::SEASONS)?,
            destinations: tree(trees::DESTINATIONS)?,
            fields: tree(trees::FIELDS)?,
            sources: tree(trees::SOURCES)?,
            records_by_time: tree(trees::RECORDS_BY_TIME)?,
            db,
        })
    }

    /// Brings the on-disk layout up to date. Safe to call on every start.
    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
