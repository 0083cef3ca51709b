use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;

use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeighingRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub vehicle_id: String,
    pub cargo_type_id: String,
    pub season_id: String,
    #[serde(default)]
    pub source_id: Option<String>,
    pub from_id: String,
    pub to_id: String,
    pub gross_weight: f64,
    pub tare_weight: f64,
    pub net_weight: f64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[cfg(test)]
impl WeighingRecord {
    pub(crate) fn sample(id: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            timestamp,
            vehicle_id: "v1".to_string(),
            cargo_type_id: "c1".to_string(),
            season_id: "s1".to_string(),
            source_id: None,
            from_id: "d1".to_string(),
            to_id: "d2".to_string(),
            gross_weight: 15_000.0,
            tare_weight: 6_000.0,
            net_weight: 9_000.0,
            comment: None,
        }
    }
}

fn map_tx_error(error: TransactionError<StoreError>) -> StoreError {
    match error {
        TransactionError::Abort(store_error) => store_error,
        TransactionError::Storage(storage_error) => StoreError::Sled(storage_error),
    }
}

impl Store {
    pub fn create_weighing_record(&self, record: &WeighingRecord) -> Result<(), StoreError> {
        let key = keys::weighing_record_key(&record.id)?;
        let time_key = keys::records_by_time_key(record.timestamp.timestamp_millis(), &record.id)?;
        let bytes = Self::serialize(record)?;

        (&self.weighing_records, &self.records_by_time)
            .transaction(|(tx_records, tx_index)| {
                tx_records.insert(key.as_bytes(), bytes.as_slice())?;
                tx_index.insert(time_key.as_bytes(), &[])?;
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(map_tx_error)
    }

    /// Replaces a stored record, moving its time index entry when the timestamp changed.
    pub fn update_weighing_record(&self, record: &WeighingRecord) -> Result<(), StoreError> {
        let existing = self
            .get_weighing_record(&record.id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "weighing_record".to_string(),
                key: record.id.clone(),
            })?;

        let key = keys::weighing_record_key(&record.id)?;
        let old_time_key =
            keys::records_by_time_key(existing.timestamp.timestamp_millis(), &existing.id)?;
        let new_time_key =
            keys::records_by_time_key(record.timestamp.timestamp_millis(), &record.id)?;
        let bytes = Self::serialize(record)?;

        (&self.weighing_records, &self.records_by_time)
            .transaction(|(tx_records, tx_index)| {
                tx_records.insert(key.as_bytes(), bytes.as_slice())?;
                if old_time_key != new_time_key {
                    tx_index.remove(old_time_key.as_bytes())?;
                    tx_index.insert(new_time_key.as_bytes(), &[])?;
                }
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(map_tx_error)
    }

    /// Returns `false` when the record did not exist.
    pub fn delete_weighing_record(&self, record_id: &str) -> Result<bool, StoreError> {
        let Some(existing) = self.get_weighing_record(record_id)? else {
            return Ok(false);
        };
        let key = keys::weighing_record_key(record_id)?;
        let time_key =
            keys::records_by_time_key(existing.timestamp.timestamp_millis(), &existing.id)?;

        (&self.weighing_records, &self.records_by_time)
            .transaction(|(tx_records, tx_index)| {
                tx_records.remove(key.as_bytes())?;
                tx_index.remove(time_key.as_bytes())?;
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(map_tx_error)?;
        Ok(true)
    }

    pub fn get_weighing_record(&self, record_id: &str) -> Result<Option<WeighingRecord>, StoreError> {
        let key = keys::weighing_record_key(record_id)?;
        match self.weighing_records.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// All records, oldest first.
    pub fn list_weighing_records(&self) -> Result<Vec<WeighingRecord>, StoreError> {
        let mut records = Vec::new();
        for item in self.records_by_time.iter() {
            let (key, _) = item?;
            if let Some(record) = self.record_for_index_key(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Records with `from_exclusive < timestamp <= to_inclusive`, oldest first.
    ///
    /// The index is millisecond-grained; the exact bounds are re-checked on
    /// the decoded timestamps so sub-millisecond markers stay exclusive.
    pub fn weighing_records_in_range(
        &self,
        from_exclusive: DateTime<Utc>,
        to_inclusive: DateTime<Utc>,
    ) -> Result<Vec<WeighingRecord>, StoreError> {
        if to_inclusive <= from_exclusive {
            return Ok(Vec::new());
        }

        let start = keys::records_by_time_lower_bound(from_exclusive.timestamp_millis());
        let end = keys::records_by_time_upper_bound(to_inclusive.timestamp_millis());

        let mut records = Vec::new();
        for item in self.records_by_time.range(start.as_bytes()..end.as_bytes()) {
            let (key, _) = item?;
            let Some(record) = self.record_for_index_key(&key)? else {
                continue;
            };
            if record.timestamp > from_exclusive && record.timestamp <= to_inclusive {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn count_weighing_records(&self) -> usize {
        self.weighing_records.len()
    }

    fn record_for_index_key(&self, key: &[u8]) -> Result<Option<WeighingRecord>, StoreError> {
        let Some(record_id) = keys::record_id_from_time_key(key) else {
            tracing::warn!(key = %String::from_utf8_lossy(key), "Malformed records_by_time key");
            return Ok(None);
        };
        let record = self.get_weighing_record(record_id)?;
        if record.is_none() {
            tracing::warn!(record_id, "Dangling records_by_time entry");
        }
        Ok(record)
    }
}
