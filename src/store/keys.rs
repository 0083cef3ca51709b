use crate::store::StoreError;

fn validate_key_segment(entity: &str, value: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{entity} id must not be empty")));
    }
    if value.contains(':') {
        return Err(StoreError::Validation(format!(
            "{entity} id must not contain ':'"
        )));
    }
    Ok(())
}

pub fn weighing_record_key(record_id: &str) -> Result<String, StoreError> {
    validate_key_segment("record", record_id)?;
    Ok(record_id.to_string())
}

pub fn reference_key(entity: &str, id: &str) -> Result<String, StoreError> {
    validate_key_segment(entity, id)?;
    Ok(id.to_string())
}

/// Pre-epoch timestamps clamp to zero so the zero-padded key still sorts.
fn time_component(timestamp_ms: i64) -> u64 {
    timestamp_ms.max(0) as u64
}

/// `{ts_ms:020}:{record_id}`, ascending by time.
pub fn records_by_time_key(timestamp_ms: i64, record_id: &str) -> Result<String, StoreError> {
    validate_key_segment("record", record_id)?;
    Ok(format!("{:020}:{}", time_component(timestamp_ms), record_id))
}

/// First key of the millisecond bucket `timestamp_ms`.
pub fn records_by_time_lower_bound(timestamp_ms: i64) -> String {
    format!("{:020}:", time_component(timestamp_ms))
}

/// Key just past every entry of the millisecond bucket `timestamp_ms`
/// (`;` sorts right after `:`).
pub fn records_by_time_upper_bound(timestamp_ms: i64) -> String {
    format!("{:020};", time_component(timestamp_ms))
}

/// Record id encoded in a `records_by_time` key.
pub fn record_id_from_time_key(key: &[u8]) -> Option<&str> {
    let sep = key.iter().position(|b| *b == b':')?;
    std::str::from_utf8(&key[sep + 1..]).ok()
}
