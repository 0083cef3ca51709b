use crate::store::Store;

pub async fn run(store: &Store) {
    tracing::debug!("store_flush: start");
    match store.flush() {
        Ok(()) => tracing::debug!(records = store.count_weighing_records(), "store_flush: done"),
        Err(e) => tracing::error!(error = %e, "store_flush failed"),
    }
}
