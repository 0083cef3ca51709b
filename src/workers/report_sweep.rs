//! Removes report files left behind in the report directory, e.g. by a
//! process that died between rendering and cleanup.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::constants::{BACKUP_FILE_PREFIX, REPORT_FILE_PREFIX};
use crate::report::ReportFormat;

pub async fn run(report_dir: &Path, retention: Duration) {
    tracing::debug!("report_sweep: start");
    match sweep(report_dir, retention, SystemTime::now()).await {
        Ok(0) => tracing::debug!("report_sweep: nothing to remove"),
        Ok(removed) => tracing::info!(removed, "report_sweep: removed stale report files"),
        Err(e) => tracing::error!(error = %e, dir = %report_dir.display(), "report_sweep failed"),
    }
}

fn is_report_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let has_prefix = [BACKUP_FILE_PREFIX, REPORT_FILE_PREFIX]
        .iter()
        .any(|prefix| name.starts_with(&format!("{prefix}_")));
    let extension = path.extension().and_then(|e| e.to_str());
    has_prefix
        && [ReportFormat::Xlsx, ReportFormat::Csv]
            .iter()
            .any(|format| extension == Some(format.extension()))
}

/// Deletes report files last modified more than `retention` before `now`.
pub async fn sweep(report_dir: &Path, retention: Duration, now: SystemTime) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(report_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0usize;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_report_file(&path) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age <= retention {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(error = %e, path = %path.display(), "report_sweep: remove failed"),
        }
    }
    Ok(removed)
}
