pub mod spreadsheet;
pub mod workbook;

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;

use crate::constants::{DISPLAY_DATETIME_FORMAT, FILE_STAMP_FORMAT, KG_PER_TONNE};
use crate::history::HistoryEntry;

pub use spreadsheet::CsvReportRenderer;
pub use workbook::XlsxReportRenderer;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report encoding error: {0}")]
    Csv(#[from] csv::Error),
    #[error("workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Document kind produced for backups and exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown report format '{other}'")),
        }
    }
}

pub fn renderer_for(
    format: ReportFormat,
    output_dir: PathBuf,
    offset: FixedOffset,
) -> Arc<dyn ReportRenderer> {
    match format {
        ReportFormat::Xlsx => Arc::new(XlsxReportRenderer::new(output_dir, offset)),
        ReportFormat::Csv => Arc::new(CsvReportRenderer::new(output_dir, offset)),
    }
}

/// Turns history rows into a document on disk.
///
/// Rendering is blocking file I/O; async callers go through `spawn_blocking`.
pub trait ReportRenderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    /// Where `render` will write `file_name`. Known before rendering so the
    /// caller can arm cleanup even if rendering fails halfway.
    fn output_path(&self, file_name: &str) -> PathBuf;

    fn render(&self, entries: &[HistoryEntry], file_name: &str) -> Result<PathBuf, ReportError>;
}

/// Removes the rendered file when dropped, on every exit path.
#[derive(Debug)]
pub struct ReportArtifact {
    path: PathBuf,
}

impl ReportArtifact {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ReportArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Report file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove report file")
            }
        }
    }
}

/// `<prefix>_<yyyyMMdd_HHmmss>_<8 hex>.<ext>`, stamped in local time. The
/// random tail keeps two renders in the same second apart.
pub fn report_file_name(
    prefix: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
    format: ReportFormat,
) -> String {
    let tail = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}_{}_{}.{}",
        now.with_timezone(&offset).format(FILE_STAMP_FORMAT),
        &tail[..8],
        format.extension()
    )
}

/// Opens `path` for writing; an existing file is an error, never overwritten.
pub(crate) fn create_exclusive(path: &Path) -> Result<File, ReportError> {
    Ok(OpenOptions::new().write(true).create_new(true).open(path)?)
}

/// `<prefix> (<first> - <last>)` over the entries' timestamps; `None` when empty.
pub fn report_caption(prefix: &str, entries: &[HistoryEntry], offset: FixedOffset) -> Option<String> {
    let (first, last) = timestamp_bounds(entries)?;
    Some(span_caption(prefix, first, last, offset))
}

/// Oldest and newest timestamp among `entries`.
pub fn timestamp_bounds(entries: &[HistoryEntry]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = entries.iter().map(|e| e.timestamp).min()?;
    let last = entries.iter().map(|e| e.timestamp).max()?;
    Some((first, last))
}

pub fn span_caption(
    prefix: &str,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    format!(
        "{prefix} ({} - {})",
        format_local(first, offset),
        format_local(last, offset)
    )
}

pub fn format_local(ts: DateTime<Utc>, offset: FixedOffset) -> String {
    ts.with_timezone(&offset)
        .format(DISPLAY_DATETIME_FORMAT)
        .to_string()
}

/// Net totals in tonnes, grouped in order of first appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub total_tonnes: f64,
    pub by_cargo: Vec<(String, f64)>,
    pub by_vehicle: Vec<(String, f64)>,
    pub by_origin: Vec<(String, f64)>,
    pub by_destination: Vec<(String, f64)>,
}

impl ReportSummary {
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let total_kg: f64 = entries.iter().map(|e| e.net_weight).sum();
        Self {
            total_tonnes: round_tonnes(total_kg),
            by_cargo: group_tonnes(entries, |e| &e.cargo_display),
            by_vehicle: group_tonnes(entries, |e| &e.vehicle_name),
            by_origin: group_tonnes(entries, |e| &e.from_name),
            by_destination: group_tonnes(entries, |e| &e.to_name),
        }
    }
}

/// Tonnes to three decimals, i.e. whole kilograms.
fn round_tonnes(kg: f64) -> f64 {
    kg.round() / KG_PER_TONNE
}

fn group_tonnes(entries: &[HistoryEntry], key: impl Fn(&HistoryEntry) -> &str) -> Vec<(String, f64)> {
    let mut groups: Vec<(String, f64)> = Vec::new();
    for entry in entries {
        let name = key(entry);
        match groups.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, kg)) => *kg += entry.net_weight,
            None => groups.push((name.to_string(), entry.net_weight)),
        }
    }
    groups
        .into_iter()
        .map(|(name, kg)| (name, round_tonnes(kg)))
        .collect()
}
