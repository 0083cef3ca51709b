use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;

use crate::history::HistoryEntry;
use crate::report::{
    create_exclusive, format_local, ReportError, ReportFormat, ReportRenderer, ReportSummary,
};

pub(crate) const HEADER: [&str; 8] = [
    "Date",
    "Vehicle",
    "Cargo",
    "Net (kg)",
    "From",
    "To",
    "Source",
    "Comment",
];

/// Writes history rows as a CSV sheet followed by a block of net totals.
#[derive(Debug, Clone)]
pub struct CsvReportRenderer {
    output_dir: PathBuf,
    offset: FixedOffset,
}

impl CsvReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, offset: FixedOffset) -> Self {
        Self {
            output_dir: output_dir.into(),
            offset,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write_sheet(&self, entries: &[HistoryEntry], file: File) -> Result<(), ReportError> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(file);

        wtr.write_record(HEADER)?;
        for entry in entries {
            wtr.write_record([
                format_local(entry.timestamp, self.offset),
                entry.vehicle_name.clone(),
                entry.cargo_display.clone(),
                entry.net_weight.to_string(),
                entry.from_name.clone(),
                entry.to_name.clone(),
                entry.source_name.clone(),
                entry.comment.clone(),
            ])?;
        }

        let summary = ReportSummary::from_entries(entries);
        wtr.write_record([""])?;
        let total = format!("{:.3}", summary.total_tonnes);
        wtr.write_record(["", "Total net (t)", total.as_str()])?;

        let groups = [
            ("Cargo", &summary.by_cargo),
            ("Vehicle", &summary.by_vehicle),
            ("From", &summary.by_origin),
            ("To", &summary.by_destination),
        ];
        for (label, rows) in groups {
            wtr.write_record([""])?;
            for (name, tonnes) in rows {
                let caption = format!("{label} \"{name}\" (t)");
                let value = format!("{tonnes:.3}");
                wtr.write_record(["", caption.as_str(), value.as_str()])?;
            }
        }

        wtr.flush()?;
        Ok(())
    }
}

impl ReportRenderer for CsvReportRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Csv
    }

    fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    fn render(&self, entries: &[HistoryEntry], file_name: &str) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_path(file_name);
        let file = create_exclusive(&path)?;

        if let Err(e) = self.write_sheet(entries, file) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        tracing::debug!(path = %path.display(), rows = entries.len(), "Report rendered");
        Ok(path)
    }
}
