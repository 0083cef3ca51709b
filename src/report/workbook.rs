use std::io::Write;
use std::path::PathBuf;

use chrono::FixedOffset;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};

use crate::history::HistoryEntry;
use crate::report::spreadsheet::HEADER;
use crate::report::{
    create_exclusive, format_local, ReportError, ReportFormat, ReportRenderer, ReportSummary,
};

const SHEET_NAME: &str = "Weighings";
const HEADER_FILL: u32 = 0xD9D9D9;
const COLUMN_WIDTHS: [f64; 8] = [17.0, 18.0, 28.0, 11.0, 22.0, 22.0, 16.0, 30.0];

/// Writes history rows to an xlsx workbook: a shaded bold header, one row per
/// weighing, then bold net-total blocks in tonnes.
#[derive(Debug, Clone)]
pub struct XlsxReportRenderer {
    output_dir: PathBuf,
    offset: FixedOffset,
}

impl XlsxReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, offset: FixedOffset) -> Self {
        Self {
            output_dir: output_dir.into(),
            offset,
        }
    }

    fn build(&self, entries: &[HistoryEntry]) -> Result<Vec<u8>, ReportError> {
        let header = Format::new()
            .set_bold()
            .set_background_color(Color::RGB(HEADER_FILL))
            .set_border(FormatBorder::Thin);
        let label = Format::new().set_bold();
        let tonnes = Format::new().set_bold().set_num_format("0.000");

        let mut workbook = Workbook::new();
        {
            let sheet = workbook.add_worksheet();
            sheet.set_name(SHEET_NAME)?;
            for (col, title) in (0u16..).zip(HEADER) {
                sheet.write_string_with_format(0, col, title, &header)?;
            }

            let mut row: u32 = 1;
            for entry in entries {
                sheet.write_string(row, 0, format_local(entry.timestamp, self.offset))?;
                sheet.write_string(row, 1, entry.vehicle_name.as_str())?;
                sheet.write_string(row, 2, entry.cargo_display.as_str())?;
                sheet.write_number(row, 3, entry.net_weight)?;
                sheet.write_string(row, 4, entry.from_name.as_str())?;
                sheet.write_string(row, 5, entry.to_name.as_str())?;
                sheet.write_string(row, 6, entry.source_name.as_str())?;
                sheet.write_string(row, 7, entry.comment.as_str())?;
                row += 1;
            }

            let summary = ReportSummary::from_entries(entries);
            row += 1;
            sheet.write_string_with_format(row, 1, "Total net (t)", &label)?;
            sheet.write_number_with_format(row, 2, summary.total_tonnes, &tonnes)?;
            row += 1;

            let groups = [
                ("Cargo", &summary.by_cargo),
                ("Vehicle", &summary.by_vehicle),
                ("From", &summary.by_origin),
                ("To", &summary.by_destination),
            ];
            for (group, rows) in groups {
                row += 1;
                for (name, value) in rows {
                    sheet.write_string_with_format(row, 1, format!("{group} \"{name}\" (t)"), &label)?;
                    sheet.write_number_with_format(row, 2, *value, &tonnes)?;
                    row += 1;
                }
            }

            for (col, width) in (0u16..).zip(COLUMN_WIDTHS) {
                sheet.set_column_width(col, width)?;
            }
        }
        Ok(workbook.save_to_buffer()?)
    }
}

impl ReportRenderer for XlsxReportRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Xlsx
    }

    fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    fn render(&self, entries: &[HistoryEntry], file_name: &str) -> Result<PathBuf, ReportError> {
        let bytes = self.build(entries)?;
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_path(file_name);
        let mut file = create_exclusive(&path)?;

        if let Err(e) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
            let _ = std::fs::remove_file(&path);
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), rows = entries.len(), bytes = bytes.len(), "Workbook rendered");
        Ok(path)
    }
}
