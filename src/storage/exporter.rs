//! Export of collected rows and refined records.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::error::ExportError;
use crate::refine::Record;
use crate::search::NormalizedRow;

/// Destination for the debug and report tables of a run.
pub trait Exporter: Send + Sync {
    /// Writes one table and returns where it went.
    fn export_table(
        &self,
        prefix: &str,
        columns: &[String],
        rows: Vec<Vec<String>>,
    ) -> Result<PathBuf, ExportError>;

    /// Exports raw rows; provenance columns come from each row.
    fn export_rows(
        &self,
        prefix: &str,
        rows: &[NormalizedRow],
        columns: &[String],
    ) -> Result<PathBuf, ExportError> {
        let table = rows.iter().map(|row| row.project(columns)).collect();
        self.export_table(prefix, columns, table)
    }

    /// Exports refined records; missing fields become empty cells.
    fn export_records(
        &self,
        prefix: &str,
        records: &[Record],
        columns: &[String],
    ) -> Result<PathBuf, ExportError> {
        let table = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).to_string())
                    .collect()
            })
            .collect();
        self.export_table(prefix, columns, table)
    }
}

/// Writes timestamped CSV files (`<prefix>_<YYYYmmdd_HHMMSS>.csv`).
#[derive(Debug, Clone)]
pub struct CsvExporter {
    export_dir: PathBuf,
}

impl CsvExporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }
}

impl Exporter for CsvExporter {
    fn export_table(
        &self,
        prefix: &str,
        columns: &[String],
        rows: Vec<Vec<String>>,
    ) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(&self.export_dir)?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self.export_dir.join(format!("{}_{}.csv", prefix, timestamp));

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(columns)?;
        let count = rows.len();
        for row in rows {
            writer.write_record(&row)?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = count, "Exported CSV");
        Ok(path)
    }
}
