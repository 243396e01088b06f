//! Pseudo-label CSV output.

use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::walker::SeverityRecord;
use crate::utils::error::{Result, SeverityError};

pub const CSV_HEADER: &str = "path,class,severity";

/// Quote a field if it contains a delimiter, quote or line break
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Render one row, severity with four decimals
pub fn format_record(record: &SeverityRecord) -> String {
    format!(
        "{},{},{:.4}",
        escape_field(&record.path),
        record.class_label,
        record.severity
    )
}

/// Writes the ordered records of one run
#[derive(Debug, Clone)]
pub struct PseudoLabelWriter {
    path: PathBuf,
}

impl PseudoLabelWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the output file with `records`
    pub fn write(&self, records: &[SeverityRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SeverityError::output(parent, e))?;
        }

        let file = File::create(&self.path).map_err(|e| SeverityError::output(&self.path, e))?;
        let mut writer = BufWriter::new(file);

        let mut write_all = || -> std::io::Result<()> {
            writeln!(writer, "{}", CSV_HEADER)?;
            for record in records {
                writeln!(writer, "{}", format_record(record))?;
            }
            writer.flush()
        };
        write_all().map_err(|e| SeverityError::output(&self.path, e))?;

        info!("Wrote {} pseudo-labels to {:?}", records.len(), self.path);
        Ok(())
    }
}
