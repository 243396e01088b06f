//! Per-run statistics.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::walker::{SeverityRecord, SkippedImage, WalkOutcome};
use crate::model::CheckpointReport;
use crate::severity::SeverityConfig;
use crate::utils::error::{Result, SeverityError};

/// How the classifier weights were obtained
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckpointStatus {
    Loaded { report: CheckpointReport },
    /// Random weights; severities carry no meaning
    Missing { path: PathBuf },
}

impl CheckpointStatus {
    pub fn is_missing(&self) -> bool {
        matches!(self, CheckpointStatus::Missing { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassSummary {
    pub label: usize,
    pub name: String,
    pub images: usize,
    pub mean_severity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// RFC 3339, UTC
    pub timestamp: String,
    pub data_dir: PathBuf,
    pub output_path: PathBuf,
    pub backend: String,
    pub checkpoint: CheckpointStatus,
    pub severity: SeverityConfig,
    pub total_images: usize,
    pub labelled: usize,
    pub skipped: Vec<SkippedImage>,
    pub classes: Vec<ClassSummary>,
    pub elapsed_secs: f64,
}

impl RunSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        data_dir: &Path,
        output_path: &Path,
        backend: &str,
        checkpoint: CheckpointStatus,
        severity: SeverityConfig,
        class_names: &[String],
        outcome: &WalkOutcome,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            data_dir: data_dir.to_path_buf(),
            output_path: output_path.to_path_buf(),
            backend: backend.to_string(),
            checkpoint,
            severity,
            total_images: outcome.records.len() + outcome.skipped.len(),
            labelled: outcome.records.len(),
            skipped: outcome.skipped.clone(),
            classes: class_summaries(class_names, &outcome.records),
            elapsed_secs,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SeverityError::output(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| SeverityError::output(path, e))
    }

    /// Print the summary to console
    pub fn print(&self) {
        println!("\n{}", "Severity Pseudo-Labels".green().bold());
        println!("  Images:      {}", self.total_images);
        println!("  Labelled:    {}", self.labelled);
        if !self.skipped.is_empty() {
            println!("  Skipped:     {}", self.skipped.len().to_string().yellow());
        }
        println!("  Output:      {:?}", self.output_path);
        println!("  Elapsed:     {}", crate::utils::format_duration(self.elapsed_secs));

        if self.checkpoint.is_missing() {
            println!(
                "  {}",
                "No checkpoint loaded: severities come from random weights".yellow()
            );
        }

        println!("\n  Mean severity per class:");
        for class in &self.classes {
            println!(
                "    {:3}. {:30} {:5} images  {:.4}",
                class.label, class.name, class.images, class.mean_severity
            );
        }
    }
}

fn class_summaries(class_names: &[String], records: &[SeverityRecord]) -> Vec<ClassSummary> {
    let mut sums = vec![(0usize, 0.0f64); class_names.len()];
    for record in records {
        if let Some(entry) = sums.get_mut(record.class_label) {
            entry.0 += 1;
            entry.1 += record.severity as f64;
        }
    }

    class_names
        .iter()
        .zip(sums)
        .enumerate()
        .map(|(label, (name, (images, total)))| ClassSummary {
            label,
            name: name.clone(),
            images,
            mean_severity: if images > 0 {
                (total / images as f64) as f32
            } else {
                0.0
            },
        })
        .collect()
}
