//! Run configuration for pseudo-label generation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::severity::SeverityConfig;
use crate::utils::error::{Result, SeverityError};

/// What to do when a single image cannot be attributed
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the run on the first failing image
    #[default]
    FailFast,
    /// Log the failure, record the image as skipped and continue
    SkipAndLog,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::SkipAndLog => write!(f, "skip-and-log"),
        }
    }
}

/// Configuration of one pseudo-labelling run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Label-organised image folder
    pub data_dir: PathBuf,

    /// Classifier checkpoint; a missing file only produces a warning
    pub checkpoint_path: PathBuf,

    /// Pseudo-label CSV
    pub output_path: PathBuf,

    /// Optional JSON run summary
    pub summary_path: Option<PathBuf>,

    /// Optional directory for CAM overlays
    pub heatmap_dir: Option<PathBuf>,

    /// Classifier input size
    pub image_size: usize,

    /// Classifier output count; defaults to the number of class directories
    pub num_classes: Option<usize>,

    /// Base filter count of the classifier
    pub base_filters: usize,

    pub severity: SeverityConfig,

    pub failure_policy: FailurePolicy,

    /// Emit a progress line every this many images
    pub progress_interval: usize,

    /// Seed for the untrained-weights fallback
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("PlantVillage"),
            checkpoint_path: PathBuf::from("models/best_classifier.json"),
            output_path: PathBuf::from("pseudo_severity.csv"),
            summary_path: None,
            heatmap_dir: None,
            image_size: crate::IMAGE_SIZE,
            num_classes: None,
            base_filters: 32,
            severity: SeverityConfig::default(),
            failure_policy: FailurePolicy::default(),
            progress_interval: crate::PROGRESS_INTERVAL,
            seed: 42,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|e| {
            SeverityError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&json).map_err(|e| {
            SeverityError::Config(format!("Failed to parse config {:?}: {}", path, e))
        })?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SeverityError::output(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| SeverityError::output(path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.severity.validate()?;

        // Four 2x2 pools need at least a 16 pixel input.
        if self.image_size < 16 {
            return Err(SeverityError::Config(format!(
                "Image size must be at least 16, got {}",
                self.image_size
            )));
        }
        if self.num_classes == Some(0) {
            return Err(SeverityError::Config(
                "Number of classes must be greater than zero".to_string(),
            ));
        }
        if self.base_filters == 0 {
            return Err(SeverityError::Config(
                "Base filter count must be greater than zero".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(SeverityError::Config(
                "Progress interval must be greater than zero".to_string(),
            ));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(SeverityError::Config("Output path is empty".to_string()));
        }
        Ok(())
    }
}
