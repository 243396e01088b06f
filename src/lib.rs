//! # Potato Leaf Severity
//!
//! Grad-CAM based severity pseudo-labels for potato leaf disease images, built
//! on the Burn framework.
//!
//! A trained classifier is split at its last convolutional block. For every
//! image the gradient of the ground-truth class score with respect to that
//! block's activations weights the activation channels into a class
//! activation map. The share of the map above a threshold, scaled by a
//! calibration multiplier, is the image's severity in [0, 1].
//!
//! ## Modules
//!
//! - `dataset`: image folder discovery and preprocessing
//! - `model`: CNN classifier and checkpoint loading
//! - `severity`: activation capture, CAM generation, severity estimation
//! - `pipeline`: dataset walk, CSV output and run summaries
//! - `utils`: errors, logging and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use potato_severity::pipeline::{self, PipelineConfig};
//!
//! let config = PipelineConfig {
//!     data_dir: "PlantVillage".into(),
//!     ..Default::default()
//! };
//! let summary = pipeline::run(&config)?;
//! summary.print();
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod pipeline;
pub mod severity;
pub mod utils;

pub use dataset::{LeafImageFolder, LeafSample};
pub use model::{GradCamClassifier, PlantClassifier, PlantClassifierConfig};
pub use pipeline::{
    generate_pseudo_labels, FailurePolicy, PipelineConfig, RunSummary, SeverityRecord,
};
pub use severity::{
    ActivationRecorder, ActivationSnapshot, CamInterpolation, CamTarget, ClassActivationMap,
    SeverityConfig, SeverityEstimator,
};
pub use utils::error::{Result, SeverityError};

/// Classifier input size and canonical CAM resolution
pub const IMAGE_SIZE: usize = 224;

/// CAM intensity above which a pixel counts as affected
pub const DEFAULT_CAM_THRESHOLD: f32 = 0.4;

/// Coverage multiplier compensating for coarse Grad-CAM maps
pub const DEFAULT_SEVERITY_MULTIPLIER: f32 = 3.0;

/// Images between progress lines
pub const PROGRESS_INTERVAL: usize = 50;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
