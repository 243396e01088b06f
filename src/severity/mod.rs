//! Grad-CAM severity estimation
//!
//! This module provides:
//! - [`recorder`]: activation and gradient capture at the designated layer
//! - [`cam`]: gradient-weighted class activation maps
//! - [`estimator`]: CAM coverage to calibrated severity score
//! - [`heatmap`]: optional PNG overlays of the maps
//!
//! ## Pipeline
//!
//! ```text
//! image ──► activations ──► logits[target] ──► backward
//!               │                                  │
//!               └────────── ActivationSnapshot ◄───┘
//!                                 │
//!                      ClassActivationMap [0,1]
//!                                 │
//!            resample ─► threshold ─► coverage ─► min(coverage * k, 1)
//! ```

pub mod cam;
pub mod estimator;
pub mod heatmap;
pub mod recorder;

pub use cam::{grad_cam, ClassActivationMap};
pub use estimator::SeverityEstimator;
pub use heatmap::HeatmapWriter;
pub use recorder::{ActivationRecorder, ActivationSnapshot, CamTarget};

use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, SeverityError};

/// Interpolation used when resampling a CAM to the canonical resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CamInterpolation {
    #[default]
    Bilinear,
    Bicubic,
}

impl CamInterpolation {
    pub fn options(&self) -> InterpolateOptions {
        let mode = match self {
            CamInterpolation::Bilinear => InterpolateMode::Bilinear,
            CamInterpolation::Bicubic => InterpolateMode::Bicubic,
        };
        InterpolateOptions::new(mode)
    }

    /// Resample a `[N, C, H, W]` tensor to `[N, C, size[0], size[1]]`
    pub fn resample<B: burn::tensor::backend::Backend>(
        &self,
        tensor: burn::tensor::Tensor<B, 4>,
        size: [usize; 2],
    ) -> burn::tensor::Tensor<B, 4> {
        interpolate(tensor, size, self.options())
    }
}

impl std::fmt::Display for CamInterpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CamInterpolation::Bilinear => write!(f, "bilinear"),
            CamInterpolation::Bicubic => write!(f, "bicubic"),
        }
    }
}

/// Severity calibration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    /// CAM intensity above which a pixel counts as affected
    pub threshold: f32,

    /// Coverage multiplier compensating for coarse attribution
    pub multiplier: f32,

    /// Side length of the square grid coverage is measured on
    pub canonical_size: usize,

    /// Interpolation used to reach the canonical grid
    pub interpolation: CamInterpolation,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            threshold: crate::DEFAULT_CAM_THRESHOLD,
            multiplier: crate::DEFAULT_SEVERITY_MULTIPLIER,
            canonical_size: crate::IMAGE_SIZE,
            interpolation: CamInterpolation::default(),
        }
    }
}

impl SeverityConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(SeverityError::Config(format!(
                "CAM threshold must be in [0, 1), got {}",
                self.threshold
            )));
        }
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(SeverityError::Config(format!(
                "Severity multiplier must be finite and non-negative, got {}",
                self.multiplier
            )));
        }
        if self.canonical_size == 0 {
            return Err(SeverityError::Config(
                "Canonical CAM size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn canonical_shape(&self) -> [usize; 2] {
        [self.canonical_size, self.canonical_size]
    }
}
