//! Deterministic walk over a leaf image folder.

use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::{FailurePolicy, PipelineConfig};
use crate::dataset::{ImagePreprocessor, LeafImageFolder, LeafSample};
use crate::severity::{
    ActivationRecorder, CamTarget, ClassActivationMap, HeatmapWriter, SeverityEstimator,
};
use crate::utils::error::{Result, SeverityError};
use crate::utils::ProgressLogger;

/// One pseudo-label row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityRecord {
    pub path: String,
    /// Ground-truth class index of the image's folder
    pub class_label: usize,
    /// In [0, 1]
    pub severity: f32,
}

/// An image left out under [`FailurePolicy::SkipAndLog`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// In walk order
    pub records: Vec<SeverityRecord>,
    pub skipped: Vec<SkippedImage>,
}

/// Walker progress; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkerState {
    Idle,
    Processing { index: usize },
    Done,
}

/// Feeds every sample through preprocessing, attribution and estimation
pub struct DatasetWalker<B: AutodiffBackend> {
    preprocessor: ImagePreprocessor,
    estimator: SeverityEstimator,
    heatmaps: Option<HeatmapWriter>,
    policy: FailurePolicy,
    progress_interval: usize,
    recorder: ActivationRecorder<B>,
    state: WalkerState,
}

impl<B: AutodiffBackend> DatasetWalker<B> {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            preprocessor: ImagePreprocessor::new(config.image_size as u32),
            estimator: SeverityEstimator::new(config.severity.clone())?,
            heatmaps: config.heatmap_dir.as_ref().map(HeatmapWriter::new),
            policy: config.failure_policy,
            progress_interval: config.progress_interval,
            recorder: ActivationRecorder::new(),
            state: WalkerState::Idle,
        })
    }

    pub fn state(&self) -> WalkerState {
        self.state
    }

    /// Walk the whole dataset once
    pub fn run<M: CamTarget<B>>(
        &mut self,
        dataset: &LeafImageFolder,
        model: &M,
        device: &B::Device,
    ) -> Result<WalkOutcome> {
        if self.state != WalkerState::Idle {
            return Err(SeverityError::Config(format!(
                "walker cannot restart from state {:?}",
                self.state
            )));
        }

        let total = dataset.len();
        let mut progress = ProgressLogger::new(total, self.progress_interval);
        let mut outcome = WalkOutcome::default();

        for (index, sample) in dataset.samples.iter().enumerate() {
            self.state = WalkerState::Processing { index };

            match self.process(dataset, sample, model, device) {
                Ok(severity) => {
                    debug!("{:?} class {} severity {:.4}", sample.path, sample.label, severity);
                    outcome.records.push(SeverityRecord {
                        path: sample.path.to_string_lossy().into_owned(),
                        class_label: sample.label,
                        severity,
                    });
                }
                Err(err) if self.policy == FailurePolicy::SkipAndLog && err.is_per_image() => {
                    warn!("Skipping {:?}: {}", sample.path, err);
                    outcome.skipped.push(SkippedImage {
                        path: sample.path.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    self.recorder.reset();
                    return Err(err);
                }
            }

            progress.increment();
        }

        self.state = WalkerState::Done;
        Ok(outcome)
    }

    fn process<M: CamTarget<B>>(
        &mut self,
        dataset: &LeafImageFolder,
        sample: &LeafSample,
        model: &M,
        device: &B::Device,
    ) -> Result<f32> {
        let image = self.preprocessor.load(&sample.path)?;
        let resized = self.preprocessor.resize(&image);
        let input = self
            .preprocessor
            .resized_to_tensor::<B::InnerBackend>(&resized, device);

        self.recorder.reset();
        let snapshot = self.recorder.capture(model, input, sample.label)?;
        let cam = ClassActivationMap::generate(snapshot)?;
        self.recorder.reset();

        let severity = self.estimator.estimate_canonical(&cam);

        if let Some(writer) = &self.heatmaps {
            let relative = relative_to_class(dataset, sample);
            writer.write(&resized, &cam, &self.estimator, &sample.class_name, &relative)?;
        }

        Ok(severity)
    }
}

/// Sample path below its class directory
fn relative_to_class(dataset: &LeafImageFolder, sample: &LeafSample) -> PathBuf {
    let class_dir = dataset.root_dir.join(&sample.class_name);
    match sample.path.strip_prefix(&class_dir) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => sample
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new("image").to_path_buf()),
    }
}
