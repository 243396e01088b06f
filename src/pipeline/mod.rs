//! Pseudo-label generation
//!
//! Ties the pieces together for one run:
//!
//! 1. validate the configuration
//! 2. discover the dataset (fatal when missing or empty)
//! 3. build the classifier and load its checkpoint (a missing checkpoint only warns)
//! 4. walk every image: preprocess → Grad-CAM → severity
//! 5. write the CSV and the optional JSON summary

pub mod config;
pub mod summary;
pub mod walker;
pub mod writer;

pub use config::{FailurePolicy, PipelineConfig};
pub use summary::{CheckpointStatus, ClassSummary, RunSummary};
pub use walker::{DatasetWalker, SeverityRecord, SkippedImage, WalkOutcome, WalkerState};
pub use writer::{format_record, PseudoLabelWriter, CSV_HEADER};

use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use tracing::{info, warn};

use crate::backend::{backend_name, default_device, AttributionBackend};
use crate::dataset::LeafImageFolder;
use crate::model::{
    load_checkpoint, resolve_checkpoint_path, GradCamClassifier, PlantClassifier,
    PlantClassifierConfig,
};
use crate::severity::CamTarget;
use crate::utils::error::{Result, SeverityError};

/// Run the full pipeline on the compiled-in backend
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    generate_pseudo_labels::<AttributionBackend>(config, &default_device())
}

/// Generate severity pseudo-labels for every image under `config.data_dir`
pub fn generate_pseudo_labels<B: AutodiffBackend>(
    config: &PipelineConfig,
    device: &B::Device,
) -> Result<RunSummary> {
    config.validate()?;

    let dataset = LeafImageFolder::open(&config.data_dir)?;
    info!(
        "Found {} images in {} classes",
        dataset.len(),
        dataset.num_classes()
    );

    let num_classes = config.num_classes.unwrap_or(dataset.num_classes());
    if num_classes < dataset.num_classes() {
        return Err(SeverityError::Config(format!(
            "Classifier has {} outputs but the dataset has {} classes",
            num_classes,
            dataset.num_classes()
        )));
    }

    B::seed(config.seed);
    let model_config = PlantClassifierConfig::new()
        .with_num_classes(num_classes)
        .with_input_size(config.image_size)
        .with_base_filters(config.base_filters);
    let model: PlantClassifier<B> = model_config.init(device);

    let (model, checkpoint) = match resolve_checkpoint_path(&config.checkpoint_path) {
        Some(source) => {
            info!("Loading weights from {:?}", source.path());
            let (model, report) = load_checkpoint(model, &source, device)?;
            report.log();
            (model, CheckpointStatus::Loaded { report })
        }
        None => {
            warn!(
                "Checkpoint {:?} not found. Using random weights, severity values are meaningless.",
                config.checkpoint_path
            );
            let status = CheckpointStatus::Missing {
                path: config.checkpoint_path.clone(),
            };
            (model, status)
        }
    };

    let classifier = GradCamClassifier::new(model);
    label_dataset(config, &dataset, &classifier, checkpoint, device)
}

/// Walk `dataset` with an already prepared attribution target and write outputs
pub fn label_dataset<B: AutodiffBackend, M: CamTarget<B>>(
    config: &PipelineConfig,
    dataset: &LeafImageFolder,
    target: &M,
    checkpoint: CheckpointStatus,
    device: &B::Device,
) -> Result<RunSummary> {
    let start = Instant::now();

    let mut walker = DatasetWalker::<B>::new(config)?;
    let outcome = walker.run(dataset, target, device)?;

    PseudoLabelWriter::new(&config.output_path).write(&outcome.records)?;

    let summary = RunSummary::new(
        &config.data_dir,
        &config.output_path,
        backend_name(),
        checkpoint,
        config.severity.clone(),
        &dataset.classes,
        &outcome,
        start.elapsed().as_secs_f64(),
    );

    if let Some(path) = &config.summary_path {
        summary.save(path)?;
        info!("Run summary saved to {:?}", path);
    }

    if !outcome.skipped.is_empty() {
        warn!("{} images were skipped", outcome.skipped.len());
    }

    Ok(summary)
}
