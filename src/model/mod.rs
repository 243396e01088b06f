//! Model module for the leaf classifier using the Burn framework
//!
//! This module provides:
//! - The CNN classifier whose last convolutional block Grad-CAM observes
//! - An attribution view of the classifier ([`GradCamClassifier`])
//! - Checkpoint loading (non-strict JSON mappings, Burn record files) and export

pub mod checkpoint;
pub mod cnn;

pub use checkpoint::{
    load_checkpoint, resolve_checkpoint_path, save_checkpoint, CheckpointReport, CheckpointSource,
};
pub use cnn::{GradCamClassifier, PlantClassifier, PlantClassifierConfig};
