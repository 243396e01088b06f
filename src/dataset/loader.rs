//! Leaf Image Folder Loader
//!
//! Discovers a label-organised image collection on disk. The layout is one
//! subdirectory per class:
//!
//! ```text
//! root_dir/
//! ├── Potato___Early_blight/
//! │   ├── image1.jpg
//! │   └── image2.jpg
//! ├── Potato___Late_blight/
//! │   └── ...
//! └── Potato___healthy/
//!     └── ...
//! ```
//!
//! Classes are sorted by name and indexed by position. Files are collected
//! recursively under each class directory and sorted by file name, so an
//! unmodified directory always produces the same sample sequence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::is_image_file;
use crate::utils::error::{Result, SeverityError};

/// A single image sample with its ground-truth label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafSample {
    /// Path to the image file (root directory joined with the relative path)
    pub path: PathBuf,
    /// Class label index, position of the class directory in sorted order
    pub label: usize,
    /// Class directory name
    pub class_name: String,
}

/// Label-organised image folder
#[derive(Debug, Clone)]
pub struct LeafImageFolder {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// All samples, class-major, file-name sorted
    pub samples: Vec<LeafSample>,
    /// Class names indexed by label
    pub classes: Vec<String>,
}

impl LeafImageFolder {
    /// Discover a dataset rooted at `root_dir`
    ///
    /// Fails if the directory is missing, contains no class directories,
    /// or any class directory contains no images.
    pub fn open<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading image folder from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(SeverityError::DatasetNotFound(root_dir));
        }

        let mut classes: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                // Labels are positions in the sorted name list, so no class may be dropped
                let name = entry.file_name().into_string().map_err(|_| {
                    SeverityError::Config(format!(
                        "Class directory name is not valid UTF-8: {}",
                        path.to_string_lossy()
                    ))
                })?;
                classes.push(name);
            }
        }
        classes.sort();

        if classes.is_empty() {
            return Err(SeverityError::EmptyDataset {
                path: root_dir,
                reason: "no class subdirectories found".to_string(),
            });
        }

        info!("Found {} classes", classes.len());

        let mut samples = Vec::new();
        let mut empty_classes = Vec::new();

        for (label, class_name) in classes.iter().enumerate() {
            let class_dir = root_dir.join(class_name);
            let before = samples.len();

            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .follow_links(true)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| {
                    SeverityError::Io(std::io::Error::other(format!(
                        "Failed to read {:?}: {}",
                        class_dir, e
                    )))
                })?;

                if entry.file_type().is_file() && is_image_file(entry.path()) {
                    samples.push(LeafSample {
                        path: entry.path().to_path_buf(),
                        label,
                        class_name: class_name.clone(),
                    });
                }
            }

            let count = samples.len() - before;
            if count == 0 {
                empty_classes.push(class_name.clone());
            }
            debug!("Class '{}' (label {}): {} samples", class_name, label, count);
        }

        if !empty_classes.is_empty() {
            return Err(SeverityError::EmptyDataset {
                path: root_dir,
                reason: format!("no images found for classes: {}", empty_classes.join(", ")),
            });
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root_dir,
            samples,
            classes,
        })
    }

    /// Get the number of samples in the dataset
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the number of classes
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class name for a label index
    pub fn class_name(&self, label: usize) -> Option<&str> {
        self.classes.get(label).map(|s| s.as_str())
    }

    /// Mapping from class name to label index
    pub fn class_to_idx(&self) -> HashMap<String, usize> {
        self.classes
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect()
    }

    /// Get statistics about the dataset
    pub fn get_stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            num_classes: self.num_classes(),
            class_counts,
            class_names: self.classes.clone(),
        }
    }
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        for (idx, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let bar_len = (*count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            let bar: String = "█".repeat(bar_len);
            println!("    {:3}. {:40} {:5} {}", idx, name, count, bar);
        }
    }
}
