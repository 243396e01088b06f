//! Dataset module for label-organised leaf image folders
//!
//! This module provides:
//! - Deterministic discovery of an image folder with one subdirectory per class
//! - The fixed preprocessing transform applied before attribution
//!
//! Class indices are derived from the sorted subdirectory names, so the same
//! directory always yields the same class ordering and the same sample order.

pub mod loader;
pub mod preprocess;

pub use loader::{DatasetStats, LeafImageFolder, LeafSample};
pub use preprocess::{ImagePreprocessor, IMAGENET_MEAN, IMAGENET_STD};

/// File extensions accepted as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// Potato classes of the PlantVillage layout, in directory-sort order
pub const POTATO_CLASSES: [&str; 3] = [
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
];

/// Check whether a path has an accepted image extension
pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether a class directory name is one of the known potato classes
pub fn is_known_class(name: &str) -> bool {
    POTATO_CLASSES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("leaf.JPG")));
        assert!(is_image_file(Path::new("dir/leaf.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_known_classes() {
        assert!(is_known_class("Potato___Late_blight"));
        assert!(!is_known_class("Tomato___Late_blight"));
    }

    #[test]
    fn test_potato_classes_sorted() {
        let mut sorted = POTATO_CLASSES;
        sorted.sort();
        assert_eq!(sorted, POTATO_CLASSES);
    }
}
