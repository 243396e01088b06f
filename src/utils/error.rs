//! Error Handling Module
//!
//! Defines the error type shared by the severity pipeline.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for severity pipeline operations
#[derive(Error, Debug)]
pub enum SeverityError {
    /// The dataset root does not exist or is not a directory
    #[error("Dataset directory not found: '{0}'")]
    DatasetNotFound(PathBuf),

    /// The dataset root exists but yields nothing to process
    #[error("Dataset at '{path}' is empty: {reason}")]
    EmptyDataset { path: PathBuf, reason: String },

    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Encoding or processing an image buffer failed
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Checkpoint could not be read or parsed
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Attribution pass failed (shape mismatch, invalid target, stale buffer)
    #[error("Attribution error: {0}")]
    Attribution(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing pseudo-labels, heatmaps or summaries failed
    #[error("Failed to write '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SeverityError {
    /// Whether the error comes from a single image rather than the run setup
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            SeverityError::ImageLoad(..)
                | SeverityError::Image(_)
                | SeverityError::Attribution(_)
        )
    }

    /// Attach a path to an IO failure on an output file
    pub fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SeverityError::Output {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for SeverityError {
    fn from(err: serde_json::Error) -> Self {
        SeverityError::Serialization(err.to_string())
    }
}

/// Convenience Result type for severity pipeline operations
pub type Result<T> = std::result::Result<T, SeverityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SeverityError::Config("threshold out of range".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: threshold out of range"
        );
    }

    #[test]
    fn test_dataset_not_found_names_path() {
        let err = SeverityError::DatasetNotFound(PathBuf::from("PlantVillage"));
        assert!(err.to_string().contains("PlantVillage"));
    }

    #[test]
    fn test_per_image_classification() {
        let image = SeverityError::ImageLoad(PathBuf::from("a.jpg"), "truncated".to_string());
        assert!(image.is_per_image());
        assert!(SeverityError::Attribution("bad class".to_string()).is_per_image());
        assert!(!SeverityError::Checkpoint("corrupt".to_string()).is_per_image());
    }

    #[test]
    fn test_serde_json_conversion() {
        let err: SeverityError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, SeverityError::Serialization(_)));
    }
}
