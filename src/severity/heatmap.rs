//! PNG overlays of class activation maps.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use image::{DynamicImage, ImageBuffer, ImageError, Rgb, RgbImage};

use super::cam::ClassActivationMap;
use super::estimator::SeverityEstimator;
use crate::utils::error::{Result, SeverityError};

/// Weight of the heatmap colour in the blended overlay
const OVERLAY_ALPHA: f32 = 0.5;

/// Blue → cyan → yellow → red ramp for a value in [0, 1]
pub fn colormap(value: f32) -> [u8; 3] {
    let v = value.clamp(0.0, 1.0) * 3.0;
    let (r, g, b) = if v < 1.0 {
        (0.0, v, 1.0)
    } else if v < 2.0 {
        (v - 1.0, 1.0, 2.0 - v)
    } else {
        (1.0, 3.0 - v, 0.0)
    };
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}

/// Writes CAM overlays under `<root>/<class_name>/`
#[derive(Debug, Clone)]
pub struct HeatmapWriter {
    root: PathBuf,
}

impl HeatmapWriter {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Output location for an image, keeping its path below the class directory
    pub fn output_path(&self, class_name: &str, relative: &Path) -> PathBuf {
        self.root.join(class_name).join(relative).with_extension("png")
    }

    /// Blend the map over `image` (already at model input size)
    pub fn render<B: Backend>(
        &self,
        image: &DynamicImage,
        cam: &ClassActivationMap<B>,
        estimator: &SeverityEstimator,
    ) -> Result<RgbImage> {
        let base = image.to_rgb8();
        let (width, height) = base.dimensions();
        let values = estimator
            .resample(cam.values.clone(), [height as usize, width as usize])
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| SeverityError::Attribution(format!("{:?}", e)))?;

        let overlay = ImageBuffer::from_fn(width, height, |x, y| {
            let heat = colormap(values[(y * width + x) as usize]);
            let pixel = base.get_pixel(x, y);
            let mut blended = [0u8; 3];
            for c in 0..3 {
                blended[c] = (pixel[c] as f32 * (1.0 - OVERLAY_ALPHA)
                    + heat[c] as f32 * OVERLAY_ALPHA)
                    .round() as u8;
            }
            Rgb(blended)
        });

        Ok(overlay)
    }

    /// Render and save; returns the written path
    ///
    /// Failing to create the file is an output error, failing to encode
    /// the overlay is an image error.
    pub fn write<B: Backend>(
        &self,
        image: &DynamicImage,
        cam: &ClassActivationMap<B>,
        estimator: &SeverityEstimator,
        class_name: &str,
        relative: &Path,
    ) -> Result<PathBuf> {
        let path = self.output_path(class_name, relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SeverityError::output(parent, e))?;
        }

        let overlay = self.render(image, cam, estimator)?;
        overlay.save(&path).map_err(|e| match e {
            ImageError::IoError(source) => SeverityError::output(&path, source),
            other => SeverityError::Image(other),
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::SeverityConfig;
    use burn::tensor::{Tensor, TensorData};
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_colormap_endpoints() {
        assert_eq!(colormap(0.0), [0, 0, 255]);
        assert_eq!(colormap(1.0), [255, 0, 0]);
        assert_eq!(colormap(2.0), [255, 0, 0]);
        assert_eq!(colormap(0.5), [128, 255, 128]);
    }

    #[test]
    fn test_output_path_keeps_subdirectories() {
        let writer = HeatmapWriter::new("heatmaps");
        let path = writer.output_path("Potato___healthy", Path::new("field/leaf.JPG"));
        assert_eq!(path, PathBuf::from("heatmaps/Potato___healthy/field/leaf.png"));
    }

    #[test]
    fn test_write_overlay() {
        let temp_dir = TempDir::new().unwrap();
        let writer = HeatmapWriter::new(temp_dir.path());
        let estimator = SeverityEstimator::new(SeverityConfig::default()).unwrap();

        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(16, 16, |_, _| Rgb([0, 0, 0])));
        let cam = ClassActivationMap::<TestBackend> {
            values: Tensor::from_data(TensorData::new(vec![1.0f32; 4], [2, 2]), &Default::default()),
            target_class: 0,
        };

        let path = writer
            .write(&image, &cam, &estimator, "Potato___Late_blight", Path::new("a.jpg"))
            .unwrap();
        assert!(path.exists());

        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (16, 16));
        assert_eq!(saved.get_pixel(5, 5), &Rgb([128, 0, 0]));
    }

    #[test]
    fn test_blocked_output_file_is_output_error() {
        let temp_dir = TempDir::new().unwrap();
        let writer = HeatmapWriter::new(temp_dir.path());
        let estimator = SeverityEstimator::new(SeverityConfig::default()).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("Potato___healthy/a.png")).unwrap();

        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(8, 8, |_, _| Rgb([0, 0, 0])));
        let cam = ClassActivationMap::<TestBackend> {
            values: Tensor::from_data(TensorData::new(vec![0.5f32; 4], [2, 2]), &Default::default()),
            target_class: 0,
        };

        let err = writer
            .write(&image, &cam, &estimator, "Potato___healthy", Path::new("a.jpg"))
            .unwrap_err();
        match err {
            SeverityError::Output { path, .. } => {
                assert!(path.ends_with("Potato___healthy/a.png"))
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
