//! Deterministic image preprocessing applied before attribution.
//!
//! Resize to the classifier's input size, scale to [0, 1], normalise each
//! channel with the ImageNet statistics and lay the result out as CHW.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage, ImageReader};

use crate::utils::error::{Result, SeverityError};

/// ImageNet normalization constants
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fixed resize + normalise transform
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    image_size: u32,
}

impl ImagePreprocessor {
    pub fn new(image_size: u32) -> Self {
        Self { image_size }
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Decode an image file, reporting the path on failure
    pub fn load(&self, path: &Path) -> Result<DynamicImage> {
        let reader = ImageReader::open(path)
            .map_err(|e| SeverityError::ImageLoad(path.to_path_buf(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| SeverityError::ImageLoad(path.to_path_buf(), e.to_string()))?;

        reader
            .decode()
            .map_err(|e| SeverityError::ImageLoad(path.to_path_buf(), e.to_string()))
    }

    /// Resize to a square of the configured size (aspect ratio is not kept)
    pub fn resize(&self, image: &DynamicImage) -> DynamicImage {
        if image.width() == self.image_size && image.height() == self.image_size {
            return DynamicImage::ImageRgb8(image.to_rgb8());
        }
        DynamicImage::ImageRgb8(image.to_rgb8()).resize_exact(
            self.image_size,
            self.image_size,
            FilterType::Triangle,
        )
    }

    /// Normalised CHW pixel values of an already resized image
    pub fn normalize(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let num_pixels = (width * height) as usize;

        let mut normalized = vec![0.0f32; 3 * num_pixels];

        for (i, pixel) in rgb.pixels().enumerate() {
            for c in 0..3 {
                normalized[c * num_pixels + i] =
                    (pixel[c] as f32 / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            }
        }

        normalized
    }

    /// Full transform into a `[1, 3, S, S]` tensor
    pub fn to_tensor<B: Backend>(&self, image: &DynamicImage, device: &B::Device) -> Tensor<B, 4> {
        self.resized_to_tensor(&self.resize(image), device)
    }

    /// Normalise an image already produced by [`Self::resize`]
    pub fn resized_to_tensor<B: Backend>(
        &self,
        resized: &DynamicImage,
        device: &B::Device,
    ) -> Tensor<B, 4> {
        let size = self.image_size as usize;
        let data = TensorData::new(self.normalize(resized), [1, 3, size, size]);
        Tensor::from_data(data, device)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(crate::IMAGE_SIZE as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{ImageBuffer, Rgb};

    type TestBackend = NdArray;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |_, _| Rgb(color)))
    }

    #[test]
    fn test_resize_to_square() {
        let pre = ImagePreprocessor::new(32);
        let resized = pre.resize(&solid(64, 48, [10, 20, 30]));
        assert_eq!((resized.width(), resized.height()), (32, 32));
    }

    #[test]
    fn test_normalize_chw_layout() {
        let pre = ImagePreprocessor::new(2);
        let values = pre.normalize(&solid(2, 2, [255, 0, 255]));

        assert_eq!(values.len(), 12);
        let red = (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0];
        let green = (0.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1];
        assert!((values[0] - red).abs() < 1e-6);
        assert!((values[3] - red).abs() < 1e-6);
        assert!((values[4] - green).abs() < 1e-6);
    }

    #[test]
    fn test_to_tensor_shape() {
        let pre = ImagePreprocessor::new(16);
        let device = Default::default();
        let tensor = pre.to_tensor::<TestBackend>(&solid(40, 30, [0, 128, 0]), &device);
        assert_eq!(tensor.dims(), [1, 3, 16, 16]);
    }

    #[test]
    fn test_load_missing_file() {
        let pre = ImagePreprocessor::default();
        let err = pre.load(Path::new("does/not/exist.png")).unwrap_err();
        assert!(matches!(err, SeverityError::ImageLoad(..)));
    }

    #[test]
    fn test_resized_input_matches_full_transform() {
        let pre = ImagePreprocessor::new(8);
        let device = Default::default();
        let image = solid(20, 12, [200, 40, 90]);

        let full = pre.to_tensor::<TestBackend>(&image, &device);
        let split = pre.resized_to_tensor::<TestBackend>(&pre.resize(&image), &device);
        assert_eq!(
            full.into_data().to_vec::<f32>().unwrap(),
            split.into_data().to_vec::<f32>().unwrap()
        );
    }
}
