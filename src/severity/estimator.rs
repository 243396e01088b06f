//! CAM coverage to severity score.

use burn::tensor::{backend::Backend, ElementConversion, Tensor};

use super::cam::ClassActivationMap;
use super::SeverityConfig;
use crate::utils::error::Result;

/// Thresholds a CAM, measures coverage and calibrates it into [0, 1]
#[derive(Debug, Clone)]
pub struct SeverityEstimator {
    config: SeverityConfig,
}

impl SeverityEstimator {
    pub fn new(config: SeverityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SeverityConfig {
        &self.config
    }

    /// Resample a map to `size`, clamped back into [0, 1]
    ///
    /// Maps already at `size` are returned untouched.
    pub fn resample<B: Backend>(&self, map: Tensor<B, 2>, size: [usize; 2]) -> Tensor<B, 2> {
        let [height, width] = map.dims();
        if [height, width] == size {
            return map;
        }

        let resized = self
            .config
            .interpolation
            .resample(map.reshape([1, 1, height, width]), size);

        // Bicubic overshoots near sharp edges.
        resized.reshape(size).clamp(0.0, 1.0)
    }

    /// Fraction of pixels strictly above the threshold
    pub fn coverage<B: Backend>(&self, map: Tensor<B, 2>) -> f32 {
        let [height, width] = map.dims();
        let total = height * width;
        if total == 0 {
            return 0.0;
        }

        let affected = map
            .greater_elem(self.config.threshold)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        affected as f32 / total as f32
    }

    /// `min(coverage * multiplier, 1)`
    pub fn calibrate(&self, coverage: f32) -> f32 {
        (coverage * self.config.multiplier).clamp(0.0, 1.0)
    }

    /// Severity of a map measured on a `resize_to` grid
    pub fn estimate<B: Backend>(&self, cam: &ClassActivationMap<B>, resize_to: [usize; 2]) -> f32 {
        let resampled = self.resample(cam.values.clone(), resize_to);
        self.calibrate(self.coverage(resampled))
    }

    /// Severity on the configured canonical grid
    pub fn estimate_canonical<B: Backend>(&self, cam: &ClassActivationMap<B>) -> f32 {
        self.estimate(cam, self.config.canonical_shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::CamInterpolation;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn map(data: Vec<f32>, shape: [usize; 2]) -> ClassActivationMap<TestBackend> {
        ClassActivationMap {
            values: Tensor::from_data(TensorData::new(data, shape), &Default::default()),
            target_class: 0,
        }
    }

    /// 10x10 map with the first `hot` pixels at 1.0
    fn partial_map(hot: usize) -> ClassActivationMap<TestBackend> {
        map((0..100).map(|i| if i < hot { 1.0 } else { 0.0 }).collect(), [10, 10])
    }

    fn estimator() -> SeverityEstimator {
        SeverityEstimator::new(SeverityConfig::default()).unwrap()
    }

    #[test]
    fn test_zero_map_is_zero_severity() {
        let est = SeverityEstimator::new(SeverityConfig {
            multiplier: 100.0,
            ..Default::default()
        })
        .unwrap();
        let cam = map(vec![0.0; 49], [7, 7]);
        assert_eq!(est.estimate(&cam, [224, 224]), 0.0);
    }

    #[test]
    fn test_uniform_map_upsamples_to_full_coverage() {
        let cam = map(vec![1.0; 49], [7, 7]);
        for interpolation in [CamInterpolation::Bilinear, CamInterpolation::Bicubic] {
            let est = SeverityEstimator::new(SeverityConfig {
                interpolation,
                ..Default::default()
            })
            .unwrap();
            assert_eq!(est.estimate(&cam, [224, 224]), 1.0);
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let est = estimator();
        let cam = map(vec![0.4, 0.4, 0.41, 0.0], [2, 2]);
        assert!((est.coverage(cam.values.clone()) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_coverage_and_calibration() {
        let est = estimator();
        // 10% coverage at native size, multiplier 3
        let severity = est.estimate(&partial_map(10), [10, 10]);
        assert!((severity - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_monotonic_in_hot_fraction() {
        let est = estimator();
        let mut previous = 0.0;
        for hot in 0..=100 {
            let severity = est.estimate(&partial_map(hot), [10, 10]);
            assert!(severity >= previous, "severity dropped at {} hot pixels", hot);
            previous = severity;
        }
    }

    #[test]
    fn test_saturates_at_one_third() {
        let est = estimator();
        assert_eq!(est.calibrate(1.0 / 3.0 + 1e-6), 1.0);
        for hot in [34, 50, 75, 100] {
            assert_eq!(est.estimate(&partial_map(hot), [10, 10]), 1.0);
        }
        assert!(est.estimate(&partial_map(33), [10, 10]) < 1.0);
    }

    #[test]
    fn test_resample_stays_in_unit_range() {
        let est = SeverityEstimator::new(SeverityConfig {
            interpolation: CamInterpolation::Bicubic,
            ..Default::default()
        })
        .unwrap();
        let checker: Vec<f32> = (0..16).map(|i| ((i + i / 4) % 2) as f32).collect();
        let resized = est.resample(map(checker, [4, 4]).values, [32, 32]);

        assert_eq!(resized.dims(), [32, 32]);
        let values = resized.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SeverityEstimator::new(SeverityConfig {
            threshold: -0.1,
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
