//! Gradient-weighted class activation maps

use burn::tensor::{backend::Backend, ElementConversion, Tensor};

use super::recorder::ActivationSnapshot;
use crate::utils::error::{Result, SeverityError};

/// Compute a Grad-CAM map from `[C, H, W]` activations and gradients
///
/// Channel weights are the spatial mean of the gradients. The weighted
/// channel sum is floored at zero and divided by its maximum, so the result
/// lies in [0, 1] with a peak of exactly 1.0 unless it is all zero.
pub fn grad_cam<B: Backend>(activations: Tensor<B, 3>, gradients: Tensor<B, 3>) -> Tensor<B, 2> {
    let [channels, height, width] = activations.dims();

    let weights = gradients
        .reshape([channels, height * width])
        .mean_dim(1)
        .reshape([channels, 1, 1]);

    let cam = (activations * weights)
        .sum_dim(0)
        .reshape([height, width])
        .clamp_min(0.0);

    let peak = cam.clone().max().into_scalar().elem::<f32>();
    if peak > 0.0 {
        cam.div_scalar(peak)
    } else {
        cam
    }
}

/// Normalised importance map for one (image, class) pair
#[derive(Debug, Clone)]
pub struct ClassActivationMap<B: Backend> {
    /// `[H, W]`, values in [0, 1]
    pub values: Tensor<B, 2>,
    pub target_class: usize,
}

impl<B: Backend> ClassActivationMap<B> {
    /// Build the map from a captured snapshot
    pub fn generate(snapshot: &ActivationSnapshot<B>) -> Result<Self> {
        if snapshot.activations.dims() != snapshot.gradients.dims() {
            return Err(SeverityError::Attribution(format!(
                "activation shape {:?} and gradient shape {:?} differ",
                snapshot.activations.dims(),
                snapshot.gradients.dims()
            )));
        }

        Ok(Self {
            values: grad_cam(snapshot.activations.clone(), snapshot.gradients.clone()),
            target_class: snapshot.target_class,
        })
    }

    /// `[height, width]`
    pub fn dims(&self) -> [usize; 2] {
        self.values.dims()
    }

    pub fn max_value(&self) -> f32 {
        self.values.clone().max().into_scalar().elem::<f32>()
    }

    pub fn is_zero(&self) -> bool {
        self.max_value() <= 0.0
    }

    /// Row-major copy of the map
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        self.values
            .clone()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| SeverityError::Attribution(format!("{:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tensor3(data: Vec<f32>, shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        Tensor::from_data(TensorData::new(data, shape), &Default::default())
    }

    fn snapshot(acts: Vec<f32>, grads: Vec<f32>, shape: [usize; 3]) -> ActivationSnapshot<TestBackend> {
        ActivationSnapshot {
            activations: tensor3(acts, shape),
            gradients: tensor3(grads, shape),
            target_class: 0,
        }
    }

    #[test]
    fn test_zero_gradients_give_zero_map() {
        let acts: Vec<f32> = (0..18).map(|v| v as f32 * 0.3 - 1.0).collect();
        let cam = ClassActivationMap::generate(&snapshot(acts, vec![0.0; 18], [2, 3, 3])).unwrap();

        assert_eq!(cam.dims(), [3, 3]);
        assert!(cam.is_zero());
        assert!(cam.to_vec().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_values_in_unit_range_with_exact_peak() {
        let acts: Vec<f32> = (0..32).map(|v| ((v * 7) % 11) as f32 - 3.0).collect();
        let grads: Vec<f32> = (0..32).map(|v| ((v * 5) % 13) as f32 * 0.1 - 0.4).collect();
        let cam = ClassActivationMap::generate(&snapshot(acts, grads, [2, 4, 4])).unwrap();

        let values = cam.to_vec().unwrap();
        assert!(values.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(cam.max_value(), 1.0);
    }

    #[test]
    fn test_negative_evidence_is_clipped() {
        // One channel, gradient mean -1: every location is negative before the floor.
        let cam = grad_cam(
            tensor3(vec![1.0, 2.0, 3.0, 4.0], [1, 2, 2]),
            tensor3(vec![-1.0; 4], [1, 2, 2]),
        );
        let values = cam.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0; 4]);
    }

    #[test]
    fn test_weighted_channel_sum() {
        // Channel 0 weight 1, channel 1 weight 0.5
        let acts = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 4.0];
        let grads = vec![1.0, 1.0, 1.0, 1.0, 0.5, 0.5, 0.5, 0.5];
        let cam = grad_cam(tensor3(acts, [2, 2, 2]), tensor3(grads, [2, 2, 2]));
        let values = cam.into_data().to_vec::<f32>().unwrap();

        assert_eq!(values, vec![0.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let bad = ActivationSnapshot {
            activations: tensor3(vec![0.0; 8], [2, 2, 2]),
            gradients: tensor3(vec![0.0; 4], [1, 2, 2]),
            target_class: 0,
        };
        assert!(ClassActivationMap::generate(&bad).is_err());
    }
}
