//! Activation and gradient capture for Grad-CAM.
//!
//! The classifier is split at its designated layer. The layer's output is
//! computed without gradient tracking, lifted into the autodiff graph as a
//! fresh leaf, and the rest of the network runs on top of it. Back-propagating
//! the single target logit then yields the gradient with respect to exactly
//! that activation, in a gradient container owned by this call alone.

use burn::tensor::{backend::AutodiffBackend, backend::Backend, Tensor};

use crate::utils::error::{Result, SeverityError};

/// A classifier that can be split at the layer Grad-CAM observes
pub trait CamTarget<B: AutodiffBackend> {
    /// Output of the designated layer, `[1, C, H, W]`, in inference mode
    fn activations(&self, input: Tensor<B::InnerBackend, 4>) -> Tensor<B::InnerBackend, 4>;

    /// Class logits `[1, num_classes]` computed from the designated layer onward
    fn logits(&self, activations: Tensor<B, 4>) -> Tensor<B, 2>;

    fn num_classes(&self) -> usize;
}

/// Activations and target-class gradients of one (image, class) pair
#[derive(Debug, Clone)]
pub struct ActivationSnapshot<B: Backend> {
    /// `[C, H, W]`
    pub activations: Tensor<B, 3>,
    /// `[C, H, W]`, same shape as `activations`
    pub gradients: Tensor<B, 3>,
    pub target_class: usize,
}

impl<B: Backend> ActivationSnapshot<B> {
    pub fn dims(&self) -> [usize; 3] {
        self.activations.dims()
    }
}

/// Caller-owned capture buffer
///
/// Holds at most one snapshot. [`ActivationRecorder::reset`] must be called
/// before every capture; capturing over a previous snapshot is refused, so
/// state from one image can never bleed into the next.
pub struct ActivationRecorder<B: AutodiffBackend> {
    buffer: Option<ActivationSnapshot<B::InnerBackend>>,
}

impl<B: AutodiffBackend> Default for ActivationRecorder<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: AutodiffBackend> ActivationRecorder<B> {
    pub fn new() -> Self {
        Self { buffer: None }
    }

    /// Discard the previous snapshot
    pub fn reset(&mut self) {
        self.buffer = None;
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    /// Last captured snapshot, if any
    pub fn snapshot(&self) -> Option<&ActivationSnapshot<B::InnerBackend>> {
        self.buffer.as_ref()
    }

    /// Run one attribution pass for `target_class`
    ///
    /// `input` must have batch size one.
    pub fn capture<M: CamTarget<B>>(
        &mut self,
        model: &M,
        input: Tensor<B::InnerBackend, 4>,
        target_class: usize,
    ) -> Result<&ActivationSnapshot<B::InnerBackend>> {
        if self.buffer.is_some() {
            return Err(SeverityError::Attribution(
                "capture buffer holds a previous snapshot; call reset() first".to_string(),
            ));
        }

        let [batch, _, _, _] = input.dims();
        if batch != 1 {
            return Err(SeverityError::Attribution(format!(
                "expected a single image, got batch size {}",
                batch
            )));
        }

        if target_class >= model.num_classes() {
            return Err(SeverityError::Attribution(format!(
                "target class {} out of range for {} classes",
                target_class,
                model.num_classes()
            )));
        }

        let activations = model.activations(input);
        let [_, channels, height, width] = activations.dims();

        let leaf = Tensor::<B, 4>::from_inner(activations.clone()).require_grad();
        let logits = model.logits(leaf.clone());

        let [rows, num_logits] = logits.dims();
        if rows != 1 || target_class >= num_logits {
            return Err(SeverityError::Attribution(format!(
                "logits of shape [{}, {}] cannot be indexed at class {}",
                rows, num_logits, target_class
            )));
        }

        let score = logits.slice([0..1, target_class..target_class + 1]).sum();
        let grads = score.backward();

        // A score that does not depend on the layer has a zero gradient.
        let gradients = leaf
            .grad(&grads)
            .unwrap_or_else(|| activations.zeros_like());

        if gradients.dims() != [1, channels, height, width] {
            return Err(SeverityError::Attribution(format!(
                "gradient shape {:?} does not match activation shape {:?}",
                gradients.dims(),
                [1, channels, height, width]
            )));
        }

        let snapshot = ActivationSnapshot {
            activations: activations.reshape([channels, height, width]),
            gradients: gradients.reshape([channels, height, width]),
            target_class,
        };

        Ok(&*self.buffer.insert(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type Inner = NdArray;
    type TestBackend = Autodiff<Inner>;

    /// logits = [sum(2 * a), sum(a * a)]
    struct QuadraticTarget;

    impl CamTarget<TestBackend> for QuadraticTarget {
        fn activations(&self, input: Tensor<Inner, 4>) -> Tensor<Inner, 4> {
            input
        }

        fn logits(&self, activations: Tensor<TestBackend, 4>) -> Tensor<TestBackend, 2> {
            let linear = activations.clone().mul_scalar(2.0).sum().reshape([1, 1]);
            let square = activations.clone().mul(activations).sum().reshape([1, 1]);
            Tensor::cat(vec![linear, square], 1)
        }

        fn num_classes(&self) -> usize {
            2
        }
    }

    fn input(value: f32) -> Tensor<Inner, 4> {
        Tensor::full([1, 2, 3, 3], value, &Default::default())
    }

    #[test]
    fn test_gradient_of_target_class_only() {
        let mut recorder = ActivationRecorder::<TestBackend>::new();

        let snapshot = recorder.capture(&QuadraticTarget, input(1.5), 0).unwrap();
        assert_eq!(snapshot.dims(), [2, 3, 3]);
        let grad_min = snapshot.gradients.clone().min().into_scalar().elem::<f32>();
        let grad_max = snapshot.gradients.clone().max().into_scalar().elem::<f32>();
        assert!((grad_min - 2.0).abs() < 1e-6);
        assert!((grad_max - 2.0).abs() < 1e-6);

        recorder.reset();
        let snapshot = recorder.capture(&QuadraticTarget, input(1.5), 1).unwrap();
        let grad_max = snapshot.gradients.clone().max().into_scalar().elem::<f32>();
        assert!((grad_max - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_capture_without_reset_is_refused() {
        let mut recorder = ActivationRecorder::<TestBackend>::new();
        recorder.capture(&QuadraticTarget, input(1.0), 0).unwrap();

        let err = recorder.capture(&QuadraticTarget, input(1.0), 0).unwrap_err();
        assert!(matches!(err, SeverityError::Attribution(_)));

        recorder.reset();
        assert!(recorder.is_empty());
        assert!(recorder.capture(&QuadraticTarget, input(1.0), 0).is_ok());
    }

    #[test]
    fn test_no_accumulation_across_captures() {
        let mut recorder = ActivationRecorder::<TestBackend>::new();
        let first = recorder
            .capture(&QuadraticTarget, input(2.0), 1)
            .unwrap()
            .gradients
            .clone();
        recorder.reset();
        let second = recorder
            .capture(&QuadraticTarget, input(2.0), 1)
            .unwrap()
            .gradients
            .clone();

        let diff = (first - second).abs().max().into_scalar().elem::<f32>();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_invalid_target_class() {
        let mut recorder = ActivationRecorder::<TestBackend>::new();
        let err = recorder.capture(&QuadraticTarget, input(1.0), 2).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_batch_must_be_single_image() {
        let mut recorder = ActivationRecorder::<TestBackend>::new();
        let batch = Tensor::<Inner, 4>::ones([2, 2, 3, 3], &Default::default());
        assert!(recorder.capture(&QuadraticTarget, batch, 0).is_err());
    }
}
