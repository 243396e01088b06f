//! CNN classifier for potato leaf disease
//!
//! Four convolutional blocks followed by global average pooling and a small
//! fully connected head. The last block (`conv4`) is the layer Grad-CAM
//! observes: with a 224×224 input it emits a 14×14 spatial map.

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};

use crate::severity::recorder::CamTarget;

/// Configuration for the PlantClassifier CNN model
#[derive(Config, Debug)]
pub struct PlantClassifierConfig {
    /// Number of output classes (3 for the potato subset of PlantVillage)
    #[config(default = "3")]
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "224")]
    pub input_size: usize,

    /// Dropout rate used by the training side
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Base number of convolutional filters
    #[config(default = "32")]
    pub base_filters: usize,
}

impl PlantClassifierConfig {
    /// Spatial side length of the `conv4` activation map
    pub fn feature_map_size(&self) -> usize {
        self.input_size / 16
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PlantClassifier<B> {
        PlantClassifier::new(self, device)
    }
}

/// A CNN block with Conv2d, BatchNorm, ReLU, and optional MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: Option<MaxPool2d>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        with_pool: bool,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        let pool = if with_pool {
            Some(MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init())
        } else {
            None
        };

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);

        match &self.pool {
            Some(pool) => pool.forward(x),
            None => x,
        }
    }
}

/// Potato leaf classifier
///
/// Architecture:
/// - 4 convolutional blocks (conv, batch norm, ReLU, 2×2 max pool)
/// - Global Average Pooling
/// - fc1 → ReLU → dropout → fc2
#[derive(Module, Debug)]
pub struct PlantClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,

    pub global_pool: AdaptiveAvgPool2d,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> PlantClassifier<B> {
    pub fn new(config: &PlantClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        let conv1 = ConvBlock::new(config.in_channels, base, 3, true, device); // 224 -> 112
        let conv2 = ConvBlock::new(base, base * 2, 3, true, device); // 112 -> 56
        let conv3 = ConvBlock::new(base * 2, base * 4, 3, true, device); // 56 -> 28
        let conv4 = ConvBlock::new(base * 4, base * 8, 3, true, device); // 28 -> 14

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        let fc1 = LinearConfig::new(base * 8, 256).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let fc2 = LinearConfig::new(256, config.num_classes).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            conv4,
            global_pool,
            fc1,
            dropout,
            fc2,
            num_classes: config.num_classes,
        }
    }

    /// Full forward pass: `[B, 3, H, W]` → logits `[B, num_classes]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.embed(self.forward_features(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Convolutional trunk up to and including `conv4`
    pub fn forward_features(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        self.conv4.forward(x)
    }

    /// Logits from `conv4` features, without dropout
    pub fn forward_head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc2.forward(self.embed(features))
    }

    fn embed(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(features);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        Relu::new().forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Classifier prepared for Grad-CAM
///
/// The trunk runs on the inner backend, where batch norm uses its running
/// statistics. The head runs on the autodiff backend with frozen parameters so
/// only the activation leaf receives a gradient.
pub struct GradCamClassifier<B: AutodiffBackend> {
    trunk: PlantClassifier<B::InnerBackend>,
    head: PlantClassifier<B>,
}

impl<B: AutodiffBackend> GradCamClassifier<B> {
    pub fn new(model: PlantClassifier<B>) -> Self {
        Self {
            trunk: model.valid(),
            head: model.no_grad(),
        }
    }
}

impl<B: AutodiffBackend> CamTarget<B> for GradCamClassifier<B> {
    fn activations(&self, input: Tensor<B::InnerBackend, 4>) -> Tensor<B::InnerBackend, 4> {
        self.trunk.forward_features(input)
    }

    fn logits(&self, activations: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward_head(activations)
    }

    fn num_classes(&self) -> usize {
        self.head.num_classes()
    }
}
