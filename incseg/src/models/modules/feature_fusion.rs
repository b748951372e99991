use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Relu,
    },
    prelude::*,
    tensor::activation::sigmoid,
};
use burn_extra_ops::{NormAct, NormActKind, NormLayers};

use super::{ConvBlock, ConvBlockConfig};

/// Configuration for the `FeatureFusion` module.
#[derive(Config, Debug)]
pub struct FeatureFusionConfig {
    /// Output channels, one per class.
    num_classes: usize,
    /// Channels of the concatenated spatial and context features.
    in_channels: usize,
    #[config(default = "NormActKind::BatchNorm")]
    norm: NormActKind,
}

impl FeatureFusionConfig {
    /// Initializes a `FeatureFusion` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> FeatureFusion<B> {
        let convblock = ConvBlockConfig::new(self.in_channels, self.num_classes)
            .with_stride(1)
            .with_norm(self.norm.clone())
            .init(device);
        let conv1 = Conv2dConfig::new([self.num_classes, self.num_classes], [1, 1]).init(device);
        let conv2 = Conv2dConfig::new([self.num_classes, self.num_classes], [1, 1]).init(device);

        FeatureFusion {
            convblock,
            conv1,
            relu: Relu::new(),
            conv2,
        }
    }
}

/// Fuses spatial-path and context-path features with channel attention.
#[derive(Module, Debug)]
pub struct FeatureFusion<B: Backend> {
    convblock: ConvBlock<B>,
    conv1: Conv2d<B>,
    relu: Relu,
    conv2: Conv2d<B>,
}

impl<B: Backend> FeatureFusion<B> {
    /// # Shapes
    /// - spatial: `[batch_size, C1, height, width]`
    /// - context: `[batch_size, C2, height, width]`
    /// - output: `[batch_size, num_classes, height, width]`
    pub fn forward(&self, spatial: Tensor<B, 4>, context: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = Tensor::cat(vec![spatial, context], 1);
        let feature = self.convblock.forward(x);

        let x = feature.clone().mean_dim(3).mean_dim(2);
        let x = self.relu.forward(self.conv1.forward(x));
        let x = sigmoid(self.conv2.forward(x));

        feature.clone().mul(x).add(feature)
    }
}

impl<B: Backend> NormLayers<B> for FeatureFusion<B> {
    fn freeze_norm(mut self) -> Self {
        self.convblock = self.convblock.freeze_norm();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        self.convblock.visit_norm(visitor);
    }
}
