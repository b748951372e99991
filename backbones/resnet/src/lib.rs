//! ResNet implementation for the BiSeNet context path.
//!
//! The implementation follows torchvision's ResNet, with every normalization layer
//! replaced by a [`NormAct`] of a caller-selected [`NormActKind`] so that the whole
//! backbone shares one normalization strategy.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
    Initializer, PaddingConfig2d,
};
use burn::prelude::*;
use burn_extra_ops::{NormAct, NormActKind, NormLayers};
use core::f64::consts::SQRT_2;

mod blocks;
pub use blocks::*;

// ResNet residual layer block configs
const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// ResNet feature extractor.
///
/// Returns the outputs of the four residual stages (1/4, 1/8, 1/16 and 1/32 of the
/// input resolution).
#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    // First feature level: conv1 + bn1 + relu + maxpool + layer1
    pub conv1_block: Conv1Block<B>,
    pub layer1: LayerBlock<B>,

    // Second feature level: layer2
    pub layer2: LayerBlock<B>,

    // Third feature level: layer3
    pub layer3: LayerBlock<B>,

    // Fourth feature level: layer4
    pub layer4: LayerBlock<B>,

    expansion: usize,
}

impl<B: Backend> ResNetBackbone<B> {
    /// Forward pass returning the 4 stage outputs.
    pub fn forward(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 4] {
        let conv1 = self.conv1_block.forward(input);
        let conv1 = self.layer1.forward(conv1);
        let conv2 = self.layer2.forward(conv1.clone());
        let conv3 = self.layer3.forward(conv2.clone());
        let conv4 = self.layer4.forward(conv3.clone());

        [conv1, conv2, conv3, conv4]
    }

    /// Channel count of each stage output.
    pub const fn output_channels(&self) -> [usize; 4] {
        let e = self.expansion;
        [64 * e, 128 * e, 256 * e, 512 * e]
    }

    /// Create ResNet-18 backbone.
    pub fn resnet18(norm: &NormActKind, device: &Device<B>) -> Self {
        Self::new(RESNET18_BLOCKS, 1, norm, device)
    }

    /// Create ResNet-34 backbone.
    pub fn resnet34(norm: &NormActKind, device: &Device<B>) -> Self {
        Self::new(RESNET34_BLOCKS, 1, norm, device)
    }

    /// Create ResNet-50 backbone.
    pub fn resnet50(norm: &NormActKind, device: &Device<B>) -> Self {
        Self::new(RESNET50_BLOCKS, 4, norm, device)
    }

    /// Create ResNet-101 backbone.
    pub fn resnet101(norm: &NormActKind, device: &Device<B>) -> Self {
        Self::new(RESNET101_BLOCKS, 4, norm, device)
    }

    /// Create ResNet-152 backbone.
    pub fn resnet152(norm: &NormActKind, device: &Device<B>) -> Self {
        Self::new(RESNET152_BLOCKS, 4, norm, device)
    }

    /// Create a new ResNet backbone with the specified configuration.
    fn new(blocks: [usize; 4], expansion: usize, norm: &NormActKind, device: &Device<B>) -> Self {
        assert!(
            expansion == 1 || expansion == 4,
            "ResNet backbone only supports expansion values [1, 4] for residual blocks"
        );

        // First conv block: 7x7 conv, 64, stride=2, padding=3
        let conv1_block = Conv1Block::new(3, 64, norm, device);

        // Residual blocks
        let bottleneck = expansion > 1;
        let layer1 = LayerBlock::new(blocks[0], 64, 64 * expansion, 1, bottleneck, norm, device);
        let layer2 = LayerBlock::new(
            blocks[1],
            64 * expansion,
            128 * expansion,
            2,
            bottleneck,
            norm,
            device,
        );
        let layer3 = LayerBlock::new(
            blocks[2],
            128 * expansion,
            256 * expansion,
            2,
            bottleneck,
            norm,
            device,
        );
        let layer4 = LayerBlock::new(
            blocks[3],
            256 * expansion,
            512 * expansion,
            2,
            bottleneck,
            norm,
            device,
        );

        Self {
            conv1_block,
            layer1,
            layer2,
            layer3,
            layer4,
            expansion,
        }
    }
}

impl<B: Backend> NormLayers<B> for ResNetBackbone<B> {
    fn freeze_norm(mut self) -> Self {
        self.conv1_block = self.conv1_block.freeze_norm();
        self.layer1 = self.layer1.freeze_norm();
        self.layer2 = self.layer2.freeze_norm();
        self.layer3 = self.layer3.freeze_norm();
        self.layer4 = self.layer4.freeze_norm();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        self.conv1_block.visit_norm(visitor);
        self.layer1.visit_norm(visitor);
        self.layer2.visit_norm(visitor);
        self.layer3.visit_norm(visitor);
        self.layer4.visit_norm(visitor);
    }
}

/// First conv block: conv1 + bn1 + relu + maxpool
#[derive(Module, Debug)]
pub struct Conv1Block<B: Backend> {
    conv1: Conv2d<B>,
    bn1: NormAct<B>,
    maxpool: MaxPool2d,
}

impl<B: Backend> Conv1Block<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        self.maxpool.forward(out)
    }

    /// Create a new Conv1Block.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        norm: &NormActKind,
        device: &Device<B>,
    ) -> Self {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        // 7x7 conv, stride=2, padding=3
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);

        let bn1 = blocks::activated_norm(out_channels, norm, device);

        // 3x3 maxpool, stride=2, padding=1
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            conv1,
            bn1,
            maxpool,
        }
    }
}

impl<B: Backend> NormLayers<B> for Conv1Block<B> {
    fn freeze_norm(mut self) -> Self {
        self.bn1 = self.bn1.freeze();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        visitor(&self.bn1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_resnet18_forward() {
        let device = Default::default();
        let model = ResNetBackbone::<TestBackend>::resnet18(&NormActKind::BatchNorm, &device);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.forward(input);

        // Check output shapes for ResNet18 (expansion=1)
        assert_eq!(output[0].dims(), [1, 64, 16, 16]); // 64/4 = 16
        assert_eq!(output[1].dims(), [1, 128, 8, 8]);
        assert_eq!(output[2].dims(), [1, 256, 4, 4]);
        assert_eq!(output[3].dims(), [1, 512, 2, 2]);
        assert_eq!(model.output_channels(), [64, 128, 256, 512]);
    }

    #[test]
    fn test_resnet50_forward_with_abn() {
        let device = Default::default();
        let model = ResNetBackbone::<TestBackend>::resnet50(&NormActKind::InPlaceAbn, &device);

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let output = model.forward(input);

        assert_eq!(output[0].dims(), [1, 256, 16, 16]);
        assert_eq!(output[3].dims(), [1, 2048, 2, 2]);
        assert_eq!(model.output_channels(), [256, 512, 1024, 2048]);
    }

    #[test]
    fn test_norm_kind_reaches_every_layer() {
        let device = Default::default();
        let model = ResNetBackbone::<TestBackend>::resnet18(&NormActKind::Abn, &device);

        // conv1 + 8 basic blocks * 2 + 3 downsample layers
        assert_eq!(model.norm_count(), 1 + 16 + 3);
        model.visit_norm(&mut |layer| assert_eq!(layer.kind(), &NormActKind::Abn));
    }

    #[test]
    fn test_freeze_norm_covers_whole_backbone() {
        let device = Default::default();
        let model = ResNetBackbone::<TestBackend>::resnet18(&NormActKind::BatchNorm, &device)
            .freeze_norm();

        model.visit_norm(&mut |layer| assert!(layer.is_frozen()));
    }
}
