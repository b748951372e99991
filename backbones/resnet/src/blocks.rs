//! ResNet block implementations.
//!
//! This module contains the building blocks for ResNet: BasicBlock, Bottleneck, and LayerBlock.
//! Every normalization layer is a [`NormAct`] of the kind chosen for the whole network.

use core::f64::consts::SQRT_2;

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Initializer, PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::{Activation, NormAct, NormActConfig, NormActKind, NormLayers};

fn kaiming() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

/// Norm layer followed by the block activation (ReLU, or the kind's fused leaky-ReLU).
pub(crate) fn activated_norm<B: Backend>(
    channels: usize,
    norm: &NormActKind,
    device: &Device<B>,
) -> NormAct<B> {
    NormActConfig::new(channels)
        .with_kind(norm.clone())
        .with_activation(Some(norm.block_activation(Activation::Relu)))
        .init(device)
}

/// Norm layer without activation, used before a residual sum.
fn linear_norm<B: Backend>(channels: usize, norm: &NormActKind, device: &Device<B>) -> NormAct<B> {
    NormActConfig::new(channels)
        .with_kind(norm.clone())
        .with_activation(Some(Activation::Identity))
        .init(device)
}

#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    /// A bottleneck residual block.
    Bottleneck(Bottleneck<B>),
    /// A basic residual block.
    Basic(BasicBlock<B>),
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

impl<B: Backend> NormLayers<B> for ResidualBlock<B> {
    fn freeze_norm(self) -> Self {
        match self {
            Self::Basic(block) => Self::Basic(block.freeze_norm()),
            Self::Bottleneck(block) => Self::Bottleneck(block.freeze_norm()),
        }
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        match self {
            Self::Basic(block) => block.visit_norm(visitor),
            Self::Bottleneck(block) => block.visit_norm(visitor),
        }
    }
}

/// ResNet basic residual block implementation.
/// Derived from torchvision.models.resnet.BasicBlock
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: NormAct<B>,
    conv2: Conv2d<B>,
    bn2: NormAct<B>,
    downsample: Option<Downsample<B>>,
    activation: Ignored<Activation>,
}

impl<B: Backend> BasicBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        self.activation.0.forward(out)
    }

    /// Create a new BasicBlock.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        norm: &NormActKind,
        device: &Device<B>,
    ) -> Self {
        // conv3x3
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn1 = activated_norm(out_channels, norm, device);

        // conv3x3
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn2 = linear_norm(out_channels, norm, device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, norm, device));

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample,
            activation: Ignored(norm.block_activation(Activation::Relu)),
        }
    }
}

impl<B: Backend> NormLayers<B> for BasicBlock<B> {
    fn freeze_norm(mut self) -> Self {
        self.bn1 = self.bn1.freeze();
        self.bn2 = self.bn2.freeze();
        self.downsample = self.downsample.freeze_norm();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        visitor(&self.bn1);
        visitor(&self.bn2);
        self.downsample.visit_norm(visitor);
    }
}

/// ResNet bottleneck residual block implementation.
/// Derived from torchvision.models.resnet.Bottleneck
///
/// **NOTE:** Following common practice, this bottleneck block places the stride for downsampling
/// to the second 3x3 convolution while the original paper places it to the first 1x1 convolution.
/// This variant improves the accuracy and is known as ResNet V1.5.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: NormAct<B>,
    conv2: Conv2d<B>,
    bn2: NormAct<B>,
    conv3: Conv2d<B>,
    bn3: NormAct<B>,
    downsample: Option<Downsample<B>>,
    activation: Ignored<Activation>,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        // Skip connection
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(identity),
            None => out + identity,
        };

        self.activation.0.forward(out)
    }

    /// Create a new Bottleneck.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        norm: &NormActKind,
        device: &Device<B>,
    ) -> Self {
        // Intermediate output channels w/ expansion = 4
        let int_out_channels = out_channels / 4;

        // conv1x1
        let conv1 = Conv2dConfig::new([in_channels, int_out_channels], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn1 = activated_norm(int_out_channels, norm, device);

        // conv3x3
        let conv2 = Conv2dConfig::new([int_out_channels, int_out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn2 = activated_norm(int_out_channels, norm, device);

        // conv1x1
        let conv3 = Conv2dConfig::new([int_out_channels, out_channels], [1, 1])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn3 = linear_norm(out_channels, norm, device);

        let downsample = (stride != 1 || in_channels != out_channels)
            .then(|| Downsample::new(in_channels, out_channels, stride, norm, device));

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            conv3,
            bn3,
            downsample,
            activation: Ignored(norm.block_activation(Activation::Relu)),
        }
    }
}

impl<B: Backend> NormLayers<B> for Bottleneck<B> {
    fn freeze_norm(mut self) -> Self {
        self.bn1 = self.bn1.freeze();
        self.bn2 = self.bn2.freeze();
        self.bn3 = self.bn3.freeze();
        self.downsample = self.downsample.freeze_norm();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        visitor(&self.bn1);
        visitor(&self.bn2);
        visitor(&self.bn3);
        self.downsample.visit_norm(visitor);
    }
}

/// Downsample layer applies a 1x1 conv to reduce the resolution (H, W) and adjust the number of channels.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: NormAct<B>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }

    /// Create a new Downsample.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        norm: &NormActKind,
        device: &Device<B>,
    ) -> Self {
        // conv1x1
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(0, 0))
            .with_bias(false)
            .with_initializer(kaiming())
            .init(device);
        let bn = linear_norm(out_channels, norm, device);

        Self { conv, bn }
    }
}

impl<B: Backend> NormLayers<B> for Downsample<B> {
    fn freeze_norm(mut self) -> Self {
        self.bn = self.bn.freeze();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        visitor(&self.bn);
    }
}

/// Collection of residual blocks.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(input, |x, block| block.forward(x))
    }

    /// Create a new LayerBlock.
    pub fn new(
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        bottleneck: bool,
        norm: &NormActKind,
        device: &Device<B>,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|b| {
                // The first block changes the resolution and the channel count
                let (in_channels, stride) = if b == 0 {
                    (in_channels, stride)
                } else {
                    (out_channels, 1)
                };

                if bottleneck {
                    ResidualBlock::Bottleneck(Bottleneck::new(
                        in_channels,
                        out_channels,
                        stride,
                        norm,
                        device,
                    ))
                } else {
                    ResidualBlock::Basic(BasicBlock::new(
                        in_channels,
                        out_channels,
                        stride,
                        norm,
                        device,
                    ))
                }
            })
            .collect();

        Self { blocks }
    }
}

impl<B: Backend> NormLayers<B> for LayerBlock<B> {
    fn freeze_norm(mut self) -> Self {
        self.blocks = self.blocks.freeze_norm();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        self.blocks.visit_norm(visitor);
    }
}
