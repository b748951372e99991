use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::{Activation, NormAct, NormActConfig, NormActKind, NormLayers};

/// A `conv -> norm -> activation` block.
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = "3")]
    kernel_size: usize,
    #[config(default = "2")]
    stride: usize,
    #[config(default = "1")]
    padding: usize,
    #[config(default = "NormActKind::BatchNorm")]
    norm: NormActKind,
}

impl ConvBlockConfig {
    /// Initializes a `ConvBlock` module.
    ///
    /// The activation is ReLU, or the fused leaky-ReLU of an ABN norm kind.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvBlock<B> {
        let conv = Conv2dConfig::new(
            [self.in_channels, self.out_channels],
            [self.kernel_size, self.kernel_size],
        )
        .with_stride([self.stride, self.stride])
        .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
        .with_bias(false)
        .init(device);

        let bn = NormActConfig::new(self.out_channels)
            .with_kind(self.norm.clone())
            .with_activation(Some(self.norm.block_activation(Activation::Relu)))
            .init(device);

        ConvBlock { conv, bn }
    }
}

/// Convolution followed by an activated normalization.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    bn: NormAct<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

impl<B: Backend> NormLayers<B> for ConvBlock<B> {
    fn freeze_norm(mut self) -> Self {
        self.bn = self.bn.freeze();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        visitor(&self.bn);
    }
}
