use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    tensor::activation::sigmoid,
};
use burn_extra_ops::{Activation, NormAct, NormActConfig, NormActKind, NormLayers};

/// Configuration for the `AttentionRefinement` module.
#[derive(Config, Debug)]
pub struct AttentionRefinementConfig {
    channels: usize,
    #[config(default = "NormActKind::BatchNorm")]
    norm: NormActKind,
}

impl AttentionRefinementConfig {
    /// Initializes an `AttentionRefinement` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AttentionRefinement<B> {
        let conv = Conv2dConfig::new([self.channels, self.channels], [1, 1]).init(device);
        let bn = NormActConfig::new(self.channels)
            .with_kind(self.norm.clone())
            .with_activation(Some(Activation::Identity))
            .init(device);

        AttentionRefinement { conv, bn }
    }
}

/// Re-weights the channels of a context feature with a globally pooled gate.
#[derive(Module, Debug)]
pub struct AttentionRefinement<B: Backend> {
    conv: Conv2d<B>,
    bn: NormAct<B>,
}

impl<B: Backend> AttentionRefinement<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = input.clone().mean_dim(3).mean_dim(2);
        let x = self.conv.forward(x);
        let x = sigmoid(self.bn.forward(x));
        input.mul(x)
    }
}

impl<B: Backend> NormLayers<B> for AttentionRefinement<B> {
    fn freeze_norm(mut self) -> Self {
        self.bn = self.bn.freeze();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        visitor(&self.bn);
    }
}
