use burn::prelude::*;
use burn_extra_ops::{NormAct, NormActKind, NormLayers};

use super::{ConvBlock, ConvBlockConfig};

/// Channel count of the spatial path output.
pub const SPATIAL_PATH_CHANNELS: usize = 256;

/// Configuration for the `SpatialPath` module.
#[derive(Config, Debug)]
pub struct SpatialPathConfig {
    #[config(default = "3")]
    in_channels: usize,
    #[config(default = "NormActKind::BatchNorm")]
    norm: NormActKind,
}

impl SpatialPathConfig {
    /// Initializes a `SpatialPath` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> SpatialPath<B> {
        let block = |in_channels, out_channels| {
            ConvBlockConfig::new(in_channels, out_channels)
                .with_norm(self.norm.clone())
                .init(device)
        };

        SpatialPath {
            convblock1: block(self.in_channels, 64),
            convblock2: block(64, 128),
            convblock3: block(128, SPATIAL_PATH_CHANNELS),
        }
    }
}

/// Three stride-2 conv blocks keeping spatial detail at 1/8 of the input resolution.
#[derive(Module, Debug)]
pub struct SpatialPath<B: Backend> {
    convblock1: ConvBlock<B>,
    convblock2: ConvBlock<B>,
    convblock3: ConvBlock<B>,
}

impl<B: Backend> SpatialPath<B> {
    /// # Shapes
    /// - input: `[batch_size, 3, height, width]`
    /// - output: `[batch_size, 256, height / 8, width / 8]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.convblock1.forward(input);
        let x = self.convblock2.forward(x);
        self.convblock3.forward(x)
    }
}

impl<B: Backend> NormLayers<B> for SpatialPath<B> {
    fn freeze_norm(mut self) -> Self {
        self.convblock1 = self.convblock1.freeze_norm();
        self.convblock2 = self.convblock2.freeze_norm();
        self.convblock3 = self.convblock3.freeze_norm();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        self.convblock1.visit_norm(visitor);
        self.convblock2.visit_norm(visitor);
        self.convblock3.visit_norm(visitor);
    }
}
