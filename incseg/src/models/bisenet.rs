//! # BiSeNet Backbone
//!
//! The shared feature extractor of the segmentation models: a bilateral network with
//! a shallow, high-resolution spatial path and a ResNet context path whose features
//! are refined by channel attention and fused back together.
//!
//! ## Core Components
//!
//! - `BiSeNetConfig`: Builds a `BiSeNet` for a backbone, class count and
//!   normalization strategy.
//! - `BiSeNet`: Produces `num_classes` feature channels at the input resolution
//!   (input sizes divisible by 32 map back exactly).

use backbones::{create_context_path, ContextFeatures, ContextPath, ContextPathWrapper};
use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};
use burn_extra_ops::{resize_bilinear, resize_bilinear_like, NormAct, NormLayers};

use super::modules::{
    AttentionRefinement, AttentionRefinementConfig, FeatureFusion, FeatureFusionConfig,
    SpatialPath, SpatialPathConfig, SPATIAL_PATH_CHANNELS,
};
use crate::config::{Backbone, NormActKind};

/// Upsampling factor from the spatial-path resolution back to the input resolution.
const OUTPUT_UPSAMPLE: usize = 8;

/// Configuration for the `BiSeNet` model.
#[derive(Config, Debug)]
pub struct BiSeNetConfig {
    /// Number of output channels.
    pub num_classes: usize,
    /// The context-path backbone.
    #[config(default = "Backbone::ResNet101")]
    pub backbone: Backbone,
    /// Normalization strategy used by every normalization layer.
    #[config(default = "NormActKind::BatchNorm")]
    pub norm: NormActKind,
}

impl BiSeNetConfig {
    /// Initializes a `BiSeNet` model with the given configuration.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> BiSeNet<B> {
        let spatial_path = SpatialPathConfig::new()
            .with_norm(self.norm.clone())
            .init(device);
        let context_path = create_context_path(&self.backbone, &self.norm, device);
        let [c3, c4] = context_path.output_channels();

        let arm1 = AttentionRefinementConfig::new(c3)
            .with_norm(self.norm.clone())
            .init(device);
        let arm2 = AttentionRefinementConfig::new(c4)
            .with_norm(self.norm.clone())
            .init(device);
        let ffm = FeatureFusionConfig::new(self.num_classes, SPATIAL_PATH_CHANNELS + c3 + c4)
            .with_norm(self.norm.clone())
            .init(device);
        let conv = Conv2dConfig::new([self.num_classes, self.num_classes], [1, 1]).init(device);

        BiSeNet {
            spatial_path,
            context_path,
            arm1,
            arm2,
            ffm,
            conv,
            num_classes: self.num_classes,
        }
    }
}

/// Bilateral segmentation network.
#[derive(Module, Debug)]
pub struct BiSeNet<B: Backend> {
    spatial_path: SpatialPath<B>,
    context_path: ContextPathWrapper<B>,
    /// Attention refinement of the 1/16 context feature.
    arm1: AttentionRefinement<B>,
    /// Attention refinement of the 1/32 context feature.
    arm2: AttentionRefinement<B>,
    ffm: FeatureFusion<B>,
    conv: Conv2d<B>,
    num_classes: usize,
}

impl<B: Backend> BiSeNet<B> {
    /// # Shapes
    /// - input: `[batch_size, 3, height, width]`
    /// - output: `[batch_size, num_classes, height / 8 * 8, width / 8 * 8]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let sx = self.spatial_path.forward(input.clone());

        let ContextFeatures {
            feature3,
            feature4,
            tail,
        } = self.context_path.forward(input);
        let cx1 = self.arm1.forward(feature3);
        let cx2 = self.arm2.forward(feature4).mul(tail);

        let cx1 = resize_bilinear_like(cx1, &sx);
        let cx2 = resize_bilinear_like(cx2, &sx);
        let cx = Tensor::cat(vec![cx1, cx2], 1);

        let result = self.ffm.forward(sx, cx);
        let [_, _, h, w] = result.dims();
        let result = resize_bilinear(result, [h * OUTPUT_UPSAMPLE, w * OUTPUT_UPSAMPLE]);

        self.conv.forward(result)
    }

    /// Channel count of the produced feature map.
    pub const fn out_channels(&self) -> usize {
        self.num_classes
    }
}

impl<B: Backend> NormLayers<B> for BiSeNet<B> {
    fn freeze_norm(mut self) -> Self {
        self.spatial_path = self.spatial_path.freeze_norm();
        self.context_path = self.context_path.freeze_norm();
        self.arm1 = self.arm1.freeze_norm();
        self.arm2 = self.arm2.freeze_norm();
        self.ffm = self.ffm.freeze_norm();
        self
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        self.spatial_path.visit_norm(visitor);
        self.context_path.visit_norm(visitor);
        self.arm1.visit_norm(visitor);
        self.arm2.visit_norm(visitor);
        self.ffm.visit_norm(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn bisenet(norm: NormActKind) -> BiSeNet<TestBackend> {
        BiSeNetConfig::new(5)
            .with_backbone(Backbone::ResNet18)
            .with_norm(norm)
            .init(&Default::default())
    }

    #[test]
    fn forward_restores_input_resolution() {
        let device = Default::default();
        let model = bisenet(NormActKind::BatchNorm);
        let input = Tensor::<TestBackend, 4>::random(
            [2, 3, 64, 96],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 5, 64, 96]);
        assert_eq!(model.out_channels(), 5);
    }

    #[test]
    fn norm_kind_is_shared_by_every_layer() {
        let model = bisenet(NormActKind::InPlaceAbnSync);

        // spatial path 3 + resnet18 20 + two attention modules + fusion block
        assert_eq!(model.norm_count(), 3 + 20 + 2 + 1);
        model.visit_norm(&mut |layer| assert_eq!(layer.kind(), &NormActKind::InPlaceAbnSync));
    }
}
