//! # Plain Segmentation Module
//!
//! A BiSeNet backbone followed by a single, fixed classifier. This is what the factory
//! builds when no per-task class list is given.

use std::collections::HashMap;

use burn::{module::Ignored, prelude::*};
use burn_extra_ops::{resize_bilinear, NormLayers};

use super::{
    bisenet::BiSeNet,
    modules::{ClassifierHead, ClassifierHeadConfig},
    tta::ensemble,
};
use crate::config::FusionMode;

/// Key under which the raw backbone features are returned.
pub const BACKBONE_FEATURES: &str = "bisenet";

/// Output of a segmentation forward pass.
#[derive(Debug, Clone)]
pub struct SegmentationOutput<B: Backend> {
    /// Class logits at input resolution, `[batch_size, classes, height, width]`.
    pub logits: Tensor<B, 4>,
    /// Intermediate tensors, keyed by name. Holds [`BACKBONE_FEATURES`] when requested.
    pub intermediate: HashMap<&'static str, Tensor<B, 4>>,
}

impl<B: Backend> SegmentationOutput<B> {
    pub(crate) fn new(logits: Tensor<B, 4>, backbone_features: Option<Tensor<B, 4>>) -> Self {
        let intermediate = backbone_features
            .map(|features| HashMap::from([(BACKBONE_FEATURES, features)]))
            .unwrap_or_default();

        Self {
            logits,
            intermediate,
        }
    }

    /// The raw backbone feature map, if it was requested.
    pub fn backbone_features(&self) -> Option<&Tensor<B, 4>> {
        self.intermediate.get(BACKBONE_FEATURES)
    }
}

/// Segmentation model with one classifier over a shared backbone.
#[derive(Module, Debug)]
pub struct SegmentationModule<B: Backend> {
    bisenet: BiSeNet<B>,
    cls: ClassifierHead<B>,
    num_classes: usize,
    fusion_mode: Ignored<FusionMode>,
}

impl<B: Backend> SegmentationModule<B> {
    /// Wraps `bisenet` with a `num_classes -> num_classes` classifier.
    pub fn new(bisenet: BiSeNet<B>, fusion_mode: FusionMode, device: &Device<B>) -> Self {
        let num_classes = bisenet.out_channels();
        let cls = ClassifierHeadConfig::new(num_classes, num_classes).init(device);

        Self {
            bisenet,
            cls,
            num_classes,
            fusion_mode: Ignored(fusion_mode),
        }
    }

    /// Runs the backbone and the classifier without upsampling.
    pub fn extract_features(
        &self,
        input: Tensor<B, 4>,
        return_intermediate: bool,
    ) -> (Tensor<B, 4>, Option<Tensor<B, 4>>) {
        let features = self.bisenet.forward(input);
        let logits = self.cls.forward(features.clone());

        (logits, return_intermediate.then_some(features))
    }

    /// # Shapes
    /// - input: `[batch_size, 3, height, width]`
    /// - logits: `[batch_size, num_classes, height, width]`
    pub fn forward(&self, input: Tensor<B, 4>, return_intermediate: bool) -> SegmentationOutput<B> {
        let [_, _, h, w] = input.dims();
        let (logits, features) = self.extract_features(input, return_intermediate);

        // Bilinear with half-pixel centres, edges not aligned
        SegmentationOutput::new(resize_bilinear(logits, [h, w]), features)
    }

    /// Multi-scale and flip test-time augmentation, fused with the configured mode.
    pub fn forward_tta(&self, input: Tensor<B, 4>, scales: &[f64], do_flip: bool) -> Tensor<B, 4> {
        ensemble(input, scales, do_flip, &self.fusion_mode.0, |x| {
            self.forward(x, false).logits
        })
    }

    /// Freezes every normalization layer of the backbone.
    pub fn freeze_normalization_layers(mut self) -> Self {
        self.bisenet = self.bisenet.freeze_norm();
        self
    }

    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn fusion_mode(&self) -> &FusionMode {
        &self.fusion_mode.0
    }

    pub const fn backbone(&self) -> &BiSeNet<B> {
        &self.bisenet
    }
}
