//! Context-path backbones for BiSeNet
//!
//! This crate provides a unified interface over the feature extractors that can
//! serve as the context path of BiSeNet. Every backbone is built with a single
//! [`NormActKind`] shared by all of its normalization layers.

use core::str::FromStr;

use burn::prelude::*;
use burn_extra_ops::{NormAct, NormActKind, NormLayers};
use thiserror::Error;

pub use resnet::ResNetBackbone;

/// Features produced by a context path.
#[derive(Debug, Clone)]
pub struct ContextFeatures<B: Backend> {
    /// 1/16 resolution feature map.
    pub feature3: Tensor<B, 4>,
    /// 1/32 resolution feature map.
    pub feature4: Tensor<B, 4>,
    /// Global average of `feature4`, shape `[batch_size, channels, 1, 1]`.
    pub tail: Tensor<B, 4>,
}

/// Unified context-path trait
pub trait ContextPath<B: Backend> {
    /// Forward pass through the backbone
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape `[batch_size, channels, height, width]`
    fn forward(&self, input: Tensor<B, 4>) -> ContextFeatures<B>;

    /// Channel counts of `feature3` and `feature4` (the tail matches `feature4`).
    fn output_channels(&self) -> [usize; 2];
}

impl<B: Backend> ContextPath<B> for ResNetBackbone<B> {
    fn forward(&self, input: Tensor<B, 4>) -> ContextFeatures<B> {
        let [_, _, feature3, feature4] = Self::forward(self, input);
        let tail = feature4.clone().mean_dim(3).mean_dim(2);

        ContextFeatures {
            feature3,
            feature4,
            tail,
        }
    }

    fn output_channels(&self) -> [usize; 2] {
        let [_, _, c3, c4] = Self::output_channels(self);
        [c3, c4]
    }
}

/// ResNet variants
#[derive(Config, Debug, PartialEq, Eq)]
pub enum ResNetVariant {
    /// ResNet-18
    ResNet18,
    /// ResNet-34
    ResNet34,
    /// ResNet-50
    ResNet50,
    /// ResNet-101
    ResNet101,
    /// ResNet-152
    ResNet152,
}

/// Error returned when a backbone identifier is not recognized.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown backbone identifier: {0}")]
pub struct UnknownBackbone(pub String);

impl FromStr for ResNetVariant {
    type Err = UnknownBackbone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "resnet18" => Ok(Self::ResNet18),
            "resnet34" => Ok(Self::ResNet34),
            "resnet50" => Ok(Self::ResNet50),
            "resnet101" => Ok(Self::ResNet101),
            "resnet152" => Ok(Self::ResNet152),
            _ => Err(UnknownBackbone(s.to_string())),
        }
    }
}

/// Enum to wrap different context-path implementations
#[derive(Module, Debug)]
pub enum ContextPathWrapper<B: Backend> {
    /// ResNet backbone
    ResNet(ResNetBackbone<B>),
}

impl<B: Backend> ContextPath<B> for ContextPathWrapper<B> {
    fn forward(&self, input: Tensor<B, 4>) -> ContextFeatures<B> {
        match self {
            Self::ResNet(backbone) => ContextPath::forward(backbone, input),
        }
    }

    fn output_channels(&self) -> [usize; 2] {
        match self {
            Self::ResNet(backbone) => ContextPath::output_channels(backbone),
        }
    }
}

impl<B: Backend> NormLayers<B> for ContextPathWrapper<B> {
    fn freeze_norm(self) -> Self {
        match self {
            Self::ResNet(backbone) => Self::ResNet(backbone.freeze_norm()),
        }
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        match self {
            Self::ResNet(backbone) => backbone.visit_norm(visitor),
        }
    }
}

/// Factory function to create context paths
pub fn create_context_path<B: Backend>(
    variant: &ResNetVariant,
    norm: &NormActKind,
    device: &Device<B>,
) -> ContextPathWrapper<B> {
    let backbone = match variant {
        ResNetVariant::ResNet18 => ResNetBackbone::resnet18(norm, device),
        ResNetVariant::ResNet34 => ResNetBackbone::resnet34(norm, device),
        ResNetVariant::ResNet50 => ResNetBackbone::resnet50(norm, device),
        ResNetVariant::ResNet101 => ResNetBackbone::resnet101(norm, device),
        ResNetVariant::ResNet152 => ResNetBackbone::resnet152(norm, device),
    };
    ContextPathWrapper::ResNet(backbone)
}
