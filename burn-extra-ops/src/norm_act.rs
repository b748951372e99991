//! # Activated Normalization
//!
//! Batch normalization fused with an optional activation, in the style of the
//! in-place activated batch norm (ABN) family. Burn ships a plain `BatchNorm`,
//! but it decides between batch and running statistics from the backend alone;
//! `NormAct` additionally carries a `frozen` flag so that a layer can be pinned
//! to its running statistics while the rest of the network keeps training.

use core::str::FromStr;

use burn::{
    module::{Ignored, Param, RunningState},
    nn::Initializer,
    prelude::*,
    tensor::activation::{leaky_relu, relu},
};

/// Slope used by every leaky-ReLU fused into an ABN-style layer.
pub const ABN_LEAKY_SLOPE: f64 = 0.01;

/// Normalization strategy shared by all normalization layers of a network.
#[derive(Config, Debug, PartialEq)]
pub enum NormActKind {
    /// In-place ABN whose statistics are reduced across devices.
    InPlaceAbnSync,
    /// In-place ABN with per-device statistics.
    InPlaceAbn,
    /// Activated batch norm without the in-place memory trick.
    Abn,
    /// Plain, unsynchronized batch norm with no fused activation.
    BatchNorm,
}

impl NormActKind {
    /// Activation fused into layers of this kind.
    pub fn activation(&self) -> Activation {
        match self {
            Self::InPlaceAbnSync | Self::InPlaceAbn | Self::Abn => {
                Activation::LeakyRelu(ABN_LEAKY_SLOPE)
            }
            Self::BatchNorm => Activation::Identity,
        }
    }

    /// Activation for a `conv -> norm -> act` block.
    ///
    /// ABN kinds fuse their own leaky-ReLU; a plain batch norm leaves the block's
    /// `fallback` activation in place.
    pub fn block_activation(&self, fallback: Activation) -> Activation {
        match self {
            Self::BatchNorm => fallback,
            _ => self.activation(),
        }
    }

    /// Whether batch statistics are meant to be synchronized across devices.
    pub const fn is_sync(&self) -> bool {
        matches!(self, Self::InPlaceAbnSync)
    }
}

impl FromStr for NormActKind {
    type Err = core::convert::Infallible;

    /// Unknown names fall back to plain batch norm.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "iabn_sync" => Self::InPlaceAbnSync,
            "iabn" => Self::InPlaceAbn,
            "abn" => Self::Abn,
            _ => Self::BatchNorm,
        })
    }
}

/// Element-wise activation applied after normalization.
#[derive(Config, Debug, PartialEq)]
pub enum Activation {
    /// Leaky ReLU with the given negative slope.
    LeakyRelu(f64),
    /// ReLU.
    Relu,
    /// No activation.
    Identity,
}

impl Activation {
    pub fn forward<B: Backend, const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::LeakyRelu(slope) => leaky_relu(input, *slope),
            Self::Relu => relu(input),
            Self::Identity => input,
        }
    }
}

/// Configuration for the [`NormAct`] layer.
#[derive(Config, Debug)]
pub struct NormActConfig {
    /// Number of channels.
    pub num_features: usize,
    /// Normalization strategy.
    #[config(default = "NormActKind::BatchNorm")]
    pub kind: NormActKind,
    /// Activation override. `None` uses the kind's own activation.
    #[config(default = "None")]
    pub activation: Option<Activation>,
    /// Added to the variance for numerical stability.
    #[config(default = 1e-5)]
    pub epsilon: f64,
    /// Weight of the current batch when updating running statistics.
    #[config(default = 0.1)]
    pub momentum: f64,
}

impl NormActConfig {
    /// Initializes a new [`NormAct`] layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NormAct<B> {
        let activation = self
            .activation
            .clone()
            .unwrap_or_else(|| self.kind.activation());

        NormAct {
            gamma: Initializer::Ones.init([self.num_features], device),
            beta: Initializer::Zeros.init([self.num_features], device),
            running_mean: RunningState::new(Tensor::zeros([self.num_features], device)),
            running_var: RunningState::new(Tensor::ones([self.num_features], device)),
            momentum: self.momentum,
            epsilon: self.epsilon,
            frozen: false,
            kind: Ignored(self.kind.clone()),
            activation: Ignored(activation),
        }
    }
}

/// Batch normalization over `[batch, channels, height, width]` followed by an activation.
///
/// Batch statistics are used (and folded into the running estimates) only when the
/// backend tracks gradients and the layer is not frozen.
#[derive(Module, Debug)]
pub struct NormAct<B: Backend> {
    /// Learnable scale.
    pub gamma: Param<Tensor<B, 1>>,
    /// Learnable shift.
    pub beta: Param<Tensor<B, 1>>,
    /// Running mean.
    pub running_mean: RunningState<Tensor<B, 1>>,
    /// Running variance.
    pub running_var: RunningState<Tensor<B, 1>>,
    momentum: f64,
    epsilon: f64,
    frozen: bool,
    kind: Ignored<NormActKind>,
    activation: Ignored<Activation>,
}

impl<B: Backend> NormAct<B> {
    /// # Shapes
    /// - input: `[batch_size, channels, height, width]`
    /// - output: `[batch_size, channels, height, width]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = input.dims();

        let (mean, var) = if self.is_training() {
            self.batch_statistics(input.clone())
        } else {
            (self.running_mean.value(), self.running_var.value())
        };

        let mean = mean.reshape([1, channels, 1, 1]);
        let std = var.add_scalar(self.epsilon).sqrt().reshape([1, channels, 1, 1]);
        let gamma = self.gamma.val().reshape([1, channels, 1, 1]);
        let beta = self.beta.val().reshape([1, channels, 1, 1]);

        let output = input.sub(mean).div(std).mul(gamma).add(beta);
        self.activation.0.forward(output)
    }

    /// Pins the layer to its running statistics and stops gradients on scale and shift.
    pub fn freeze(mut self) -> Self {
        self.gamma = self.gamma.set_require_grad(false);
        self.beta = self.beta.set_require_grad(false);
        self.frozen = true;
        self
    }

    /// Whether the layer is pinned to its running statistics.
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Normalization strategy the layer was built with.
    pub fn kind(&self) -> &NormActKind {
        &self.kind.0
    }

    /// Activation applied after normalization.
    pub fn activation(&self) -> &Activation {
        &self.activation.0
    }

    fn is_training(&self) -> bool {
        B::ad_enabled() && !self.frozen
    }

    fn batch_statistics(&self, input: Tensor<B, 4>) -> (Tensor<B, 1>, Tensor<B, 1>) {
        let [batch_size, channels, height, width] = input.dims();
        let flat = input
            .swap_dims(0, 1)
            .reshape([channels, batch_size * height * width]);

        let mean = flat.clone().mean_dim(1);
        let var = flat.sub(mean.clone()).powi_scalar(2).mean_dim(1);
        let mean = mean.reshape([channels]);
        let var = var.reshape([channels]);

        let running_mean = self.running_mean.value_sync();
        let running_var = self.running_var.value_sync();
        self.running_mean.update(
            running_mean
                .mul_scalar(1.0 - self.momentum)
                .add(mean.clone().detach().mul_scalar(self.momentum)),
        );
        self.running_var.update(
            running_var
                .mul_scalar(1.0 - self.momentum)
                .add(var.clone().detach().mul_scalar(self.momentum)),
        );

        (mean, var)
    }
}

/// A module tree that contains [`NormAct`] layers.
pub trait NormLayers<B: Backend>: Sized {
    /// Freezes every normalization layer in the tree.
    fn freeze_norm(self) -> Self;

    /// Calls `visitor` on every normalization layer in the tree.
    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F);

    /// Number of normalization layers in the tree.
    fn norm_count(&self) -> usize {
        let mut count = 0;
        self.visit_norm(&mut |_| count += 1);
        count
    }
}

impl<B: Backend> NormLayers<B> for NormAct<B> {
    fn freeze_norm(self) -> Self {
        self.freeze()
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        visitor(self);
    }
}

impl<B: Backend, T: NormLayers<B>> NormLayers<B> for Option<T> {
    fn freeze_norm(self) -> Self {
        self.map(NormLayers::freeze_norm)
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        if let Some(inner) = self {
            inner.visit_norm(visitor);
        }
    }
}

impl<B: Backend, T: NormLayers<B>> NormLayers<B> for Vec<T> {
    fn freeze_norm(self) -> Self {
        self.into_iter().map(NormLayers::freeze_norm).collect()
    }

    fn visit_norm<F: FnMut(&NormAct<B>)>(&self, visitor: &mut F) {
        for inner in self {
            inner.visit_norm(visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{ndarray::NdArray, Autodiff},
        tensor::{Distribution, ElementConversion},
    };

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn parse_norm_kind_names() {
        assert_eq!("iabn_sync".parse::<NormActKind>().unwrap(), NormActKind::InPlaceAbnSync);
        assert_eq!("iabn".parse::<NormActKind>().unwrap(), NormActKind::InPlaceAbn);
        assert_eq!("abn".parse::<NormActKind>().unwrap(), NormActKind::Abn);
        assert_eq!("bn".parse::<NormActKind>().unwrap(), NormActKind::BatchNorm);
        assert_eq!("".parse::<NormActKind>().unwrap(), NormActKind::BatchNorm);
    }

    #[test]
    fn abn_kinds_fuse_leaky_relu() {
        for kind in [NormActKind::InPlaceAbnSync, NormActKind::InPlaceAbn, NormActKind::Abn] {
            assert_eq!(kind.activation(), Activation::LeakyRelu(ABN_LEAKY_SLOPE));
            assert_eq!(
                kind.block_activation(Activation::Relu),
                Activation::LeakyRelu(ABN_LEAKY_SLOPE)
            );
        }
        assert_eq!(NormActKind::BatchNorm.activation(), Activation::Identity);
        assert_eq!(
            NormActKind::BatchNorm.block_activation(Activation::Relu),
            Activation::Relu
        );
        assert!(NormActKind::InPlaceAbnSync.is_sync());
        assert!(!NormActKind::InPlaceAbn.is_sync());
    }

    #[test]
    fn inference_uses_running_statistics() {
        let device = Default::default();
        let norm = NormActConfig::new(3).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random([2, 3, 4, 4], Distribution::Default, &device);

        // Fresh running stats are mean 0 / var 1, so the layer is almost the identity.
        let output = norm.forward(input.clone());
        let diff = (output - input).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-4);
    }

    #[test]
    fn training_normalizes_with_batch_statistics() {
        let device = Default::default();
        let norm = NormActConfig::new(2).init::<TestAutodiffBackend>(&device);
        let input = Tensor::<TestAutodiffBackend, 4>::random(
            [4, 2, 3, 3],
            Distribution::Normal(5.0, 2.0),
            &device,
        );

        let output = norm.forward(input);
        let mean = output.mean().into_scalar().elem::<f32>();
        assert!(mean.abs() < 1e-3);
    }

    #[test]
    fn leaky_relu_is_applied_after_normalization() {
        let device = Default::default();
        let norm = NormActConfig::new(1)
            .with_kind(NormActKind::Abn)
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::from_floats([[[[-1.0, 2.0]]]], &device);

        let output = norm.forward(input);
        let min = output.min().into_scalar().elem::<f32>();
        assert!((min + 0.01).abs() < 1e-4);
    }

    #[test]
    fn freeze_disables_gradients_and_batch_statistics() {
        let device = Default::default();
        let norm = NormActConfig::new(2)
            .with_kind(NormActKind::InPlaceAbn)
            .init::<TestAutodiffBackend>(&device)
            .freeze();

        assert!(norm.is_frozen());
        assert!(!norm.gamma.val().is_require_grad());
        assert!(!norm.beta.val().is_require_grad());

        // Frozen layers keep using the running statistics even on an autodiff backend.
        let input = Tensor::<TestAutodiffBackend, 4>::random(
            [2, 2, 3, 3],
            Distribution::Normal(5.0, 1.0),
            &device,
        );
        let output = norm.forward(input.clone());
        let diff = (output - input).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-3);
    }

    #[test]
    fn norm_layers_over_collections() {
        let device = Default::default();
        let layers: Vec<NormAct<TestBackend>> = (0..3)
            .map(|_| NormActConfig::new(4).init(&device))
            .collect();
        assert_eq!(layers.norm_count(), 3);

        let layers = layers.freeze_norm();
        let mut frozen = 0;
        layers.visit_norm(&mut |layer| {
            if layer.is_frozen() {
                frozen += 1;
            }
        });
        assert_eq!(frozen, 3);

        let empty: Option<NormAct<TestBackend>> = None;
        assert_eq!(empty.freeze_norm().norm_count(), 0);
    }
}
