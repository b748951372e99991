//! # Classifier Head
//!
//! A per-task 1×1 convolution mapping shared features to that task's logits.
//! Weight imprinting reads single class rows of the convolution and overwrites them
//! with [`ParamAssign::assign`].

use burn::{
    module::Param,
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
};
use burn_extra_ops::ParamAssign;

/// Configuration for the `ClassifierHead` module.
#[derive(Config, Debug)]
pub struct ClassifierHeadConfig {
    /// Feature channels consumed by the head.
    pub in_channels: usize,
    /// Logits produced by the head.
    pub num_classes: usize,
}

impl ClassifierHeadConfig {
    /// Initializes a `ClassifierHead` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ClassifierHead<B> {
        let conv = Conv2dConfig::new([self.in_channels, self.num_classes], [1, 1]).init(device);

        ClassifierHead {
            conv,
            in_channels: self.in_channels,
            num_classes: self.num_classes,
        }
    }
}

/// 1×1 convolutional classifier for one task.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    conv: Conv2d<B>,
    in_channels: usize,
    num_classes: usize,
}

impl<B: Backend> ClassifierHead<B> {
    /// # Shapes
    /// - features: `[batch_size, in_channels, height, width]`
    /// - output: `[batch_size, num_classes, height, width]`
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(features)
    }

    pub const fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Weight of shape `[num_classes, in_channels, 1, 1]`.
    pub fn weight(&self) -> Tensor<B, 4> {
        self.conv.weight.val()
    }

    /// Bias of shape `[num_classes]`, zeros for a head built without one.
    pub fn bias(&self) -> Tensor<B, 1> {
        match &self.conv.bias {
            Some(bias) => bias.val(),
            None => Tensor::zeros([self.num_classes], &self.conv.weight.val().device()),
        }
    }

    /// Weight row of class 0, shape `[1, in_channels, 1, 1]`.
    pub fn background_weight(&self) -> Tensor<B, 4> {
        self.weight().slice([0..1])
    }

    /// Bias of class 0, shape `[1]`.
    pub fn background_bias(&self) -> Tensor<B, 1> {
        self.bias().slice([0..1])
    }

    /// Copies one weight row and one bias value into every class of the head.
    ///
    /// `weight` has shape `[1, in_channels, 1, 1]` and `bias` shape `[1]`.
    pub fn imprint(mut self, weight: Tensor<B, 4>, bias: Tensor<B, 1>) -> Self {
        let weight = Tensor::cat(vec![weight; self.num_classes], 0);
        let bias = Tensor::cat(vec![bias; self.num_classes], 0);

        self.conv.weight = self.conv.weight.assign(weight);
        self.assign_bias(bias)
    }

    /// Overwrites the bias of class 0.
    pub fn set_background_bias(self, value: Tensor<B, 1>) -> Self {
        let bias = self.bias().slice_assign([0..1], value);
        self.assign_bias(bias)
    }

    fn assign_bias(mut self, value: Tensor<B, 1>) -> Self {
        self.conv.bias = Some(match self.conv.bias {
            Some(bias) => bias.assign(value),
            None => Param::from_tensor(value.detach()),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::ElementConversion};

    type TestBackend = NdArray<f32>;

    #[test]
    fn head_maps_channels_to_classes() {
        let device = Default::default();
        let head = ClassifierHeadConfig::new(4, 3).init::<TestBackend>(&device);
        let features = Tensor::<TestBackend, 4>::random(
            [2, 4, 5, 6],
            burn::tensor::Distribution::Default,
            &device,
        );

        assert_eq!(head.forward(features).dims(), [2, 3, 5, 6]);
        assert_eq!(head.in_channels(), 4);
        assert_eq!(head.num_classes(), 3);
    }

    #[test]
    fn imprint_copies_row_into_every_class() {
        let device = Default::default();
        let head = ClassifierHeadConfig::new(2, 3).init::<TestBackend>(&device);
        let row = Tensor::<TestBackend, 4>::from_floats([[[[0.5]], [[-1.0]]]], &device);
        let bias = Tensor::<TestBackend, 1>::from_floats([0.25], &device);

        let head = head.imprint(row, bias);

        let features = Tensor::<TestBackend, 4>::from_floats([[[[2.0]], [[1.0]]]], &device);
        // 0.5 * 2 - 1 * 1 + 0.25 for every class
        let output = head.forward(features);
        assert_eq!(output.dims(), [1, 3, 1, 1]);
        let diff = output.sub_scalar(0.25).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-6);
    }

    #[test]
    fn set_background_bias_only_touches_class_zero() {
        let device = Default::default();
        let head = ClassifierHeadConfig::new(2, 3).init::<TestBackend>(&device);
        let before = head.bias();

        let head = head.set_background_bias(Tensor::from_floats([7.0], &device));
        let after = head.bias();

        let background = after.clone().slice([0..1]).into_scalar().elem::<f32>();
        assert_eq!(background, 7.0);
        let rest = (after.slice([1..3]) - before.slice([1..3]))
            .abs()
            .max()
            .into_scalar()
            .elem::<f32>();
        assert_eq!(rest, 0.0);
    }

    #[test]
    fn imprint_keeps_convolution_parameters() {
        let device = Default::default();
        let head = ClassifierHeadConfig::new(2, 2).init::<TestBackend>(&device);
        let weight_id = head.conv.weight.id;
        let bias_id = head.conv.bias.as_ref().map(|bias| bias.id);

        let row = head.background_weight();
        let bias = head.background_bias();
        let head = head.imprint(row, bias);

        assert_eq!(head.conv.weight.id, weight_id);
        assert_eq!(head.conv.bias.as_ref().map(|bias| bias.id), bias_id);
        assert_eq!(head.weight().dims(), [2, 2, 1, 1]);
    }
}
