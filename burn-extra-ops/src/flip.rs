//! # Axis Reversal
//!
//! Reverses a tensor along one axis by gathering it with descending indices.
//! Used to mirror images and logits for flip test-time augmentation.

use burn::prelude::*;

/// Reverses `tensor` along `dim`.
///
/// # Panics
///
/// Panics if `dim` is not a valid axis of a rank-`D` tensor.
pub fn flip<B: Backend, const D: usize>(tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    assert!(dim < D, "cannot flip axis {dim} of a rank-{D} tensor");

    let len = tensor.dims()[dim];
    if len <= 1 {
        return tensor;
    }

    let indices = Tensor::<B, 1, Int>::arange(0..len as i64, &tensor.device())
        .neg()
        .add_scalar(len as i64 - 1);
    tensor.select(dim, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::ndarray::NdArray, tensor::ElementConversion};

    type TestBackend = NdArray<f32>;

    #[test]
    fn flip_reverses_last_axis() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &device);
        let expected =
            Tensor::<TestBackend, 2>::from_floats([[3.0, 2.0, 1.0], [6.0, 5.0, 4.0]], &device);

        let diff = (flip(tensor, 1) - expected).abs().max().into_scalar().elem::<f32>();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn flip_reverses_leading_axis() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device);
        let expected = Tensor::<TestBackend, 1>::from_floats([4.0, 3.0, 2.0, 1.0], &device);

        let diff = (flip(tensor, 0) - expected).abs().max().into_scalar().elem::<f32>();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn flip_twice_is_identity() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::random(
            [2, 3, 5, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        for dim in 0..4 {
            let twice = flip(flip(tensor.clone(), dim), dim);
            let diff = (twice - tensor.clone()).abs().max().into_scalar().elem::<f32>();
            assert_eq!(diff, 0.0);
        }
    }

    #[test]
    fn flip_singleton_axis_is_noop() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 3>::ones([1, 2, 1], &device);
        assert_eq!(flip(tensor, 2).dims(), [1, 2, 1]);
    }

    #[test]
    #[should_panic(expected = "cannot flip axis")]
    fn flip_rejects_invalid_axis() {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 2>::ones([2, 2], &device);
        let _ = flip(tensor, 2);
    }
}
