//! # Test-Time Augmentation
//!
//! Runs a segmentation forward pass over rescaled and horizontally mirrored copies of
//! the input, maps every prediction back onto the input grid and fuses them.

use burn::prelude::*;
use burn_extra_ops::{resize_bilinear, TensorExtraOps};

use crate::config::FusionMode;

/// Width axis of `[batch_size, channels, height, width]` tensors.
const WIDTH_DIM: usize = 3;

fn scaled_size([h, w]: [usize; 2], scale: f64) -> [usize; 2] {
    let side = |len: usize| ((len as f64 * scale).round() as usize).max(1);
    [side(h), side(w)]
}

/// Fuses `views` (all of the same shape) according to `mode`.
///
/// Returns `None` for an empty set of views.
pub fn fuse<B: Backend>(views: Vec<Tensor<B, 4>>, mode: &FusionMode) -> Option<Tensor<B, 4>> {
    let mut views = views.into_iter();
    let first = views.next()?;
    Some(fuse_onto(first, views, mode))
}

fn fuse_onto<B: Backend>(
    first: Tensor<B, 4>,
    rest: impl IntoIterator<Item = Tensor<B, 4>>,
    mode: &FusionMode,
) -> Tensor<B, 4> {
    let rest = rest.into_iter();
    match mode {
        FusionMode::Mean => {
            let (sum, count) = rest.fold((first, 1usize), |(acc, n), view| (acc + view, n + 1));
            sum.div_scalar(count as f64)
        }
        FusionMode::Sum => rest.fold(first, Tensor::add),
        FusionMode::Max => rest.fold(first, Tensor::max_pair),
    }
}

/// Evaluates `forward` on every scale (and mirror, when `do_flip` is set) of `input`
/// and fuses the predictions at the input resolution.
///
/// An empty `scales` slice evaluates the input at its own size only.
pub fn ensemble<B, F>(
    input: Tensor<B, 4>,
    scales: &[f64],
    do_flip: bool,
    mode: &FusionMode,
    forward: F,
) -> Tensor<B, 4>
where
    B: Backend,
    F: Fn(Tensor<B, 4>) -> Tensor<B, 4>,
{
    let [_, _, h, w] = input.dims();
    let view = |scale: f64, mirrored: bool| {
        let scaled = resize_bilinear(input.clone(), scaled_size([h, w], scale));
        let logits = if mirrored {
            forward(scaled.reverse_dim(WIDTH_DIM)).reverse_dim(WIDTH_DIM)
        } else {
            forward(scaled)
        };
        resize_bilinear(logits, [h, w])
    };

    let (&first_scale, others) = scales.split_first().unwrap_or((&1.0, &[][..]));
    let first = view(first_scale, false);

    let mut rest = Vec::with_capacity(others.len() * 2 + 1);
    if do_flip {
        rest.push(view(first_scale, true));
    }
    for &scale in others {
        rest.push(view(scale, false));
        if do_flip {
            rest.push(view(scale, true));
        }
    }

    fuse_onto(first, rest, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::ElementConversion};

    type TestBackend = NdArray<f32>;

    fn max_abs_diff(a: Tensor<TestBackend, 4>, b: Tensor<TestBackend, 4>) -> f32 {
        (a - b).abs().max().into_scalar().elem::<f32>()
    }

    #[test]
    fn fuse_modes() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 4.0]]]], &device);
        let b = Tensor::<TestBackend, 4>::from_floats([[[[3.0, 2.0]]]], &device);

        let mean = fuse(vec![a.clone(), b.clone()], &FusionMode::Mean).unwrap();
        let sum = fuse(vec![a.clone(), b.clone()], &FusionMode::Sum).unwrap();
        let max = fuse(vec![a, b], &FusionMode::Max).unwrap();

        let expected = |values| Tensor::<TestBackend, 4>::from_floats([[values]], &device);
        assert_eq!(max_abs_diff(mean, expected([[2.0, 3.0]])), 0.0);
        assert_eq!(max_abs_diff(sum, expected([[4.0, 6.0]])), 0.0);
        assert_eq!(max_abs_diff(max, expected([[3.0, 4.0]])), 0.0);
    }

    #[test]
    fn fuse_nothing_is_none() {
        assert!(fuse::<TestBackend>(Vec::new(), &FusionMode::Sum).is_none());
    }

    #[test]
    fn flip_views_are_mapped_back() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [1, 2, 4, 6],
            burn::tensor::Distribution::Default,
            &device,
        );

        // A pointwise "model" is equivariant to mirroring, so every view agrees.
        let output = ensemble(input.clone(), &[], true, &FusionMode::Mean, |x| x.mul_scalar(2.0));
        assert_eq!(max_abs_diff(output, input.mul_scalar(2.0)), 0.0);
    }

    #[test]
    fn scaled_views_return_to_input_size() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([2, 3, 8, 8], &device);

        let output = ensemble(input, &[0.5, 1.0, 1.5], true, &FusionMode::Max, |x| x);
        assert_eq!(output.dims(), [2, 3, 8, 8]);
    }

    #[test]
    fn scaled_size_never_collapses() {
        assert_eq!(scaled_size([10, 7], 0.5), [5, 4]);
        assert_eq!(scaled_size([1, 1], 0.1), [1, 1]);
    }
}
