//! # Bilinear Resize
//!
//! Bilinear resizing with half-pixel sampling (`align_corners = false`).
//!
//! The resize is expressed as two matrix products with precomputed interpolation
//! weights, `out = Wh · x · Wwᵀ`.

use burn::prelude::*;

/// Interpolation matrix of shape `[output, input]` for one spatial axis.
fn interpolation_weights(input: usize, output: usize) -> Vec<f32> {
    let mut weights = vec![0.0_f32; output * input];
    let scale = input as f64 / output as f64;

    for dst in 0..output {
        let src = ((dst as f64 + 0.5) * scale - 0.5).max(0.0);
        let lower = (src.floor() as usize).min(input - 1);
        let upper = (lower + 1).min(input - 1);
        let lambda = (src - lower as f64) as f32;

        weights[dst * input + lower] += 1.0 - lambda;
        weights[dst * input + upper] += lambda;
    }

    weights
}

fn weight_matrix<B: Backend>(input: usize, output: usize, device: &B::Device) -> Tensor<B, 2> {
    let weights = interpolation_weights(input, output);
    Tensor::<B, 1>::from_floats(weights.as_slice(), device).reshape([output, input])
}

/// Resizes the spatial dimensions of `input` to `size` with bilinear interpolation.
///
/// Edges are not aligned: output pixel centres are mapped back onto input pixel
/// centres, matching `interpolate(..., mode="bilinear", align_corners=False)`.
///
/// # Shapes
/// - input: `[batch_size, channels, height, width]`
/// - output: `[batch_size, channels, size[0], size[1]]`
pub fn resize_bilinear<B: Backend>(input: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [batch_size, channels, height, width] = input.dims();
    let [out_height, out_width] = size;
    if [height, width] == size {
        return input;
    }

    let device = input.device();
    let rows = weight_matrix::<B>(height, out_height, &device)
        .unsqueeze::<4>()
        .expand([batch_size, channels, out_height, height]);
    let cols = weight_matrix::<B>(width, out_width, &device)
        .transpose()
        .unsqueeze::<4>()
        .expand([batch_size, channels, width, out_width]);

    rows.matmul(input).matmul(cols)
}

/// Resizes `input` to the spatial size of `like`.
pub fn resize_bilinear_like<B: Backend>(input: Tensor<B, 4>, like: &Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, height, width] = like.dims();
    resize_bilinear(input, [height, width])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::ndarray::NdArray, tensor::ElementConversion};

    type TestBackend = NdArray<f32>;

    #[test]
    fn upsample_matches_half_pixel_sampling() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::from_floats([[[[0.0, 1.0]]]], &device);
        let expected = Tensor::<TestBackend, 4>::from_floats([[[[0.0, 0.25, 0.75, 1.0]]]], &device);

        let output = resize_bilinear(input, [1, 4]);
        assert_eq!(output.dims(), [1, 1, 1, 4]);
        let diff = (output - expected).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-6);
    }

    #[test]
    fn downsample_averages_neighbours() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 3.0, 5.0, 7.0]]]], &device);
        let expected = Tensor::<TestBackend, 4>::from_floats([[[[2.0, 6.0]]]], &device);

        let output = resize_bilinear(input, [1, 2]);
        let diff = (output - expected).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-6);
    }

    #[test]
    fn constant_input_stays_constant() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::ones([2, 3, 4, 5], &device).mul_scalar(2.5);

        let output = resize_bilinear(input, [9, 7]);
        assert_eq!(output.dims(), [2, 3, 9, 7]);
        let diff = output.sub_scalar(2.5).abs().max().into_scalar().elem::<f32>();
        assert!(diff < 1e-5);
    }

    #[test]
    fn same_size_is_identity() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 4>::random(
            [1, 2, 3, 3],
            burn::tensor::Distribution::Default,
            &device,
        );
        let like = Tensor::<TestBackend, 4>::zeros([5, 1, 3, 3], &device);

        let output = resize_bilinear_like(input.clone(), &like);
        let diff = (output - input).abs().max().into_scalar().elem::<f32>();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn interpolation_rows_sum_to_one() {
        for (input, output) in [(2, 4), (7, 3), (1, 5), (5, 1)] {
            let weights = interpolation_weights(input, output);
            for row in weights.chunks(input) {
                let sum: f32 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-6);
            }
        }
    }
}
