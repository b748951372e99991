//! Additional operations for the Burn deep learning framework
//!
//! This crate provides operations that are commonly used by segmentation networks
//! but are not available in the core Burn framework: activated batch normalization
//! with explicit freezing, half-pixel bilinear resizing, axis reversal and
//! gradient-free parameter assignment.

use burn::prelude::*;

mod flip;
mod norm_act;
mod param;
mod resize;

// Convenient re-exports
pub use flip::flip;
pub use norm_act::{
    Activation, NormAct, NormActConfig, NormActKind, NormLayers, ABN_LEAKY_SLOPE,
};
pub use param::ParamAssign;
pub use resize::{resize_bilinear, resize_bilinear_like};

/// Additional operations for Burn tensors
pub trait TensorExtraOps<B: Backend, const D: usize> {
    /// Reverse the tensor along `dim`
    fn reverse_dim(self, dim: usize) -> Self;
}

impl<B: Backend, const D: usize> TensorExtraOps<B, D> for Tensor<B, D> {
    fn reverse_dim(self, dim: usize) -> Self {
        flip(self, dim)
    }
}
