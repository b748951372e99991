//! # Parameter Assignment
//!
//! Overwrites the value held by a parameter outside of the gradient graph.
//! The parameter keeps its id, so optimizer state keyed by that id stays attached,
//! and keeps its `require_grad` flag.

use burn::{module::Param, prelude::*};

/// In-place style assignment for tensor parameters.
pub trait ParamAssign<B: Backend, const D: usize> {
    /// Replaces the parameter value with `value`.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not have the parameter's shape.
    fn assign(self, value: Tensor<B, D>) -> Self;
}

impl<B: Backend, const D: usize> ParamAssign<B, D> for Param<Tensor<B, D>> {
    fn assign(self, value: Tensor<B, D>) -> Self {
        let current = self.val();
        assert_eq!(
            current.dims(),
            value.dims(),
            "assigned value must keep the parameter shape"
        );

        let require_grad = current.is_require_grad();
        let value = value.detach().set_require_grad(require_grad);
        Param::initialized(self.id, value)
    }
}
