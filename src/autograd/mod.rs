//! Reverse-mode autograd engine
//!
//! Provides automatic differentiation over a computational graph of [`BackwardOp`]
//! nodes. Each op only propagates its own local gradient; [`backward`] visits the
//! graph in topological order so that a tensor consumed by several ops receives the
//! sum of their contributions before its own producer runs.

mod backward;
mod context;
mod ops;
mod tensor;


pub use backward::BackwardOp;
pub(crate) use backward::parents_of;
pub use context::{is_grad_enabled, no_grad, Context, NoGradGuard};
pub use ops::*;
pub(crate) use ops::tracks;
pub use tensor::Tensor;

/// Perform backward pass on a tensor
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        // Initialize with ones for scalar loss
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    if let Some(root) = tensor.backward_op() {
        for op in backward::topological_order(root) {
            op.backward();
        }
    }
}
