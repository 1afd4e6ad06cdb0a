//! Autograd operations with backward passes
//!
//! This module provides differentiable operations for automatic differentiation.

mod activations;
mod basic;
mod conv;
mod linear;
mod scalar;

pub use activations::{hard_swish, relu, sigmoid, softplus, swish, SCALE_FLOOR};
pub use basic::{add, affine, clamp, exp2, mul, scale, sum};
pub use conv::{conv2d, Conv2dSpec, Layout};
pub use linear::linear;
pub use scalar::{add_scalar, div_scalar, mul_scalar};

use super::is_grad_enabled;

/// Whether an op output should carry a backward op
pub(crate) fn tracks(requires_grad: bool) -> bool {
    requires_grad && is_grad_enabled()
}
