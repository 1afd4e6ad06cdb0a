//! Optimizers for quantization-aware training

mod optimizer;
mod sgd;

pub use optimizer::Optimizer;
pub use sgd::SGD;
