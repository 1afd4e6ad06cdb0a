//! Host model contract

use super::{FeatureMap, Instrumented};
use crate::autograd::{Context, Tensor};
use crate::error::Result;
use crate::quant::QuantizedOp;

/// A model whose quantized operators can be enumerated
///
/// Enumeration order must be stable between calls; reports list operators in
/// this order.
pub trait QuantModel {
    /// Run a forward pass
    fn forward(&mut self, input: &FeatureMap, ctx: &Context) -> Result<FeatureMap>;

    /// Every quantized operator
    fn quantized_ops(&self) -> Vec<&QuantizedOp>;

    fn quantized_ops_mut(&mut self) -> Vec<&mut QuantizedOp>;

    /// Every operator that records extents during calibration, quantized or not
    fn instrumented_ops_mut(&mut self) -> Vec<&mut dyn Instrumented>;

    /// Parameters an optimizer may update
    fn trainable_params(&mut self) -> Vec<&mut Tensor> {
        self.quantized_ops_mut()
            .into_iter()
            .flat_map(QuantizedOp::trainable_params)
            .collect()
    }
}
