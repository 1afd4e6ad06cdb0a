//! Bit-operation cost model
//!
//! Cost of one operator, in GiBOPs (2^30 bit-operations):
//!
//! ```text
//! c_out * c_in * k^2 * h_out * w_out * w_bits * a_bits / 2^30
//! ```
//!
//! Affine operators count as `k = 1`, `c_out = 1`, `h_out = 1`,
//! `w_out = out_features`. Group structure is not taken into account.

use super::{LinearKind, QuantizedOp};
use crate::autograd::{add, mul, scale, Tensor};
use crate::error::Result;
use crate::loss::{LossFn, SmoothL1Loss};
use crate::nn::QuantModel;

/// Bit-operations in one GiBOP
pub const GIBI: f64 = (1u64 << 30) as f64;

/// Multiply-accumulate extents of one operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostGeometry {
    pub kernel_size: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub out_height: usize,
    pub out_width: usize,
}

impl CostGeometry {
    /// Extents of `op`; convolutions need calibrated output extents
    pub fn of(op: &QuantizedOp) -> Result<Self> {
        match *op.kind() {
            LinearKind::Conv2d(spec) => {
                let shape = op.require_shape()?;
                Ok(Self {
                    kernel_size: spec.kernel_size,
                    in_channels: spec.in_channels,
                    out_channels: spec.out_channels,
                    out_height: shape.out_height,
                    out_width: shape.out_width,
                })
            }
            LinearKind::Affine {
                in_features,
                out_features,
            } => Ok(Self {
                kernel_size: 1,
                in_channels: in_features,
                out_channels: 1,
                out_height: 1,
                out_width: out_features,
            }),
        }
    }

    /// Multiply-accumulates, in GiB units
    pub fn gibi_macs(&self) -> f64 {
        let macs = self.out_channels as f64
            * (self.in_channels * self.kernel_size * self.kernel_size) as f64
            * (self.out_height * self.out_width) as f64;
        macs / GIBI
    }
}

/// Cost in GiBOPs of one operator with the given bitwidths
pub fn bops(geometry: &CostGeometry, w_bits: f32, a_bits: f32) -> f32 {
    (geometry.gibi_macs() * w_bits as f64 * a_bits as f64) as f32
}

/// Differentiable cost of one operator at its current bitwidths
pub fn op_bops(op: &QuantizedOp) -> Result<Tensor> {
    let geometry = CostGeometry::of(op)?;
    let bits = mul(&op.weight_quant().bitwidth(), &op.act_quant().bitwidth());
    Ok(scale(&bits, geometry.gibi_macs() as f32))
}

/// Total cost of every quantized operator in `model`
///
/// # Errors
///
/// [`crate::Error::MissingShapeMetadata`] for a convolution that has not been
/// calibrated.
pub fn model_bops<M: QuantModel + ?Sized>(model: &M) -> Result<Tensor> {
    let mut total = Tensor::scalar(0.0, false);
    for op in model.quantized_ops() {
        total = add(&total, &op_bops(op)?);
    }
    Ok(total)
}

/// `smooth_l1(model_bops, target) * lambda`
pub fn cost_loss<M: QuantModel + ?Sized>(
    model: &M,
    target_gibops: f32,
    lambda: f32,
) -> Result<Tensor> {
    let total = model_bops(model)?;
    let target = Tensor::scalar(target_gibops, false);
    let loss = SmoothL1Loss::default().forward(&total, &target);
    tracing::trace!(gibops = total.item(), target = target_gibops, "cost loss");
    Ok(scale(&loss, lambda))
}
