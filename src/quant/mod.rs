//! Learnable mixed-precision quantization
//!
//! - **bitwidth**: logit to bitwidth mapping
//! - **quantizer**: per-tensor quantizer with trainable bitwidth and scale
//! - **noise** / **rounding**: stochastic and straight-through rounding estimators
//! - **qop**: convolution/affine operators with quantized input and weight
//! - **bops**: bit-operation cost model and cost regularizer
//! - **calibration**: activation offset calibration and phase initialization
//! - **report**: per-layer bitwidth report

mod activation;
mod bitwidth;
mod bops;
mod calibration;
mod noise;
mod qop;
mod quantizer;
mod report;
mod rounding;

pub use activation::{ActivationTag, HARD_SWISH_OFFSET, SWISH_OFFSET};
pub use bitwidth::{
    deployable_bitwidth, logit_for, mapped_bitwidth, trainable_bitwidth, BIT_CEIL, BIT_FLOOR,
    BIT_RANGE,
};
pub use bops::{bops, cost_loss, model_bops, op_bops, CostGeometry, GIBI};
pub use calibration::{
    calibrate, fit_groups, initialize, optimal_multiple, search_groups, GroupFit, InitMode,
};
pub use noise::{stochastic_round, NoiseContext, StochasticRound};
pub use qop::{LinearKind, QuantizedOp};
pub use quantizer::{Offset, Precision, Quantizer, Range, RoundingPolicy};
pub use report::{report_bitwidths, BitwidthReport, LayerBitwidth};
pub use rounding::round_ste;
