//! YAML schema definitions for quantization configuration

use crate::autograd::Layout;
use serde::{Deserialize, Serialize};

/// Complete quantization configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantConfig {
    /// Initial values of quantizer parameters
    pub quantizer: QuantizerInit,

    /// Activation calibration pass
    pub calibration: CalibrationConfig,

    /// BOPs cost regularizer
    pub cost: CostConfig,
}

/// Initial raw (pre-transform) values of a quantizer's trainable logits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerInit {
    /// Bitwidth logit; 2.5 maps to ≈ 8.007 bits
    pub bitwidth_logit: f32,

    /// Scale logit of symmetric quantizers
    pub symmetric_scale_logit: f32,

    /// Scale logit of asymmetric (activation-tagged) quantizers
    pub asymmetric_scale_logit: f32,
}

impl Default for QuantizerInit {
    fn default() -> Self {
        Self {
            bitwidth_logit: 2.5,
            symmetric_scale_logit: 1.0,
            asymmetric_scale_logit: 6.0,
        }
    }
}

/// Bounds of the per-channel-group offset search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetSearch {
    /// Largest offset multiple `i` tried (inclusive, starting at 0)
    pub max_multiple: usize,

    /// Largest number of channel groups `g` tried (inclusive, starting at 1)
    pub max_groups: usize,

    /// Errors at or above this bound are never accepted
    pub error_bound: f32,

    /// Layers whose input has exactly this many channels keep their offset
    pub exempt_channels: usize,
}

impl Default for OffsetSearch {
    fn default() -> Self {
        Self {
            max_multiple: 4,
            max_groups: 4,
            error_bound: 100.0,
            exempt_channels: 3,
        }
    }
}

/// Activation calibration settings
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Channel axis of observed feature maps
    pub layout: Layout,

    /// Offset search bounds
    pub search: OffsetSearch,
}

/// BOPs regularizer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Target cost in GiBOPs
    pub target_gibops: f32,

    /// Weight of the cost loss in the training objective
    pub lambda: f32,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            target_gibops: 1.0,
            lambda: 1.0,
        }
    }
}
