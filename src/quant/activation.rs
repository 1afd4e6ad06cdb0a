//! Activation tags for asymmetric quantizers
//!
//! The nonlinearity feeding a quantizer bounds its input from below; the tag
//! records which one it is and thereby the base offset that recentres the
//! distribution before clipping.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Offset for inputs following hard-swish
pub const HARD_SWISH_OFFSET: f32 = 0.3125;

/// Offset for inputs following swish (β = 1), `W(1/e)`
#[allow(clippy::excessive_precision)]
pub const SWISH_OFFSET: f32 = 0.278_464_542_761_073_8;

/// Nonlinearity preceding a quantizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationTag {
    /// ReLU family (ReLU, ReLU6, bounded variants)
    Relu,
    HardSwish,
    Swish,
}

impl ActivationTag {
    /// Base offset added to inputs before clipping
    pub fn offset(self) -> f32 {
        match self {
            ActivationTag::Relu => 0.0,
            ActivationTag::HardSwish => HARD_SWISH_OFFSET,
            ActivationTag::Swish => SWISH_OFFSET,
        }
    }
}

impl FromStr for ActivationTag {
    type Err = Error;

    /// Case-insensitive; any name containing `relu` is ReLU-family, and a
    /// `swish` name with `h` in its first two characters is hard-swish.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.to_lowercase();
        if name.contains("relu") {
            Ok(ActivationTag::Relu)
        } else if name.contains("swish") {
            if name.chars().take(2).any(|c| c == 'h') {
                Ok(ActivationTag::HardSwish)
            } else {
                Ok(ActivationTag::Swish)
            }
        } else {
            Err(Error::UnsupportedActivation(s.to_string()))
        }
    }
}

impl fmt::Display for ActivationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivationTag::Relu => "relu",
            ActivationTag::HardSwish => "hswish",
            ActivationTag::Swish => "swish",
        };
        f.write_str(name)
    }
}
