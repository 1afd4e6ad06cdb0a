//! # mixq: learnable mixed-precision quantization
//!
//! Quantization-aware training where every weight and activation tensor gets
//! its own trainable bitwidth and clipping scale, optimized jointly with the
//! task loss and a bit-operation (BOPs) cost regularizer.
//!
//! ## Architecture
//!
//! - **autograd**: Reverse-mode automatic differentiation
//! - **quant**: Quantizers, rounding estimators, quantized operators, cost model,
//!   activation calibration and reporting
//! - **nn**: Host model contract and a sequential container
//! - **loss**: Loss functions
//! - **optim**: Optimizers
//! - **config**: Declarative YAML configuration
//!
//! ## Workflow
//!
//! ```
//! use mixq::autograd::{backward, Conv2dSpec, Context};
//! use mixq::config::QuantConfig;
//! use mixq::nn::{FeatureMap, QuantModel, Sequential};
//! use mixq::optim::{Optimizer, SGD};
//! use mixq::quant::{cost_loss, initialize, ActivationTag, InitMode, QuantizedOp};
//! use mixq::Tensor;
//!
//! # fn main() -> mixq::Result<()> {
//! let config = QuantConfig::default();
//! let spec = Conv2dSpec::new(4, 8, 3).with_same_padding();
//! let conv = QuantizedOp::conv2d(
//!     "conv",
//!     spec,
//!     Tensor::from_vec(vec![0.05; spec.weight_len()], true),
//!     None,
//!     Some(ActivationTag::Relu),
//! )?;
//! let mut model = Sequential::new().quantized(conv);
//!
//! let sample = FeatureMap::from_vec(vec![0.5; 4 * 8 * 8], vec![1, 4, 8, 8])?;
//! initialize(&mut model, InitMode::First, Some(&sample), &config.calibration)?;
//!
//! let mut loss = cost_loss(&model, config.cost.target_gibops, config.cost.lambda)?;
//! backward(&mut loss, None);
//!
//! let mut optimizer = SGD::new(0.01, 0.9);
//! optimizer.step(&mut model.trainable_params());
//! # let _ = model.forward(&sample, &Context::new())?;
//! # Ok(())
//! # }
//! ```

pub mod autograd;
pub mod config;
pub mod loss;
pub mod nn;
pub mod optim;
pub mod quant;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Context, Tensor};
pub use error::{Error, Result};
pub use nn::{FeatureMap, QuantModel};
pub use quant::{BitwidthReport, Quantizer, QuantizedOp};
