//! Quantized operator wrapper
//!
//! Composes a plain linear operator with two independent quantizers: one for
//! the incoming activation and one for the weight.

use super::activation::ActivationTag;
use super::quantizer::Quantizer;
use crate::autograd::{conv2d, linear, Context, Conv2dSpec, Tensor};
use crate::error::{Error, Result};
use crate::nn::{
    check_conv_input, check_conv_params, FeatureMap, Instrumented, Probe, ShapeMetadata,
};

/// Linear algebra behind a [`QuantizedOp`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinearKind {
    Conv2d(Conv2dSpec),
    Affine {
        in_features: usize,
        out_features: usize,
    },
}

impl LinearKind {
    /// Dims of the weight tensor
    pub fn weight_dims(&self) -> Vec<usize> {
        match *self {
            LinearKind::Conv2d(spec) => vec![
                spec.out_channels,
                spec.in_channels / spec.groups,
                spec.kernel_size,
                spec.kernel_size,
            ],
            LinearKind::Affine {
                in_features,
                out_features,
            } => vec![out_features, in_features],
        }
    }

    pub fn in_channels(&self) -> usize {
        match *self {
            LinearKind::Conv2d(spec) => spec.in_channels,
            LinearKind::Affine { in_features, .. } => in_features,
        }
    }
}

/// Convolution or affine map with quantized input and weight
#[derive(Debug, Clone)]
pub struct QuantizedOp {
    name: String,
    kind: LinearKind,
    weight: Tensor,
    bias: Option<Tensor>,
    act_quant: Quantizer,
    weight_quant: Quantizer,
    shape: Option<ShapeMetadata>,
    probe: Option<Probe>,
}

impl QuantizedOp {
    /// Quantized convolution
    ///
    /// `activation` names the nonlinearity feeding this operator; `None` marks
    /// raw zero-centred input and makes both quantizers symmetric.
    ///
    /// # Errors
    ///
    /// Fails if the weight or bias size does not match `spec`.
    pub fn conv2d(
        name: impl Into<String>,
        spec: Conv2dSpec,
        weight: Tensor,
        bias: Option<Tensor>,
        activation: Option<ActivationTag>,
    ) -> Result<Self> {
        let name = name.into();
        check_conv_params(&name, &spec, &weight, bias.as_ref())?;
        Ok(Self::assemble(name, LinearKind::Conv2d(spec), weight, bias, activation))
    }

    /// Quantized affine map `y = x Wᵀ + b` over `[batch, in_features]` input
    ///
    /// # Errors
    ///
    /// Fails if the weight or bias size does not match the feature counts.
    pub fn affine(
        name: impl Into<String>,
        in_features: usize,
        out_features: usize,
        weight: Tensor,
        bias: Option<Tensor>,
        activation: Option<ActivationTag>,
    ) -> Result<Self> {
        if weight.len() != in_features * out_features {
            return Err(Error::ShapeMismatch {
                expected: vec![out_features, in_features],
                got: vec![weight.len()],
            });
        }
        if let Some(b) = &bias {
            if b.len() != out_features {
                return Err(Error::ShapeMismatch {
                    expected: vec![out_features],
                    got: vec![b.len()],
                });
            }
        }
        let kind = LinearKind::Affine {
            in_features,
            out_features,
        };
        Ok(Self::assemble(name.into(), kind, weight, bias, activation))
    }

    fn assemble(
        name: String,
        kind: LinearKind,
        weight: Tensor,
        bias: Option<Tensor>,
        activation: Option<ActivationTag>,
    ) -> Self {
        // Both quantizers share the activation tag
        let quantizer = || match activation {
            None => Quantizer::symmetric(),
            Some(tag) => Quantizer::asymmetric(tag),
        };
        Self {
            name,
            kind,
            weight,
            bias,
            act_quant: quantizer(),
            weight_quant: quantizer(),
            shape: None,
            probe: None,
        }
    }

    /// Replace both quantizers
    pub fn with_quantizers(mut self, act_quant: Quantizer, weight_quant: Quantizer) -> Self {
        self.act_quant = act_quant;
        self.weight_quant = weight_quant;
        self
    }

    /// Freeze both bitwidths from construction on (input and stem layers)
    pub fn with_fixed_precision(mut self) -> Self {
        self.act_quant.freeze_bitwidth();
        self.weight_quant.freeze_bitwidth();
        self
    }

    pub fn kind(&self) -> &LinearKind {
        &self.kind
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn act_quant(&self) -> &Quantizer {
        &self.act_quant
    }

    pub fn act_quant_mut(&mut self) -> &mut Quantizer {
        &mut self.act_quant
    }

    pub fn weight_quant(&self) -> &Quantizer {
        &self.weight_quant
    }

    pub fn weight_quant_mut(&mut self) -> &mut Quantizer {
        &mut self.weight_quant
    }

    /// Extents recorded by calibration
    ///
    /// # Errors
    ///
    /// [`Error::MissingShapeMetadata`] before calibration has run.
    pub fn require_shape(&self) -> Result<&ShapeMetadata> {
        self.shape
            .as_ref()
            .ok_or_else(|| Error::MissingShapeMetadata(self.name.clone()))
    }

    /// Weight, bias and all four quantizer logits
    pub fn trainable_params(&mut self) -> Vec<&mut Tensor> {
        let mut params = vec![&mut self.weight];
        if let Some(b) = self.bias.as_mut() {
            params.push(b);
        }
        params.extend(self.act_quant.trainable_params());
        params.extend(self.weight_quant.trainable_params());
        params
    }

    /// Quantize input and weight, then apply the linear operator
    pub fn forward(&mut self, input: &FeatureMap, ctx: &Context) -> Result<FeatureMap> {
        let training = ctx.is_training();
        let (tensor, dims) = match self.kind {
            LinearKind::Conv2d(spec) => {
                check_conv_input(&spec, input)?;
                let x = self.act_quant.quantize(&input.tensor, &input.dims, training)?;
                let w = self
                    .weight_quant
                    .quantize(&self.weight, &self.kind.weight_dims(), training)?;
                conv2d(&x, &w, self.bias.as_ref(), &spec, &input.dims)
            }
            LinearKind::Affine {
                in_features,
                out_features,
            } => {
                if input.dims.len() != 2 || input.dims[1] != in_features {
                    return Err(Error::ShapeMismatch {
                        expected: vec![input.dims.first().copied().unwrap_or(0), in_features],
                        got: input.dims.clone(),
                    });
                }
                let batch = input.dims[0];
                let x = self.act_quant.quantize(&input.tensor, &input.dims, training)?;
                let w = self
                    .weight_quant
                    .quantize(&self.weight, &self.kind.weight_dims(), training)?;
                let y = linear(&x, &w, self.bias.as_ref(), batch, in_features, out_features);
                (y, vec![batch, out_features])
            }
        };

        if let Some(probe) = self.probe.as_mut() {
            probe.record(input, &dims);
        }
        Ok(FeatureMap { tensor, dims })
    }
}

impl Instrumented for QuantizedOp {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach_probe(&mut self, probe: Probe) {
        self.probe = Some(probe);
    }

    fn detach_probe(&mut self) -> Option<Probe> {
        self.probe.take()
    }

    fn is_probed(&self) -> bool {
        self.probe.is_some()
    }

    fn set_shape(&mut self, shape: ShapeMetadata) {
        self.shape = Some(shape);
    }

    fn shape(&self) -> Option<&ShapeMetadata> {
        self.shape.as_ref()
    }

    fn wants_channel_minima(&self) -> bool {
        !self.act_quant.is_symmetric()
    }

    fn as_quantized_mut(&mut self) -> Option<&mut QuantizedOp> {
        Some(self)
    }
}
