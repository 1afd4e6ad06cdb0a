//! Sequential container

use super::{Conv2d, FeatureMap, Instrumented, QuantModel};
use crate::autograd::{hard_swish, relu, swish, Context, Tensor};
use crate::error::Result;
use crate::quant::{ActivationTag, QuantizedOp};

/// One stage of a [`Sequential`] model
#[derive(Debug, Clone)]
pub enum Layer {
    Quantized(QuantizedOp),
    Conv2d(Conv2d),
    Activation(ActivationTag),
    Flatten,
}

/// Layers applied in order
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn quantized(self, op: QuantizedOp) -> Self {
        self.push(Layer::Quantized(op))
    }

    pub fn conv2d(self, conv: Conv2d) -> Self {
        self.push(Layer::Conv2d(conv))
    }

    pub fn activation(self, tag: ActivationTag) -> Self {
        self.push(Layer::Activation(tag))
    }

    pub fn flatten(self) -> Self {
        self.push(Layer::Flatten)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

fn activate(tag: ActivationTag, x: &Tensor) -> Tensor {
    match tag {
        ActivationTag::Relu => relu(x),
        ActivationTag::HardSwish => hard_swish(x),
        ActivationTag::Swish => swish(x),
    }
}

impl QuantModel for Sequential {
    fn forward(&mut self, input: &FeatureMap, ctx: &Context) -> Result<FeatureMap> {
        let mut x = input.clone();
        for layer in &mut self.layers {
            x = match layer {
                Layer::Quantized(op) => op.forward(&x, ctx)?,
                Layer::Conv2d(conv) => conv.forward(&x, ctx)?,
                Layer::Activation(tag) => FeatureMap {
                    tensor: activate(*tag, &x.tensor),
                    dims: x.dims,
                },
                Layer::Flatten => x.flatten(),
            };
        }
        Ok(x)
    }

    fn quantized_ops(&self) -> Vec<&QuantizedOp> {
        self.layers
            .iter()
            .filter_map(|layer| match layer {
                Layer::Quantized(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    fn quantized_ops_mut(&mut self) -> Vec<&mut QuantizedOp> {
        self.layers
            .iter_mut()
            .filter_map(|layer| match layer {
                Layer::Quantized(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    fn instrumented_ops_mut(&mut self) -> Vec<&mut dyn Instrumented> {
        self.layers
            .iter_mut()
            .filter_map(|layer| match layer {
                Layer::Quantized(op) => Some(op as &mut dyn Instrumented),
                Layer::Conv2d(conv) => Some(conv as &mut dyn Instrumented),
                Layer::Activation(_) | Layer::Flatten => None,
            })
            .collect()
    }

    fn trainable_params(&mut self) -> Vec<&mut Tensor> {
        self.layers
            .iter_mut()
            .flat_map(|layer| match layer {
                Layer::Quantized(op) => op.trainable_params(),
                Layer::Conv2d(conv) => conv.trainable_params(),
                Layer::Activation(_) | Layer::Flatten => Vec::new(),
            })
            .collect()
    }
}
