//! Floating-point convolution layer

use super::{FeatureMap, Instrumented, Probe, ShapeMetadata};
use crate::autograd::{conv2d, Conv2dSpec, Context, Tensor};
use crate::error::{Error, Result};

/// Check that `spec` is usable and `weight`/`bias` fit it
pub(crate) fn check_conv_params(
    name: &str,
    spec: &Conv2dSpec,
    weight: &Tensor,
    bias: Option<&Tensor>,
) -> Result<()> {
    if !spec.is_valid() {
        return Err(Error::InvalidParameter(format!(
            "{name}: invalid convolution {spec:?}"
        )));
    }
    if weight.len() != spec.weight_len() {
        return Err(Error::ShapeMismatch {
            expected: vec![
                spec.out_channels,
                spec.in_channels / spec.groups,
                spec.kernel_size,
                spec.kernel_size,
            ],
            got: vec![weight.len()],
        });
    }
    if let Some(b) = bias {
        if b.len() != spec.out_channels {
            return Err(Error::ShapeMismatch {
                expected: vec![spec.out_channels],
                got: vec![b.len()],
            });
        }
    }
    Ok(())
}

/// Check that `input` is a 4-D map with `spec.in_channels` channels
pub(crate) fn check_conv_input(spec: &Conv2dSpec, input: &FeatureMap) -> Result<()> {
    match spec.layout.split(&input.dims) {
        Some((_, channels, _, _)) if channels == spec.in_channels => Ok(()),
        _ => Err(Error::ShapeMismatch {
            expected: spec.layout.dims(0, spec.in_channels, 0, 0),
            got: input.dims.clone(),
        }),
    }
}

/// Unquantized 2-D convolution
///
/// Records its extents during calibration like quantized operators do.
#[derive(Debug, Clone)]
pub struct Conv2d {
    name: String,
    spec: Conv2dSpec,
    weight: Tensor,
    bias: Option<Tensor>,
    shape: Option<ShapeMetadata>,
    probe: Option<Probe>,
}

impl Conv2d {
    /// # Errors
    ///
    /// Fails if the weight or bias size does not match `spec`.
    pub fn new(
        name: impl Into<String>,
        spec: Conv2dSpec,
        weight: Tensor,
        bias: Option<Tensor>,
    ) -> Result<Self> {
        let name = name.into();
        check_conv_params(&name, &spec, &weight, bias.as_ref())?;
        Ok(Self {
            name,
            spec,
            weight,
            bias,
            shape: None,
            probe: None,
        })
    }

    pub fn spec(&self) -> &Conv2dSpec {
        &self.spec
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn forward(&mut self, input: &FeatureMap, _ctx: &Context) -> Result<FeatureMap> {
        check_conv_input(&self.spec, input)?;
        let (tensor, dims) = conv2d(
            &input.tensor,
            &self.weight,
            self.bias.as_ref(),
            &self.spec,
            &input.dims,
        );
        if let Some(probe) = self.probe.as_mut() {
            probe.record(input, &dims);
        }
        Ok(FeatureMap { tensor, dims })
    }

    pub fn trainable_params(&mut self) -> Vec<&mut Tensor> {
        let mut params = vec![&mut self.weight];
        if let Some(b) = self.bias.as_mut() {
            params.push(b);
        }
        params
    }
}

impl Instrumented for Conv2d {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::Layout;

    #[test]
    fn test_rejects_wrong_weight_size() {
        let spec = Conv2dSpec::new(2, 4, 3);
        let result = Conv2d::new("c", spec, Tensor::zeros(10, true), None);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_rejects_wrong_channel_count() {
        let spec = Conv2dSpec::new(2, 1, 1);
        let mut conv = Conv2d::new("c", spec, Tensor::ones(2, true), None).unwrap();
        let input = FeatureMap::from_vec(vec![0.0; 12], vec![1, 3, 2, 2]).unwrap();
        let result = conv.forward(&input, &Context::evaluation());
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_probe_records_extents() {
        let spec = Conv2dSpec::new(1, 2, 3).with_layout(Layout::ChannelsLast);
        let mut conv = Conv2d::new("stem", spec, Tensor::ones(18, true), None).unwrap();
        conv.attach_probe(Probe::new(Layout::ChannelsLast));

        let input = FeatureMap::from_vec(vec![1.0; 25], vec![1, 5, 5, 1]).unwrap();
        let out = conv.forward(&input, &Context::evaluation()).unwrap();
        assert_eq!(out.dims, vec![1, 3, 3, 2]);

        let shape = conv.detach_probe().unwrap().shape().unwrap();
        assert_eq!((shape.in_height, shape.out_height, shape.out_channels), (5, 3, 2));
        assert!(!conv.is_probed());
    }
}
