//! Instrumentation probes
//!
//! A probe is attached to an operator for exactly one calibration pass. While
//! attached it records the operator's input/output extents and, when asked,
//! the per-channel minimum of the operator's input.

use super::FeatureMap;
use crate::autograd::Layout;
use crate::quant::QuantizedOp;
use serde::{Deserialize, Serialize};

/// Extents observed on an operator during calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeMetadata {
    pub in_channels: usize,
    pub in_height: usize,
    pub in_width: usize,
    pub out_channels: usize,
    pub out_height: usize,
    pub out_width: usize,
}

impl ShapeMetadata {
    /// Read extents from memory-order dims
    ///
    /// 4-D maps are split by `layout`; 2-D `[batch, features]` maps count as a
    /// 1×1 spatial extent. Anything else yields `None`.
    pub fn observe(layout: Layout, input: &[usize], output: &[usize]) -> Option<Self> {
        let (in_channels, in_height, in_width) = extents(layout, input)?;
        let (out_channels, out_height, out_width) = extents(layout, output)?;
        Some(Self {
            in_channels,
            in_height,
            in_width,
            out_channels,
            out_height,
            out_width,
        })
    }
}

fn extents(layout: Layout, dims: &[usize]) -> Option<(usize, usize, usize)> {
    match dims {
        &[_, features] => Some((features, 1, 1)),
        _ => layout.split(dims).map(|(_, c, h, w)| (c, h, w)),
    }
}

/// Recording state attached to one operator
#[derive(Debug, Clone)]
pub struct Probe {
    layout: Layout,
    track_minima: bool,
    shape: Option<ShapeMetadata>,
    channel_minima: Option<Vec<f32>>,
}

impl Probe {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            track_minima: false,
            shape: None,
            channel_minima: None,
        }
    }

    /// Also collect the per-channel minimum of the input
    pub fn with_channel_minima(mut self) -> Self {
        self.track_minima = true;
        self
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Last recorded extents
    pub fn shape(&self) -> Option<ShapeMetadata> {
        self.shape
    }

    /// Per-channel input minima over every recorded pass
    pub fn channel_minima(&self) -> Option<&[f32]> {
        self.channel_minima.as_deref()
    }

    /// Record one forward pass
    pub fn record(&mut self, input: &FeatureMap, output_dims: &[usize]) {
        if let Some(shape) = ShapeMetadata::observe(self.layout, &input.dims, output_dims) {
            self.shape = Some(shape);
        }
        if !self.track_minima || input.dims.len() < 2 {
            return;
        }

        let axis = self.layout.channel_axis(input.dims.len());
        let channels = input.dims[axis];
        let inner: usize = input.dims[axis + 1..].iter().product();
        let mut minima = vec![f32::INFINITY; channels];
        for (i, &v) in input.tensor.data().iter().enumerate() {
            let c = (i / inner.max(1)) % channels;
            minima[c] = minima[c].min(v);
        }

        self.channel_minima = Some(match self.channel_minima.take() {
            Some(prev) if prev.len() == channels => {
                prev.iter().zip(&minima).map(|(a, b)| a.min(*b)).collect()
            }
            _ => minima,
        });
    }
}

/// Operator that can carry a calibration probe
pub trait Instrumented {
    /// Path of the operator inside its model
    fn name(&self) -> &str;

    /// Attach a probe; replaces any probe left over
    fn attach_probe(&mut self, probe: Probe);

    /// Remove and return the attached probe
    fn detach_probe(&mut self) -> Option<Probe>;

    /// Whether a probe is attached
    fn is_probed(&self) -> bool;

    /// Store extents recorded by a probe
    fn set_shape(&mut self, shape: ShapeMetadata);

    fn shape(&self) -> Option<&ShapeMetadata>;

    /// Whether calibration should collect input minima for this operator
    fn wants_channel_minima(&self) -> bool {
        false
    }

    /// The quantized operator behind this instrumentation, if any
    fn as_quantized_mut(&mut self) -> Option<&mut QuantizedOp> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_from_layouts() {
        let first = ShapeMetadata::observe(Layout::ChannelsFirst, &[2, 3, 8, 6], &[2, 4, 4, 3]);
        let last = ShapeMetadata::observe(Layout::ChannelsLast, &[2, 8, 6, 3], &[2, 4, 3, 4]);
        assert_eq!(first, last);
        let shape = first.unwrap();
        assert_eq!((shape.in_height, shape.in_width), (8, 6));
        assert_eq!((shape.out_channels, shape.out_height, shape.out_width), (4, 4, 3));
    }

    #[test]
    fn test_affine_shape_is_one_by_one() {
        let shape = ShapeMetadata::observe(Layout::ChannelsFirst, &[5, 12], &[5, 7]).unwrap();
        assert_eq!(shape.in_channels, 12);
        assert_eq!((shape.out_height, shape.out_width), (1, 1));
    }

    #[test]
    fn test_minima_per_channel() {
        // [n=2, c=2, h=1, w=2]
        let input = FeatureMap::from_vec(
            vec![1.0, -1.0, 5.0, 4.0, 0.5, 2.0, -3.0, 9.0],
            vec![2, 2, 1, 2],
        )
        .unwrap();
        let mut probe = Probe::new(Layout::ChannelsFirst).with_channel_minima();
        probe.record(&input, &[2, 2, 1, 2]);
        assert_eq!(probe.channel_minima().unwrap(), &[-1.0, -3.0]);

        let mut last = Probe::new(Layout::ChannelsLast).with_channel_minima();
        // Same values seen as [n=2, h=2, w=1, c=2]
        let input = FeatureMap::from_vec(input.tensor.data().to_vec(), vec![2, 2, 1, 2]).unwrap();
        last.record(&input, &[2, 2, 1, 2]);
        assert_eq!(last.channel_minima().unwrap(), &[-3.0, -1.0]);
    }

    #[test]
    fn test_minima_merge_across_passes() {
        let mut probe = Probe::new(Layout::ChannelsFirst).with_channel_minima();
        let a = FeatureMap::from_vec(vec![0.0, 5.0], vec![1, 2, 1, 1]).unwrap();
        let b = FeatureMap::from_vec(vec![1.0, -2.0], vec![1, 2, 1, 1]).unwrap();
        probe.record(&a, &[1, 2, 1, 1]);
        probe.record(&b, &[1, 2, 1, 1]);
        assert_eq!(probe.channel_minima().unwrap(), &[0.0, -2.0]);
    }

    #[test]
    fn test_minima_skipped_unless_requested() {
        let mut probe = Probe::new(Layout::ChannelsFirst);
        let a = FeatureMap::from_vec(vec![0.0, 5.0], vec![1, 2, 1, 1]).unwrap();
        probe.record(&a, &[1, 2, 1, 1]);
        assert!(probe.channel_minima().is_none());
        assert!(probe.shape().is_some());
    }
}
