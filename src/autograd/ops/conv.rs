//! 2-D convolution over channels-first or channels-last feature maps

use super::tracks;
use crate::autograd::{parents_of, BackwardOp, Tensor};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Memory order of a 4-D feature map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// `[batch, channel, height, width]`
    #[default]
    ChannelsFirst,
    /// `[batch, height, width, channel]`
    ChannelsLast,
}

impl Layout {
    /// Memory-order dims for a logical `(n, c, h, w)` shape
    pub fn dims(self, n: usize, c: usize, h: usize, w: usize) -> Vec<usize> {
        match self {
            Layout::ChannelsFirst => vec![n, c, h, w],
            Layout::ChannelsLast => vec![n, h, w, c],
        }
    }

    /// Logical `(n, c, h, w)` of memory-order dims; `None` unless 4-D
    pub fn split(self, dims: &[usize]) -> Option<(usize, usize, usize, usize)> {
        match (self, dims) {
            (Layout::ChannelsFirst, &[n, c, h, w]) => Some((n, c, h, w)),
            (Layout::ChannelsLast, &[n, h, w, c]) => Some((n, c, h, w)),
            _ => None,
        }
    }

    /// Axis holding channels in a tensor of the given rank
    pub fn channel_axis(self, rank: usize) -> usize {
        match self {
            Layout::ChannelsFirst => 1,
            Layout::ChannelsLast => rank.saturating_sub(1),
        }
    }

    /// Flat index of element `(n, c, y, x)` in a map with `channels × height × width` per sample
    #[allow(clippy::too_many_arguments)]
    pub fn index(
        self,
        channels: usize,
        height: usize,
        width: usize,
        n: usize,
        c: usize,
        y: usize,
        x: usize,
    ) -> usize {
        match self {
            Layout::ChannelsFirst => ((n * channels + c) * height + y) * width + x,
            Layout::ChannelsLast => ((n * height + y) * width + x) * channels + c,
        }
    }
}

/// Hyperparameters of a 2-D convolution
///
/// Weights are always stored `[out_channels, in_channels / groups, k, k]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conv2dSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub groups: usize,
    pub layout: Layout,
}

impl Conv2dSpec {
    /// Square kernel, stride 1, no padding, one group, channels-first
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
            dilation: 1,
            groups: 1,
            layout: Layout::ChannelsFirst,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Pad by `kernel_size / 2` so odd kernels at stride 1 keep the spatial size
    pub fn with_same_padding(mut self) -> Self {
        self.padding = self.kernel_size / 2;
        self
    }

    pub fn with_dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Whether channel counts divide evenly into groups and all sizes are non-zero
    pub fn is_valid(&self) -> bool {
        self.groups > 0
            && self.kernel_size > 0
            && self.stride > 0
            && self.dilation > 0
            && self.in_channels % self.groups == 0
            && self.out_channels % self.groups == 0
    }

    /// Number of weight elements
    pub fn weight_len(&self) -> usize {
        self.out_channels * (self.in_channels / self.groups) * self.kernel_size * self.kernel_size
    }

    /// Output height and width for an input of `height × width`
    pub fn output_hw(&self, height: usize, width: usize) -> (usize, usize) {
        let span = self.dilation * (self.kernel_size - 1) + 1;
        let out = |size: usize| {
            let padded = size + 2 * self.padding;
            if padded < span {
                0
            } else {
                (padded - span) / self.stride + 1
            }
        };
        (out(height), out(width))
    }
}

#[derive(Clone, Copy)]
struct ConvGeometry {
    spec: Conv2dSpec,
    batch: usize,
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
}

impl ConvGeometry {
    fn output_len(&self) -> usize {
        self.batch * self.spec.out_channels * self.out_h * self.out_w
    }

    /// Visit every (output, input, weight) index triple that contributes a product
    fn for_each_tap(&self, mut f: impl FnMut(usize, usize, usize)) {
        let s = &self.spec;
        let cin_g = s.in_channels / s.groups;
        let cout_g = s.out_channels / s.groups;
        let k = s.kernel_size;

        for n in 0..self.batch {
            for oc in 0..s.out_channels {
                let group = oc / cout_g;
                for oy in 0..self.out_h {
                    for ox in 0..self.out_w {
                        let oi = s
                            .layout
                            .index(s.out_channels, self.out_h, self.out_w, n, oc, oy, ox);
                        for icg in 0..cin_g {
                            let ic = group * cin_g + icg;
                            for ky in 0..k {
                                let iy = (oy * s.stride + ky * s.dilation) as isize
                                    - s.padding as isize;
                                if iy < 0 || iy as usize >= self.in_h {
                                    continue;
                                }
                                for kx in 0..k {
                                    let ix = (ox * s.stride + kx * s.dilation) as isize
                                        - s.padding as isize;
                                    if ix < 0 || ix as usize >= self.in_w {
                                        continue;
                                    }
                                    let ii = s.layout.index(
                                        s.in_channels,
                                        self.in_h,
                                        self.in_w,
                                        n,
                                        ic,
                                        iy as usize,
                                        ix as usize,
                                    );
                                    let wi = ((oc * cin_g + icg) * k + ky) * k + kx;
                                    f(oi, ii, wi);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Visit every output index with its output channel
    fn for_each_output(&self, mut f: impl FnMut(usize, usize)) {
        let s = &self.spec;
        for n in 0..self.batch {
            for oc in 0..s.out_channels {
                for oy in 0..self.out_h {
                    for ox in 0..self.out_w {
                        let oi = s
                            .layout
                            .index(s.out_channels, self.out_h, self.out_w, n, oc, oy, ox);
                        f(oi, oc);
                    }
                }
            }
        }
    }
}

/// 2-D convolution
///
/// `in_dims` are the memory-order dims of `x` in `spec.layout`. Returns the output
/// tensor and its memory-order dims.
pub fn conv2d(
    x: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    spec: &Conv2dSpec,
    in_dims: &[usize],
) -> (Tensor, Vec<usize>) {
    assert!(spec.is_valid(), "conv2d: invalid spec {:?}", spec);
    let (batch, channels, in_h, in_w) = spec
        .layout
        .split(in_dims)
        .unwrap_or_else(|| panic!("conv2d: input dims {:?} are not 4-D", in_dims));
    assert_eq!(channels, spec.in_channels, "conv2d: channel mismatch");
    assert_eq!(x.len(), batch * channels * in_h * in_w, "conv2d: input size mismatch");
    assert_eq!(weight.len(), spec.weight_len(), "conv2d: weight size mismatch");
    if let Some(b) = bias {
        assert_eq!(b.len(), spec.out_channels, "conv2d: bias size mismatch");
    }

    let (out_h, out_w) = spec.output_hw(in_h, in_w);
    let geometry = ConvGeometry {
        spec: *spec,
        batch,
        in_h,
        in_w,
        out_h,
        out_w,
    };

    let xd = x.data();
    let wd = weight.data();
    let mut out = vec![0.0; geometry.output_len()];
    geometry.for_each_tap(|oi, ii, wi| out[oi] += xd[ii] * wd[wi]);
    if let Some(b) = bias {
        let bd = b.data();
        geometry.for_each_output(|oi, oc| out[oi] += bd[oc]);
    }

    let requires_grad = tracks(
        x.requires_grad() || weight.requires_grad() || bias.is_some_and(|b| b.requires_grad()),
    );
    let mut result = Tensor::new(Array1::from(out), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(Conv2dBackward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            geometry,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    let out_dims = spec.layout.dims(batch, spec.out_channels, out_h, out_w);
    (result, out_dims)
}

struct Conv2dBackward {
    x: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    geometry: ConvGeometry,
    result_grad: Rc<RefCell<Option<Array1<f32>>>>,
}

impl BackwardOp for Conv2dBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let wd = self.weight.data();
                let mut grad_x = vec![0.0; self.x.len()];
                self.geometry
                    .for_each_tap(|oi, ii, wi| grad_x[ii] += grad_output[oi] * wd[wi]);
                self.x.accumulate_grad(Array1::from(grad_x));
            }

            if self.weight.requires_grad() {
                let xd = self.x.data();
                let mut grad_w = vec![0.0; self.weight.len()];
                self.geometry
                    .for_each_tap(|oi, ii, wi| grad_w[wi] += grad_output[oi] * xd[ii]);
                self.weight.accumulate_grad(Array1::from(grad_w));
            }

            if let Some(bias) = self.bias.as_ref().filter(|b| b.requires_grad()) {
                let mut grad_b = vec![0.0; bias.len()];
                self.geometry
                    .for_each_output(|oi, oc| grad_b[oc] += grad_output[oi]);
                bias.accumulate_grad(Array1::from(grad_b));
            }
        }
    }

    fn parents(&self) -> Vec<Rc<dyn BackwardOp>> {
        let mut inputs = vec![&self.x, &self.weight];
        if let Some(b) = &self.bias {
            inputs.push(b);
        }
        parents_of(&inputs)
    }
}
