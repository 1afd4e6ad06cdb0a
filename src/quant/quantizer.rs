//! Learnable per-tensor quantizer
//!
//! Each quantizer owns two trainable logits: one for its bitwidth, mapped into
//! `[2.0, 8.5]` bits, and one for its clipping scale, mapped through softplus.
//! Whether a forward pass injects stochastic dither or rounds deterministically
//! is decided by a small state machine over [`Precision`] and the training flag.

use super::activation::ActivationTag;
use super::bitwidth::{deployable_bitwidth, logit_for, mapped_bitwidth, trainable_bitwidth};
use super::noise::{stochastic_round, NoiseContext};
use super::rounding::round_ste;
use crate::autograd::{
    add, add_scalar, affine, clamp, div_scalar, exp2, mul, mul_scalar, scale, softplus, Layout,
    Tensor,
};
use crate::config::QuantizerInit;
use crate::error::{Error, Result};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Above this the softplus inverse is the identity in f32
const SOFTPLUS_LINEAR_FROM: f32 = 20.0;

/// Whether a quantizer's bitwidth is still being searched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    /// Bitwidth logit is trainable
    Searching,
    /// Bitwidth logit is frozen at its rounded value
    Fixed,
}

/// How a forward pass turns values into levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingPolicy {
    /// Dithered relaxation; lets gradient reach the bitwidth logit
    Stochastic,
    /// Clip, round with a straight-through gradient, rescale
    Deterministic,
}

impl RoundingPolicy {
    /// Only a searching quantizer in training mode takes the stochastic path
    pub fn select(precision: Precision, training: bool) -> Self {
        match (precision, training) {
            (Precision::Searching, true) => RoundingPolicy::Stochastic,
            (Precision::Searching, false) | (Precision::Fixed, _) => RoundingPolicy::Deterministic,
        }
    }
}

/// Shift applied to asymmetric inputs before clipping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Offset {
    /// One value for the whole tensor
    Uniform(f32),
    /// One value per channel, broadcast along the layout's channel axis
    PerChannel { values: Vec<f32>, layout: Layout },
}

/// Range construction of a quantizer
#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    /// Zero-centred input; the learned scale doubles as offset
    Symmetric,
    /// Input bounded below by a known nonlinearity
    Asymmetric { tag: ActivationTag, offset: Offset },
}

/// Learnable quantizer for a single tensor
///
/// Clones share parameters but get a freshly seeded dither generator; call
/// [`Quantizer::with_seed`] on a clone for a reproducible sequence.
#[derive(Debug)]
pub struct Quantizer {
    bitwidth_logit: Tensor,
    scale_logit: Tensor,
    range: Range,
    rng: StdRng,
}

impl Clone for Quantizer {
    fn clone(&self) -> Self {
        Self {
            bitwidth_logit: self.bitwidth_logit.clone(),
            scale_logit: self.scale_logit.clone(),
            range: self.range.clone(),
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Quantizer {
    /// Quantizer for zero-centred inputs with default initial logits
    pub fn symmetric() -> Self {
        Self::with_init(Range::Symmetric, &QuantizerInit::default())
    }

    /// Quantizer for inputs following `tag`, with default initial logits
    pub fn asymmetric(tag: ActivationTag) -> Self {
        Self::with_init(
            Range::Asymmetric {
                tag,
                offset: Offset::Uniform(tag.offset()),
            },
            &QuantizerInit::default(),
        )
    }

    /// Symmetric without a preceding activation, otherwise asymmetric for the named one
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedActivation`] for an unrecognized name.
    pub fn for_activation(activation: Option<&str>) -> Result<Self> {
        match activation {
            None => Ok(Self::symmetric()),
            Some(name) => Ok(Self::asymmetric(name.parse()?)),
        }
    }

    /// Quantizer with explicit initial logits
    pub fn with_init(range: Range, init: &QuantizerInit) -> Self {
        let scale_logit = match range {
            Range::Symmetric => init.symmetric_scale_logit,
            Range::Asymmetric { .. } => init.asymmetric_scale_logit,
        };
        Self {
            bitwidth_logit: Tensor::scalar(init.bitwidth_logit, true),
            scale_logit: Tensor::scalar(scale_logit, true),
            range,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reseed the dither generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn range(&self) -> &Range {
        &self.range
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self.range, Range::Symmetric)
    }

    /// Preceding activation, if asymmetric
    pub fn activation(&self) -> Option<ActivationTag> {
        match self.range {
            Range::Symmetric => None,
            Range::Asymmetric { tag, .. } => Some(tag),
        }
    }

    /// Offset unit implied by the preceding activation; zero when symmetric
    pub fn base_offset(&self) -> f32 {
        self.activation().map_or(0.0, ActivationTag::offset)
    }

    /// Stored offset, if asymmetric
    pub fn offset(&self) -> Option<&Offset> {
        match &self.range {
            Range::Symmetric => None,
            Range::Asymmetric { offset, .. } => Some(offset),
        }
    }

    /// Replace the offset with one value per channel
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] on a symmetric quantizer, whose offset is
    /// its learned scale.
    pub fn set_channel_offsets(&mut self, values: Vec<f32>, layout: Layout) -> Result<()> {
        match &mut self.range {
            Range::Symmetric => Err(Error::InvalidParameter(
                "symmetric quantizers have no stored offset".to_string(),
            )),
            Range::Asymmetric { offset, .. } => {
                *offset = Offset::PerChannel { values, layout };
                Ok(())
            }
        }
    }

    pub fn precision(&self) -> Precision {
        if self.bitwidth_logit.requires_grad() {
            Precision::Searching
        } else {
            Precision::Fixed
        }
    }

    /// Rounding policy a forward pass would take
    pub fn policy(&self, training: bool) -> RoundingPolicy {
        RoundingPolicy::select(self.precision(), training)
    }

    /// Stop searching the bitwidth; later passes round deterministically
    pub fn freeze_bitwidth(&mut self) {
        self.bitwidth_logit.set_requires_grad(false);
    }

    /// Move the bitwidth logit so that it maps to `bits`
    pub fn set_bitwidth(&mut self, bits: f32) {
        self.bitwidth_logit.data_mut()[0] = logit_for(bits);
    }

    /// Bitwidth as a tensor
    ///
    /// While searching this is the differentiable mapped value; once fixed it is
    /// the rounded value with no graph.
    pub fn bitwidth(&self) -> Tensor {
        match self.precision() {
            Precision::Searching => trainable_bitwidth(&self.bitwidth_logit),
            Precision::Fixed => Tensor::scalar(self.deployable_bitwidth() as f32, false),
        }
    }

    /// Current value of [`Quantizer::bitwidth`]
    pub fn effective_bitwidth(&self) -> f32 {
        match self.precision() {
            Precision::Searching => mapped_bitwidth(self.bitwidth_logit.item()),
            Precision::Fixed => self.deployable_bitwidth() as f32,
        }
    }

    /// Whole-bit width this quantizer would deploy with
    pub fn deployable_bitwidth(&self) -> u32 {
        deployable_bitwidth(self.bitwidth_logit.item())
    }

    /// Clipping scale, `softplus(scale_logit)`; always strictly positive
    pub fn scale(&self) -> Tensor {
        softplus(&self.scale_logit)
    }

    pub fn scale_value(&self) -> f32 {
        self.scale().item()
    }

    /// Move the scale logit so that the scale equals `value`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] unless `value` is finite and positive.
    pub fn set_scale(&mut self, value: f32) -> Result<()> {
        if !(value.is_finite() && value > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "quantizer scale must be finite and positive, got {value}"
            )));
        }
        let logit = if value > SOFTPLUS_LINEAR_FROM {
            value
        } else {
            value.exp_m1().ln()
        };
        self.scale_logit.data_mut()[0] = logit;
        Ok(())
    }

    pub fn bitwidth_logit(&self) -> &Tensor {
        &self.bitwidth_logit
    }

    pub fn scale_logit(&self) -> &Tensor {
        &self.scale_logit
    }

    /// Trainable logits, bitwidth first
    pub fn trainable_params(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.bitwidth_logit, &mut self.scale_logit]
    }

    /// Quantize `x`, laid out as `dims`
    ///
    /// The result has the shape of `x` and is differentiable with respect to
    /// `x`, the scale logit and, on the stochastic path, the bitwidth logit.
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] when per-channel offsets do not match the
    /// channel extent of `dims`.
    pub fn quantize(&mut self, x: &Tensor, dims: &[usize], training: bool) -> Result<Tensor> {
        let policy = self.policy(training);
        let bits = round_ste(&self.bitwidth());
        let alpha = self.scale();

        let (shift, alpha) = match &self.range {
            Range::Symmetric => {
                // alpha * (2 - 2^(1 - bits))
                let widen = affine(&exp2(&affine(&bits, -1.0, 1.0)), -1.0, 2.0);
                let widened = mul(&alpha, &widen);
                (Shift::Learned(alpha), widened)
            }
            Range::Asymmetric { offset, .. } => (Shift::fixed(offset, dims, x.len())?, alpha),
        };

        let levels = affine(&exp2(&bits), 1.0, -1.0);
        let step = div_scalar(&alpha, &levels);
        let shifted = shift.apply(x, 1.0);

        let quantized = match policy {
            RoundingPolicy::Stochastic => {
                let ctx = NoiseContext::draw(&mut self.rng);
                let noisy = stochastic_round(&shifted, &step, ctx)?;
                mul_scalar(&clamp(&div_scalar(&noisy, &alpha), 0.0, 1.0), &alpha)
            }
            RoundingPolicy::Deterministic => {
                let unit = clamp(&div_scalar(&shifted, &alpha), 0.0, 1.0);
                mul_scalar(&round_ste(&mul_scalar(&unit, &levels)), &step)
            }
        };

        Ok(shift.apply(&quantized, -1.0))
    }
}

/// Offset as used by one forward pass
enum Shift {
    Learned(Tensor),
    Uniform(f32),
    PerChannel(Tensor),
}

impl Shift {
    fn fixed(offset: &Offset, dims: &[usize], len: usize) -> Result<Self> {
        match offset {
            Offset::Uniform(value) => Ok(Shift::Uniform(*value)),
            Offset::PerChannel { values, layout } => {
                let rank = dims.len();
                let axis = layout.channel_axis(rank);
                let channels = dims.get(axis).copied().unwrap_or(0);
                if rank < 2 || channels != values.len() || dims.iter().product::<usize>() != len {
                    return Err(Error::ShapeMismatch {
                        expected: vec![values.len()],
                        got: dims.to_vec(),
                    });
                }
                let inner: usize = dims[axis + 1..].iter().product();
                let data = Array1::from_iter((0..len).map(|i| values[(i / inner) % channels]));
                Ok(Shift::PerChannel(Tensor::new(data, false)))
            }
        }
    }

    fn apply(&self, x: &Tensor, sign: f32) -> Tensor {
        match self {
            Shift::Learned(alpha) => add_scalar(x, &scale(alpha, sign)),
            Shift::Uniform(value) => affine(x, 1.0, sign * value),
            Shift::PerChannel(values) => add(x, &scale(values, sign)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, sum};
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn fixed(range: Range, bits: f32, alpha: f32) -> Quantizer {
        let mut q = Quantizer::with_init(range, &QuantizerInit::default()).with_seed(0);
        q.set_bitwidth(bits);
        q.freeze_bitwidth();
        q.set_scale(alpha).unwrap();
        q
    }

    #[test]
    fn test_default_initial_logits() {
        let sym = Quantizer::symmetric();
        assert_eq!(sym.scale_logit().item(), 1.0);
        assert_eq!(sym.bitwidth_logit().item(), 2.5);
        assert_eq!(sym.deployable_bitwidth(), 8);

        let asym = Quantizer::asymmetric(ActivationTag::Relu);
        assert_eq!(asym.scale_logit().item(), 6.0);
        assert_eq!(asym.precision(), Precision::Searching);
    }

    #[test]
    fn test_offsets_follow_activation_name() {
        let offset_of = |name: &str| Quantizer::for_activation(Some(name)).unwrap().offset().cloned();
        assert_eq!(offset_of("relu"), Some(Offset::Uniform(0.0)));
        assert_eq!(offset_of("hswish"), Some(Offset::Uniform(0.3125)));
        assert_eq!(
            offset_of("swish"),
            Some(Offset::Uniform(0.278_464_542_761_073_8_f64 as f32))
        );
        assert!(Quantizer::for_activation(None).unwrap().offset().is_none());
    }

    #[test]
    fn test_unknown_activation_fails_construction() {
        let result = Quantizer::for_activation(Some("mish"));
        assert!(matches!(result, Err(Error::UnsupportedActivation(_))));
    }

    #[test]
    fn test_policy_table() {
        use Precision::*;
        use RoundingPolicy::*;
        assert_eq!(RoundingPolicy::select(Searching, true), Stochastic);
        assert_eq!(RoundingPolicy::select(Searching, false), Deterministic);
        assert_eq!(RoundingPolicy::select(Fixed, true), Deterministic);
        assert_eq!(RoundingPolicy::select(Fixed, false), Deterministic);
    }

    #[test]
    fn test_frozen_quantizer_trains_deterministically() {
        let mut q = Quantizer::asymmetric(ActivationTag::Relu).with_seed(9);
        q.freeze_bitwidth();
        assert_eq!(q.policy(true), RoundingPolicy::Deterministic);

        let x = Tensor::from_vec((0..32).map(|i| i as f32 * 0.173).collect(), false);
        let dims = [x.len()];
        let train_a = q.quantize(&x, &dims, true).unwrap();
        let train_b = q.quantize(&x, &dims, true).unwrap();
        let eval = q.quantize(&x, &dims, false).unwrap();
        assert_eq!(train_a.data(), eval.data());
        assert_eq!(train_b.data(), eval.data());
    }

    #[test]
    fn test_symmetric_range_bounds() {
        let alpha = 1.5;
        let bits = 4.0;
        let mut q = fixed(Range::Symmetric, bits, alpha);
        let x = Tensor::from_vec(vec![-100.0, 100.0, 0.0], false);
        let y = q.quantize(&x, &[3], false).unwrap();

        assert_abs_diff_eq!(y.data()[0], -alpha, epsilon = 1e-5);
        assert_abs_diff_eq!(
            y.data()[1],
            alpha * (1.0 - 2f32.powf(1.0 - bits)),
            epsilon = 1e-5
        );
        // Zero sits on a level
        assert_abs_diff_eq!(y.data()[2], 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_asymmetric_clips_below_offset() {
        let mut q = fixed(
            Range::Asymmetric {
                tag: ActivationTag::HardSwish,
                offset: Offset::Uniform(0.3125),
            },
            8.0,
            6.0,
        );
        let x = Tensor::from_vec(vec![-5.0, 0.0, 100.0], false);
        let y = q.quantize(&x, &[3], false).unwrap();
        assert_abs_diff_eq!(y.data()[0], -0.3125, epsilon = 1e-5);
        assert_abs_diff_eq!(y.data()[2], 6.0 - 0.3125, epsilon = 1e-4);
    }

    #[test]
    fn test_levels_match_bitwidth() {
        let mut q = fixed(
            Range::Asymmetric {
                tag: ActivationTag::Relu,
                offset: Offset::Uniform(0.0),
            },
            2.0,
            3.0,
        );
        let x = Tensor::from_vec((0..301).map(|i| i as f32 * 0.01).collect(), false);
        let y = q.quantize(&x, &[x.len()], false).unwrap();
        let mut levels: Vec<i32> = y.data().iter().map(|v| (v * 1000.0).round() as i32).collect();
        levels.dedup();
        assert_eq!(levels, vec![0, 1000, 2000, 3000]);
    }

    #[test]
    fn test_per_channel_offsets_broadcast() {
        let mut q = fixed(
            Range::Asymmetric {
                tag: ActivationTag::Swish,
                offset: Offset::Uniform(0.0),
            },
            8.0,
            4.0,
        );
        q.set_channel_offsets(vec![0.0, 1.0], Layout::ChannelsFirst).unwrap();
        // [n=1, c=2, h=1, w=2], all at the bottom of channel 1's range
        let x = Tensor::from_vec(vec![0.0, 0.0, -1.0, -1.0], false);
        let y = q.quantize(&x, &[1, 2, 1, 2], false).unwrap();
        assert_abs_diff_eq!(y.data()[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.data()[2], -1.0, epsilon = 1e-6);

        q.set_channel_offsets(vec![0.0, 1.0], Layout::ChannelsLast).unwrap();
        // [n=1, h=1, w=2, c=2]: channels alternate
        let x = Tensor::from_vec(vec![0.0, -1.0, 0.0, -1.0], false);
        let y = q.quantize(&x, &[1, 1, 2, 2], false).unwrap();
        assert_abs_diff_eq!(y.data()[2], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.data()[3], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_per_channel_offset_length_checked() {
        let mut q = Quantizer::asymmetric(ActivationTag::Relu);
        q.set_channel_offsets(vec![0.0; 3], Layout::ChannelsFirst).unwrap();
        let x = Tensor::zeros(8, false);
        let result = q.quantize(&x, &[1, 2, 2, 2], false);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_symmetric_has_no_stored_offset() {
        let mut q = Quantizer::symmetric();
        let result = q.set_channel_offsets(vec![0.0], Layout::ChannelsFirst);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_stochastic_path_reaches_bitwidth_logit() {
        let mut q = Quantizer::symmetric().with_seed(5);
        let x = Tensor::from_vec(vec![-0.4, 0.1, 0.3, 0.9], true);
        let mut loss = sum(&q.quantize(&x, &[4], true).unwrap());
        backward(&mut loss, None);

        assert!(q.bitwidth_logit().grad().is_some());
        assert!(q.scale_logit().grad().is_some());
        assert_eq!(x.grad().unwrap().len(), 4);
    }

    const TRAIN_INPUTS: [f32; 6] = [-3.0, -0.9, -0.2, 0.3, 0.95, 3.0];

    /// Searching at 4 bits with unit scale and a known dither stream
    fn searching(q: Quantizer, seed: u64) -> Quantizer {
        let mut q = q.with_seed(seed);
        q.set_bitwidth(4.0);
        q.set_scale(1.0).unwrap();
        q
    }

    /// First seed whose first drawn context dithers by a nonzero multiple
    fn dithering_seed() -> (u64, f32) {
        (0..256)
            .map(|seed| {
                let ctx = NoiseContext::draw(&mut StdRng::seed_from_u64(seed));
                (seed, ctx.multiple())
            })
            .find(|&(_, m)| m != 0.0)
            .unwrap()
    }

    fn assert_dithered_values(mut q: Quantizer, m: f32, offset: f32, alpha_eff: f32) {
        let step = alpha_eff / 15.0;
        let x = Tensor::from_vec(TRAIN_INPUTS.to_vec(), true);
        let y = q.quantize(&x, &[TRAIN_INPUTS.len()], true).unwrap();

        for (xi, yi) in TRAIN_INPUTS.iter().zip(y.data().iter()) {
            let unit = ((xi + offset + m * step) / alpha_eff).clamp(0.0, 1.0);
            assert_abs_diff_eq!(*yi, unit * alpha_eff - offset, epsilon = 1e-5);
        }
        // Both ends clip
        assert_abs_diff_eq!(y.data()[0], -offset, epsilon = 1e-5);
        assert_abs_diff_eq!(y.data()[5], alpha_eff - offset, epsilon = 1e-5);
    }

    #[test]
    fn test_stochastic_values_symmetric() {
        let (seed, m) = dithering_seed();
        let q = searching(Quantizer::symmetric(), seed);
        let alpha = q.scale_value();
        assert_dithered_values(q, m, alpha, alpha * (2.0 - 2f32.powf(1.0 - 4.0)));
    }

    #[test]
    fn test_stochastic_values_asymmetric() {
        let (seed, m) = dithering_seed();
        let q = searching(Quantizer::asymmetric(ActivationTag::HardSwish), seed);
        let alpha = q.scale_value();
        assert_dithered_values(q, m, ActivationTag::HardSwish.offset(), alpha);
    }

    #[test]
    fn test_stochastic_bitwidth_gradient_follows_step_surrogate() {
        let (seed, m) = dithering_seed();
        let mut q = searching(Quantizer::asymmetric(ActivationTag::HardSwish), seed);
        let alpha = q.scale_value();
        let offset = ActivationTag::HardSwish.offset();
        let x = Tensor::from_vec(TRAIN_INPUTS.to_vec(), false);
        let mut loss = sum(&q.quantize(&x, &[TRAIN_INPUTS.len()], true).unwrap());
        backward(&mut loss, None);

        // Unclipped elements pass a unit gradient back to the rounding node
        let step = alpha / 15.0;
        let unclipped = TRAIN_INPUTS
            .iter()
            .filter(|&&xi| (0.0..=1.0).contains(&((xi + offset + m * step) / alpha)))
            .count() as f32;
        let grad_step = m * unclipped;

        // step = alpha / (2^b - 1), b = 2 + 6.5 * sigmoid(logit)
        let s = 1.0 / (1.0 + (-q.bitwidth_logit().item()).exp());
        let dstep_dbits = -alpha * 16.0 * std::f32::consts::LN_2 / (15.0 * 15.0);
        let expected = grad_step * dstep_dbits * 6.5 * s * (1.0 - s);

        let got = q.bitwidth_logit().grad().unwrap()[0];
        assert!(got != 0.0);
        assert_abs_diff_eq!(got, expected, epsilon = 1e-4);
    }

    #[test]
    fn test_clone_reseeds_dither() {
        let mut original = Quantizer::symmetric().with_seed(9);
        let mut copy = original.clone();
        assert_eq!(copy.bitwidth_logit().item(), original.bitwidth_logit().item());
        assert_eq!(copy.range(), original.range());
        assert_ne!(
            NoiseContext::draw(&mut copy.rng),
            NoiseContext::draw(&mut original.rng)
        );

        let mut reseeded = Quantizer::symmetric().clone().with_seed(9);
        let mut fresh = Quantizer::symmetric().with_seed(9);
        assert_eq!(
            NoiseContext::draw(&mut reseeded.rng),
            NoiseContext::draw(&mut fresh.rng)
        );
    }

    #[test]
    fn test_frozen_bitwidth_receives_no_gradient() {
        let mut q = Quantizer::symmetric().with_seed(5);
        q.freeze_bitwidth();
        let x = Tensor::from_vec(vec![-0.4, 0.1, 0.3, 5.0], true);
        let mut loss = sum(&q.quantize(&x, &[4], true).unwrap());
        backward(&mut loss, None);

        assert!(q.bitwidth_logit().grad().is_none());
        let scale_grad = q.scale_logit().grad().unwrap()[0];
        assert!(scale_grad.is_finite() && scale_grad != 0.0);
    }

    #[test]
    fn test_frozen_bitwidth_is_rounded() {
        let mut q = Quantizer::symmetric();
        q.set_bitwidth(5.4);
        assert_abs_diff_eq!(q.effective_bitwidth(), 5.4, epsilon = 1e-4);
        q.freeze_bitwidth();
        assert_eq!(q.effective_bitwidth(), 5.0);
        assert_eq!(q.bitwidth().item(), 5.0);
    }

    #[test]
    fn test_set_scale_rejects_non_positive() {
        let mut q = Quantizer::symmetric();
        assert!(q.set_scale(0.0).is_err());
        assert!(q.set_scale(f32::NAN).is_err());
        q.set_scale(0.75).unwrap();
        assert_abs_diff_eq!(q.scale_value(), 0.75, epsilon = 1e-6);
        q.set_scale(40.0).unwrap();
        assert_abs_diff_eq!(q.scale_value(), 40.0, epsilon = 1e-4);
    }

    proptest! {
        #[test]
        fn prop_scale_is_positive(logit in -1e4f32..1e4) {
            let mut q = Quantizer::symmetric();
            q.trainable_params()[1].data_mut()[0] = logit;
            prop_assert!(q.scale_value() > 0.0);
        }

        #[test]
        fn prop_deterministic_quantization_is_idempotent(
            values in prop::collection::vec(-3.0f32..3.0, 1..32),
            bits in 2u32..=8,
            alpha in 0.1f32..4.0,
            symmetric in any::<bool>(),
        ) {
            let range = if symmetric {
                Range::Symmetric
            } else {
                Range::Asymmetric { tag: ActivationTag::Swish, offset: Offset::Uniform(0.2784645) }
            };
            let mut q = fixed(range, bits as f32, alpha);
            let n = values.len();
            let once = q.quantize(&Tensor::from_vec(values, false), &[n], false).unwrap();
            let twice = q.quantize(&once, &[n], false).unwrap();
            for (a, b) in once.data().iter().zip(twice.data().iter()) {
                prop_assert!((a - b).abs() <= 1e-5, "{} != {}", a, b);
            }
        }
    }
}
