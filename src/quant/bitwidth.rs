//! Bit-logit mapping
//!
//! A bitwidth is stored as an unconstrained logit `L` and read back through
//! `BIT_FLOOR + sigmoid(L) * BIT_RANGE`, a saturating map into `[2.0, 8.5]`.
//! Deployable widths round half to even, so both ends land on whole bits
//! (`2.0 -> 2`, `8.5 -> 8`).

use crate::autograd::{affine, sigmoid, Tensor};

/// Smallest bitwidth the mapper can produce
pub const BIT_FLOOR: f32 = 2.0;

/// Width of the mapped interval above [`BIT_FLOOR`]
pub const BIT_RANGE: f32 = 6.5;

/// Largest bitwidth the mapper can produce
pub const BIT_CEIL: f32 = BIT_FLOOR + BIT_RANGE;

/// Differentiable bitwidth for a logit tensor
///
/// The returned tensor carries a graph back to `logit` whenever `logit`
/// requires grad and gradient tracking is enabled.
pub fn trainable_bitwidth(logit: &Tensor) -> Tensor {
    affine(&sigmoid(logit), BIT_RANGE, BIT_FLOOR)
}

/// Continuous bitwidth for a raw logit value
pub fn mapped_bitwidth(logit: f32) -> f32 {
    let s = 1.0 / (1.0 + (-logit).exp());
    BIT_FLOOR + s * BIT_RANGE
}

/// Whole-bit width used for deployment and reporting
pub fn deployable_bitwidth(logit: f32) -> u32 {
    mapped_bitwidth(logit).round_ties_even() as u32
}

/// Logit that maps to `bits`
///
/// Values at or outside the open interval `(2.0, 8.5)` saturate to a logit
/// of magnitude 20, which maps within `1e-8` of the corresponding bound.
pub fn logit_for(bits: f32) -> f32 {
    const SATURATION: f32 = 20.0;
    let p = (bits - BIT_FLOOR) / BIT_RANGE;
    if p <= 0.0 {
        -SATURATION
    } else if p >= 1.0 {
        SATURATION
    } else {
        (p / (1.0 - p)).ln().clamp(-SATURATION, SATURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_default_logit_maps_just_above_eight_bits() {
        assert_abs_diff_eq!(mapped_bitwidth(2.5), 8.006_922, epsilon = 1e-5);
        assert_eq!(deployable_bitwidth(2.5), 8);
    }

    #[test]
    fn test_extremes_round_half_to_even() {
        assert_eq!(deployable_bitwidth(-1e4), 2);
        assert_eq!(deployable_bitwidth(1e4), 8);
        assert_abs_diff_eq!(mapped_bitwidth(1e4), BIT_CEIL);
    }

    #[test]
    fn test_trainable_matches_scalar_map() {
        let logit = Tensor::scalar(-0.7, true);
        let bits = trainable_bitwidth(&logit);
        assert_abs_diff_eq!(bits.item(), mapped_bitwidth(-0.7), epsilon = 1e-6);
        assert!(bits.requires_grad());
    }

    #[test]
    fn test_logit_for_inverts_mapping() {
        for bits in [2.5, 4.0, 6.0, 8.0] {
            assert_abs_diff_eq!(mapped_bitwidth(logit_for(bits)), bits, epsilon = 1e-4);
        }
    }

    proptest! {
        #[test]
        fn prop_bitwidth_stays_in_range(logit in -1e6f32..1e6) {
            let bits = mapped_bitwidth(logit);
            prop_assert!((BIT_FLOOR..=BIT_CEIL).contains(&bits));
            prop_assert!((2..=8).contains(&deployable_bitwidth(logit)));
        }

        #[test]
        fn prop_mapping_is_monotonic(a in -30.0f32..30.0, delta in 0.01f32..10.0) {
            prop_assert!(mapped_bitwidth(a) <= mapped_bitwidth(a + delta));
        }
    }
}
