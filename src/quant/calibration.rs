//! Activation calibration
//!
//! One gradient-free forward pass over a sample batch records every
//! instrumented operator's extents and, for quantized operators fed by a
//! known nonlinearity, the per-channel minimum of their input. Those minima
//! are then fitted by channel groups, each group snapping to the nearest
//! whole multiple of the quantizer's base offset.

use crate::autograd::{Context, NoGradGuard};
use crate::config::{CalibrationConfig, OffsetSearch};
use crate::error::{Error, Result};
use crate::nn::{FeatureMap, Probe, QuantModel};
use std::fmt;
use std::str::FromStr;

/// Result of fitting channel minima with a fixed number of groups
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFit {
    /// Number of channel groups
    pub groups: usize,
    /// Mean absolute distance between channel minima and their group target
    pub error: f32,
    /// Group target of each channel, a whole multiple of the offset unit
    pub targets: Vec<f32>,
}

/// Multiple `i` of `unit` closest to `target`
///
/// Candidates run `0..=search.max_multiple`; ties keep the smaller multiple.
///
/// # Errors
///
/// [`Error::CalibrationFailed`] when no candidate comes strictly within
/// `search.error_bound` of `target`.
pub fn optimal_multiple(target: f32, unit: f32, search: &OffsetSearch) -> Result<usize> {
    let mut best: Option<(usize, f32)> = None;
    for i in 0..=search.max_multiple {
        let err = (target - unit * i as f32).abs();
        let bound = best.map_or(search.error_bound, |(_, e)| e);
        if err < bound {
            best = Some((i, err));
        }
    }
    best.map(|(i, _)| i)
        .ok_or(Error::CalibrationFailed { target, unit })
}

/// Fit `minima` with `groups` equal-size channel groups
///
/// The remainder of an uneven split goes to the last group. Each group's
/// target is the multiple of `unit` closest to the group's smallest minimum.
///
/// # Errors
///
/// Propagates [`optimal_multiple`] failures.
pub fn fit_groups(
    minima: &[f32],
    unit: f32,
    groups: usize,
    search: &OffsetSearch,
) -> Result<GroupFit> {
    let len = minima.len();
    let per_group = len / groups.max(1);
    let mut targets = vec![0.0; len];

    for g in 0..groups {
        let start = g * per_group;
        let end = if g + 1 == groups { len } else { start + per_group };
        let group = &minima[start..end];
        let lowest = group.iter().copied().fold(f32::INFINITY, f32::min);
        let target = unit * optimal_multiple(lowest, unit, search)? as f32;
        targets[start..end].fill(target);
    }

    let error = minima
        .iter()
        .zip(&targets)
        .map(|(m, t)| (m - t).abs())
        .sum::<f32>()
        / len.max(1) as f32;

    Ok(GroupFit {
        groups,
        error,
        targets,
    })
}

/// Group count with the smallest fit error
///
/// Tries `1..=search.max_groups`, skipping counts above the channel count;
/// ties keep the smaller count.
///
/// # Errors
///
/// [`Error::CalibrationFailed`] when no count fits strictly within
/// `search.error_bound`, or when a group has no acceptable multiple.
pub fn search_groups(minima: &[f32], unit: f32, search: &OffsetSearch) -> Result<GroupFit> {
    let mut best: Option<GroupFit> = None;
    for groups in 1..=search.max_groups.min(minima.len()) {
        let fit = fit_groups(minima, unit, groups, search)?;
        let bound = best.as_ref().map_or(search.error_bound, |b| b.error);
        if fit.error < bound {
            best = Some(fit);
        }
    }
    best.ok_or_else(|| Error::CalibrationFailed {
        target: minima.iter().copied().fold(f32::INFINITY, f32::min),
        unit,
    })
}

/// Run the calibration pass on `sample`
///
/// Probes are attached to every instrumented operator for one evaluation-mode
/// forward pass with gradient tracking off, and removed before this returns,
/// whether or not the pass succeeded. Afterwards every observed operator
/// carries shape metadata, and asymmetric quantized operators whose input has
/// other than `search.exempt_channels` channels carry per-channel offsets.
pub fn calibrate<M: QuantModel + ?Sized>(
    model: &mut M,
    sample: &FeatureMap,
    config: &CalibrationConfig,
) -> Result<()> {
    let layout = config.layout;
    let search = &config.search;

    for op in model.instrumented_ops_mut() {
        let probe = Probe::new(layout);
        let probe = if op.wants_channel_minima() {
            probe.with_channel_minima()
        } else {
            probe
        };
        op.attach_probe(probe);
    }

    let outcome = {
        let _guard = NoGradGuard::new();
        model.forward(sample, &Context::evaluation())
    };
    let probes: Vec<Option<Probe>> = model
        .instrumented_ops_mut()
        .into_iter()
        .map(|op| op.detach_probe())
        .collect();
    outcome?;

    let mut calibrated = 0usize;
    for (op, probe) in model.instrumented_ops_mut().into_iter().zip(probes) {
        let name = op.name().to_string();
        let Some(shape) = probe.as_ref().and_then(Probe::shape) else {
            tracing::warn!(layer = %name, "no activation observed; layer skipped");
            continue;
        };
        op.set_shape(shape);

        let Some(minima) = probe.as_ref().and_then(Probe::channel_minima) else {
            continue;
        };
        let Some(qop) = op.as_quantized_mut() else {
            continue;
        };
        if minima.len() == search.exempt_channels {
            tracing::debug!(layer = %name, channels = minima.len(), "input offsets left as-is");
            continue;
        }

        let unit = -qop.act_quant().base_offset();
        let fit = search_groups(minima, unit, search)?;
        tracing::debug!(
            layer = %name,
            groups = fit.groups,
            error = fit.error,
            "calibrated activation offsets"
        );
        let offsets = fit.targets.iter().map(|t| -t).collect();
        qop.act_quant_mut().set_channel_offsets(offsets, layout)?;
        calibrated += 1;
    }

    tracing::info!(calibrated, "activation calibration finished");
    Ok(())
}

/// Phase selected by [`initialize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMode {
    /// Calibrate offsets and extents, then seed weight scales
    First,
    /// Freeze every bitwidth for fixed-precision fine-tuning
    Finetune,
}

impl FromStr for InitMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "first" => Ok(InitMode::First),
            "finetune" => Ok(InitMode::Finetune),
            other => Err(Error::ConfigError(format!(
                "unknown initialization mode `{other}` (expected `first` or `finetune`)"
            ))),
        }
    }
}

impl fmt::Display for InitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitMode::First => "first",
            InitMode::Finetune => "finetune",
        })
    }
}

/// Prepare a model's quantizers for a training phase
///
/// # Errors
///
/// [`Error::MissingSampleInput`] in [`InitMode::First`] without a sample, and
/// any error raised by [`calibrate`].
pub fn initialize<M: QuantModel + ?Sized>(
    model: &mut M,
    mode: InitMode,
    sample: Option<&FeatureMap>,
    config: &CalibrationConfig,
) -> Result<()> {
    tracing::info!(%mode, "initializing quantizers");
    match mode {
        InitMode::First => {
            let sample = sample.ok_or(Error::MissingSampleInput)?;
            calibrate(model, sample, config)?;
            for op in model.quantized_ops_mut() {
                let peak = op
                    .weight()
                    .data()
                    .iter()
                    .fold(0.0f32, |m, v| m.max(v.abs()));
                if peak > 0.0 && peak.is_finite() {
                    op.weight_quant_mut().set_scale(peak)?;
                } else {
                    tracing::warn!(peak, "weight scale left at its initial value");
                }
            }
        }
        InitMode::Finetune => {
            for op in model.quantized_ops_mut() {
                op.act_quant_mut().freeze_bitwidth();
                op.weight_quant_mut().freeze_bitwidth();
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{Conv2dSpec, Layout, Tensor};
    use crate::nn::{Conv2d, Instrumented, Sequential};
    use crate::quant::{ActivationTag, Offset, Precision, QuantizedOp};
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    const UNIT: f32 = -0.3125;

    fn search() -> OffsetSearch {
        OffsetSearch::default()
    }

    #[test]
    fn test_optimal_multiple_picks_nearest() {
        assert_eq!(optimal_multiple(-0.6, UNIT, &search()).unwrap(), 2);
        assert_eq!(optimal_multiple(0.0, UNIT, &search()).unwrap(), 0);
        assert_eq!(optimal_multiple(-10.0, UNIT, &search()).unwrap(), 4);
    }

    #[test]
    fn test_zero_unit_keeps_first_multiple() {
        assert_eq!(optimal_multiple(-3.0, 0.0, &search()).unwrap(), 0);
    }

    #[test]
    fn test_optimal_multiple_fails_out_of_bound() {
        let result = optimal_multiple(-500.0, UNIT, &search());
        assert!(matches!(result, Err(Error::CalibrationFailed { .. })));
        assert!(optimal_multiple(f32::NAN, UNIT, &search()).is_err());
    }

    #[test]
    fn test_uneven_split_folds_remainder_into_last_group() {
        let minima = [-0.3, -0.3, -0.9, -0.9, -0.95];
        let fit = fit_groups(&minima, UNIT, 2, &search()).unwrap();
        // Groups: [0, 1] and [2, 3, 4]
        assert_abs_diff_eq!(fit.targets[1], UNIT);
        assert_abs_diff_eq!(fit.targets[2], 3.0 * UNIT);
        assert_abs_diff_eq!(fit.targets[4], 3.0 * UNIT);
    }

    #[test]
    fn test_search_prefers_smaller_group_on_tie() {
        // Every count fits exactly
        let minima = [UNIT; 4];
        let fit = search_groups(&minima, UNIT, &search()).unwrap();
        assert_eq!(fit.groups, 1);
        assert_eq!(fit.error, 0.0);
    }

    #[test]
    fn test_search_splits_distinct_populations() {
        let minima = [-0.31, -0.32, -1.24, -1.26];
        let fit = search_groups(&minima, UNIT, &search()).unwrap();
        assert_eq!(fit.groups, 2);
        assert_abs_diff_eq!(fit.targets[0], UNIT);
        assert_abs_diff_eq!(fit.targets[3], 4.0 * UNIT);
    }

    #[test]
    fn test_search_skips_counts_above_channel_count() {
        let fit = search_groups(&[-0.5, -0.6], UNIT, &search()).unwrap();
        assert!(fit.groups <= 2);
    }

    #[test]
    fn test_init_mode_parsing() {
        assert_eq!("first".parse::<InitMode>().unwrap(), InitMode::First);
        assert_eq!("finetune".parse::<InitMode>().unwrap(), InitMode::Finetune);
        assert!(matches!("warmup".parse::<InitMode>(), Err(Error::ConfigError(_))));
    }

    fn two_layer_model() -> Sequential {
        // Raw 3-channel input into a plain stem, then a quantized conv fed by hard-swish
        let stem = Conv2d::new(
            "stem",
            Conv2dSpec::new(3, 4, 1),
            Tensor::from_vec((0..12).map(|i| (i % 5) as f32 * 0.5 - 1.0).collect(), true),
            None,
        )
        .unwrap();
        let body = QuantizedOp::conv2d(
            "body",
            Conv2dSpec::new(4, 2, 3).with_same_padding(),
            Tensor::from_vec(vec![0.1; 72], true),
            None,
            Some(ActivationTag::HardSwish),
        )
        .unwrap();
        Sequential::new()
            .conv2d(stem)
            .activation(ActivationTag::HardSwish)
            .quantized(body)
    }

    fn sample() -> FeatureMap {
        let data = (0..3 * 16).map(|i| ((i * 37 % 11) as f32 - 5.0) * 0.4).collect();
        FeatureMap::from_vec(data, vec![1, 3, 4, 4]).unwrap()
    }

    #[test]
    fn test_calibration_records_shapes_and_offsets() {
        let mut model = two_layer_model();
        calibrate(&mut model, &sample(), &CalibrationConfig::default()).unwrap();

        for op in model.instrumented_ops_mut() {
            assert!(op.shape().is_some());
            assert!(!op.is_probed());
        }

        let ops = model.quantized_ops();
        let body = ops[0];
        assert_eq!(body.require_shape().unwrap().out_height, 4);
        match body.act_quant().offset() {
            Some(Offset::PerChannel { values, layout }) => {
                assert_eq!(values.len(), 4);
                assert_eq!(*layout, Layout::ChannelsFirst);
                for v in values {
                    let multiple = v / 0.3125;
                    assert_abs_diff_eq!(multiple, multiple.round(), epsilon = 1e-5);
                    assert!((0.0..=4.0).contains(&multiple.round()));
                }
            }
            other => panic!("expected per-channel offsets, got {other:?}"),
        }
    }

    #[test]
    fn test_three_channel_input_is_exempt() {
        let op = QuantizedOp::conv2d(
            "first",
            Conv2dSpec::new(3, 1, 1),
            Tensor::ones(3, true),
            None,
            Some(ActivationTag::Relu),
        )
        .unwrap();
        let mut model = Sequential::new().quantized(op);
        calibrate(&mut model, &sample(), &CalibrationConfig::default()).unwrap();

        let ops = model.quantized_ops();
        assert_eq!(ops[0].act_quant().offset(), Some(&Offset::Uniform(0.0)));
        assert!(ops[0].require_shape().is_ok());
    }

    #[test]
    fn test_probes_removed_when_forward_fails() {
        let mut model = two_layer_model();
        let wrong = FeatureMap::from_vec(vec![0.0; 32], vec![1, 2, 4, 4]).unwrap();
        assert!(calibrate(&mut model, &wrong, &CalibrationConfig::default()).is_err());
        for op in model.instrumented_ops_mut() {
            assert!(!op.is_probed());
            assert!(op.shape().is_none());
        }
    }

    #[test]
    fn test_first_requires_sample() {
        let mut model = two_layer_model();
        let result = initialize(&mut model, InitMode::First, None, &CalibrationConfig::default());
        assert!(matches!(result, Err(Error::MissingSampleInput)));
    }

    #[test]
    fn test_first_seeds_weight_scale_from_peak() {
        let mut model = two_layer_model();
        let sample = sample();
        initialize(&mut model, InitMode::First, Some(&sample), &CalibrationConfig::default())
            .unwrap();
        let ops = model.quantized_ops();
        assert_abs_diff_eq!(ops[0].weight_quant().scale_value(), 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_finetune_freezes_every_bitwidth() {
        let mut model = two_layer_model();
        initialize(&mut model, InitMode::Finetune, None, &CalibrationConfig::default()).unwrap();
        for op in model.quantized_ops() {
            assert_eq!(op.act_quant().precision(), Precision::Fixed);
            assert_eq!(op.weight_quant().precision(), Precision::Fixed);
        }
    }

    proptest! {
        #[test]
        fn prop_search_selects_minimum_error(
            minima in prop::collection::vec(-1.5f32..0.0, 1..12),
        ) {
            let best = search_groups(&minima, UNIT, &search()).unwrap();
            for g in 1..=4usize.min(minima.len()) {
                let fit = fit_groups(&minima, UNIT, g, &search()).unwrap();
                prop_assert!(best.error <= fit.error);
                if g < best.groups {
                    prop_assert!(fit.error > best.error);
                }
            }
        }
    }
}
