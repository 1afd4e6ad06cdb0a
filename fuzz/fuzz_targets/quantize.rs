#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mixq::autograd::{backward, sum, Tensor};
use mixq::quant::{Quantizer, BIT_CEIL, BIT_FLOOR};

/// Fuzz target for the quantizer
///
/// Quantization must never panic, keep the input length, stay finite for
/// finite input, and report a bitwidth inside the mapped interval.

#[derive(Arbitrary, Debug)]
struct QuantizeFuzzInput {
    activation: String,
    bitwidth_logit: f32,
    scale: f32,
    values: Vec<u8>,
    training: bool,
    frozen: bool,
    seed: u64,
}

fuzz_target!(|input: QuantizeFuzzInput| {
    let name = if input.activation.is_empty() {
        None
    } else {
        Some(input.activation.as_str())
    };
    // Unknown names must be rejected, never panic
    let Ok(quantizer) = Quantizer::for_activation(name) else {
        return;
    };
    let mut q = quantizer.with_seed(input.seed);

    if input.bitwidth_logit.is_finite() {
        q.trainable_params()[0].data_mut()[0] = input.bitwidth_logit.clamp(-1e4, 1e4);
    }
    let _ = q.set_scale(input.scale);
    if input.frozen {
        q.freeze_bitwidth();
    }

    let bits = q.effective_bitwidth();
    assert!((BIT_FLOOR..=BIT_CEIL).contains(&bits));
    assert!(q.scale_value() > 0.0);

    let values: Vec<f32> = input
        .values
        .iter()
        .take(256)
        .map(|&b| (b as f32 / 255.0) * 40.0 - 20.0)
        .collect();
    if values.is_empty() {
        return;
    }
    let n = values.len();
    let x = Tensor::from_vec(values, true);

    let y = q.quantize(&x, &[n], input.training).expect("flat input never mismatches");
    assert_eq!(y.len(), n);
    if q.scale_value().is_finite() && q.scale_value() < 1e30 {
        assert!(y.data().iter().all(|v| v.is_finite()));
    }

    let mut loss = sum(&y);
    backward(&mut loss, None);
});
