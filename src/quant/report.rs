//! Bitwidth report

use super::bops::{model_bops, GIBI};
use super::LinearKind;
use crate::error::{Error, Result};
use crate::nn::{Instrumented, QuantModel};
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Effective bitwidths of one quantized operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerBitwidth {
    pub name: String,
    pub w_bits: f32,
    pub a_bits: f32,
}

/// Per-operator bitwidths, their weighted averages and the total cost
///
/// Weight bits are averaged over weight elements, activation bits over input
/// elements per sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitwidthReport {
    pub layers: Vec<LayerBitwidth>,
    pub avg_w_bits: f32,
    pub avg_a_bits: f32,
    pub gibops: f32,
}

impl BitwidthReport {
    /// # Errors
    ///
    /// [`Error::MissingShapeMetadata`] if a convolution has not been calibrated.
    pub fn from_model<M: QuantModel + ?Sized>(model: &M) -> Result<Self> {
        let mut layers = Vec::new();
        let (mut w_total, mut avg_w) = (0.0f64, 0.0f64);
        let (mut a_total, mut avg_a) = (0.0f64, 0.0f64);

        for op in model.quantized_ops() {
            let w_bits = op.weight_quant().effective_bitwidth();
            let a_bits = op.act_quant().effective_bitwidth();

            let w_count = op.weight().len() as f64 / GIBI;
            let a_count = match op.kind() {
                LinearKind::Conv2d(spec) => {
                    let shape = op.require_shape()?;
                    (shape.in_height * shape.in_width * spec.in_channels) as f64 / GIBI
                }
                LinearKind::Affine { in_features, .. } => *in_features as f64 / GIBI,
            };

            // Running weighted means
            w_total += w_count;
            if w_total > 0.0 {
                avg_w += w_count * (w_bits as f64 - avg_w) / w_total;
            }
            a_total += a_count;
            if a_total > 0.0 {
                avg_a += a_count * (a_bits as f64 - avg_a) / a_total;
            }

            layers.push(LayerBitwidth {
                name: op.name().to_string(),
                w_bits,
                a_bits,
            });
        }

        Ok(Self {
            layers,
            avg_w_bits: avg_w as f32,
            avg_a_bits: avg_a as f32,
            gibops: model_bops(model)?.item(),
        })
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Append the text form to `path`, creating the file if needed
    pub fn append_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        writeln!(file, "{self}")?;
        Ok(())
    }
}

impl fmt::Display for BitwidthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "layer\tw_bits\ta_bits")?;
        for layer in &self.layers {
            writeln!(f, "{}\t{}\t{}", layer.name, layer.w_bits, layer.a_bits)?;
        }
        writeln!(f, "AVG w{} a{}", self.avg_w_bits, self.avg_a_bits)?;
        write!(f, "{} GiBOPs", self.gibops)
    }
}

/// Build the report, log it, and optionally append it to `log_path`
pub fn report_bitwidths<M: QuantModel + ?Sized>(
    model: &M,
    log_path: Option<&Path>,
) -> Result<BitwidthReport> {
    let report = BitwidthReport::from_model(model)?;
    for line in report.to_string().lines() {
        tracing::info!("{line}");
    }
    if let Some(path) = log_path {
        report.append_to(path)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{Conv2dSpec, Tensor};
    use crate::nn::{Sequential, ShapeMetadata};
    use crate::quant::{ActivationTag, QuantizedOp};
    use approx::assert_abs_diff_eq;

    fn fixed_bits(mut op: QuantizedOp, w: f32, a: f32) -> QuantizedOp {
        op.weight_quant_mut().set_bitwidth(w);
        op.act_quant_mut().set_bitwidth(a);
        op.with_fixed_precision()
    }

    fn model() -> Sequential {
        let spec = Conv2dSpec::new(2, 4, 3);
        let mut conv = QuantizedOp::conv2d(
            "backbone.0",
            spec,
            Tensor::zeros(spec.weight_len(), true),
            None,
            Some(ActivationTag::Swish),
        )
        .unwrap();
        conv.set_shape(ShapeMetadata {
            in_channels: 2,
            in_height: 6,
            in_width: 6,
            out_channels: 4,
            out_height: 4,
            out_width: 4,
        });
        // 72 weights, 72 input elements
        let conv = fixed_bits(conv, 4.0, 6.0);
        // 24 weights, 8 input features
        let fc = QuantizedOp::affine("head", 8, 3, Tensor::zeros(24, true), None, None).unwrap();
        let fc = fixed_bits(fc, 8.0, 8.0);
        Sequential::new().quantized(conv).quantized(fc)
    }

    #[test]
    fn test_weighted_averages() {
        let report = BitwidthReport::from_model(&model()).unwrap();
        assert_eq!(report.layers.len(), 2);
        assert_eq!(report.layers[0].w_bits, 4.0);
        assert_eq!(report.layers[1].a_bits, 8.0);
        assert_abs_diff_eq!(report.avg_w_bits, (72.0 * 4.0 + 24.0 * 8.0) / 96.0, epsilon = 1e-5);
        assert_abs_diff_eq!(report.avg_a_bits, (72.0 * 6.0 + 8.0 * 8.0) / 80.0, epsilon = 1e-5);
        assert!(report.gibops > 0.0);
    }

    #[test]
    fn test_text_layout() {
        let text = BitwidthReport::from_model(&model()).unwrap().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "layer\tw_bits\ta_bits");
        assert_eq!(lines[1], "backbone.0\t4\t6");
        assert_eq!(lines[2], "head\t8\t8");
        assert!(lines[3].starts_with("AVG w"));
        assert!(lines[4].ends_with(" GiBOPs"));
    }

    #[test]
    fn test_append_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bits.log");
        let m = model();
        report_bitwidths(&m, Some(&path)).unwrap();
        report_bitwidths(&m, Some(&path)).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("GiBOPs").count(), 2);
    }

    #[test]
    fn test_json_export() {
        let json = BitwidthReport::from_model(&model()).unwrap().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["layers"][1]["name"], "head");
        assert!(value["gibops"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_uncalibrated_conv_fails() {
        let spec = Conv2dSpec::new(1, 1, 1);
        let op = QuantizedOp::conv2d("c", spec, Tensor::ones(1, true), None, None).unwrap();
        let m = Sequential::new().quantized(op);
        assert!(matches!(
            BitwidthReport::from_model(&m),
            Err(Error::MissingShapeMetadata(_))
        ));
    }
}
