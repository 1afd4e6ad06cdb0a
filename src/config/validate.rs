//! Configuration validation

use super::schema::QuantConfig;

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid group count bound: {0} (must be > 0)")]
    InvalidMaxGroups(usize),

    #[error("Invalid offset error bound: {0} (must be > 0.0)")]
    InvalidErrorBound(f32),

    #[error("Invalid cost target: {0} (must be >= 0.0)")]
    InvalidCostTarget(f32),

    #[error("Invalid cost weight: {0} (must be >= 0.0)")]
    InvalidLambda(f32),

    #[error("Invalid initial logit `{name}`: {value} (must be finite)")]
    NonFiniteLogit { name: &'static str, value: f32 },
}

/// Validate a quantization configuration
pub fn validate_config(config: &QuantConfig) -> Result<(), ValidationError> {
    let search = &config.calibration.search;
    if search.max_groups == 0 {
        return Err(ValidationError::InvalidMaxGroups(search.max_groups));
    }
    if !(search.error_bound > 0.0) {
        return Err(ValidationError::InvalidErrorBound(search.error_bound));
    }

    let cost = &config.cost;
    if !(cost.target_gibops >= 0.0) {
        return Err(ValidationError::InvalidCostTarget(cost.target_gibops));
    }
    if !(cost.lambda >= 0.0) {
        return Err(ValidationError::InvalidLambda(cost.lambda));
    }

    let init = &config.quantizer;
    for (name, value) in [
        ("bitwidth_logit", init.bitwidth_logit),
        ("symmetric_scale_logit", init.symmetric_scale_logit),
        ("asymmetric_scale_logit", init.asymmetric_scale_logit),
    ] {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteLogit { name, value });
        }
    }

    Ok(())
}
