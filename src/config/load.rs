//! Loading configuration from YAML

use super::schema::QuantConfig;
use super::validate::validate_config;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Load and validate a configuration file
///
/// # Example
///
/// ```no_run
/// use mixq::config::load_config;
///
/// let config = load_config("quant.yaml")?;
/// println!("target: {} GiBOPs", config.cost.target_gibops);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<QuantConfig> {
    let yaml_content = fs::read_to_string(config_path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            config_path.as_ref().display(),
            e
        ))
    })?;

    from_yaml_str(&yaml_content)
}

/// Parse and validate a configuration document
pub fn from_yaml_str(yaml: &str) -> Result<QuantConfig> {
    // serde_yaml reads an empty document as unit, not as an empty mapping
    let config: QuantConfig = if yaml.trim().is_empty() {
        QuantConfig::default()
    } else {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {}", e)))?
    };

    validate_config(&config).map_err(|e| Error::ConfigError(format!("Invalid config: {}", e)))?;

    tracing::debug!(?config, "loaded quantization config");
    Ok(config)
}
