//! Declarative YAML configuration
//!
//! Every field has a default, so a partial (or empty) document is valid.
//!
//! # Example
//!
//! ```yaml
//! quantizer:
//!   bitwidth_logit: 2.5
//!   asymmetric_scale_logit: 6.0
//!
//! calibration:
//!   layout: channels_last
//!   search:
//!     max_multiple: 4
//!     max_groups: 4
//!
//! cost:
//!   target_gibops: 0.5
//!   lambda: 0.1
//! ```

mod load;
mod schema;
mod validate;


pub use load::{from_yaml_str, load_config};
pub use schema::{CalibrationConfig, CostConfig, OffsetSearch, QuantConfig, QuantizerInit};
pub use validate::{validate_config, ValidationError};
