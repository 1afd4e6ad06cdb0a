//! Host model collaborators
//!
//! A model only has to run forward passes over [`FeatureMap`]s and enumerate
//! its quantized and instrumentable operators; see [`QuantModel`].
//! [`Sequential`] is a minimal implementation used by tests and demos.

mod conv;
mod feature;
mod model;
mod probe;
mod sequential;

pub use conv::Conv2d;
pub(crate) use conv::{check_conv_input, check_conv_params};
pub use feature::FeatureMap;
pub use model::QuantModel;
pub use probe::{Instrumented, Probe, ShapeMetadata};
pub use sequential::{Layer, Sequential};
