//! Layer Tree Module
//!
//! Keeps the layer tree's variable tracker and the native parameter registry
//! in sync:
//! - Layer: owned variables, seed generators, attributes
//! - Exposure: per-layer snapshots of native handles, rebuilt on change
//! - Attach: attribute assignment and foreign module wrapping
//! - Enumerate: flattened parameter view, state dict, fingerprint

mod attach;
mod enumerate;
mod exposure;
mod layer;
mod scope;

pub use attach::{should_wrap, Attribute, WRAPPED_MODULE_ATTR};
pub use enumerate::find_parameter_name;
pub use exposure::{ExposureSnapshot, EXPOSURE_ATTR};
pub use layer::Layer;
pub use scope::EvalContext;
