//! Attribute attachment
//!
//! Every attribute assignment goes through `Layer::set_attr`. A foreign
//! native module assigned to a regular layer is wrapped in a module-wrapper
//! layer so it takes part in variable tracking; layers, wrappers and plain
//! values pass through unchanged.

use std::fmt;
use std::ptr;
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use super::exposure::EXPOSURE_ATTR;
use super::layer::Layer;
use crate::error::{ParamError, Result};
use crate::native::{self, NativeModule};
use crate::tensor::Variable;

/// Attribute name of the module held by a wrapper
pub const WRAPPED_MODULE_ATTR: &str = "module";

/// Value assigned to a layer attribute
#[derive(Clone)]
pub enum Attribute {
    /// A layer (module wrappers included)
    Layer(Arc<Layer>),
    /// A native module that is not a layer
    Module(Arc<dyn NativeModule>),
    /// Anything the native runtime doesn't walk
    Value(Value),
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Layer(layer) => f.debug_tuple("Layer").field(&layer.name()).finish(),
            Attribute::Module(module) => f
                .debug_tuple("Module")
                .field(&module.module_type())
                .finish(),
            Attribute::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

/// Decide whether an assigned value gets wrapped
///
/// Only a native module that is not a layer is wrapped, and never under the
/// snapshot attribute name or inside a module wrapper (the wrapper's own
/// `module` attribute must stay raw). `set_attr` refuses the snapshot name
/// before asking; the clause holds for other callers of this decision.
pub fn should_wrap(owner_is_wrapper: bool, name: &str, attribute: &Attribute) -> bool {
    matches!(attribute, Attribute::Module(_)) && name != EXPOSURE_ATTR && !owner_is_wrapper
}

impl Layer {
    /// Wrap a foreign native module into a built layer
    ///
    /// Every parameter of the module is tracked as a variable sharing the
    /// module's tensor handle, trainable when the handle requires grad. The
    /// layer is marked built without being exposed; the first enumeration
    /// exposes it.
    pub fn wrap_module(module: Arc<dyn NativeModule>) -> Arc<Layer> {
        let name = format!("{}_wrapper", module.module_type().to_lowercase());
        let layer = Layer::new_wrapper(name, module.clone());

        for (param_name, tensor) in native::named_parameters(module.as_ref(), "", true, true) {
            let trainable = tensor.requires_grad();
            let path = format!("{}/{}", layer.name(), param_name);
            let variable = Variable::from_tensor(param_name, path, tensor, trainable);
            layer.track_variable(&variable);
        }

        let mut state = layer.state.write();
        state
            .attributes
            .push((WRAPPED_MODULE_ATTR.to_string(), Attribute::Module(module)));
        state.built = true;
        drop(state);

        debug!(
            "Wrapped native module as '{}' with {} variables",
            layer.name(),
            layer.variables().len()
        );
        layer
    }

    /// Assign an attribute, wrapping foreign modules as needed
    ///
    /// Re-assigning an existing name replaces it in place. A layer attached
    /// to an exposed parent is exposed right away if it is built.
    ///
    /// # Errors
    /// - `ReservedAttribute` for the snapshot attribute name
    /// - `CyclicAttachment` if the layer is this layer or one of its ancestors
    pub fn set_attr(&self, name: &str, attribute: Attribute) -> Result<()> {
        if name == EXPOSURE_ATTR {
            return Err(ParamError::ReservedAttribute {
                name: name.to_string(),
            });
        }

        let slot = if should_wrap(self.is_module_wrapper(), name, &attribute) {
            match attribute {
                Attribute::Module(module) => Attribute::Layer(Layer::wrap_module(module)),
                other => other,
            }
        } else {
            attribute
        };

        if let Attribute::Layer(child) = &slot {
            if ptr::eq(child.as_ref(), self) || child.contains_layer(self) {
                return Err(ParamError::CyclicAttachment {
                    parent: self.name().to_string(),
                    child: child.name().to_string(),
                });
            }
        }

        let mut state = self.state.write();
        if let Attribute::Layer(child) = &slot {
            if state.exposure.is_some() && child.is_built() {
                child.ensure_exposed();
            }
        }
        match state.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = slot,
            None => state.attributes.push((name.to_string(), slot)),
        }
        Ok(())
    }

    /// Read an attribute
    pub fn get_attr(&self, name: &str) -> Option<Attribute> {
        self.state
            .read()
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, slot)| slot.clone())
    }

    /// Remove an attribute, returning its value
    pub fn remove_attr(&self, name: &str) -> Option<Attribute> {
        let mut state = self.state.write();
        let index = state.attributes.iter().position(|(n, _)| n == name)?;
        Some(state.attributes.remove(index).1)
    }

    /// Attribute names in assignment order
    pub fn attr_names(&self) -> Vec<String> {
        self.state
            .read()
            .attributes
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }
}
