//! Native parameter enumeration
//!
//! The flattened `(name, handle)` view the native runtime asks for, plus the
//! save/load and fingerprint helpers built on top of it.

use log::debug;
use parking_lot::{RwLockUpgradableReadGuard, RwLockWriteGuard};
use sha2::{Digest, Sha256};

use super::exposure::EXPOSURE_ATTR;
use super::layer::Layer;
use crate::error::{ParamError, Result};
use crate::native::{self, qualify, LoadReport, NativeModule, StateDict};
use crate::tensor::Tensor;

impl Layer {
    /// Flattened, prefix-qualified parameters of this layer's tree
    ///
    /// A built layer without a snapshot is exposed on the spot. The layer's
    /// lock is held in read mode until the list is fully materialized.
    ///
    /// With `recurse = false` only this layer's own snapshot is listed.
    /// With `remove_duplicate = true` every handle appears once, under the
    /// first path that reaches it.
    ///
    /// # Errors
    /// Returns `NotBuilt` if the layer has no snapshot and was never built
    pub fn named_parameters(
        &self,
        prefix: &str,
        recurse: bool,
        remove_duplicate: bool,
    ) -> Result<Vec<(String, Tensor)>> {
        let state = self.state.upgradable_read();
        let state = if state.exposure.is_some() {
            RwLockUpgradableReadGuard::downgrade(state)
        } else if state.built {
            debug!("Layer '{}' exposed lazily on enumeration", self.name());
            let mut state = RwLockUpgradableReadGuard::upgrade(state);
            self.ensure_exposed_locked(&mut state);
            RwLockWriteGuard::downgrade(state)
        } else {
            return Err(ParamError::NotBuilt {
                layer: self.name().to_string(),
            });
        };

        let params = if recurse {
            native::named_parameters(self, prefix, true, remove_duplicate)
        } else {
            let mut local = self.local_parameters();
            if let Some(snapshot) = &state.exposure {
                local.extend(native::named_parameters(
                    snapshot.as_ref(),
                    &qualify(prefix, EXPOSURE_ATTR),
                    false,
                    remove_duplicate,
                ));
            }
            local
        };
        drop(state);
        Ok(params)
    }

    /// `named_parameters("", true, true)`
    pub fn all_named_parameters(&self) -> Result<Vec<(String, Tensor)>> {
        self.named_parameters("", true, true)
    }

    /// Unique handles of this layer's tree, in enumeration order
    pub fn parameters(&self) -> Result<Vec<Tensor>> {
        Ok(self
            .all_named_parameters()?
            .into_iter()
            .map(|(_, tensor)| tensor)
            .collect())
    }

    /// Current values of every parameter, one entry per reachable path
    pub fn state_dict(&self) -> Result<StateDict> {
        let params = self.named_parameters("", true, false)?;
        Ok(StateDict::from_named(&params))
    }

    /// Copy saved values into this tree's handles in place
    ///
    /// # Errors
    /// - `NotBuilt` if the layer cannot be enumerated
    /// - `StateDictMismatch` when `strict` and keys differ
    /// - `ShapeMismatch` when a saved value doesn't fit
    pub fn load_state_dict(&self, state_dict: &StateDict, strict: bool) -> Result<LoadReport> {
        let params = self.named_parameters("", true, false)?;
        let report = state_dict.load_into(&params, strict)?;
        debug!(
            "Layer '{}' loaded {} parameters",
            self.name(),
            report.loaded.len()
        );
        Ok(report)
    }

    /// SHA-256 over the ordered `name:dtype:shape` lines of the enumeration
    pub fn exposure_fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        for (name, tensor) in self.all_named_parameters()? {
            let data = tensor.read();
            hasher.update(format!("{}:{}:{}\n", name, data.dtype, data.shape_string()).as_bytes());
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Find the enumerated name of a variable's handle
pub fn find_parameter_name(layer: &Layer, handle: &Tensor) -> Result<Option<String>> {
    Ok(layer
        .all_named_parameters()?
        .into_iter()
        .find(|(_, t)| t.ptr_eq(handle))
        .map(|(name, _)| name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::EvalContext;
    use crate::tensor::DType;
    use pretty_assertions::assert_eq;

    fn names(params: &[(String, Tensor)]) -> Vec<&str> {
        params.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn test_not_built_errors() {
        let layer = Layer::new("dense");
        layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);

        let err = layer.all_named_parameters().unwrap_err();
        assert_eq!(err.error_code(), "NOT_BUILT");
    }

    #[test]
    fn test_lazy_exposure_on_enumeration() {
        let layer = Layer::new("dense");
        layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);
        layer.mark_built();
        assert!(!layer.is_exposed());

        let params = layer.all_named_parameters().unwrap();
        assert!(layer.is_exposed());
        assert_eq!(names(&params), vec!["native_params.0"]);
    }

    #[test]
    fn test_prefix_and_no_recurse() {
        let parent = Layer::new("parent");
        parent.add_weight("scale", &[1], DType::Float32, true, 1.0);
        let child = Layer::new("child");
        child.add_weight("w", &[1], DType::Float32, true, 0.0);
        parent
            .set_attr("child", crate::layers::Attribute::Layer(child))
            .unwrap();
        parent.finalize(&EvalContext::stateful());

        let all = parent.named_parameters("model", true, true).unwrap();
        assert_eq!(
            names(&all),
            vec!["model.child.native_params.0", "model.native_params.0"]
        );

        let local = parent.named_parameters("model", false, true).unwrap();
        assert_eq!(names(&local), vec!["model.native_params.0"]);
    }

    #[test]
    fn test_fingerprint_is_stable_and_tracks_changes() {
        let layer = Layer::new("dense");
        layer.add_weight("kernel", &[2, 2], DType::Float32, true, 0.0);
        layer.finalize(&EvalContext::stateful());

        let first = layer.exposure_fingerprint().unwrap();
        assert_eq!(first, layer.exposure_fingerprint().unwrap());
        assert_eq!(first.len(), 64);

        layer.add_weight("bias", &[2], DType::Float32, true, 0.0);
        assert_ne!(first, layer.exposure_fingerprint().unwrap());
    }

    #[test]
    fn test_find_parameter_name() {
        let layer = Layer::new("dense");
        let kernel = layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);
        let bias = layer.add_weight("bias", &[2], DType::Float32, true, 0.0);
        layer.finalize(&EvalContext::stateful());

        assert_eq!(
            find_parameter_name(&layer, bias.value()).unwrap().as_deref(),
            Some("native_params.1")
        );
        assert_eq!(
            find_parameter_name(&layer, kernel.value()).unwrap().as_deref(),
            Some("native_params.0")
        );
    }
}
