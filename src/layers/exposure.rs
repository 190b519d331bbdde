//! Parameter exposure
//!
//! Each layer presents its own variables to the native runtime through an
//! `ExposureSnapshot`: trainable variables, then non-trainable variables,
//! then seed generator states, each bucket in insertion order. The snapshot
//! holds the variables' own tensor handles and is never patched. Any change
//! to the tracked set throws it away and derives a new one.

use std::sync::Arc;

use log::debug;

use super::layer::{Layer, LayerState};
use crate::native::NativeModule;
use crate::tensor::{Tensor, Variable};

/// Attribute name under which a layer's snapshot is registered
pub const EXPOSURE_ATTR: &str = "native_params";

/// Ordered handles a layer presents to the native runtime
#[derive(Debug)]
pub struct ExposureSnapshot {
    handles: Vec<Tensor>,
}

impl ExposureSnapshot {
    fn collect(state: &LayerState) -> Self {
        let handles = state
            .trainable_variables
            .iter()
            .chain(state.non_trainable_variables.iter())
            .map(|v| v.value().clone())
            .chain(
                state
                    .seed_generators
                    .iter()
                    .map(|sg| sg.state().value().clone()),
            )
            .collect();
        Self { handles }
    }

    pub fn handles(&self) -> &[Tensor] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl NativeModule for ExposureSnapshot {
    fn module_type(&self) -> &str {
        "ParameterList"
    }

    fn local_parameters(&self) -> Vec<(String, Tensor)> {
        self.handles
            .iter()
            .enumerate()
            .map(|(i, t)| (i.to_string(), t.clone()))
            .collect()
    }

    fn named_children(&self) -> Vec<(String, Arc<dyn NativeModule>)> {
        Vec::new()
    }
}

impl Layer {
    /// Expose this layer and every descendant
    ///
    /// Children are handled first. A layer that already has a snapshot keeps
    /// it untouched.
    pub fn ensure_exposed(&self) {
        let mut state = self.state.write();
        self.ensure_exposed_locked(&mut state);
    }

    pub(crate) fn ensure_exposed_locked(&self, state: &mut LayerState) {
        for child in state.sublayers() {
            child.ensure_exposed();
        }
        if state.exposure.is_some() {
            return;
        }
        let snapshot = ExposureSnapshot::collect(state);
        debug!(
            "Layer '{}' exposed {} native parameters",
            self.name(),
            snapshot.len()
        );
        state.exposure = Some(Arc::new(snapshot));
    }

    /// Drop the snapshot of this layer and every descendant
    ///
    /// Safe to call when nothing is exposed.
    pub fn invalidate_exposure(&self) {
        let mut state = self.state.write();
        self.invalidate_exposure_locked(&mut state);
    }

    fn invalidate_exposure_locked(&self, state: &mut LayerState) {
        for child in state.sublayers() {
            child.invalidate_exposure();
        }
        if state.exposure.take().is_some() {
            debug!("Layer '{}' exposure invalidated", self.name());
        }
    }

    /// Rebuild after a track/untrack event, if this layer is exposed
    ///
    /// The caller holds the layer's write lock across the whole
    /// invalidate + ensure pair.
    pub(crate) fn on_variable_change_locked(&self, state: &mut LayerState, variable: &Variable) {
        if state.exposure.is_none() {
            return;
        }
        debug!(
            "Layer '{}' rebuilding exposure after change to '{}'",
            self.name(),
            variable.path()
        );
        self.invalidate_exposure_locked(state);
        self.ensure_exposed_locked(state);
    }

    pub fn is_exposed(&self) -> bool {
        self.state.read().exposure.is_some()
    }

    /// The current snapshot, if any
    pub fn exposure(&self) -> Option<Arc<ExposureSnapshot>> {
        self.state.read().exposure.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::EvalContext;
    use crate::tensor::DType;

    #[test]
    fn test_snapshot_order_by_bucket() {
        let layer = Layer::new("bn");
        let sg = layer.add_seed_generator("seed", 1);
        let c = layer.add_weight("c", &[1], DType::Float32, false, 0.0);
        let a = layer.add_weight("a", &[1], DType::Float32, true, 0.0);
        let b = layer.add_weight("b", &[1], DType::Float32, true, 0.0);

        layer.ensure_exposed();
        let snapshot = layer.exposure().unwrap();
        let expected = [a.value(), b.value(), c.value(), sg.state().value()];

        assert_eq!(snapshot.len(), 4);
        for (got, want) in snapshot.handles().iter().zip(expected) {
            assert!(got.ptr_eq(want));
        }
    }

    #[test]
    fn test_ensure_exposed_is_idempotent() {
        let layer = Layer::new("dense");
        layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);

        layer.ensure_exposed();
        let first = layer.exposure().unwrap();
        layer.ensure_exposed();
        let second = layer.exposure().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalidate_is_noop_without_snapshot() {
        let layer = Layer::new("dense");
        layer.invalidate_exposure();
        layer.invalidate_exposure();
        assert!(!layer.is_exposed());
    }

    #[test]
    fn test_invalidate_recurses_into_children() {
        let parent = Layer::new("parent");
        let child = Layer::new("child");
        child.add_weight("w", &[1], DType::Float32, true, 0.0);
        parent
            .set_attr("child", crate::layers::Attribute::Layer(child.clone()))
            .unwrap();

        parent.finalize(&EvalContext::stateful());
        assert!(child.is_exposed());

        parent.invalidate_exposure();
        assert!(!parent.is_exposed());
        assert!(!child.is_exposed());
    }

    #[test]
    fn test_track_rebuilds_snapshot() {
        let layer = Layer::new("dense");
        let kernel = layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);
        let counter = layer.add_weight("counter", &[1], DType::Int64, false, 0.0);
        layer.finalize(&EvalContext::stateful());
        let before = layer.exposure().unwrap();

        let lora = layer.add_weight("lora_a", &[2], DType::Float32, true, 0.0);
        let after = layer.exposure().unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.len(), 3);
        assert!(after.handles()[0].ptr_eq(kernel.value()));
        assert!(after.handles()[1].ptr_eq(lora.value()));
        assert!(after.handles()[2].ptr_eq(counter.value()));
    }

    #[test]
    fn test_untrack_rebuilds_snapshot() {
        let layer = Layer::new("dense");
        let kernel = layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);
        let bias = layer.add_weight("bias", &[2], DType::Float32, true, 0.0);
        layer.finalize(&EvalContext::stateful());

        layer.untrack_variable(&kernel).unwrap();
        let snapshot = layer.exposure().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.handles()[0].ptr_eq(bias.value()));
    }

    #[test]
    fn test_change_before_exposure_does_not_expose() {
        let layer = Layer::new("dense");
        layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);
        assert!(!layer.is_exposed());
    }
}
