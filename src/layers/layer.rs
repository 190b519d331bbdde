//! Layer tree
//!
//! A `Layer` owns its variables (split into trainable and non-trainable
//! buckets), its seed generators and its named attributes, some of which are
//! sub-layers or raw native modules. All of it sits behind one per-layer
//! `RwLock`; lock acquisition always runs parent before child.

use std::fmt;
use std::ptr;
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use super::attach::Attribute;
use super::exposure::{ExposureSnapshot, EXPOSURE_ATTR};
use super::scope::EvalContext;
use crate::error::{ParamError, Result};
use crate::native::NativeModule;
use crate::tensor::{DType, SeedGenerator, Tensor, Variable};

/// Mutable part of a layer, guarded by the layer's lock
#[derive(Default)]
pub(crate) struct LayerState {
    pub(crate) built: bool,
    pub(crate) trainable_variables: Vec<Arc<Variable>>,
    pub(crate) non_trainable_variables: Vec<Arc<Variable>>,
    pub(crate) seed_generators: Vec<Arc<SeedGenerator>>,
    /// Named attributes in assignment order
    pub(crate) attributes: Vec<(String, Attribute)>,
    pub(crate) exposure: Option<Arc<ExposureSnapshot>>,
}

impl LayerState {
    /// Direct sub-layers in assignment order
    pub(crate) fn sublayers(&self) -> Vec<Arc<Layer>> {
        self.attributes
            .iter()
            .filter_map(|(_, slot)| match slot {
                Attribute::Layer(layer) => Some(layer.clone()),
                _ => None,
            })
            .collect()
    }

    fn position_of(&self, variable: &Arc<Variable>) -> Option<(bool, usize)> {
        if let Some(i) = self
            .trainable_variables
            .iter()
            .position(|v| Arc::ptr_eq(v, variable))
        {
            return Some((true, i));
        }
        self.non_trainable_variables
            .iter()
            .position(|v| Arc::ptr_eq(v, variable))
            .map(|i| (false, i))
    }

    fn remove_variable(&mut self, variable: &Arc<Variable>) -> bool {
        match self.position_of(variable) {
            Some((true, i)) => {
                self.trainable_variables.remove(i);
                true
            }
            Some((false, i)) => {
                self.non_trainable_variables.remove(i);
                true
            }
            None => false,
        }
    }

    fn push_variable(&mut self, variable: &Arc<Variable>) {
        if variable.is_trainable() {
            self.trainable_variables.push(variable.clone());
        } else {
            self.non_trainable_variables.push(variable.clone());
        }
    }
}

/// A node of the layer tree
pub struct Layer {
    name: String,
    /// Set for layers that adapt a foreign native module
    wrapped: Option<Arc<dyn NativeModule>>,
    pub(crate) state: RwLock<LayerState>,
}

impl Layer {
    /// Create an empty, unbuilt layer
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            wrapped: None,
            state: RwLock::new(LayerState::default()),
        })
    }

    pub(crate) fn new_wrapper(name: String, module: Arc<dyn NativeModule>) -> Arc<Self> {
        Arc::new(Self {
            name,
            wrapped: Some(module),
            state: RwLock::new(LayerState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this layer adapts a foreign native module
    pub fn is_module_wrapper(&self) -> bool {
        self.wrapped.is_some()
    }

    /// The foreign module adapted by this layer, if any
    pub fn wrapped_module(&self) -> Option<&Arc<dyn NativeModule>> {
        self.wrapped.as_ref()
    }

    // === Authoring ===

    /// Create a variable owned by this layer and track it
    ///
    /// The variable path is `"{layer}/{name}"`. Adding a weight to a layer
    /// that is already exposed rebuilds its snapshot.
    pub fn add_weight(
        &self,
        name: &str,
        shape: &[usize],
        dtype: DType,
        trainable: bool,
        fill: f64,
    ) -> Arc<Variable> {
        let variable = Variable::new(
            name,
            format!("{}/{}", self.name, name),
            shape,
            dtype,
            trainable,
            fill,
        );
        self.track_variable(&variable);
        variable
    }

    /// Create a seed generator owned by this layer
    pub fn add_seed_generator(&self, name: &str, seed: u32) -> Arc<SeedGenerator> {
        let generator = Arc::new(SeedGenerator::new(&self.name, name, seed));
        let mut state = self.state.write();
        state.seed_generators.push(generator.clone());
        let variable = generator.state().clone();
        self.on_variable_change_locked(&mut state, &variable);
        generator
    }

    // === Lifecycle ===

    /// Complete construction of this layer's variables (build)
    ///
    /// Inside a stateless scope the variables are placeholders: the layer
    /// stays unbuilt and nothing is exposed. Otherwise the layer is marked
    /// built and its subtree is exposed.
    pub fn finalize(&self, ctx: &EvalContext) {
        if ctx.in_stateless_scope() {
            debug!(
                "Layer '{}' finalized inside a stateless scope, exposure deferred",
                self.name
            );
            return;
        }
        let mut state = self.state.write();
        state.built = true;
        self.ensure_exposed_locked(&mut state);
    }

    /// Mark the layer built without running the exposure hook
    ///
    /// The snapshot is then created lazily by the first enumeration.
    pub fn mark_built(&self) {
        self.state.write().built = true;
    }

    pub fn is_built(&self) -> bool {
        self.state.read().built
    }

    // === Tracking ===

    /// Track a variable on this layer
    ///
    /// The variable lands at the end of the bucket matching its trainable
    /// flag. Tracking a variable twice is a no-op.
    pub fn track_variable(&self, variable: &Arc<Variable>) {
        let mut state = self.state.write();
        if state.position_of(variable).is_some() {
            return;
        }
        state.push_variable(variable);
        debug!("Layer '{}' tracked '{}'", self.name, variable.path());
        self.on_variable_change_locked(&mut state, variable);
    }

    /// Stop tracking a variable
    ///
    /// # Errors
    /// Returns `VariableNotTracked` if this layer doesn't own the variable
    pub fn untrack_variable(&self, variable: &Arc<Variable>) -> Result<()> {
        let mut state = self.state.write();
        if !state.remove_variable(variable) {
            return Err(ParamError::VariableNotTracked {
                layer: self.name.clone(),
                path: variable.path().to_string(),
            });
        }
        debug!("Layer '{}' untracked '{}'", self.name, variable.path());
        self.on_variable_change_locked(&mut state, variable);
        Ok(())
    }

    /// Move a variable to the bucket matching its current trainable flag
    ///
    /// Flipping `Variable::set_trainable` alone never moves a variable; this
    /// does, keeping its identity and firing the change hook.
    ///
    /// # Errors
    /// Returns `VariableNotTracked` if this layer doesn't own the variable
    pub fn repartition_variable(&self, variable: &Arc<Variable>) -> Result<()> {
        let mut state = self.state.write();
        match state.position_of(variable) {
            None => Err(ParamError::VariableNotTracked {
                layer: self.name.clone(),
                path: variable.path().to_string(),
            }),
            Some((in_trainable, _)) if in_trainable == variable.is_trainable() => Ok(()),
            Some(_) => {
                state.remove_variable(variable);
                state.push_variable(variable);
                self.on_variable_change_locked(&mut state, variable);
                Ok(())
            }
        }
    }

    // === Accessors ===

    pub fn trainable_variables(&self) -> Vec<Arc<Variable>> {
        self.state.read().trainable_variables.clone()
    }

    pub fn non_trainable_variables(&self) -> Vec<Arc<Variable>> {
        self.state.read().non_trainable_variables.clone()
    }

    /// Trainable then non-trainable variables
    pub fn variables(&self) -> Vec<Arc<Variable>> {
        let state = self.state.read();
        state
            .trainable_variables
            .iter()
            .chain(state.non_trainable_variables.iter())
            .cloned()
            .collect()
    }

    pub fn seed_generators(&self) -> Vec<Arc<SeedGenerator>> {
        self.state.read().seed_generators.clone()
    }

    /// Direct sub-layers in assignment order
    pub fn layers(&self) -> Vec<Arc<Layer>> {
        self.state.read().sublayers()
    }

    /// Whether `target` is a strict descendant of this layer
    pub(crate) fn contains_layer(&self, target: &Layer) -> bool {
        self.layers()
            .iter()
            .any(|child| ptr::eq(child.as_ref(), target) || child.contains_layer(target))
    }
}

impl NativeModule for Layer {
    fn module_type(&self) -> &str {
        if self.is_module_wrapper() {
            "ModuleWrapper"
        } else {
            "Layer"
        }
    }

    fn local_parameters(&self) -> Vec<(String, Tensor)> {
        Vec::new()
    }

    /// Attributes holding layers or modules, then the exposure snapshot
    fn named_children(&self) -> Vec<(String, Arc<dyn NativeModule>)> {
        let state = self.state.read_recursive();
        let mut children: Vec<(String, Arc<dyn NativeModule>)> = state
            .attributes
            .iter()
            .filter_map(|(name, slot)| match slot {
                Attribute::Layer(layer) => Some((name.clone(), layer.clone() as Arc<dyn NativeModule>)),
                Attribute::Module(module) => Some((name.clone(), module.clone())),
                Attribute::Value(_) => None,
            })
            .collect();
        if let Some(snapshot) = &state.exposure {
            children.push((
                EXPOSURE_ATTR.to_string(),
                snapshot.clone() as Arc<dyn NativeModule>,
            ));
        }
        children
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read_recursive();
        f.debug_struct("Layer")
            .field("name", &self.name)
            .field("built", &state.built)
            .field("trainable_variables", &state.trainable_variables.len())
            .field("non_trainable_variables", &state.non_trainable_variables.len())
            .field("seed_generators", &state.seed_generators.len())
            .field("attributes", &state.attributes.len())
            .field("exposed", &state.exposure.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_weight_buckets() {
        let layer = Layer::new("dense");
        let kernel = layer.add_weight("kernel", &[2, 3], DType::Float32, true, 0.0);
        let count = layer.add_weight("count", &[], DType::Int64, false, 0.0);

        assert_eq!(kernel.path(), "dense/kernel");
        assert_eq!(layer.trainable_variables().len(), 1);
        assert_eq!(layer.non_trainable_variables().len(), 1);
        assert!(Arc::ptr_eq(&layer.variables()[1], &count));
    }

    #[test]
    fn test_track_twice_is_noop() {
        let layer = Layer::new("dense");
        let v = layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);
        layer.track_variable(&v);
        assert_eq!(layer.variables().len(), 1);
    }

    #[test]
    fn test_untrack_unknown_variable() {
        let layer = Layer::new("dense");
        let stranger = Variable::new("w", "other/w", &[1], DType::Float32, true, 0.0);
        let err = layer.untrack_variable(&stranger).unwrap_err();
        assert_eq!(err.error_code(), "VARIABLE_NOT_TRACKED");
    }

    #[test]
    fn test_repartition_moves_variable_keeping_identity() {
        let layer = Layer::new("dense");
        let a = layer.add_weight("a", &[1], DType::Float32, true, 0.0);
        let b = layer.add_weight("b", &[1], DType::Float32, true, 0.0);

        a.set_trainable(false);
        assert_eq!(layer.trainable_variables().len(), 2);

        layer.repartition_variable(&a).unwrap();
        assert_eq!(layer.trainable_variables().len(), 1);
        assert!(Arc::ptr_eq(&layer.trainable_variables()[0], &b));
        assert!(Arc::ptr_eq(&layer.non_trainable_variables()[0], &a));
    }

    #[test]
    fn test_stateless_finalize_leaves_layer_unbuilt() {
        let layer = Layer::new("dense");
        layer.add_weight("kernel", &[2], DType::Float32, true, 0.0);

        layer.finalize(&EvalContext::stateless());
        assert!(!layer.is_built());

        layer.finalize(&EvalContext::stateful());
        assert!(layer.is_built());
    }
}
