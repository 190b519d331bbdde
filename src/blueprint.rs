//! Layer tree blueprints
//!
//! JSON description of a layer tree used by the CLI and by tests: weights,
//! seed generators, sub-layers, shared sub-layers and foreign native modules.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ParamError, Result};
use crate::layers::{Attribute, EvalContext, Layer};
use crate::native::{ForeignModule, NativeModule};
use crate::tensor::{DType, Tensor};

fn default_true() -> bool {
    true
}

fn default_dtype() -> DType {
    DType::Float32
}

/// A variable to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightBlueprint {
    pub name: String,
    #[serde(default)]
    pub shape: Vec<usize>,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
    #[serde(default = "default_true")]
    pub trainable: bool,
    #[serde(default)]
    pub fill: f64,
}

/// A seed generator to create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedBlueprint {
    pub name: String,
    #[serde(default)]
    pub seed: u32,
}

/// A foreign native module (not a layer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleBlueprint {
    pub type_name: String,
    #[serde(default)]
    pub parameters: Vec<WeightBlueprint>,
    #[serde(default)]
    pub children: Vec<NamedModuleBlueprint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedModuleBlueprint {
    pub name: String,
    pub module: ModuleBlueprint,
}

/// An attribute holding a layer or module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChildBlueprint {
    /// A new sub-layer
    Layer { attr: String, layer: LayerBlueprint },
    /// A layer already built earlier in the same blueprint, by name
    Shared { attr: String, target: String },
    /// A foreign module, wrapped on assignment
    Module { attr: String, module: ModuleBlueprint },
}

/// One layer of the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerBlueprint {
    pub name: String,
    #[serde(default)]
    pub weights: Vec<WeightBlueprint>,
    #[serde(default)]
    pub seed_generators: Vec<SeedBlueprint>,
    #[serde(default)]
    pub children: Vec<ChildBlueprint>,
    /// Call `finalize` once the layer is assembled
    #[serde(default = "default_true")]
    pub finalize: bool,
    /// Finalize inside a stateless scope
    #[serde(default)]
    pub stateless: bool,
}

impl LayerBlueprint {
    /// Read a blueprint from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let blueprint: LayerBlueprint = serde_json::from_str(&content)?;
        Ok(blueprint)
    }

    /// Write the blueprint as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Build the layer tree
    ///
    /// Children are assembled and finalized before their parent.
    ///
    /// # Errors
    /// Returns `InvalidBlueprint` for duplicate layer names or unknown shared
    /// targets, and propagates attachment errors
    pub fn build(&self) -> Result<Arc<Layer>> {
        let mut built = HashMap::new();
        let layer = self.build_into(&mut built)?;
        info!(
            "Built layer tree '{}' with {} layers",
            layer.name(),
            built.len()
        );
        Ok(layer)
    }

    fn build_into(&self, built: &mut HashMap<String, Arc<Layer>>) -> Result<Arc<Layer>> {
        if built.contains_key(&self.name) {
            return Err(ParamError::InvalidBlueprint {
                reason: format!("duplicate layer name '{}'", self.name),
            });
        }

        let layer = Layer::new(self.name.clone());
        for weight in &self.weights {
            layer.add_weight(
                &weight.name,
                &weight.shape,
                weight.dtype,
                weight.trainable,
                weight.fill,
            );
        }
        for seed in &self.seed_generators {
            layer.add_seed_generator(&seed.name, seed.seed);
        }
        built.insert(self.name.clone(), layer.clone());

        for child in &self.children {
            match child {
                ChildBlueprint::Layer { attr, layer: child } => {
                    let sublayer = child.build_into(built)?;
                    layer.set_attr(attr, Attribute::Layer(sublayer))?;
                }
                ChildBlueprint::Shared { attr, target } => {
                    let shared = built.get(target).cloned().ok_or_else(|| {
                        ParamError::InvalidBlueprint {
                            reason: format!("shared target '{}' is not built yet", target),
                        }
                    })?;
                    layer.set_attr(attr, Attribute::Layer(shared))?;
                }
                ChildBlueprint::Module { attr, module } => {
                    layer.set_attr(attr, Attribute::Module(module.build()))?;
                }
            }
        }

        if self.finalize {
            let ctx = if self.stateless {
                EvalContext::stateless()
            } else {
                EvalContext::stateful()
            };
            layer.finalize(&ctx);
        }
        Ok(layer)
    }
}

impl ModuleBlueprint {
    pub fn build(&self) -> Arc<dyn NativeModule> {
        let mut module = ForeignModule::new(self.type_name.clone());
        for param in &self.parameters {
            module = module.with_parameter(
                param.name.clone(),
                Tensor::filled(&param.shape, param.dtype, param.fill, param.trainable),
            );
        }
        for child in &self.children {
            module = module.with_child(child.name.clone(), child.module.build());
        }
        Arc::new(module)
    }
}
