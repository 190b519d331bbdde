//! Native module contract
//!
//! The native runtime discovers parameters by walking modules: each module
//! reports its own local parameters and its named children. This file holds
//! that contract and the traversal every enumeration goes through.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::tensor::{Tensor, TensorId};

/// Anything the native runtime can walk for parameters
pub trait NativeModule: Send + Sync {
    /// Short type name used in logs and wrapper names
    fn module_type(&self) -> &str;

    /// Parameters registered directly on this module, in registration order
    fn local_parameters(&self) -> Vec<(String, Tensor)>;

    /// Child modules in registration order
    fn named_children(&self) -> Vec<(String, Arc<dyn NativeModule>)>;
}

/// Join a prefix and a local name the way the native runtime does
pub fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn module_key(module: &dyn NativeModule) -> usize {
    module as *const _ as *const () as usize
}

struct ParameterWalk {
    recurse: bool,
    remove_duplicate: bool,
    seen_modules: HashSet<usize>,
    seen_tensors: HashSet<TensorId>,
    out: Vec<(String, Tensor)>,
}

impl ParameterWalk {
    fn visit(&mut self, module: &dyn NativeModule, prefix: &str) {
        if self.remove_duplicate && !self.seen_modules.insert(module_key(module)) {
            trace!("skipping already visited module at '{}'", prefix);
            return;
        }

        for (name, tensor) in module.local_parameters() {
            if self.remove_duplicate && !self.seen_tensors.insert(tensor.id()) {
                continue;
            }
            self.out.push((qualify(prefix, &name), tensor));
        }

        if !self.recurse {
            return;
        }
        for (name, child) in module.named_children() {
            self.visit(child.as_ref(), &qualify(prefix, &name));
        }
    }
}

/// Flatten the parameters reachable from `root`
///
/// Modules are visited pre-order (the module itself, then its children in
/// registration order). With `recurse = false` only the root's local
/// parameters are returned. With `remove_duplicate = true` a module or a
/// tensor that was already reached through another path is skipped;
/// otherwise it is reported once per path.
pub fn named_parameters(
    root: &dyn NativeModule,
    prefix: &str,
    recurse: bool,
    remove_duplicate: bool,
) -> Vec<(String, Tensor)> {
    let mut walk = ParameterWalk {
        recurse,
        remove_duplicate,
        seen_modules: HashSet::new(),
        seen_tensors: HashSet::new(),
        out: Vec::new(),
    };
    walk.visit(root, prefix);
    walk.out
}

/// A plain native module that is not a layer
///
/// Stands in for modules built directly against the native runtime, the
/// kind of child the attribute interceptor wraps.
pub struct ForeignModule {
    type_name: String,
    parameters: Vec<(String, Tensor)>,
    children: Vec<(String, Arc<dyn NativeModule>)>,
}

impl ForeignModule {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            parameters: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Register a parameter (builder style)
    pub fn with_parameter(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.parameters.push((name.into(), tensor));
        self
    }

    /// Register a child module (builder style)
    pub fn with_child(mut self, name: impl Into<String>, child: Arc<dyn NativeModule>) -> Self {
        self.children.push((name.into(), child));
        self
    }
}

impl NativeModule for ForeignModule {
    fn module_type(&self) -> &str {
        &self.type_name
    }

    fn local_parameters(&self) -> Vec<(String, Tensor)> {
        self.parameters.clone()
    }

    fn named_children(&self) -> Vec<(String, Arc<dyn NativeModule>)> {
        self.children.clone()
    }
}

impl fmt::Debug for ForeignModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignModule")
            .field("type_name", &self.type_name)
            .field("parameters", &self.parameters.len())
            .field("children", &self.children.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;
    use pretty_assertions::assert_eq;

    fn param(fill: f64) -> Tensor {
        Tensor::filled(&[2], DType::Float32, fill, true)
    }

    fn names(params: &[(String, Tensor)]) -> Vec<&str> {
        params.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[test]
    fn test_preorder_with_prefix() {
        let inner: Arc<dyn NativeModule> =
            Arc::new(ForeignModule::new("Linear").with_parameter("weight", param(1.0)));
        let outer = ForeignModule::new("Sequential")
            .with_parameter("scale", param(0.0))
            .with_child("0", inner);

        let params = named_parameters(&outer, "model", true, true);
        assert_eq!(names(&params), vec!["model.scale", "model.0.weight"]);
    }

    #[test]
    fn test_no_recurse_returns_local_only() {
        let inner: Arc<dyn NativeModule> =
            Arc::new(ForeignModule::new("Linear").with_parameter("weight", param(1.0)));
        let outer = ForeignModule::new("Sequential")
            .with_parameter("scale", param(0.0))
            .with_child("0", inner);

        let params = named_parameters(&outer, "", false, true);
        assert_eq!(names(&params), vec!["scale"]);
    }

    #[test]
    fn test_shared_module_deduplication() {
        let shared: Arc<dyn NativeModule> =
            Arc::new(ForeignModule::new("Linear").with_parameter("weight", param(1.0)));
        let outer = ForeignModule::new("Sequential")
            .with_child("a", shared.clone())
            .with_child("b", shared);

        assert_eq!(names(&named_parameters(&outer, "", true, true)), vec!["a.weight"]);
        assert_eq!(
            names(&named_parameters(&outer, "", true, false)),
            vec!["a.weight", "b.weight"]
        );
    }

    #[test]
    fn test_shared_tensor_deduplication() {
        let tied = param(1.0);
        let module = ForeignModule::new("Tied")
            .with_parameter("encoder", tied.clone())
            .with_parameter("decoder", tied);

        assert_eq!(names(&named_parameters(&module, "", true, true)), vec!["encoder"]);
        assert_eq!(named_parameters(&module, "", true, false).len(), 2);
    }
}
