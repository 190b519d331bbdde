//! Tracked variables
//!
//! A `Variable` pairs a stable hierarchical path with a native tensor handle.
//! The handle is the same object the exposure snapshot presents to the
//! native traversal; no copy is ever made.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::tensor::{DType, Tensor};

/// A named, typed storage cell owned by a layer
pub struct Variable {
    name: String,
    path: String,
    value: Tensor,
    trainable: AtomicBool,
}

impl Variable {
    /// Create a variable with freshly allocated storage
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        shape: &[usize],
        dtype: DType,
        trainable: bool,
        fill: f64,
    ) -> Arc<Self> {
        Self::from_tensor(
            name,
            path,
            Tensor::filled(shape, dtype, fill, trainable),
            trainable,
        )
    }

    /// Create a variable around an existing handle (shared, not copied)
    pub fn from_tensor(
        name: impl Into<String>,
        path: impl Into<String>,
        value: Tensor,
        trainable: bool,
    ) -> Arc<Self> {
        value.set_requires_grad(trainable);
        Arc::new(Self {
            name: name.into(),
            path: path.into(),
            value,
            trainable: AtomicBool::new(trainable),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The native handle backing this variable
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn is_trainable(&self) -> bool {
        self.trainable.load(Ordering::Acquire)
    }

    /// Flip the trainable flag
    ///
    /// This does not move the variable between its layer's buckets; use
    /// `Layer::repartition_variable` for that.
    pub fn set_trainable(&self, trainable: bool) {
        self.trainable.store(trainable, Ordering::Release);
        self.value.set_requires_grad(trainable);
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("path", &self.path)
            .field("trainable", &self.is_trainable())
            .field("value", &self.value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_trainable_updates_handle() {
        let v = Variable::new("kernel", "dense/kernel", &[2, 2], DType::Float32, true, 0.0);
        assert!(v.value().requires_grad());

        v.set_trainable(false);
        assert!(!v.is_trainable());
        assert!(!v.value().requires_grad());
    }

    #[test]
    fn test_from_tensor_shares_handle() {
        let t = Tensor::filled(&[3], DType::Float32, 1.0, true);
        let v = Variable::from_tensor("bias", "dense/bias", t.clone(), true);
        t.fill(5.0);
        assert!(v.value().ptr_eq(&t));
        assert_eq!(v.value().values(), vec![5.0; 3]);
    }
}
