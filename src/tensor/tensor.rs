//! Native tensor handle
//!
//! A `Tensor` is a reference-counted handle to lock-protected storage.
//! Cloning the handle never copies the data: every clone observes the same
//! values, which is how variables and exposure snapshots share storage.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::error::{ParamError, Result};

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float32,
    Int64,
    UInt32,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Int64 => "int64",
            DType::UInt32 => "uint32",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owned tensor contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub values: Vec<f64>,
}

impl TensorData {
    /// Create tensor data filled with a constant
    pub fn filled(shape: &[usize], dtype: DType, fill: f64) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            dtype,
            values: vec![fill; len],
        }
    }

    /// Create tensor data from explicit values
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the value count doesn't match the shape
    pub fn from_values(shape: &[usize], dtype: DType, values: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(ParamError::ShapeMismatch {
                name: "<values>".to_string(),
                expected: format!("{} elements", expected),
                actual: format!("{} elements", values.len()),
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            dtype,
            values,
        })
    }

    /// Number of elements the shape calls for
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the value count matches the shape
    pub fn is_consistent(&self) -> bool {
        self.values.len() == self.numel()
    }

    /// Shape formatted like `[2, 3]`
    pub fn shape_string(&self) -> String {
        format!("{:?}", self.shape)
    }
}

/// Identity of a tensor handle (address of the shared allocation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(usize);

struct TensorInner {
    data: RwLock<TensorData>,
    requires_grad: AtomicBool,
}

/// Shared native tensor handle
#[derive(Clone)]
pub struct Tensor {
    inner: Arc<TensorInner>,
}

impl Tensor {
    /// Wrap tensor data in a new handle
    pub fn new(data: TensorData, requires_grad: bool) -> Self {
        Self {
            inner: Arc::new(TensorInner {
                data: RwLock::new(data),
                requires_grad: AtomicBool::new(requires_grad),
            }),
        }
    }

    /// Create a handle filled with a constant
    pub fn filled(shape: &[usize], dtype: DType, fill: f64, requires_grad: bool) -> Self {
        Self::new(TensorData::filled(shape, dtype, fill), requires_grad)
    }

    /// Identity of this handle
    pub fn id(&self) -> TensorId {
        TensorId(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    /// Check whether two handles point to the same storage
    pub fn ptr_eq(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad.load(Ordering::Acquire)
    }

    pub fn set_requires_grad(&self, requires_grad: bool) {
        self.inner.requires_grad.store(requires_grad, Ordering::Release);
    }

    pub fn dtype(&self) -> DType {
        self.inner.data.read().dtype
    }

    /// Copy of the current values
    pub fn values(&self) -> Vec<f64> {
        self.inner.data.read().values.clone()
    }

    /// Copy of the full contents
    pub fn to_data(&self) -> TensorData {
        self.inner.data.read().clone()
    }

    /// Borrow the contents for reading
    pub fn read(&self) -> RwLockReadGuard<'_, TensorData> {
        self.inner.data.read()
    }

    /// Borrow the contents for in-place mutation
    pub fn write(&self) -> RwLockWriteGuard<'_, TensorData> {
        self.inner.data.write()
    }

    /// Set every element to `value`
    pub fn fill(&self, value: f64) {
        self.inner.data.write().values.iter_mut().for_each(|v| *v = value);
    }

    /// Overwrite the contents in place, keeping the handle identity
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if shape, dtype or value count differ
    pub fn copy_from(&self, name: &str, source: &TensorData) -> Result<()> {
        let mut data = self.inner.data.write();
        if data.shape != source.shape || data.dtype != source.dtype || !source.is_consistent() {
            return Err(ParamError::ShapeMismatch {
                name: name.to_string(),
                expected: format!("{}{}", data.dtype, data.shape_string()),
                actual: format!("{}{}", source.dtype, source.shape_string()),
            });
        }
        data.values.copy_from_slice(&source.values);
        Ok(())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.inner.data.read();
        f.debug_struct("Tensor")
            .field("id", &self.id())
            .field("shape", &data.shape)
            .field("dtype", &data.dtype)
            .field("requires_grad", &self.requires_grad())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_storage() {
        let a = Tensor::filled(&[2, 2], DType::Float32, 0.0, true);
        let b = a.clone();
        b.fill(3.0);

        assert!(a.ptr_eq(&b));
        assert_eq!(a.id(), b.id());
        assert_eq!(a.values(), vec![3.0; 4]);
    }

    #[test]
    fn test_distinct_handles_have_distinct_ids() {
        let a = Tensor::filled(&[1], DType::Float32, 0.0, true);
        let b = Tensor::filled(&[1], DType::Float32, 0.0, true);
        assert!(!a.ptr_eq(&b));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_copy_from_rejects_shape_mismatch() {
        let t = Tensor::filled(&[2], DType::Float32, 0.0, true);
        let err = t
            .copy_from("w", &TensorData::filled(&[3], DType::Float32, 1.0))
            .unwrap_err();
        assert_eq!(err.error_code(), "SHAPE_MISMATCH");
        assert_eq!(t.values(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_copy_from_rejects_short_values() {
        let t = Tensor::filled(&[2], DType::Float32, 0.0, true);
        let short = TensorData {
            shape: vec![2],
            dtype: DType::Float32,
            values: vec![1.0],
        };
        assert!(!short.is_consistent());

        let err = t.copy_from("w", &short).unwrap_err();
        assert_eq!(err.error_code(), "SHAPE_MISMATCH");
        assert_eq!(t.values(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_from_values_checks_length() {
        assert!(TensorData::from_values(&[2, 2], DType::Float32, vec![1.0; 4]).is_ok());
        assert!(TensorData::from_values(&[2, 2], DType::Float32, vec![1.0; 3]).is_err());
    }
}
