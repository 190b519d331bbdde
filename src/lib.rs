//! Parambridge - Layer Tree / Native Parameter Synchronization
//!
//! Parambridge keeps two views of a model's state in step:
//! 1. The layer tree's own variable tracker (trainable, non-trainable and
//!    seed generator state per layer)
//! 2. The native module registry that save/load and optimizer tooling walk
//!
//! # Architecture
//!
//! - Tensors: shared handles; variables and snapshots hold the same storage
//! - Layers: per-layer exposure snapshots, rebuilt whenever tracking changes
//! - Native: the module traversal contract and state dict surface

pub mod blueprint;
pub mod cli;
pub mod error;
pub mod layers;
pub mod native;
pub mod tensor;

pub use error::{ParamError, Result};
pub use layers::{Attribute, EvalContext, ExposureSnapshot, Layer};
pub use native::{NativeModule, StateDict};
pub use tensor::{DType, SeedGenerator, Tensor, TensorData, Variable};
