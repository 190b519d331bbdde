//! Tensor Module
//!
//! Leaf collaborators of the layer tree:
//! - Native tensor handles with shared storage
//! - Variables owned by layers
//! - Seed generators whose state is exposed like a variable

pub mod seed;
#[allow(clippy::module_inception)]
pub mod tensor;
pub mod variable;

pub use seed::SeedGenerator;
pub use tensor::{DType, Tensor, TensorData, TensorId};
pub use variable::Variable;
