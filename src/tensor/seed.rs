//! Seed generators
//!
//! Generator state lives in a non-trainable variable so it is exposed and
//! saved like any other variable.

use std::sync::Arc;

use super::tensor::DType;
use super::variable::Variable;

/// Stateful seed generator backed by a `[seed, counter]` state variable
#[derive(Debug)]
pub struct SeedGenerator {
    name: String,
    state: Arc<Variable>,
}

impl SeedGenerator {
    /// Create a generator whose state path lives under `owner_path`
    pub fn new(owner_path: &str, name: impl Into<String>, seed: u32) -> Self {
        let name = name.into();
        let state = Variable::new(
            "seed_generator_state",
            format!("{}/{}/seed_generator_state", owner_path, name),
            &[2],
            DType::UInt32,
            false,
            0.0,
        );
        state.value().write().values[0] = seed as f64;
        Self { name, state }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The state variable exposed alongside the layer's own variables
    pub fn state(&self) -> &Arc<Variable> {
        &self.state
    }

    /// Derive the next seed and advance the counter in place
    pub fn next_seed(&self) -> [u32; 2] {
        let mut data = self.state.value().write();
        let seed = data.values[0] as u32;
        let counter = data.values[1] as u32;
        data.values[1] = counter.wrapping_add(1) as f64;
        [seed, counter]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sg = SeedGenerator::new("dropout", "seed_generator", 42);
        assert_eq!(sg.state().value().values(), vec![42.0, 0.0]);
        assert!(!sg.state().is_trainable());
        assert_eq!(
            sg.state().path(),
            "dropout/seed_generator/seed_generator_state"
        );
    }

    #[test]
    fn test_next_seed_advances_shared_state() {
        let sg = SeedGenerator::new("dropout", "seed_generator", 7);
        let handle = sg.state().value().clone();

        assert_eq!(sg.next_seed(), [7, 0]);
        assert_eq!(sg.next_seed(), [7, 1]);
        assert_eq!(handle.values(), vec![7.0, 2.0]);
    }
}
