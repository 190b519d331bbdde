//! Evaluation scope
//!
//! Read-only context handed to lifecycle calls. Inside a stateless scope
//! variables are placeholders without materialized storage, so nothing may
//! be exposed to the native runtime.

/// Evaluation context consulted when a layer is finalized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalContext {
    stateless: bool,
}

impl EvalContext {
    /// Regular evaluation: variables hold real storage
    pub fn stateful() -> Self {
        Self { stateless: false }
    }

    /// Shape-inference style evaluation: variables are placeholders
    pub fn stateless() -> Self {
        Self { stateless: true }
    }

    pub fn in_stateless_scope(&self) -> bool {
        self.stateless
    }
}
