//! Error handling for parambridge
//!
//! Every error carries enough context to tell the caller which layer or
//! parameter was involved, plus recovery suggestions.

use thiserror::Error;

/// Result type alias for parambridge operations
pub type Result<T> = std::result::Result<T, ParamError>;

/// Main error type for parambridge operations
#[derive(Error, Debug)]
pub enum ParamError {
    // Lifecycle Errors
    #[error(
        "Native parameters of layer '{layer}' are not exposed yet and the layer is not built. \
         Did you forget to call finalize() (build) first?"
    )]
    NotBuilt { layer: String },

    // Tracking Errors
    #[error("Variable '{path}' is not tracked by layer '{layer}'")]
    VariableNotTracked { layer: String, path: String },

    // Attribute Errors
    #[error("Attribute name '{name}' is reserved for the exposure snapshot")]
    ReservedAttribute { name: String },

    #[error("Attaching layer '{child}' to '{parent}' would create a cycle")]
    CyclicAttachment { parent: String, child: String },

    // State Dict Errors
    #[error("Shape mismatch for '{name}': expected {expected}, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("State dict mismatch: missing keys {missing:?}, unexpected keys {unexpected:?}")]
    StateDictMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    // Configuration Errors
    #[error("Invalid blueprint: {reason}")]
    InvalidBlueprint { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ParamError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ParamError::NotBuilt { .. } => "NOT_BUILT",
            ParamError::VariableNotTracked { .. } => "VARIABLE_NOT_TRACKED",
            ParamError::ReservedAttribute { .. } => "RESERVED_ATTRIBUTE",
            ParamError::CyclicAttachment { .. } => "CYCLIC_ATTACHMENT",
            ParamError::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            ParamError::StateDictMismatch { .. } => "STATE_DICT_MISMATCH",
            ParamError::InvalidBlueprint { .. } => "INVALID_BLUEPRINT",
            ParamError::Io(_) => "IO_ERROR",
            ParamError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ParamError::Io(_) | ParamError::Serialization(_))
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ParamError::NotBuilt { .. } => vec![
                "Call finalize() on the layer with a stateful evaluation context",
                "Layers finalized inside a stateless scope stay unbuilt",
            ],
            ParamError::VariableNotTracked { .. } => vec![
                "Check that the variable was created or tracked by this layer",
                "Variables are matched by identity, not by path",
            ],
            ParamError::ReservedAttribute { .. } => vec![
                "Pick a different attribute name",
                "The exposure snapshot is managed by the layer itself",
            ],
            ParamError::CyclicAttachment { .. } => {
                vec!["A layer cannot contain one of its own ancestors"]
            }
            ParamError::ShapeMismatch { .. } => vec![
                "The saved state was produced by a differently configured layer",
                "Rebuild the layer with matching shapes before loading",
            ],
            ParamError::StateDictMismatch { .. } => vec![
                "Load with strict = false to skip unknown keys",
                "Compare the saved names against named_parameters()",
            ],
            _ => vec![],
        }
    }
}
