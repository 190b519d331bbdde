//! State dict surface
//!
//! The host runtime saves and restores state by walking the parameter
//! interface: names come from the traversal, values are copied in place into
//! the shared handles so every holder (variables included) sees the load.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{ParamError, Result};
use crate::tensor::{Tensor, TensorData};

/// One saved parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEntry {
    pub name: String,
    pub tensor: TensorData,
}

/// Ordered snapshot of parameter values keyed by qualified name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDict {
    pub entries: Vec<StateEntry>,
}

/// Outcome of a non-strict load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Parameters that were overwritten
    pub loaded: Vec<String>,
    /// Parameters with no saved value
    pub missing_keys: Vec<String>,
    /// Saved values with no matching parameter
    pub unexpected_keys: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.missing_keys.is_empty() && self.unexpected_keys.is_empty()
    }
}

/// State dict plus export metadata, as written to disk by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub created_at: DateTime<Utc>,
    pub fingerprint: String,
    pub state: StateDict,
}

impl StateDict {
    /// Copy the current values of enumerated parameters
    pub fn from_named(params: &[(String, Tensor)]) -> Self {
        Self {
            entries: params
                .iter()
                .map(|(name, tensor)| StateEntry {
                    name: name.clone(),
                    tensor: tensor.to_data(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TensorData> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.tensor)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Write saved values into the enumerated handles
    ///
    /// Everything is validated before the first copy, so a failed load leaves
    /// all parameters untouched.
    ///
    /// # Errors
    /// - `StateDictMismatch` when `strict` and keys differ
    /// - `ShapeMismatch` when a saved value doesn't fit its parameter
    pub fn load_into(&self, params: &[(String, Tensor)], strict: bool) -> Result<LoadReport> {
        let saved: HashMap<&str, &TensorData> = self
            .entries
            .iter()
            .map(|e| (e.name.as_str(), &e.tensor))
            .collect();
        let known: HashSet<&str> = params.iter().map(|(n, _)| n.as_str()).collect();

        let mut report = LoadReport::default();
        for (name, _) in params {
            if !saved.contains_key(name.as_str()) {
                report.missing_keys.push(name.clone());
            }
        }
        for entry in &self.entries {
            if !known.contains(entry.name.as_str()) {
                report.unexpected_keys.push(entry.name.clone());
            }
        }

        if strict && !report.is_clean() {
            return Err(ParamError::StateDictMismatch {
                missing: report.missing_keys,
                unexpected: report.unexpected_keys,
            });
        }

        for (name, tensor) in params {
            if let Some(data) = saved.get(name.as_str()) {
                let current = tensor.read();
                if current.shape != data.shape || current.dtype != data.dtype {
                    return Err(ParamError::ShapeMismatch {
                        name: name.clone(),
                        expected: format!("{}{}", current.dtype, current.shape_string()),
                        actual: format!("{}{}", data.dtype, data.shape_string()),
                    });
                }
                if !data.is_consistent() {
                    return Err(ParamError::ShapeMismatch {
                        name: name.clone(),
                        expected: format!("{} elements", data.numel()),
                        actual: format!("{} elements", data.values.len()),
                    });
                }
            }
        }

        for (name, tensor) in params {
            if let Some(data) = saved.get(name.as_str()) {
                tensor.copy_from(name, data)?;
                report.loaded.push(name.clone());
            }
        }

        if !report.is_clean() {
            warn!(
                "State dict loaded with {} missing and {} unexpected keys",
                report.missing_keys.len(),
                report.unexpected_keys.len()
            );
        }
        Ok(report)
    }
}
