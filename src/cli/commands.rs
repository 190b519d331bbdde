//! CLI Command Implementations
//!
//! Each command builds the layer tree from a blueprint, then talks to it only
//! through the native parameter interface.

use std::fs;
use std::path::Path;

use chrono::Utc;
use log::{info, warn};

use crate::blueprint::LayerBlueprint;
use crate::error::Result;
use crate::native::{LoadReport, StateFile};

/// One line of `inspect` output
pub fn format_parameter_line(name: &str, dtype: &str, shape: &[usize]) -> String {
    format!("{:<48} {:<8} {:?}", name, dtype, shape)
}

/// List the flattened parameters of a blueprint.
pub fn inspect(
    blueprint: &Path,
    prefix: &str,
    recurse: bool,
    remove_duplicate: bool,
) -> Result<Vec<String>> {
    info!("Inspecting blueprint: {}", blueprint.display());

    let layer = LayerBlueprint::load(blueprint)?.build()?;
    let lines = layer
        .named_parameters(prefix, recurse, remove_duplicate)?
        .iter()
        .map(|(name, tensor)| {
            let data = tensor.read();
            format_parameter_line(name, data.dtype.as_str(), &data.shape)
        })
        .collect();
    Ok(lines)
}

/// Compute the exposure fingerprint of a blueprint.
pub fn fingerprint(blueprint: &Path) -> Result<String> {
    info!("Fingerprinting blueprint: {}", blueprint.display());

    let layer = LayerBlueprint::load(blueprint)?.build()?;
    layer.exposure_fingerprint()
}

/// Write the state dict of a blueprint.
pub fn export(blueprint: &Path, output: &Path) -> Result<StateFile> {
    info!("Exporting state of {} to {}", blueprint.display(), output.display());

    let layer = LayerBlueprint::load(blueprint)?.build()?;
    let state_file = StateFile {
        created_at: Utc::now(),
        fingerprint: layer.exposure_fingerprint()?,
        state: layer.state_dict()?,
    };
    fs::write(output, serde_json::to_string_pretty(&state_file)?)?;
    Ok(state_file)
}

/// Load a state file into a freshly built blueprint.
pub fn load(blueprint: &Path, state: &Path, strict: bool) -> Result<LoadReport> {
    info!("Loading {} into {}", state.display(), blueprint.display());

    let layer = LayerBlueprint::load(blueprint)?.build()?;
    let state_file: StateFile = serde_json::from_str(&fs::read_to_string(state)?)?;

    if state_file.fingerprint != layer.exposure_fingerprint()? {
        warn!("State file was exported from a differently shaped layer tree");
    }
    layer.load_state_dict(&state_file.state, strict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const MODEL: &str = r#"{
        "name": "model",
        "children": [
            {"kind": "layer", "attr": "dense", "layer": {
                "name": "dense",
                "weights": [
                    {"name": "kernel", "shape": [2, 2], "fill": 0.5},
                    {"name": "steps", "shape": [1], "dtype": "int64", "trainable": false}
                ]
            }}
        ]
    }"#;

    fn write_model(dir: &Path) -> PathBuf {
        let path = dir.join("model.json");
        fs::write(&path, MODEL).unwrap();
        path
    }

    #[test]
    fn test_inspect_lists_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_model(dir.path());

        let lines = inspect(&model, "", true, true).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("dense.native_params.0"));
        assert!(lines[1].contains("int64"));
    }

    #[test]
    fn test_export_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_model(dir.path());
        let state = dir.path().join("state.json");

        let exported = export(&model, &state).unwrap();
        assert_eq!(exported.state.len(), 2);
        assert_eq!(exported.fingerprint, fingerprint(&model).unwrap());

        let report = load(&model, &state, true).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.loaded.len(), 2);
    }
}
