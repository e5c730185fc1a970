//! Loads a [`Flow`] description from disk. JSON and YAML are both
//! accepted since `Flow`/`Job`/`Value` already round-trip through serde
//! (`Value`'s own `Serialize`/`Deserialize` impls go through the wire
//! encoding jobflow-core defines); the extension picks the parser.

use std::path::Path;

use anyhow::{bail, Context, Result};
use jobflow_core::Flow;

pub fn load_flow(path: &Path) -> Result<Flow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading flow file '{}'", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yml") | Some("yaml") => {
            serde_yaml::from_str(&content).with_context(|| format!("parsing '{}' as YAML", path.display()))
        }
        Some("json") => {
            serde_json::from_str(&content).with_context(|| format!("parsing '{}' as JSON", path.display()))
        }
        _ => bail!("flow file '{}' must have a .json, .yml, or .yaml extension", path.display()),
    }
}
