//! Schema validation for `UserConfig`
//!
//! Runs on every load and save. All violations are collected and joined so
//! the user sees the full picture in one pass, not one error per save.

use brain_core::config::{MemoriesMode, UserConfig, CONFIG_VERSION};
use thiserror::Error;

use crate::safety::{validate_code_path, validate_memories_path};

/// One or more schema violations, semicolon-joined
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Validation error: {0}")]
pub struct SchemaError(pub String);

/// Validate a config against the fixed 2.0.0 schema and the path-safety
/// invariants.
pub fn validate_config(config: &UserConfig) -> Result<(), SchemaError> {
    let mut all_errors = Vec::new();

    if config.version != CONFIG_VERSION {
        all_errors.push(format!(
            "version must be \"{}\", found \"{}\"",
            CONFIG_VERSION, config.version
        ));
    }

    if let Err(e) = validate_memories_path(&config.defaults.memories_location) {
        all_errors.push(format!("defaults.memories_location: {e}"));
    }

    for (name, entry) in &config.projects {
        if name.trim().is_empty() {
            all_errors.push("project name must not be empty".to_string());
        }
        if let Err(e) = validate_code_path(&entry.code_path) {
            all_errors.push(format!("projects.{name}.code_path: {e}"));
        }
        if let Some(memories_path) = &entry.memories_path {
            if let Err(e) = validate_memories_path(memories_path) {
                all_errors.push(format!("projects.{name}.memories_path: {e}"));
            }
        }
        // The defaults fallback applies here too, or a project silently
        // inheriting CUSTOM would pass validation and then fail to project.
        if entry.effective_mode(&config.defaults) == MemoriesMode::Custom
            && entry.memories_path.is_none()
        {
            all_errors.push(format!(
                "projects.{name}: memories_mode CUSTOM requires memories_path"
            ));
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError(all_errors.join("; ")))
    }
}
