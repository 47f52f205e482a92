//! Structured config diffing
//!
//! The watcher uses `detect` to decide whether a manual edit needs any
//! downstream work, and `requires_migration` to decide whether project
//! content has to move. `detailed` adds per-field granularity for
//! reporting.

use serde::Serialize;
use serde_json::Value;

use crate::config::{MemoriesMode, UserConfig};

/// Global config groups compared field-by-field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalField {
    Defaults,
    Sync,
    Logging,
    Watcher,
}

impl GlobalField {
    pub const ALL: [GlobalField; 4] = [
        GlobalField::Defaults,
        GlobalField::Sync,
        GlobalField::Logging,
        GlobalField::Watcher,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GlobalField::Defaults => "defaults",
            GlobalField::Sync => "sync",
            GlobalField::Logging => "logging",
            GlobalField::Watcher => "watcher",
        }
    }
}

/// Result of comparing two configs
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigDiff {
    pub projects_added: Vec<String>,
    pub projects_removed: Vec<String>,
    pub projects_modified: Vec<String>,
    pub global_fields_changed: Vec<GlobalField>,
    pub has_changes: bool,
    /// True when project content may have to move: projects were added or
    /// removed, a modified project changed a path field, or the default
    /// memories location changed.
    pub requires_migration: bool,
}

/// A single field-level change
#[derive(Debug, Clone, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Per-project field changes for a modified project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectFieldChanges {
    pub project: String,
    pub fields_added: Vec<String>,
    pub fields_removed: Vec<String>,
    pub fields_modified: Vec<FieldChange>,
}

/// A changed global group with old and new values
#[derive(Debug, Clone, Serialize)]
pub struct GlobalFieldChange {
    pub field: GlobalField,
    pub old_value: Value,
    pub new_value: Value,
}

/// `detect` output extended with per-field detail
#[derive(Debug, Clone, Serialize)]
pub struct DetailedConfigDiff {
    pub diff: ConfigDiff,
    pub project_changes: Vec<ProjectFieldChanges>,
    pub global_changes: Vec<GlobalFieldChange>,
}

impl ConfigDiff {
    /// Compare two configs. `old = None` means there was no baseline; every
    /// project in `new` counts as added and all global groups as changed.
    pub fn detect(old: Option<&UserConfig>, new: &UserConfig) -> ConfigDiff {
        let Some(old) = old else {
            let projects_added: Vec<String> = new.projects.keys().cloned().collect();
            return ConfigDiff {
                requires_migration: !projects_added.is_empty(),
                projects_added,
                projects_removed: Vec::new(),
                projects_modified: Vec::new(),
                global_fields_changed: GlobalField::ALL.to_vec(),
                has_changes: true,
            };
        };

        let projects_added: Vec<String> = new
            .projects
            .keys()
            .filter(|name| !old.projects.contains_key(*name))
            .cloned()
            .collect();
        let projects_removed: Vec<String> = old
            .projects
            .keys()
            .filter(|name| !new.projects.contains_key(*name))
            .cloned()
            .collect();

        let mut projects_modified = Vec::new();
        let mut modified_path_field = false;
        for (name, new_entry) in &new.projects {
            if let Some(old_entry) = old.projects.get(name) {
                let path_changed = old_entry.code_path != new_entry.code_path
                    || old_entry.memories_path != new_entry.memories_path;
                if path_changed || old_entry.memories_mode != new_entry.memories_mode {
                    projects_modified.push(name.clone());
                }
                modified_path_field |= path_changed;
            }
        }

        let mut global_fields_changed = Vec::new();
        if old.defaults != new.defaults {
            global_fields_changed.push(GlobalField::Defaults);
        }
        if old.sync != new.sync {
            global_fields_changed.push(GlobalField::Sync);
        }
        if old.logging != new.logging {
            global_fields_changed.push(GlobalField::Logging);
        }
        if old.watcher != new.watcher {
            global_fields_changed.push(GlobalField::Watcher);
        }

        let has_changes = !projects_added.is_empty()
            || !projects_removed.is_empty()
            || !projects_modified.is_empty()
            || !global_fields_changed.is_empty();

        let requires_migration = !projects_added.is_empty()
            || !projects_removed.is_empty()
            || modified_path_field
            || old.defaults.memories_location != new.defaults.memories_location;

        ConfigDiff {
            projects_added,
            projects_removed,
            projects_modified,
            global_fields_changed,
            has_changes,
            requires_migration,
        }
    }

    /// All project names touched by this diff (added, removed, or modified)
    pub fn affected_projects(&self) -> Vec<String> {
        let mut all = Vec::with_capacity(
            self.projects_added.len()
                + self.projects_removed.len()
                + self.projects_modified.len(),
        );
        all.extend(self.projects_added.iter().cloned());
        all.extend(self.projects_removed.iter().cloned());
        all.extend(self.projects_modified.iter().cloned());
        all
    }

    /// Whether a specific project was added, removed, or modified
    pub fn is_project_affected(&self, name: &str) -> bool {
        self.projects_added.iter().any(|p| p == name)
            || self.projects_removed.iter().any(|p| p == name)
            || self.projects_modified.iter().any(|p| p == name)
    }

    /// Projects resolving through DEFAULT mode when the default memories
    /// location changed: their effective store path moved even though their
    /// own entry did not.
    pub fn default_mode_affected_projects(
        &self,
        old: &UserConfig,
        new: &UserConfig,
    ) -> Vec<String> {
        if old.defaults.memories_location == new.defaults.memories_location {
            return Vec::new();
        }
        new.projects
            .iter()
            .filter(|(_, entry)| entry.effective_mode(&new.defaults) == MemoriesMode::Default)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Per-field detail for reporting. The coarse diff is embedded unchanged.
    pub fn detailed(old: &UserConfig, new: &UserConfig) -> DetailedConfigDiff {
        let diff = ConfigDiff::detect(Some(old), new);

        let mut project_changes = Vec::new();
        for name in &diff.projects_modified {
            let (Some(old_entry), Some(new_entry)) =
                (old.projects.get(name), new.projects.get(name))
            else {
                continue;
            };
            let mut fields_added = Vec::new();
            let mut fields_removed = Vec::new();
            let mut fields_modified = Vec::new();

            if old_entry.code_path != new_entry.code_path {
                fields_modified.push(FieldChange {
                    field: "code_path".to_string(),
                    old_value: Value::String(old_entry.code_path.clone()),
                    new_value: Value::String(new_entry.code_path.clone()),
                });
            }
            match (&old_entry.memories_path, &new_entry.memories_path) {
                (None, Some(_)) => fields_added.push("memories_path".to_string()),
                (Some(_), None) => fields_removed.push("memories_path".to_string()),
                (Some(old_path), Some(new_path)) if old_path != new_path => {
                    fields_modified.push(FieldChange {
                        field: "memories_path".to_string(),
                        old_value: Value::String(old_path.clone()),
                        new_value: Value::String(new_path.clone()),
                    });
                }
                _ => {}
            }
            match (old_entry.memories_mode, new_entry.memories_mode) {
                (None, Some(_)) => fields_added.push("memories_mode".to_string()),
                (Some(_), None) => fields_removed.push("memories_mode".to_string()),
                (Some(old_mode), Some(new_mode)) if old_mode != new_mode => {
                    fields_modified.push(FieldChange {
                        field: "memories_mode".to_string(),
                        old_value: Value::String(old_mode.as_str().to_string()),
                        new_value: Value::String(new_mode.as_str().to_string()),
                    });
                }
                _ => {}
            }

            project_changes.push(ProjectFieldChanges {
                project: name.clone(),
                fields_added,
                fields_removed,
                fields_modified,
            });
        }

        let mut global_changes = Vec::new();
        for field in &diff.global_fields_changed {
            let (old_value, new_value) = match field {
                GlobalField::Defaults => (
                    serde_json::to_value(&old.defaults),
                    serde_json::to_value(&new.defaults),
                ),
                GlobalField::Sync => (
                    serde_json::to_value(&old.sync),
                    serde_json::to_value(&new.sync),
                ),
                GlobalField::Logging => (
                    serde_json::to_value(&old.logging),
                    serde_json::to_value(&new.logging),
                ),
                GlobalField::Watcher => (
                    serde_json::to_value(&old.watcher),
                    serde_json::to_value(&new.watcher),
                ),
            };
            if let (Ok(old_value), Ok(new_value)) = (old_value, new_value) {
                global_changes.push(GlobalFieldChange {
                    field: *field,
                    old_value,
                    new_value,
                });
            }
        }

        DetailedConfigDiff {
            diff,
            project_changes,
            global_changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProjectEntry, UserConfig};

    fn config_with(projects: &[(&str, &str)]) -> UserConfig {
        let mut config = UserConfig::default();
        for (name, code_path) in projects {
            config
                .projects
                .insert((*name).to_string(), ProjectEntry::new(*code_path));
        }
        config
    }

    #[test]
    fn null_baseline_marks_everything_changed() {
        let new = config_with(&[("alpha", "/workspace/alpha")]);
        let diff = ConfigDiff::detect(None, &new);
        assert_eq!(diff.projects_added, vec!["alpha"]);
        assert!(diff.has_changes);
        assert!(diff.requires_migration);
        assert_eq!(diff.global_fields_changed.len(), 4);
    }

    #[test]
    fn null_baseline_without_projects_needs_no_migration() {
        let diff = ConfigDiff::detect(None, &UserConfig::default());
        assert!(diff.has_changes);
        assert!(!diff.requires_migration);
    }

    #[test]
    fn identical_configs_have_no_changes() {
        let config = config_with(&[("alpha", "/workspace/alpha")]);
        let diff = ConfigDiff::detect(Some(&config), &config.clone());
        assert!(!diff.has_changes);
        assert!(!diff.requires_migration);
    }

    #[test]
    fn added_and_removed_projects_are_set_differences() {
        let old = config_with(&[("alpha", "/workspace/alpha"), ("beta", "/workspace/beta")]);
        let new = config_with(&[("beta", "/workspace/beta"), ("gamma", "/workspace/gamma")]);
        let diff = ConfigDiff::detect(Some(&old), &new);
        assert_eq!(diff.projects_added, vec!["gamma"]);
        assert_eq!(diff.projects_removed, vec!["alpha"]);
        assert!(diff.requires_migration);
    }

    #[test]
    fn mode_change_modifies_without_migration() {
        let old = config_with(&[("alpha", "/workspace/alpha")]);
        let mut new = old.clone();
        new.projects.get_mut("alpha").unwrap().memories_mode = Some(MemoriesMode::Code);
        let diff = ConfigDiff::detect(Some(&old), &new);
        assert_eq!(diff.projects_modified, vec!["alpha"]);
        assert!(diff.has_changes);
        assert!(!diff.requires_migration);
    }

    #[test]
    fn code_path_change_requires_migration() {
        let old = config_with(&[("alpha", "/workspace/alpha")]);
        let mut new = old.clone();
        new.projects.get_mut("alpha").unwrap().code_path = "/workspace/alpha-v2".into();
        let diff = ConfigDiff::detect(Some(&old), &new);
        assert_eq!(diff.projects_modified, vec!["alpha"]);
        assert!(diff.requires_migration);
    }

    #[test]
    fn memories_location_change_requires_migration() {
        let old = UserConfig::default();
        let mut new = old.clone();
        new.defaults.memories_location = "~/archive".into();
        let diff = ConfigDiff::detect(Some(&old), &new);
        assert!(diff.has_changes);
        assert!(diff.requires_migration);
        assert_eq!(diff.global_fields_changed, vec![GlobalField::Defaults]);
    }

    #[test]
    fn sync_change_does_not_require_migration() {
        let old = UserConfig::default();
        let mut new = old.clone();
        new.sync.delay_ms = 1000;
        let diff = ConfigDiff::detect(Some(&old), &new);
        assert!(diff.has_changes);
        assert!(!diff.requires_migration);
        assert_eq!(diff.global_fields_changed, vec![GlobalField::Sync]);
    }

    #[test]
    fn affected_projects_cover_all_buckets() {
        let old = config_with(&[("alpha", "/workspace/alpha"), ("beta", "/workspace/beta")]);
        let mut new = config_with(&[("beta", "/workspace/beta"), ("gamma", "/workspace/gamma")]);
        new.projects.get_mut("beta").unwrap().code_path = "/workspace/beta2".into();
        let diff = ConfigDiff::detect(Some(&old), &new);
        let affected = diff.affected_projects();
        assert!(affected.contains(&"alpha".to_string()));
        assert!(affected.contains(&"beta".to_string()));
        assert!(affected.contains(&"gamma".to_string()));
        assert!(diff.is_project_affected("beta"));
        assert!(!diff.is_project_affected("delta"));
    }

    #[test]
    fn default_mode_projects_affected_by_location_change() {
        let old = config_with(&[("alpha", "/workspace/alpha"), ("beta", "/workspace/beta")]);
        let mut new = old.clone();
        new.defaults.memories_location = "~/elsewhere".into();
        new.projects.get_mut("beta").unwrap().memories_mode = Some(MemoriesMode::Code);
        let diff = ConfigDiff::detect(Some(&old), &new);
        let affected = diff.default_mode_affected_projects(&old, &new);
        assert_eq!(affected, vec!["alpha"]);
    }

    #[test]
    fn detailed_diff_reports_field_changes() {
        let old = config_with(&[("alpha", "/workspace/alpha")]);
        let mut new = old.clone();
        {
            let entry = new.projects.get_mut("alpha").unwrap();
            entry.code_path = "/workspace/alpha-v2".into();
            entry.memories_path = Some("/workspace/alpha-notes".into());
        }
        new.logging.level = crate::config::LogLevel::Debug;

        let detailed = ConfigDiff::detailed(&old, &new);
        assert_eq!(detailed.project_changes.len(), 1);
        let changes = &detailed.project_changes[0];
        assert_eq!(changes.fields_added, vec!["memories_path"]);
        assert_eq!(changes.fields_modified.len(), 1);
        assert_eq!(changes.fields_modified[0].field, "code_path");

        assert_eq!(detailed.global_changes.len(), 1);
        assert_eq!(detailed.global_changes[0].field, GlobalField::Logging);
    }
}
