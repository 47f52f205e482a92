//! One-shot migration of pre-2.0 configuration files
//!
//! The legacy file lives at a well-known path and comes in two shapes that
//! may coexist: per-project objects (`projects.<name>.code_path`, Format A)
//! and a flat `code_paths` map (Format B). When a name appears in both,
//! Format A wins.
//!
//! Migration runs as an ordered, recorded pipeline; every step lands in the
//! result with a status so the caller can show exactly what happened. Steps
//! before the new config is saved abort the migration on failure; the
//! upstream sync and legacy-file removal afterwards are non-fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use brain_config::paths::restrict_file;
use brain_config::store::{ConfigStore, StoreError};
use brain_core::config::{
    LogLevel, MemoriesMode, ProjectEntry, UserConfig, CONFIG_VERSION,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::services::rollback_manager::RollbackManager;
use crate::services::upstream_sync::UpstreamSyncService;

/// Errors that abort a migration
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to load legacy config at {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Failed to back up legacy config to {path}: {message}")]
    Backup { path: PathBuf, message: String },

    #[error("Legacy config could not be transformed: {0}")]
    Transform(String),

    #[error("Migrated config failed verification: {0}")]
    Verify(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

/// A recorded pipeline step
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStep {
    pub name: &'static str,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationStep {
    fn completed(name: &'static str) -> Self {
        Self {
            name,
            status: StepStatus::Completed,
            error: None,
        }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: StepStatus::Skipped,
            error: None,
        }
    }

    fn failed(name: &'static str, error: impl ToString) -> Self {
        Self {
            name,
            status: StepStatus::Failed,
            error: Some(error.to_string()),
        }
    }
}

/// Options controlling a migration run
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationOptions {
    /// Delete the legacy file after a successful migration
    pub remove_old_config: bool,
    /// Migrate even when a new config already exists
    pub force: bool,
    /// Go through the motions without writing anything
    pub dry_run: bool,
}

/// Full record of a migration run
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub success: bool,
    pub steps: Vec<MigrationStep>,
    pub backup_path: Option<PathBuf>,
    pub config: Option<UserConfig>,
}

/// Migrates the pre-2.0 config file into the current store
pub struct LegacyMigrator {
    store: Arc<ConfigStore>,
    sync: Arc<UpstreamSyncService>,
}

impl LegacyMigrator {
    pub fn new(store: Arc<ConfigStore>, sync: Arc<UpstreamSyncService>) -> Self {
        Self { store, sync }
    }

    fn legacy_path(&self) -> &Path {
        &self.store.paths().legacy_config_path
    }

    /// True iff the legacy file exists and either `force` is set or the new
    /// config is absent.
    pub fn needs_migration(&self, force: bool) -> bool {
        self.legacy_path().exists() && (force || !self.store.exists())
    }

    /// Run the migration pipeline. Never returns `Err`; every failure is a
    /// recorded step and `success` reflects the fatal ones.
    pub async fn migrate(&self, options: MigrationOptions) -> MigrationResult {
        let mut steps = Vec::new();

        if !self.needs_migration(options.force) {
            steps.push(MigrationStep::skipped("check_migration_needed"));
            return MigrationResult {
                success: true,
                steps,
                backup_path: None,
                config: None,
            };
        }
        steps.push(MigrationStep::completed("check_migration_needed"));

        let legacy = match self.load_legacy() {
            Ok(value) => {
                steps.push(MigrationStep::completed("load_old_config"));
                value
            }
            Err(e) => {
                steps.push(MigrationStep::failed("load_old_config", &e));
                return MigrationResult {
                    success: false,
                    steps,
                    backup_path: None,
                    config: None,
                };
            }
        };

        let backup_path = if options.dry_run {
            steps.push(MigrationStep::skipped("create_backup"));
            None
        } else {
            match self.create_backup() {
                Ok(path) => {
                    steps.push(MigrationStep::completed("create_backup"));
                    Some(path)
                }
                Err(e) => {
                    steps.push(MigrationStep::failed("create_backup", &e));
                    return MigrationResult {
                        success: false,
                        steps,
                        backup_path: None,
                        config: None,
                    };
                }
            }
        };

        let config = match transform_legacy(&legacy) {
            Ok(config) => {
                steps.push(MigrationStep::completed("transform_schema"));
                config
            }
            Err(e) => {
                steps.push(MigrationStep::failed("transform_schema", &e));
                return MigrationResult {
                    success: false,
                    steps,
                    backup_path,
                    config: None,
                };
            }
        };

        if options.dry_run {
            steps.push(MigrationStep::skipped("save_new_config"));
            steps.push(MigrationStep::skipped("verify_new_config"));
            steps.push(MigrationStep::skipped("sync_basic_memory"));
            steps.push(MigrationStep::skipped("remove_old_config"));
            return MigrationResult {
                success: true,
                steps,
                backup_path,
                config: Some(config),
            };
        }

        if let Err(e) = self.store.save(&config).await {
            steps.push(MigrationStep::failed("save_new_config", &e));
            return MigrationResult {
                success: false,
                steps,
                backup_path,
                config: Some(config),
            };
        }
        steps.push(MigrationStep::completed("save_new_config"));

        match self.store.load().await {
            Ok(saved) if saved.version == CONFIG_VERSION => {
                steps.push(MigrationStep::completed("verify_new_config"));
            }
            Ok(saved) => {
                steps.push(MigrationStep::failed(
                    "verify_new_config",
                    MigrationError::Verify(format!("unexpected version {}", saved.version)),
                ));
                return MigrationResult {
                    success: false,
                    steps,
                    backup_path,
                    config: Some(config),
                };
            }
            Err(e) => {
                steps.push(MigrationStep::failed("verify_new_config", &e));
                return MigrationResult {
                    success: false,
                    steps,
                    backup_path,
                    config: Some(config),
                };
            }
        }

        // Non-fatal from here on: the new config is saved and verified.
        match self.sync.sync(&config).await {
            Ok(()) => steps.push(MigrationStep::completed("sync_basic_memory")),
            Err(e) => {
                warn!(error = %e, "Upstream sync after migration failed");
                steps.push(MigrationStep::failed("sync_basic_memory", &e));
            }
        }

        if options.remove_old_config {
            match std::fs::remove_file(self.legacy_path()) {
                Ok(()) => steps.push(MigrationStep::completed("remove_old_config")),
                Err(e) => {
                    warn!(error = %e, "Failed to remove legacy config");
                    steps.push(MigrationStep::failed("remove_old_config", &e));
                }
            }
        } else {
            steps.push(MigrationStep::skipped("remove_old_config"));
        }

        info!(projects = config.projects.len(), "Legacy config migrated");
        MigrationResult {
            success: true,
            steps,
            backup_path,
            config: Some(config),
        }
    }

    /// Restore the legacy file from its backup and delete the new config.
    pub async fn rollback_migration(&self, backup_path: &Path) -> Result<(), MigrationError> {
        std::fs::copy(backup_path, self.legacy_path()).map_err(|e| MigrationError::Backup {
            path: backup_path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.store.delete().await?;
        info!(backup = %backup_path.display(), "Migration rolled back");
        Ok(())
    }

    /// Migrate with snapshot protection: snapshot any pre-existing config
    /// first, and anchor the migrated config on success.
    pub async fn migrate_with_rollback(
        &self,
        rollback: &RollbackManager,
        options: MigrationOptions,
    ) -> MigrationResult {
        if self.store.exists() {
            if let Ok(current) = self.store.try_load_sync() {
                if let Err(e) = rollback.snapshot(&current, "pre-migration").await {
                    warn!(error = %e, "Failed to snapshot config before migration");
                }
            }
        }

        let result = self.migrate(options).await;

        if result.success && !options.dry_run {
            if let Some(config) = &result.config {
                if let Err(e) = rollback.mark_as_good(config, "migrated from legacy config").await
                {
                    warn!(error = %e, "Failed to anchor migrated config");
                }
            }
        }
        result
    }

    fn load_legacy(&self) -> Result<Value, MigrationError> {
        let path = self.legacy_path();
        let raw = std::fs::read_to_string(path).map_err(|e| MigrationError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| MigrationError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Copy the legacy file to `<legacy>.backup`, falling back to a
    /// timestamped name when a backup already exists.
    fn create_backup(&self) -> Result<PathBuf, MigrationError> {
        let legacy = self.legacy_path();
        let mut backup = PathBuf::from(format!("{}.backup", legacy.display()));
        if backup.exists() {
            backup = PathBuf::from(format!(
                "{}.{}.backup",
                legacy.display(),
                Utc::now().timestamp_millis()
            ));
        }
        std::fs::copy(legacy, &backup).map_err(|e| MigrationError::Backup {
            path: backup.clone(),
            message: e.to_string(),
        })?;
        restrict_file(&backup).map_err(|e| MigrationError::Backup {
            path: backup.clone(),
            message: e.to_string(),
        })?;
        Ok(backup)
    }
}

/// Apply the fixed legacy-to-2.0 field mapping and validate the result by
/// round-tripping it through the schema types.
pub fn transform_legacy(legacy: &Value) -> Result<UserConfig, MigrationError> {
    let obj = legacy
        .as_object()
        .ok_or_else(|| MigrationError::Transform("legacy config is not an object".into()))?;

    let mut config = UserConfig::default();

    if let Some(location) = obj
        .get("notes_path")
        .or_else(|| obj.get("default_notes_path"))
        .and_then(Value::as_str)
    {
        config.defaults.memories_location = location.to_string();
    }

    // Format A: per-project objects.
    if let Some(projects) = obj.get("projects").and_then(Value::as_object) {
        for (name, value) in projects {
            let Some(project) = value.as_object() else {
                continue;
            };
            let Some(code_path) = project.get("code_path").and_then(Value::as_str) else {
                continue;
            };
            let mut entry = ProjectEntry::new(code_path);

            if let Some(mode) = project.get("mode").and_then(Value::as_str) {
                match MemoriesMode::parse(mode) {
                    Some(mode) => entry.memories_mode = Some(mode),
                    None => warn!(project = %name, mode, "Unrecognized legacy mode ignored"),
                }
            }
            // An explicit notes path always means CUSTOM.
            if let Some(notes) = project.get("notes_path").and_then(Value::as_str) {
                entry.memories_path = Some(notes.to_string());
                entry.memories_mode = Some(MemoriesMode::Custom);
            }
            config.projects.insert(name.clone(), entry);
        }
    }

    // Format B: flat code_paths map. Format A wins on collision.
    if let Some(code_paths) = obj.get("code_paths").and_then(Value::as_object) {
        for (name, value) in code_paths {
            let Some(code_path) = value.as_str() else {
                continue;
            };
            config.projects.entry(name.clone()).or_insert_with(|| ProjectEntry {
                code_path: code_path.to_string(),
                memories_path: None,
                memories_mode: Some(MemoriesMode::Default),
            });
        }
    }

    if let Some(sync) = obj.get("sync").and_then(Value::as_object) {
        if let Some(enabled) = sync.get("enabled").and_then(Value::as_bool) {
            config.sync.enabled = enabled;
        }
        if let Some(delay) = sync.get("delay").and_then(Value::as_u64) {
            config.sync.delay_ms = delay;
        }
    }

    if let Some(level) = obj.get("log_level").and_then(Value::as_str) {
        match LogLevel::parse(level) {
            Some(level) => config.logging.level = level,
            None => warn!(level, "Unrecognized legacy log level ignored"),
        }
    }

    config.version = CONFIG_VERSION.to_string();

    brain_config::validate_config(&config)
        .map_err(|e| MigrationError::Transform(e.to_string()))?;
    Ok(config)
}
