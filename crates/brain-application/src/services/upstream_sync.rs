//! Projection of the user config to the upstream format
//!
//! Translation is pure: resolve each project's memory-store path per its
//! mode, merge the result into the *existing* upstream config so unknown
//! keys survive, and project the sync/logging settings. `sync` wraps the
//! pure step with the locked, atomic write and the restart signal the
//! upstream contract requires.
//!
//! A project that fails resolution is dropped from the projection rather
//! than failing the whole translation; `validate_translation` and
//! `preview_translation` surface the individual failures.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use brain_config::locks::{LockError, LockManager};
use brain_config::paths::{ensure_secure_dir, expand_tilde, BrainPaths};
use brain_config::safety::{validate_code_path, validate_memories_path};
use brain_config::store::atomic_write_json;
use brain_core::config::{DefaultsSection, MemoriesMode, ProjectEntry, UserConfig};
use brain_core::upstream::UpstreamConfig;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ports::UpstreamControllerRef;

/// Errors from the synced upstream write
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Upstream config I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to serialize upstream config: {0}")]
    Serialize(String),

    #[error("Failed to signal upstream restart: {0}")]
    Signal(String),
}

/// One project that could not be projected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationIssue {
    pub project: String,
    pub message: String,
}

/// Dry-run result: the projection plus every per-project failure
#[derive(Debug, Clone)]
pub struct TranslationPreview {
    pub upstream: UpstreamConfig,
    pub issues: Vec<TranslationIssue>,
}

/// Resolve a project's memory-store path per its effective mode.
///
/// DEFAULT joins the default location with the project name, CODE appends
/// `docs` to the code path, CUSTOM takes the explicit `memories_path`.
/// Every candidate is normalized and safety-checked; memory-store
/// candidates additionally go through the system-root blocklist, while
/// CODE-derived candidates inherit wherever the code already lives.
pub fn resolve_memories_path(
    project: &str,
    entry: &ProjectEntry,
    defaults: &DefaultsSection,
) -> Result<PathBuf, TranslationIssue> {
    let issue = |message: String| TranslationIssue {
        project: project.to_string(),
        message,
    };

    match entry.effective_mode(defaults) {
        MemoriesMode::Default => {
            let candidate = expand_tilde(Path::new(&defaults.memories_location)).join(project);
            validate_memories_path(&candidate.to_string_lossy())
                .map_err(|e| issue(format!("default memories location rejected: {e}")))
        }
        MemoriesMode::Code => {
            let candidate = expand_tilde(Path::new(&entry.code_path)).join("docs");
            validate_code_path(&candidate.to_string_lossy())
                .map_err(|e| issue(format!("code path rejected: {e}")))
        }
        MemoriesMode::Custom => {
            let path = entry
                .memories_path
                .as_deref()
                .ok_or_else(|| issue("memories_path is required for CUSTOM mode".to_string()))?;
            validate_memories_path(path)
                .map_err(|e| issue(format!("memories_path rejected: {e}")))
        }
    }
}

/// Project a `UserConfig` onto the upstream format.
///
/// Starts from `existing` so keys the core does not own survive the
/// rewrite verbatim. Unresolvable projects are dropped.
pub fn translate(config: &UserConfig, existing: Option<&UpstreamConfig>) -> UpstreamConfig {
    let mut upstream = existing.cloned().unwrap_or_default();
    upstream.projects.clear();

    for (name, entry) in &config.projects {
        match resolve_memories_path(name, entry, &config.defaults) {
            Ok(path) => {
                upstream
                    .projects
                    .insert(name.clone(), path.to_string_lossy().into_owned());
            }
            Err(e) => {
                warn!(project = %name, reason = %e.message, "Project dropped from upstream projection");
            }
        }
    }

    upstream.sync_changes = config.sync.enabled;
    upstream.sync_delay = config.sync.delay_ms;
    upstream.log_level = config.logging.level.as_str().to_string();
    upstream
}

/// Collect every per-project resolution failure without writing anything.
pub fn validate_translation(config: &UserConfig) -> Vec<TranslationIssue> {
    config
        .projects
        .iter()
        .filter_map(|(name, entry)| resolve_memories_path(name, entry, &config.defaults).err())
        .collect()
}

/// Writes the projected upstream config and signals the upstream process
pub struct UpstreamSyncService {
    paths: BrainPaths,
    locks: Arc<LockManager>,
    controller: UpstreamControllerRef,
}

impl UpstreamSyncService {
    pub fn new(
        paths: BrainPaths,
        locks: Arc<LockManager>,
        controller: UpstreamControllerRef,
    ) -> Self {
        Self {
            paths,
            locks,
            controller,
        }
    }

    /// Translate without writing: the projection plus its issues.
    pub fn preview_translation(&self, config: &UserConfig) -> TranslationPreview {
        let existing = self.read_existing();
        TranslationPreview {
            upstream: translate(config, existing.as_ref()),
            issues: validate_translation(config),
        }
    }

    /// Project `config` and atomically write the upstream config file,
    /// then signal the upstream process to restart.
    ///
    /// The whole read-translate-write runs under the config-file lock so a
    /// concurrent writer never interleaves with the read of the existing
    /// upstream contents.
    pub async fn sync(&self, config: &UserConfig) -> Result<(), SyncError> {
        let path = self.paths.upstream_config_path.clone();
        let config = config.clone();

        self.locks
            .with_config_lock(|| async move {
                let existing = Self::read_upstream_file(&path);
                let upstream = translate(&config, existing.as_ref());
                let contents = serde_json::to_string_pretty(&upstream)
                    .map_err(|e| SyncError::Serialize(e.to_string()))?;

                if let Some(parent) = path.parent() {
                    ensure_secure_dir(parent).map_err(|e| SyncError::Io {
                        path: parent.to_path_buf(),
                        message: e.to_string(),
                    })?;
                }
                atomic_write_json(&path, &contents).map_err(|e| SyncError::Io {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                debug!(path = %path.display(), projects = upstream.projects.len(), "Upstream config written");
                Ok::<(), SyncError>(())
            })
            .await??;

        // The upstream only re-reads its config at startup; without this
        // signal the write never takes effect.
        self.controller
            .signal_restart()
            .await
            .map_err(|e| SyncError::Signal(e.to_string()))
    }

    fn read_existing(&self) -> Option<UpstreamConfig> {
        Self::read_upstream_file(&self.paths.upstream_config_path)
    }

    /// Tolerant read of the current upstream file. The file is derived
    /// state, so an unparseable file is replaced rather than blocking sync.
    fn read_upstream_file(path: &Path) -> Option<UpstreamConfig> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(upstream) => Some(upstream),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Existing upstream config unparseable, rewriting from scratch");
                None
            }
        }
    }
}
