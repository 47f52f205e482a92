//! Durable per-file tracking of project-content migrations
//!
//! Moving a project's memory store is a multi-file copy that can be
//! interrupted at any point. Every copy runs against a manifest: source
//! checksums are computed up front, each file moves through
//! `pending -> copied -> verified`, and the manifest is atomically
//! re-persisted after every state change. At process start,
//! `recover_incomplete_migrations` rolls back whatever never finished.
//!
//! Rollback deletes target files only. A target that resolves under the
//! source root, or outside the target root, is never touched.

use std::path::{Path, PathBuf};

use brain_config::locks::sanitize_project_name;
use brain_config::paths::ensure_secure_dir;
use brain_config::safety::is_path_within;
use brain_config::store::atomic_write_json;
use brain_core::checksum::sha256_hex;
use brain_core::manifest::{CopyEntry, CopyManifest, CopyStatus};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Errors from manifest operations
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse manifest at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Manifest {id} has no entry {index}")]
    UnknownEntry { id: String, index: usize },

    #[error("Entry {index} of manifest {id} is {actual:?}, expected {expected:?}")]
    InvalidState {
        id: String,
        index: usize,
        expected: CopyStatus,
        actual: CopyStatus,
    },
}

/// Result of rolling back one partial copy
#[derive(Debug, Clone)]
pub struct CopyRollbackReport {
    pub success: bool,
    pub files_rolled_back: usize,
    pub failures: Vec<String>,
}

/// Aggregated result of startup recovery
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub found: usize,
    pub recovered: usize,
    pub failures: Vec<String>,
}

/// Owns the manifest directory (0700, files 0600)
pub struct CopyManifestEngine {
    dir: PathBuf,
}

fn new_migration_id() -> String {
    format!("{}-{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>())
}

fn file_sha256(path: &Path) -> std::io::Result<String> {
    Ok(sha256_hex(&std::fs::read(path)?))
}

impl CopyManifestEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Start a manifest for copying `files` (paths relative to the roots).
    /// Source checksums are computed now; every entry starts `pending`.
    pub fn create(
        &self,
        project: &str,
        source_root: &Path,
        target_root: &Path,
        files: &[PathBuf],
    ) -> Result<CopyManifest, ManifestError> {
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let source_path = source_root.join(file);
            let source_checksum = file_sha256(&source_path).map_err(|e| ManifestError::Io {
                path: source_path.clone(),
                message: e.to_string(),
            })?;
            entries.push(CopyEntry {
                source_path,
                target_path: target_root.join(file),
                source_checksum,
                target_checksum: None,
                status: CopyStatus::Pending,
                copied_at: None,
                error: None,
            });
        }

        let manifest = CopyManifest {
            migration_id: new_migration_id(),
            project: project.to_string(),
            source_root: source_root.to_path_buf(),
            target_root: target_root.to_path_buf(),
            started_at: Utc::now(),
            completed_at: None,
            entries,
        };
        self.save(&manifest)?;
        debug!(id = %manifest.migration_id, files = manifest.entries.len(), "Copy manifest created");
        Ok(manifest)
    }

    /// Record the copy of entry `index`: checksum the target and move the
    /// entry to `copied`, or to `failed` when the target is unreadable.
    pub fn mark_copied(
        &self,
        manifest: &mut CopyManifest,
        index: usize,
    ) -> Result<(), ManifestError> {
        let entry = Self::entry_mut(manifest, index)?;
        match file_sha256(&entry.target_path) {
            Ok(checksum) => {
                entry.target_checksum = Some(checksum);
                entry.status = CopyStatus::Copied;
                entry.copied_at = Some(Utc::now());
                entry.error = None;
            }
            Err(e) => {
                entry.status = CopyStatus::Failed;
                entry.error = Some(e.to_string());
            }
        }
        self.save(manifest)
    }

    /// Verify entry `index`: the target must recompute to the recorded
    /// source checksum. Mismatches and read errors move it to `failed`.
    pub fn verify(&self, manifest: &mut CopyManifest, index: usize) -> Result<(), ManifestError> {
        let id = manifest.migration_id.clone();
        let entry = Self::entry_mut(manifest, index)?;
        if entry.status != CopyStatus::Copied {
            return Err(ManifestError::InvalidState {
                id,
                index,
                expected: CopyStatus::Copied,
                actual: entry.status,
            });
        }

        match file_sha256(&entry.target_path) {
            Ok(checksum) if checksum == entry.source_checksum => {
                entry.status = CopyStatus::Verified;
                entry.error = None;
            }
            Ok(checksum) => {
                entry.status = CopyStatus::Failed;
                entry.error = Some(format!(
                    "checksum mismatch: expected {}, got {}",
                    entry.source_checksum, checksum
                ));
            }
            Err(e) => {
                entry.status = CopyStatus::Failed;
                entry.error = Some(e.to_string());
            }
        }
        self.save(manifest)
    }

    /// Move entry `index` to `failed` with a message.
    pub fn mark_failed(
        &self,
        manifest: &mut CopyManifest,
        index: usize,
        message: &str,
    ) -> Result<(), ManifestError> {
        let entry = Self::entry_mut(manifest, index)?;
        entry.status = CopyStatus::Failed;
        entry.error = Some(message.to_string());
        self.save(manifest)
    }

    /// Stamp the completion time. The manifest still counts as incomplete
    /// if any entry is not `verified`.
    pub fn mark_completed(&self, manifest: &mut CopyManifest) -> Result<(), ManifestError> {
        manifest.completed_at = Some(Utc::now());
        self.save(manifest)
    }

    /// Undo a partial copy: delete every copied or verified target file,
    /// remove the target root if it ends up empty, drop the manifest.
    /// Source files are never touched.
    pub fn rollback_partial_copy(&self, manifest: &CopyManifest) -> CopyRollbackReport {
        let mut files_rolled_back = 0;
        let mut failures = Vec::new();

        for entry in &manifest.entries {
            if !matches!(entry.status, CopyStatus::Copied | CopyStatus::Verified) {
                continue;
            }
            let target = &entry.target_path;
            if is_path_within(target, &manifest.source_root)
                || !is_path_within(target, &manifest.target_root)
            {
                failures.push(format!(
                    "refusing to delete {} outside the target root",
                    target.display()
                ));
                continue;
            }
            match std::fs::remove_file(target) {
                Ok(()) => files_rolled_back += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => files_rolled_back += 1,
                Err(e) => failures.push(format!("{}: {}", target.display(), e)),
            }
        }

        // Drop the target root only when the rollback emptied it.
        if let Ok(mut dir) = std::fs::read_dir(&manifest.target_root) {
            if dir.next().is_none() {
                if let Err(e) = std::fs::remove_dir(&manifest.target_root) {
                    warn!(path = %manifest.target_root.display(), error = %e, "Failed to remove empty target root");
                }
            }
        }

        let manifest_path = self.manifest_path(&manifest.migration_id);
        if let Err(e) = std::fs::remove_file(&manifest_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                failures.push(format!("{}: {}", manifest_path.display(), e));
            }
        }

        info!(
            id = %manifest.migration_id,
            files_rolled_back,
            failures = failures.len(),
            "Partial copy rolled back"
        );
        CopyRollbackReport {
            success: failures.is_empty(),
            files_rolled_back,
            failures,
        }
    }

    /// Enumerate all manifests and roll back every incomplete one.
    pub fn recover_incomplete_migrations(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                report
                    .failures
                    .push(format!("{}: {}", self.dir.display(), e));
                return report;
            }
        };

        for dir_entry in entries.flatten() {
            let path = dir_entry.path();
            if !path.to_string_lossy().ends_with(MANIFEST_SUFFIX) {
                continue;
            }
            let manifest = match self.load_manifest(&path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    report.failures.push(e.to_string());
                    continue;
                }
            };
            if !manifest.is_incomplete() {
                continue;
            }

            report.found += 1;
            let rollback = self.rollback_partial_copy(&manifest);
            if rollback.success {
                report.recovered += 1;
            } else {
                report.failures.extend(rollback.failures);
            }
        }

        if report.found > 0 {
            info!(
                found = report.found,
                recovered = report.recovered,
                "Incomplete content migrations recovered"
            );
        }
        report
    }

    /// Atomically persist the manifest.
    pub fn save(&self, manifest: &CopyManifest) -> Result<(), ManifestError> {
        ensure_secure_dir(&self.dir).map_err(|e| ManifestError::Io {
            path: self.dir.clone(),
            message: e.to_string(),
        })?;
        let path = self.manifest_path(&manifest.migration_id);
        let contents = serde_json::to_string_pretty(manifest).map_err(|e| ManifestError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        atomic_write_json(&path, &contents).map_err(|e| ManifestError::Io {
            path,
            message: e.to_string(),
        })
    }

    fn load_manifest(&self, path: &Path) -> Result<CopyManifest, ManifestError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Manifest IDs are generated internally but sanitized anyway so an ID
    /// can never traverse out of the manifest directory.
    fn manifest_path(&self, id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{MANIFEST_SUFFIX}", sanitize_project_name(id)))
    }

    fn entry_mut(
        manifest: &mut CopyManifest,
        index: usize,
    ) -> Result<&mut CopyEntry, ManifestError> {
        let id = manifest.migration_id.clone();
        manifest
            .entries
            .get_mut(index)
            .ok_or(ManifestError::UnknownEntry { id, index })
    }
}
