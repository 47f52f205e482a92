//! Copy-manifest entities
//!
//! A `CopyManifest` is the durable record of a project-content migration:
//! one entry per file, each carrying the source checksum computed before the
//! copy and the verification state afterwards. If a manifest is found
//! incomplete at startup, the engine rolls the copy back.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-file copy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Pending,
    Copied,
    Verified,
    Failed,
}

/// One file tracked by a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyEntry {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    /// SHA-256 of the source file, computed at manifest creation
    pub source_checksum: String,
    /// SHA-256 of the target file, computed after the copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_checksum: Option<String>,
    pub status: CopyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Durable record of a project-content migration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyManifest {
    pub migration_id: String,
    pub project: String,
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub started_at: DateTime<Utc>,
    /// Set only once every entry is `verified`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub entries: Vec<CopyEntry>,
}

impl CopyManifest {
    /// A manifest is incomplete when it never finished or any entry is not
    /// yet verified. Incomplete manifests are rolled back on startup.
    pub fn is_incomplete(&self) -> bool {
        self.completed_at.is_none()
            || self
                .entries
                .iter()
                .any(|entry| entry.status != CopyStatus::Verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: CopyStatus) -> CopyEntry {
        CopyEntry {
            source_path: PathBuf::from("/src/a.md"),
            target_path: PathBuf::from("/dst/a.md"),
            source_checksum: "00".repeat(32),
            target_checksum: None,
            status,
            copied_at: None,
            error: None,
        }
    }

    fn manifest(entries: Vec<CopyEntry>, completed: bool) -> CopyManifest {
        CopyManifest {
            migration_id: "m-1".into(),
            project: "alpha".into(),
            source_root: PathBuf::from("/src"),
            target_root: PathBuf::from("/dst"),
            started_at: Utc::now(),
            completed_at: completed.then(Utc::now),
            entries,
        }
    }

    #[test]
    fn manifest_without_completion_is_incomplete() {
        let m = manifest(vec![entry(CopyStatus::Verified)], false);
        assert!(m.is_incomplete());
    }

    #[test]
    fn manifest_with_unverified_entry_is_incomplete() {
        let m = manifest(
            vec![entry(CopyStatus::Verified), entry(CopyStatus::Copied)],
            true,
        );
        assert!(m.is_incomplete());
    }

    #[test]
    fn fully_verified_completed_manifest_is_complete() {
        let m = manifest(vec![entry(CopyStatus::Verified)], true);
        assert!(!m.is_incomplete());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CopyStatus::Pending).unwrap(),
            "\"pending\""
        );
        let json = serde_json::to_value(manifest(vec![entry(CopyStatus::Pending)], false)).unwrap();
        assert!(json.get("migrationId").is_some());
        assert!(json["entries"][0].get("sourceChecksum").is_some());
    }
}
