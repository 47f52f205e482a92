//! Rollback snapshot entities
//!
//! A snapshot is an immutable, checksummed deep copy of a `UserConfig` at a
//! point in time. The on-disk format uses camelCase keys (`createdAt`,
//! `snapshotIds`) per the external interface contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::config_checksum;
use crate::config::UserConfig;
use crate::error::Result;

/// An immutable, checksummed copy of a `UserConfig`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub reason: String,
    /// Hex SHA-256 over the canonical JSON of `config`
    pub checksum: String,
    pub config: UserConfig,
}

impl ConfigSnapshot {
    /// Create a snapshot of `config` with a freshly computed checksum.
    /// The config is cloned; the snapshot never aliases the live value.
    pub fn capture(id: impl Into<String>, config: &UserConfig, reason: impl Into<String>) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            created_at: Utc::now(),
            reason: reason.into(),
            checksum: config_checksum(config)?,
            config: config.clone(),
        })
    }

    /// Recompute the checksum of the embedded config and compare it to the
    /// stored one. False means the snapshot is corrupted.
    pub fn verify(&self) -> Result<bool> {
        Ok(config_checksum(&self.config)? == self.checksum)
    }
}

/// On-disk index of snapshot IDs in chronological order (`history.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotHistoryIndex {
    pub snapshot_ids: Vec<String>,
    pub updated_at: DateTime<Utc>,
}
