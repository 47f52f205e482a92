//! Checksummed config snapshots and restore
//!
//! Keeps two things: a bounded history of snapshots and one distinguished
//! *last-known-good* anchor. Both live in memory and are mirrored under the
//! rollback directory (0700, files 0600): `last-known-good.json`,
//! `history.json` (chronological ID index), and one `<id>.json` per
//! snapshot. Every write is atomic.
//!
//! A snapshot whose recomputed checksum does not match its stored one is
//! corrupted: discarded on load, refused on restore.

use std::path::PathBuf;
use std::sync::Arc;

use brain_config::constants::SNAPSHOT_HISTORY_CAP;
use brain_config::paths::ensure_secure_dir;
use brain_config::schema::{validate_config, SchemaError};
use brain_config::store::{atomic_write_json, ConfigStore, StoreError};
use brain_core::config::UserConfig;
use brain_core::snapshot::{ConfigSnapshot, SnapshotHistoryIndex};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::services::upstream_sync::UpstreamSyncService;

const LAST_KNOWN_GOOD_FILENAME: &str = "last-known-good.json";
const HISTORY_FILENAME: &str = "history.json";

/// Which snapshot a rollback restores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// The distinguished anchor
    LastKnownGood,
    /// The most recent history entry
    Previous,
}

impl RollbackTarget {
    fn describe(self) -> &'static str {
        match self {
            RollbackTarget::LastKnownGood => "last-known-good",
            RollbackTarget::Previous => "previous",
        }
    }
}

/// Errors from rollback operations. Returned, never panicked, so callers
/// can present the user a path forward.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("No {0} snapshot available to roll back to")]
    NoSnapshot(&'static str),

    #[error("Snapshot {id} is corrupted: stored checksum does not match its config")]
    Corrupted { id: String },

    #[error(transparent)]
    Validation(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Rollback storage I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error(transparent)]
    Domain(#[from] brain_core::Error),
}

/// A successful restore
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub restored: UserConfig,
    pub snapshot: ConfigSnapshot,
}

#[derive(Debug, Default)]
struct RollbackState {
    last_known_good: Option<ConfigSnapshot>,
    history: Vec<ConfigSnapshot>,
}

/// One per process. `initialize` before use; snapshots taken before it are
/// lost on restart.
pub struct RollbackManager {
    store: Arc<ConfigStore>,
    sync: Arc<UpstreamSyncService>,
    dir: PathBuf,
    state: Mutex<RollbackState>,
}

/// Millisecond timestamp plus four random bytes; unique enough for one
/// user's rollback directory.
fn new_snapshot_id() -> String {
    format!("{}-{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>())
}

impl RollbackManager {
    pub fn new(store: Arc<ConfigStore>, sync: Arc<UpstreamSyncService>) -> Self {
        let dir = store.paths().rollback_dir();
        Self {
            store,
            sync,
            dir,
            state: Mutex::new(RollbackState::default()),
        }
    }

    /// Load the on-disk mirror: the anchor (discarded if its schema or
    /// checksum fails) and the history (corrupted entries skipped). If no
    /// anchor exists but a config file does, the current config becomes the
    /// anchor with reason "initial baseline".
    pub async fn initialize(&self) -> Result<(), RollbackError> {
        ensure_secure_dir(&self.dir).map_err(|e| RollbackError::Io {
            path: self.dir.clone(),
            message: e.to_string(),
        })?;

        let mut state = self.state.lock().await;

        state.last_known_good = self.load_verified_snapshot(&self.dir.join(LAST_KNOWN_GOOD_FILENAME));
        if let Some(anchor) = &state.last_known_good {
            if validate_config(&anchor.config).is_err() {
                warn!(id = %anchor.id, "Discarding last-known-good snapshot with invalid config");
                state.last_known_good = None;
            }
        }

        state.history.clear();
        if let Some(index) = self.load_history_index() {
            for id in &index.snapshot_ids {
                let path = self.dir.join(format!("{id}.json"));
                if let Some(snapshot) = self.load_verified_snapshot(&path) {
                    state.history.push(snapshot);
                }
            }
        }

        if state.last_known_good.is_none() && self.store.exists() {
            if let Ok(config) = self.store.try_load_sync() {
                let snapshot =
                    ConfigSnapshot::capture(new_snapshot_id(), &config, "initial baseline")?;
                self.persist_anchor(&snapshot)?;
                info!(id = %snapshot.id, "Promoted current config to rollback anchor");
                state.last_known_good = Some(snapshot);
            }
        }

        debug!(
            history = state.history.len(),
            has_anchor = state.last_known_good.is_some(),
            "Rollback manager initialized"
        );
        Ok(())
    }

    /// Snapshot `config` into the history, evicting beyond the cap.
    pub async fn snapshot(
        &self,
        config: &UserConfig,
        reason: &str,
    ) -> Result<ConfigSnapshot, RollbackError> {
        let snapshot = ConfigSnapshot::capture(new_snapshot_id(), config, reason)?;

        let mut state = self.state.lock().await;
        state.history.push(snapshot.clone());
        while state.history.len() > SNAPSHOT_HISTORY_CAP {
            let evicted = state.history.remove(0);
            let path = self.dir.join(format!("{}.json", evicted.id));
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to delete evicted snapshot");
                }
            }
        }

        self.persist_snapshot(&snapshot)?;
        self.persist_history_index(&state.history)?;
        debug!(id = %snapshot.id, reason, "Snapshot taken");
        Ok(snapshot)
    }

    /// Validate `config` and set it as the rollback anchor.
    pub async fn mark_as_good(
        &self,
        config: &UserConfig,
        reason: &str,
    ) -> Result<ConfigSnapshot, RollbackError> {
        validate_config(config)?;
        let snapshot = ConfigSnapshot::capture(new_snapshot_id(), config, reason)?;
        self.persist_anchor(&snapshot)?;

        let mut state = self.state.lock().await;
        state.last_known_good = Some(snapshot.clone());
        debug!(id = %snapshot.id, reason, "Last-known-good updated");
        Ok(snapshot)
    }

    /// Restore the target snapshot: verify its checksum, save its config
    /// through the store, then push the restored config upstream.
    pub async fn rollback(&self, target: RollbackTarget) -> Result<RollbackOutcome, RollbackError> {
        let snapshot = {
            let state = self.state.lock().await;
            match target {
                RollbackTarget::LastKnownGood => state.last_known_good.clone(),
                RollbackTarget::Previous => state.history.last().cloned(),
            }
        }
        .ok_or(RollbackError::NoSnapshot(target.describe()))?;

        if !snapshot.verify()? {
            return Err(RollbackError::Corrupted {
                id: snapshot.id.clone(),
            });
        }

        self.store.save(&snapshot.config).await?;

        // The config is restored either way; a failed upstream push will be
        // retried by the next sync.
        if let Err(e) = self.sync.sync(&snapshot.config).await {
            warn!(error = %e, "Upstream sync after rollback failed");
        }

        info!(id = %snapshot.id, target = target.describe(), "Config rolled back");
        Ok(RollbackOutcome {
            restored: snapshot.config.clone(),
            snapshot,
        })
    }

    /// The current anchor, if any
    pub async fn last_known_good(&self) -> Option<ConfigSnapshot> {
        self.state.lock().await.last_known_good.clone()
    }

    /// Number of history snapshots currently held
    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }

    fn load_verified_snapshot(&self, path: &PathBuf) -> Option<ConfigSnapshot> {
        let raw = std::fs::read_to_string(path).ok()?;
        let snapshot: ConfigSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unparseable snapshot");
                return None;
            }
        };
        match snapshot.verify() {
            Ok(true) => Some(snapshot),
            Ok(false) => {
                warn!(path = %path.display(), id = %snapshot.id, "Skipping corrupted snapshot");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unverifiable snapshot");
                None
            }
        }
    }

    fn load_history_index(&self) -> Option<SnapshotHistoryIndex> {
        let path = self.dir.join(HISTORY_FILENAME);
        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unparseable history index");
                None
            }
        }
    }

    fn persist_snapshot(&self, snapshot: &ConfigSnapshot) -> Result<(), RollbackError> {
        let path = self.dir.join(format!("{}.json", snapshot.id));
        self.write_json(&path, snapshot)
    }

    fn persist_anchor(&self, snapshot: &ConfigSnapshot) -> Result<(), RollbackError> {
        self.write_json(&self.dir.join(LAST_KNOWN_GOOD_FILENAME), snapshot)
    }

    fn persist_history_index(&self, history: &[ConfigSnapshot]) -> Result<(), RollbackError> {
        let index = SnapshotHistoryIndex {
            snapshot_ids: history.iter().map(|s| s.id.clone()).collect(),
            updated_at: Utc::now(),
        };
        self.write_json(&self.dir.join(HISTORY_FILENAME), &index)
    }

    fn write_json<T: serde::Serialize>(
        &self,
        path: &PathBuf,
        value: &T,
    ) -> Result<(), RollbackError> {
        ensure_secure_dir(&self.dir).map_err(|e| RollbackError::Io {
            path: self.dir.clone(),
            message: e.to_string(),
        })?;
        let contents = serde_json::to_string_pretty(value)
            .map_err(|e| brain_core::Error::Parse(e.to_string()))?;
        atomic_write_json(path, &contents).map_err(|e| RollbackError::Io {
            path: path.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::NullUpstreamController;
    use brain_config::locks::LockManager;
    use brain_config::paths::BrainPaths;
    use brain_core::config::ProjectEntry;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> RollbackManager {
        let paths = BrainPaths::rooted_at(temp.path());
        let locks = Arc::new(LockManager::new(paths.lock_dir()));
        let store = Arc::new(ConfigStore::new(paths.clone(), locks.clone()));
        let sync = Arc::new(UpstreamSyncService::new(
            paths,
            locks,
            Arc::new(NullUpstreamController),
        ));
        RollbackManager::new(store, sync)
    }

    fn config_with_delay(delay_ms: u64) -> UserConfig {
        UserConfig {
            sync: brain_core::config::SyncSection {
                enabled: true,
                delay_ms,
            },
            ..UserConfig::default()
        }
    }

    #[tokio::test]
    async fn rollback_restores_the_anchor_config() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        manager.initialize().await.unwrap();

        let good = config_with_delay(750);
        manager.store.save(&good).await.unwrap();
        manager.mark_as_good(&good, "test anchor").await.unwrap();

        // Something else was saved afterwards.
        manager.store.save(&config_with_delay(999)).await.unwrap();

        let outcome = manager.rollback(RollbackTarget::LastKnownGood).await.unwrap();
        assert_eq!(outcome.restored, good);
        assert_eq!(manager.store.load().await.unwrap(), good);
    }

    #[tokio::test]
    async fn rollback_previous_uses_most_recent_history_entry() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        manager.initialize().await.unwrap();

        manager.snapshot(&config_with_delay(100), "older").await.unwrap();
        let newer = config_with_delay(200);
        manager.snapshot(&newer, "newer").await.unwrap();

        let outcome = manager.rollback(RollbackTarget::Previous).await.unwrap();
        assert_eq!(outcome.restored, newer);
    }

    #[tokio::test]
    async fn rollback_without_anchor_is_an_error() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        manager.initialize().await.unwrap();

        let result = manager.rollback(RollbackTarget::LastKnownGood).await;
        assert!(matches!(result, Err(RollbackError::NoSnapshot(_))));
    }

    #[tokio::test]
    async fn history_evicts_oldest_beyond_cap() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        manager.initialize().await.unwrap();

        let mut ids = Vec::new();
        for i in 0..=SNAPSHOT_HISTORY_CAP {
            let snapshot = manager
                .snapshot(&config_with_delay(i as u64), "fill")
                .await
                .unwrap();
            ids.push(snapshot.id);
        }

        assert_eq!(manager.history_len().await, SNAPSHOT_HISTORY_CAP);
        // Oldest snapshot file is gone, newest still present.
        let dir = manager.dir.clone();
        assert!(!dir.join(format!("{}.json", ids[0])).exists());
        assert!(dir.join(format!("{}.json", ids[SNAPSHOT_HISTORY_CAP])).exists());

        // Index matches the retained set.
        let index: SnapshotHistoryIndex =
            serde_json::from_str(&std::fs::read_to_string(dir.join(HISTORY_FILENAME)).unwrap())
                .unwrap();
        assert_eq!(index.snapshot_ids, ids[1..].to_vec());
    }

    #[tokio::test]
    async fn initialize_reloads_persisted_state() {
        let temp = TempDir::new().unwrap();
        {
            let manager = manager(&temp);
            manager.initialize().await.unwrap();
            manager.snapshot(&config_with_delay(1), "one").await.unwrap();
            manager
                .mark_as_good(&config_with_delay(2), "anchor")
                .await
                .unwrap();
        }

        let manager = manager(&temp);
        manager.initialize().await.unwrap();
        assert_eq!(manager.history_len().await, 1);
        let anchor = manager.last_known_good().await.unwrap();
        assert_eq!(anchor.config.sync.delay_ms, 2);
        assert_eq!(anchor.reason, "anchor");
    }

    #[tokio::test]
    async fn initialize_discards_corrupted_snapshots() {
        let temp = TempDir::new().unwrap();
        let dir;
        {
            let manager = manager(&temp);
            manager.initialize().await.unwrap();
            manager
                .mark_as_good(&config_with_delay(5), "anchor")
                .await
                .unwrap();
            let snap = manager.snapshot(&config_with_delay(6), "hist").await.unwrap();
            dir = manager.dir.clone();

            // Tamper with both files: config changes, checksum does not.
            for path in [
                dir.join(LAST_KNOWN_GOOD_FILENAME),
                dir.join(format!("{}.json", snap.id)),
            ] {
                let mut value: serde_json::Value =
                    serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
                value["config"]["sync"]["delay_ms"] = serde_json::json!(12345);
                std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
            }
        }

        let manager = manager(&temp);
        manager.initialize().await.unwrap();
        assert_eq!(manager.history_len().await, 0);
        // The tampered anchor was discarded; no config file exists, so no
        // replacement anchor was promoted.
        assert!(manager.last_known_good().await.is_none());
    }

    #[tokio::test]
    async fn initialize_promotes_existing_config_to_anchor() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);

        let mut config = UserConfig::default();
        config.projects.insert(
            "alpha".into(),
            ProjectEntry::new("/workspace/alpha"),
        );
        manager.store.save(&config).await.unwrap();

        manager.initialize().await.unwrap();
        let anchor = manager.last_known_good().await.unwrap();
        assert_eq!(anchor.config, config);
        assert_eq!(anchor.reason, "initial baseline");
    }
}
