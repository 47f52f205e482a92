//! Atomic, validated persistence of the user config
//!
//! One file (`<XDG>/brain/config.json`), one writer path. Every write goes
//! through `atomic_write_json`: stage to `config.json.tmp`, read the staged
//! bytes back and re-parse them to verify integrity, then rename over the
//! target. A crash at any point leaves either the old file or the new file,
//! never a partial one.
//!
//! All operations serialize on the config-file lock (5 s default timeout).
//! A missing file on load is the normal first-run case and yields the
//! built-in default, not an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use brain_core::config::UserConfig;
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::TMP_SUFFIX;
use crate::locks::{LockError, LockManager};
use crate::paths::{ensure_parent_dir, ensure_secure_dir, restrict_file, BrainPaths};
use crate::schema::{validate_config, SchemaError};

/// Errors from config store operations
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Failed to parse config at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Validation(#[from] SchemaError),

    #[error("Config I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StoreError {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Write JSON contents atomically: stage to `<path>.tmp`, re-parse the
/// staged bytes, rename into place. The temp file is cleaned up on every
/// failure path.
pub fn atomic_write_json(path: &Path, contents: &str) -> std::io::Result<()> {
    ensure_parent_dir(path)?;

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(TMP_SUFFIX);
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| {
        std::fs::write(&tmp_path, contents)?;
        restrict_file(&tmp_path)?;

        // Verify the staged bytes parse before they replace the target.
        let staged = std::fs::read_to_string(&tmp_path)?;
        serde_json::from_str::<serde_json::Value>(&staged).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

/// The single authoritative reader/writer of the user config file
pub struct ConfigStore {
    paths: BrainPaths,
    locks: Arc<LockManager>,
}

impl ConfigStore {
    pub fn new(paths: BrainPaths, locks: Arc<LockManager>) -> Self {
        Self { paths, locks }
    }

    pub fn paths(&self) -> &BrainPaths {
        &self.paths
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Load the config, returning the built-in default when the file does
    /// not exist yet.
    pub async fn load(&self) -> Result<UserConfig, StoreError> {
        let path = self.paths.config_path();
        self.locks
            .with_config_lock(|| async { Self::read_validated(&path) })
            .await?
    }

    /// Validate and atomically persist the config.
    pub async fn save(&self, config: &UserConfig) -> Result<(), StoreError> {
        validate_config(config)?;

        let path = self.paths.config_path();
        let dir = self.paths.config_dir.clone();
        let contents = serde_json::to_string_pretty(config).map_err(|e| StoreError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        self.locks
            .with_config_lock(|| async move {
                ensure_secure_dir(&dir).map_err(|e| StoreError::io(&dir, &e))?;
                atomic_write_json(&path, &contents).map_err(|e| StoreError::io(&path, &e))?;
                debug!(path = %path.display(), "Config saved");
                Ok(())
            })
            .await?
    }

    /// Create the config file with defaults if it does not exist yet.
    pub async fn init(&self) -> Result<UserConfig, StoreError> {
        if self.exists() {
            return self.load().await;
        }
        let config = UserConfig::default();
        self.save(&config).await?;
        Ok(config)
    }

    pub fn exists(&self) -> bool {
        self.paths.config_path().exists()
    }

    /// Remove the config file. Missing file is not an error.
    pub async fn delete(&self) -> Result<(), StoreError> {
        let path = self.paths.config_path();
        self.locks
            .with_config_lock(|| async move {
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(StoreError::io(&path, &e)),
                }
            })
            .await?
    }

    /// Best-effort synchronous load for bootstrap: any failure falls back to
    /// the built-in default.
    pub fn load_sync(&self) -> UserConfig {
        match self.try_load_sync() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Falling back to default config");
                UserConfig::default()
            }
        }
    }

    /// Synchronous load without lock acquisition. The watcher uses this to
    /// avoid lock contention during rapid editor writes; errors surface so
    /// invalid edits can trigger rollback.
    pub fn try_load_sync(&self) -> Result<UserConfig, StoreError> {
        Self::read_validated(&self.paths.config_path())
    }

    fn read_validated(path: &Path) -> Result<UserConfig, StoreError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file absent, using defaults");
                return Ok(UserConfig::default());
            }
            Err(e) => return Err(StoreError::io(path, &e)),
        };
        let config: UserConfig = serde_json::from_str(&raw).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        validate_config(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brain_core::config::{MemoriesMode, ProjectEntry};
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> ConfigStore {
        let paths = BrainPaths::rooted_at(temp.path());
        let locks = Arc::new(LockManager::new(paths.lock_dir()));
        ConfigStore::new(paths, locks)
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let config = store.load().await.unwrap();
        assert_eq!(config, UserConfig::default());
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let mut config = UserConfig::default();
        config.projects.insert(
            "alpha".into(),
            ProjectEntry {
                code_path: "/workspace/alpha".into(),
                memories_path: Some("~/alpha-notes".into()),
                memories_mode: Some(MemoriesMode::Custom),
            },
        );
        config.sync.delay_ms = 750;

        store.save(&config).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn save_rejects_invalid_config_and_leaves_file_untouched() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let good = UserConfig::default();
        store.save(&good).await.unwrap();

        let mut bad = good.clone();
        bad.defaults.memories_location = "/etc/memories".into();
        let result = store.save(&bad).await;
        assert!(matches!(result, Err(StoreError::Validation(_))));

        assert_eq!(store.load().await.unwrap(), good);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        std::fs::create_dir_all(&store.paths().config_dir).unwrap();
        std::fs::write(store.paths().config_path(), "{not json").unwrap();

        let result = store.load().await;
        assert!(matches!(result, Err(StoreError::Parse { .. })));
    }

    #[tokio::test]
    async fn load_sync_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        std::fs::create_dir_all(&store.paths().config_dir).unwrap();
        std::fs::write(store.paths().config_path(), "garbage").unwrap();

        assert_eq!(store.load_sync(), UserConfig::default());
        assert!(store.try_load_sync().is_err());
    }

    #[tokio::test]
    async fn init_creates_defaults_once() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let created = store.init().await.unwrap();
        assert_eq!(created, UserConfig::default());
        assert!(store.exists());

        // A second init loads rather than overwrites.
        let mut config = store.load().await.unwrap();
        config.sync.delay_ms = 123;
        store.save(&config).await.unwrap();
        assert_eq!(store.init().await.unwrap().sync.delay_ms, 123);
    }

    #[tokio::test]
    async fn delete_removes_file_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.init().await.unwrap();
        store.delete().await.unwrap();
        assert!(!store.exists());
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn stale_temp_file_does_not_break_save() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        std::fs::create_dir_all(&store.paths().config_dir).unwrap();
        let tmp = store.paths().config_dir.join("config.json.tmp");
        std::fs::write(&tmp, "leftover from a crash").unwrap();

        store.save(&UserConfig::default()).await.unwrap();
        assert!(!tmp.exists());
        assert_eq!(store.load().await.unwrap(), UserConfig::default());
    }

    #[test]
    fn atomic_write_rejects_unparseable_contents() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("out.json");
        std::fs::write(&target, r#"{"old": true}"#).unwrap();

        let result = atomic_write_json(&target, "{broken");
        assert!(result.is_err());
        // Old contents intact, temp cleaned up.
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            r#"{"old": true}"#
        );
        assert!(!temp.path().join("out.json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn saved_file_has_restricted_mode() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.init().await.unwrap();
        let mode = std::fs::metadata(store.paths().config_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
